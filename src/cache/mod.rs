//! Batch cache-aside layer.
//!
//! Three components, leaves first:
//!
//! - **Facade** (`CacheFacade`): resilient, pipeline-capable wrapper around
//!   the backing key-value store. Every store failure is absorbed into a
//!   logged miss; a cache outage means "always compute", never "always
//!   fail".
//! - **Engine** (`BatchCache`): the batch reconciliation protocol. One
//!   pipelined read, a loader call for the misses only, a pipelined
//!   write-back, and a result re-keyed by a configured field.
//! - **Binding** (`BatchBinding`): per-call validation of a declared
//!   operation shape, with the original operation wrapped as the miss-path
//!   loader.
//!
//! The store itself stays behind the [`StoreBackend`] trait; an in-process
//! implementation lives in `infra::memory`.

mod batch;
mod bind;
mod codec;
mod facade;
mod keys;
mod store;

pub use batch::{
    BatchCache, BatchConfig, DEFAULT_KEY_PARAM, DEFAULT_RESULT_KEY_FIELD, DEFAULT_TTL_SECONDS,
    FieldAccessor,
};
pub use bind::{BatchBinding, ConfigError, OperationShape, Param, ParamKind, ReturnKind};
pub use codec::{Codec, CodecError, JsonCodec, MAX_KEY_BYTES};
pub use facade::CacheFacade;
pub use keys::{CacheKey, FieldValue};
pub use store::{StoreBackend, StoreCommand, StoreError, StoreReply};
