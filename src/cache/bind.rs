//! Operation binding and validation.
//!
//! The declaration mechanism is a plain data record: an [`OperationShape`]
//! describes the stable signature of a batch-cacheable operation, and
//! [`BatchBinding::bind`] validates it against a [`BatchConfig`] before any
//! call goes through the engine. Validation runs for every call; a
//! misdeclared operation fails loudly, never degrades.
//!
//! Binding wraps no object and re-instantiates nothing: the original
//! operation travels as a loader closure into
//! [`BatchBinding::dispatch`], which hands it to the reconciliation engine
//! together with the key collection.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use super::batch::{BatchCache, BatchConfig, FieldAccessor};
use super::keys::FieldValue;

/// Declared kind of one operation parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// A single value.
    Scalar,
    /// An ordered sequence of values.
    Collection,
}

/// Declared kind of an operation's return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Map,
    List,
    Scalar,
    Unit,
}

/// One declared parameter.
#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
}

/// The stable signature of a batch-cacheable operation.
///
/// `const`-constructible so call sites declare their shape once as a static.
#[derive(Debug, Clone, Copy)]
pub struct OperationShape {
    pub name: &'static str,
    pub params: &'static [Param],
    pub returns: ReturnKind,
}

/// Malformed declarative binding. Surfaced to the operator at bind time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("operation `{operation}`: return type must be a mapping")]
    ReturnNotMapping { operation: String },
    #[error("operation `{operation}`: key parameter must be a collection")]
    KeyParamNotCollection { operation: String },
    #[error("operation `{operation}`: named parameter not found")]
    KeyParamMissing { operation: String },
    #[error("operation `{operation}`: ttl must be greater than zero")]
    ZeroTtl { operation: String },
    #[error("operation `{operation}`: result key field must not be blank")]
    BlankResultKeyField { operation: String },
}

impl ConfigError {
    fn return_not_mapping(operation: &str) -> Self {
        Self::ReturnNotMapping {
            operation: operation.to_string(),
        }
    }

    fn key_param_not_collection(operation: &str) -> Self {
        Self::KeyParamNotCollection {
            operation: operation.to_string(),
        }
    }

    fn key_param_missing(operation: &str) -> Self {
        Self::KeyParamMissing {
            operation: operation.to_string(),
        }
    }

    fn zero_ttl(operation: &str) -> Self {
        Self::ZeroTtl {
            operation: operation.to_string(),
        }
    }

    fn blank_result_key_field(operation: &str) -> Self {
        Self::BlankResultKeyField {
            operation: operation.to_string(),
        }
    }
}

/// A validated binding of one operation to the reconciliation engine.
///
/// Holds the resolved key parameter and the result-key accessor; both are
/// resolved exactly once per binding.
#[derive(Debug)]
pub struct BatchBinding<T> {
    operation: &'static str,
    key_param: &'static str,
    config: BatchConfig,
    accessor: FieldAccessor<T>,
}

impl<T: Serialize> BatchBinding<T> {
    /// Validates `shape` against `config`, resolving the result-key field to
    /// the serde-based accessor.
    pub fn bind(shape: &OperationShape, config: BatchConfig) -> Result<Self, ConfigError> {
        let accessor = FieldAccessor::by_name(config.result_key_field.clone());
        Self::bind_with(shape, config, accessor)
    }
}

impl<T> BatchBinding<T> {
    /// Like [`bind`](Self::bind), with a caller-supplied typed accessor in
    /// place of the serde-based one.
    pub fn bind_with(
        shape: &OperationShape,
        config: BatchConfig,
        accessor: FieldAccessor<T>,
    ) -> Result<Self, ConfigError> {
        if shape.returns != ReturnKind::Map {
            return Err(ConfigError::return_not_mapping(shape.name));
        }
        if config.ttl_seconds == 0 {
            return Err(ConfigError::zero_ttl(shape.name));
        }
        if config.result_key_field.trim().is_empty() {
            return Err(ConfigError::blank_result_key_field(shape.name));
        }

        let key_param = resolve_key_param(shape, &config)?;
        if key_param.kind != ParamKind::Collection {
            return Err(ConfigError::key_param_not_collection(shape.name));
        }

        Ok(Self {
            operation: shape.name,
            key_param: key_param.name,
            config,
            accessor,
        })
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Name of the resolved key parameter.
    pub fn key_param(&self) -> &'static str {
        self.key_param
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Runs one call through the engine, with the original operation wrapped
    /// as the miss-path loader.
    pub async fn dispatch<K, F, Fut, E>(
        &self,
        engine: &BatchCache,
        keys: &[K],
        loader: F,
    ) -> Result<HashMap<FieldValue, T>, E>
    where
        K: fmt::Display + Eq + Hash + Clone,
        T: Serialize + DeserializeOwned,
        F: FnOnce(Vec<K>) -> Fut,
        Fut: Future<Output = Result<HashMap<K, T>, E>>,
    {
        debug!(
            operation = self.operation,
            key_param = self.key_param,
            keys = keys.len(),
            "dispatching batch operation"
        );
        engine
            .load_batch(&self.config, &self.accessor, keys, loader)
            .await
    }
}

/// Key-parameter resolution: an unset name, or a single-parameter shape,
/// selects the first parameter; otherwise the name must match a declared
/// parameter.
fn resolve_key_param<'shape>(
    shape: &'shape OperationShape,
    config: &BatchConfig,
) -> Result<&'shape Param, ConfigError> {
    if config.key_param.is_empty() || shape.params.len() == 1 {
        return shape
            .params
            .first()
            .ok_or_else(|| ConfigError::key_param_missing(shape.name));
    }
    shape
        .params
        .iter()
        .find(|param| param.name == config.key_param)
        .ok_or_else(|| ConfigError::key_param_missing(shape.name))
}
