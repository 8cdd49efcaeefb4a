//! User directory backed by the cache layer.
//!
//! The source of truth is simulated: ids 1 through 3 exist, everything
//! else is absent. Both lookup paths go through the cache first and only
//! touch the source for keys the store could not answer.

use std::{collections::HashMap, sync::Arc};

use tracing::debug;

use crate::{
    application::error::AppError,
    cache::{
        BatchBinding, BatchCache, BatchConfig, CacheFacade, CacheKey, FieldValue,
        OperationShape, Param, ParamKind, ReturnKind,
    },
    domain::users::User,
};

/// Namespace for single-user entries.
const USER_NAMESPACE: &str = "cache:user";

/// Namespace for batch-path entries.
const USER_BATCH_NAMESPACE: &str = "cache:user:batch";

/// Lifetime of batch-path entries.
const USER_BATCH_TTL_SECONDS: u64 = 1000;

/// Declared shape of [`UserDirectory::list_by_ids`].
const LIST_BY_IDS: OperationShape = OperationShape {
    name: "list_by_ids",
    params: &[Param {
        name: "ids",
        kind: ParamKind::Collection,
    }],
    returns: ReturnKind::Map,
};

/// Cache-aside directory of users.
pub struct UserDirectory {
    cache: Arc<CacheFacade>,
    engine: Arc<BatchCache>,
}

impl UserDirectory {
    pub fn new(cache: Arc<CacheFacade>, engine: Arc<BatchCache>) -> Self {
        Self { cache, engine }
    }

    /// Single-key lookup. Unknown ids are cached as null so repeat misses
    /// stay off the source.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let key = CacheKey::new(USER_NAMESPACE, &id);
        self.cache
            .get_or_load(&key, || async move { Ok::<_, AppError>(fetch_one(id)) })
            .await
    }

    /// Batch lookup, keyed in the result by the user id.
    pub async fn list_by_ids(&self, ids: &[i64]) -> Result<HashMap<FieldValue, User>, AppError> {
        let config = BatchConfig::new(USER_BATCH_NAMESPACE).ttl_seconds(USER_BATCH_TTL_SECONDS);
        let binding = BatchBinding::bind(&LIST_BY_IDS, config)?;
        binding
            .dispatch(&self.engine, ids, |missed| async move {
                Ok::<_, AppError>(fetch_many(&missed))
            })
            .await
    }
}

/// Simulated row lookup.
fn known_user(id: i64) -> Option<User> {
    (1..=3).contains(&id).then(|| User::new(id, format!("user{id}")))
}

fn fetch_one(id: i64) -> Option<User> {
    debug!(id, "querying the user source");
    known_user(id)
}

fn fetch_many(ids: &[i64]) -> HashMap<i64, User> {
    let mut users = HashMap::new();
    for &id in ids {
        debug!(id, "querying the user source");
        if let Some(user) = known_user(id) {
            users.insert(id, user);
        }
    }
    users
}

// =============================================================================
// Tests
// =============================================================================
