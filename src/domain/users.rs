//! Directory entities.

use serde::{Deserialize, Serialize};

/// A directory user. Cached entries decode back into this shape, so it
/// derives both serde directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
}

impl User {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
