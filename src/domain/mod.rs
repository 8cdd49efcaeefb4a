//! Domain layer types.

pub mod users;
