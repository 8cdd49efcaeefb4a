//! Application services layer scaffolding.

pub mod error;
pub mod users;
