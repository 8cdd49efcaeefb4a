mod middleware;
mod routes;

pub use routes::{AppState, build_router};
