//! HTTP adapter over the game registry

pub mod middleware;
pub mod protocol;
pub mod routes;

pub use routes::build_router;
