//! HTTP surface for the relay

pub mod routes;

pub use routes::build_router;
