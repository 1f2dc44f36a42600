//! HTTP surface: REST routes and error mapping

pub mod routes;

pub use routes::build_router;
