//! API module - notification intake and liveness

pub mod handlers;
pub mod routes;
