//! Data acquisition — everything that talks to the upstream service.

pub mod http_client;
pub mod query;
pub mod session;
