mod database {
    pub mod actions;
    pub mod error;
    pub mod form;
    pub mod memory;
    pub mod postgres;
    pub mod schema;
    pub mod store;
}
mod authentication {
    pub mod cryptography;
    pub mod middleware;
    pub mod session;
}
mod constants;

pub mod config;
pub mod media;
pub mod routes;

pub use authentication::*;
pub use constants::*;
pub use database::*;
