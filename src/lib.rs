pub mod auth;
pub mod config;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod store;
pub mod sync;
pub mod utils;
pub mod wizard;
