pub mod analytics;
pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod routes;
pub mod settings;
pub mod storage;
