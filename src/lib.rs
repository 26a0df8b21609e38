// Public API for the server binary, the client and integration tests

pub mod api;
pub mod broadcast;
pub mod client;
pub mod config;
pub mod doors;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod reports;
pub mod scoring;
pub mod state;
pub mod types;
pub mod validation;
pub mod ws;
