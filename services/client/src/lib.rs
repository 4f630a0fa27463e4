pub mod adapters;
pub mod config;
pub mod error;
pub mod handler;
pub mod state;
pub mod telemetry;
