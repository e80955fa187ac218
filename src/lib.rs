pub mod clients;
pub mod config;
pub mod errors;
pub mod models;
pub mod parsers;
pub mod services;
pub mod telemetry;
