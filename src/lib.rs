pub mod alternatives;
pub mod config;
pub mod coverage;
pub mod error;
pub mod evaluator;
pub mod interactions;
pub mod medication;
pub mod output;
pub mod report;
pub mod server;
pub mod sources;
