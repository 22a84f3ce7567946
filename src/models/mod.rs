pub mod config;
pub mod control;
pub mod dashboard;
pub mod detection;
pub mod snapshot;
