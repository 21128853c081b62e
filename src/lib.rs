// Public API for integration tests and potential library usage

pub mod api;
pub mod autosave;
pub mod config;
pub mod deadline;
pub mod error;
pub mod mirror;
pub mod scoring;
pub mod state;
pub mod store;
pub mod tiebreak;
pub mod types;
pub mod users;
