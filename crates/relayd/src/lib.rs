//! relayd library - exposes modules for testing.

pub mod cli;
pub mod config;
pub mod db;
pub mod dispatcher;
pub mod engine;
pub mod ledger;
pub mod orchestrator;
pub mod pending;
pub mod routes;
pub mod server;
pub mod settings;
pub mod sink;
pub mod supervisor;

pub use orchestrator::{AnswerOutcome, Orchestrator, Reply};
