// lib.rs - Library root for the phpcs language server.
//
// main.rs is a thin binary over these modules; benches/ and tests/ link
// against them directly.

pub mod backend;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod diagnostic_store;
pub mod error;
pub mod events;
pub mod perf;
pub mod report;
pub mod run_registry;
pub mod runner;
pub mod session;
pub mod settings;
pub mod state;
pub mod trigger;
