//! Device agent: library crate behind the `em-agent` binary.
//!
//! Re-exports all modules so external crates (e.g. `em-e2e-tests`) can
//! drive the agent against a mock engine.

pub mod assembler;
pub mod config;
pub mod events;
pub mod heartbeat;
pub mod mqtt_loop;
