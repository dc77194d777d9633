//! Docker operations module
//!
//! This module contains functionality for interacting with Docker:
//! - subprocess execution
//! - docker-compose.yml parsing
//! - Compose invocation
//! - engine queries (containers, volumes, networks)

pub mod compose;
pub mod compose_cli;
pub mod engine;
pub mod runner;
