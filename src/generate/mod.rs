//! Configuration file generation
//!
//! - docker-compose.yml for the postgres + odoo stack
//! - .env with the shared database credentials

pub mod compose;
pub mod env;
