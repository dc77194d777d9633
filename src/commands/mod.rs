//! Command implementations, one module per concern

pub mod backup;
pub mod database;
pub mod health;
pub mod inspect;
pub mod lifecycle;
pub mod setup;
