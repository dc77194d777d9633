//! odoo-docker-manager (odm) - Odoo Docker stack management CLI
//!
//! Generates and drives a two-service Docker Compose stack (Odoo and
//! PostgreSQL) for local development: lifecycle, logs, backups, database
//! maintenance and health checks.

use anyhow::Result;
use clap::Parser;

mod addons;
mod cli;
mod commands;
mod config;
mod console;
mod docker;
mod generate;
mod logging;
mod stack;

use cli::{Cli, Commands};
use commands::{backup, database, health, inspect, lifecycle, setup};
use console::Console;
use docker::runner::SystemRunner;
use stack::Stack;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose)?;

    let console = Console::stdin(cli.yes);
    let stack = Stack::open(cli.directory, console, Box::new(SystemRunner))?;

    match cli.command {
        Commands::Setup { force } => {
            setup::setup(&stack, force)?;
        }
        Commands::Start => {
            lifecycle::start(&stack)?;
        }
        Commands::Stop => {
            lifecycle::stop(&stack)?;
        }
        Commands::Restart => {
            lifecycle::restart(&stack)?;
        }
        Commands::Down => {
            lifecycle::down(&stack)?;
        }
        Commands::Destroy => {
            lifecycle::destroy(&stack)?;
        }
        Commands::Logs {
            service,
            no_follow,
            tail,
        } => {
            inspect::logs(&stack, service.as_deref(), !no_follow, tail)?;
        }
        Commands::Status => {
            inspect::status(&stack)?;
        }
        Commands::Shell { service } => {
            inspect::shell(&stack, &service)?;
        }
        Commands::Backup => {
            backup::backup(&stack)?;
        }
        Commands::Restore {
            archive,
            latest,
            with_config,
        } => {
            backup::restore(&stack, archive, latest, with_config)?;
        }
        Commands::Clean => {
            lifecycle::clean(&stack)?;
        }
        Commands::Update => {
            lifecycle::update(&stack)?;
        }
        Commands::Nuke => {
            lifecycle::nuke(&stack)?;
        }
        Commands::Fix => {
            health::fix(&stack)?;
        }
        Commands::ReinstallDb { database: db } => {
            database::reinstall_db(&stack, db.as_deref())?;
        }
        Commands::QuickTest => {
            health::quick_test(&stack)?;
        }
        Commands::ResetAdmin { database: db } => {
            database::reset_admin(&stack, db.as_deref())?;
        }
        Commands::ExecSql { query, database: db } => {
            database::exec_sql(&stack, &query, db.as_deref())?;
        }
        Commands::InspectDb { database: db } => {
            database::inspect_db(&stack, db.as_deref())?;
        }
        Commands::Config { write } => {
            setup::show_config(&stack, write)?;
        }
    }

    Ok(())
}
