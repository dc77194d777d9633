//! CLI command definitions for odm
//!
//! This module contains all the clap-based command definitions and argument parsing.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "odm")]
#[command(about = "Manage a local Odoo + PostgreSQL Docker stack", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Stack directory (default: current directory)
    #[arg(short, long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Answer yes to all confirmation prompts
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Increase diagnostic output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate docker-compose.yml, .env and the addons directory
    Setup {
        /// Overwrite existing files without asking
        #[arg(short, long)]
        force: bool,
    },
    /// Start Odoo containers
    Start,
    /// Stop Odoo containers
    Stop,
    /// Restart Odoo containers
    Restart,
    /// Stop and remove containers (keeps data)
    Down,
    /// Stop containers and DELETE all data volumes
    Destroy,
    /// Show container logs
    Logs {
        /// Service to show (default: all)
        #[arg(value_name = "SERVICE")]
        service: Option<String>,
        /// Print logs and exit instead of following
        #[arg(long)]
        no_follow: bool,
        /// Number of lines to show from the end
        #[arg(long, value_name = "N")]
        tail: Option<u32>,
    },
    /// Show container, volume and network status
    Status,
    /// Open a bash shell in a container
    Shell {
        #[arg(value_name = "SERVICE", default_value = "odoo")]
        service: String,
    },
    /// Back up all databases and stack files
    Backup,
    /// Restore databases from a backup archive
    Restore {
        /// Archive path or file name in backups/
        #[arg(value_name = "ARCHIVE", conflicts_with = "latest")]
        archive: Option<PathBuf>,
        /// Restore the newest backup
        #[arg(long)]
        latest: bool,
        /// Also restore .env, docker-compose.yml and odoo-manager.toml
        #[arg(long)]
        with_config: bool,
    },
    /// Remove unused Docker resources
    Clean,
    /// Pull newer container images
    Update,
    /// Remove everything belonging to the stack and prune Docker
    Nuke,
    /// Fix custom addon permissions and restart Odoo
    Fix,
    /// Drop and recreate the Odoo database
    ReinstallDb {
        #[arg(long, value_name = "DB")]
        database: Option<String>,
    },
    /// Run a quick health check
    QuickTest,
    /// Reset the admin user's password
    ResetAdmin {
        #[arg(long, value_name = "DB")]
        database: Option<String>,
    },
    /// Execute a SQL query
    ExecSql {
        #[arg(value_name = "QUERY")]
        query: String,
        #[arg(long, value_name = "DB")]
        database: Option<String>,
    },
    /// List the tables of a database
    InspectDb {
        #[arg(long, value_name = "DB")]
        database: Option<String>,
    },
    /// Show the effective configuration
    Config {
        /// Save it to odoo-manager.toml in the stack directory
        #[arg(long)]
        write: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["odm", "start", "-y", "-vv", "-d", "/srv/shop"]).unwrap();

        assert!(cli.yes);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.directory, Some(PathBuf::from("/srv/shop")));
        assert!(matches!(cli.command, Commands::Start));
    }

    #[test]
    fn test_logs_options() {
        let cli = Cli::try_parse_from(["odm", "logs", "postgres", "--no-follow", "--tail", "50"])
            .unwrap();

        match cli.command {
            Commands::Logs {
                service,
                no_follow,
                tail,
            } => {
                assert_eq!(service.as_deref(), Some("postgres"));
                assert!(no_follow);
                assert_eq!(tail, Some(50));
            }
            _ => panic!("expected logs"),
        }
    }

    #[test]
    fn test_shell_defaults_to_odoo() {
        let cli = Cli::try_parse_from(["odm", "shell"]).unwrap();
        assert!(matches!(cli.command, Commands::Shell { service } if service == "odoo"));
    }

    #[test]
    fn test_kebab_case_commands() {
        let cli = Cli::try_parse_from(["odm", "exec-sql", "SELECT 1;", "--database", "prod"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::ExecSql { query, database } if query == "SELECT 1;" && database.as_deref() == Some("prod")
        ));

        assert!(Cli::try_parse_from(["odm", "quick-test"]).is_ok());
        assert!(Cli::try_parse_from(["odm", "reinstall-db"]).is_ok());
        assert!(Cli::try_parse_from(["odm", "reset-admin"]).is_ok());
        assert!(Cli::try_parse_from(["odm", "inspect-db"]).is_ok());
    }

    #[test]
    fn test_restore_archive_conflicts_with_latest() {
        assert!(Cli::try_parse_from(["odm", "restore", "a.tar.gz", "--latest"]).is_err());

        let cli = Cli::try_parse_from(["odm", "restore", "--latest", "--with-config"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Restore { archive: None, latest: true, with_config: true }
        ));
    }
}
