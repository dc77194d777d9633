//! Database maintenance through psql inside the postgres container

use anyhow::{Result, bail};
use colored::Colorize;

use super::lifecycle::web_url;
use crate::config::is_sql_identifier;
use crate::console::{self, BIN_NAME};
use crate::generate::compose::{ODOO_SERVICE, POSTGRES_SERVICE};
use crate::generate::env::generate_password;
use crate::stack::Stack;

/// Length of the temporary admin password
const ADMIN_PASSWORD_LENGTH: usize = 16;

/// Database named on the command line, or the configured default
fn resolve_database(stack: &Stack, database: Option<&str>) -> Result<String> {
    let name = database.unwrap_or(&stack.config.postgres.database);
    if !is_sql_identifier(name) {
        bail!(
            "Invalid database name '{}': use letters, digits and underscores only",
            name
        );
    }
    Ok(name.to_string())
}

/// Row count from a psql command tag such as `UPDATE 1`
fn updated_rows(stdout: &str) -> Option<u64> {
    stdout.lines().find_map(|line| {
        line.trim()
            .strip_prefix("UPDATE ")
            .and_then(|count| count.trim().parse().ok())
    })
}

/// Database to connect to while `database` is dropped
fn maintenance_database(database: &str) -> &'static str {
    if database == "postgres" {
        "template1"
    } else {
        "postgres"
    }
}

/// Run a SQL query and print its output
pub fn exec_sql(stack: &Stack, query: &str, database: Option<&str>) -> Result<()> {
    let database = resolve_database(stack, database)?;
    stack.require_service_running(POSTGRES_SERVICE, "PostgreSQL")?;

    console::info(format!("Executing SQL on database '{}'...", database));
    let output = stack.psql(&database, query)?;
    if !output.success() {
        bail!("Query failed: {}", output.stderr_text().trim());
    }

    print!("{}", output.stdout_text());
    Ok(())
}

/// List the tables of the public schema
pub fn inspect_db(stack: &Stack, database: Option<&str>) -> Result<()> {
    let database = resolve_database(stack, database)?;
    stack.require_service_running(POSTGRES_SERVICE, "PostgreSQL")?;

    console::info(format!("Tables in database '{}':", database));
    let output = stack.psql(&database, r"\dt public.*")?;
    if !output.success() {
        bail!(
            "Could not inspect database '{}': {}",
            database,
            output.stderr_text().trim()
        );
    }

    print!("{}", output.stdout_text());
    Ok(())
}

/// Replace the admin user's password with a fresh random one.
///
/// Odoo accepts a plaintext value in `res_users.password` and rehashes it
/// on the next successful login.
pub fn reset_admin(stack: &Stack, database: Option<&str>) -> Result<()> {
    console::header();
    let database = resolve_database(stack, database)?;
    stack.require_service_running(ODOO_SERVICE, "Odoo")?;

    console::info("Resetting admin password...");
    let password = generate_password(ADMIN_PASSWORD_LENGTH);
    let sql = format!(
        "UPDATE res_users SET password = '{}' WHERE login = 'admin';",
        password
    );

    let output = stack.psql(&database, &sql)?;
    if !output.success() {
        bail!(
            "Failed to reset admin password: {}",
            output.stderr_text().trim()
        );
    }

    match updated_rows(&output.stdout_text()) {
        Some(0) => {
            console::warn(format!("No user with login 'admin' in database '{}'", database));
            return Ok(());
        }
        Some(_) => {}
        None => console::warn("psql did not report an updated row count"),
    }

    console::success("Admin password reset");
    println!();
    println!("  URL:      {}", web_url(stack).bright_white());
    println!("  Login:    {}", "admin".bright_white());
    println!("  Password: {}", password.bright_white());
    println!();
    console::warn("Change this password after logging in");

    Ok(())
}

/// Drop and recreate the database, then restart Odoo
pub fn reinstall_db(stack: &Stack, database: Option<&str>) -> Result<()> {
    console::header();
    let database = resolve_database(stack, database)?;

    console::warn(
        format!("This will DELETE the '{}' database and all its data!", database)
            .red()
            .bold(),
    );
    if !stack.console.confirm("Are you sure?")? {
        console::info("Cancelled");
        return Ok(());
    }

    stack.require_service_running(ODOO_SERVICE, "Odoo")?;

    let user = stack.db_user();
    let maintenance = maintenance_database(&database);

    console::info(format!("Dropping database '{}'...", database));
    let drop = format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE);", database);
    let output = stack.psql(maintenance, &drop)?;
    if !output.success() {
        bail!("Failed to drop database: {}", output.stderr_text().trim());
    }

    console::info(format!("Creating database '{}'...", database));
    let create = format!("CREATE DATABASE \"{}\" OWNER \"{}\";", database, user);
    let output = stack.psql(maintenance, &create)?;
    if !output.success() {
        bail!("Failed to create database: {}", output.stderr_text().trim());
    }

    console::info("Restarting Odoo...");
    stack.compose_run(["restart", ODOO_SERVICE])?;
    stack.wait_for_startup();

    console::success("Database reinstalled");
    console::info(format!(
        "Open {} to initialize it, or check '{} logs odoo'",
        web_url(stack),
        BIN_NAME
    ));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Console;
    use crate::docker::runner::testing::{fail, ok};
    use crate::stack::testing::stack_with_compose;

    #[test]
    fn test_updated_rows() {
        assert_eq!(updated_rows("UPDATE 1\n"), Some(1));
        assert_eq!(updated_rows("UPDATE 0"), Some(0));
        assert_eq!(updated_rows("ERROR: relation missing"), None);
    }

    #[test]
    fn test_maintenance_database() {
        assert_eq!(maintenance_database("postgres"), "template1");
        assert_eq!(maintenance_database("odoo_prod"), "postgres");
    }

    #[test]
    fn test_exec_sql_runs_query() {
        let (_dir, stack, runner) = stack_with_compose(Console::yes());
        runner.respond("name=odoo_postgres", ok("odoo_postgres\n"));

        exec_sql(&stack, "SELECT 1;", Some("odoo_prod")).unwrap();

        assert!(runner.ran("exec -T postgres psql -U odoo -d odoo_prod -c 'SELECT 1;'"));
    }

    #[test]
    fn test_exec_sql_rejects_bad_database_name() {
        let (_dir, stack, runner) = stack_with_compose(Console::yes());

        let err = exec_sql(&stack, "SELECT 1;", Some("x; DROP")).unwrap_err();

        assert!(err.to_string().contains("Invalid database name"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_exec_sql_requires_postgres() {
        let (_dir, stack, runner) = stack_with_compose(Console::yes());

        let err = exec_sql(&stack, "SELECT 1;", None).unwrap_err();

        assert!(err.to_string().contains("odoo_postgres"));
        assert!(!runner.ran("psql"));
    }

    #[test]
    fn test_exec_sql_reports_failure() {
        let (_dir, stack, runner) = stack_with_compose(Console::yes());
        runner
            .respond("name=odoo_postgres", ok("odoo_postgres\n"))
            .respond("psql", fail(1, "ERROR:  syntax error"));

        let err = exec_sql(&stack, "SELEC 1;", None).unwrap_err();
        assert!(err.to_string().contains("Query failed: ERROR:  syntax error"));
    }

    #[test]
    fn test_inspect_db_lists_tables() {
        let (_dir, stack, runner) = stack_with_compose(Console::yes());
        runner.respond("name=odoo_postgres", ok("odoo_postgres\n"));

        inspect_db(&stack, None).unwrap();

        assert!(runner.ran(r"-d postgres -c '\dt public.*'"));
    }

    #[test]
    fn test_reset_admin_updates_password() {
        let (_dir, stack, runner) = stack_with_compose(Console::yes());
        runner
            .respond("name=odoo_app", ok("odoo_app\n"))
            .respond("UPDATE res_users", ok("UPDATE 1\n"));

        reset_admin(&stack, Some("odoo_prod")).unwrap();

        let line = runner.lines().into_iter().find(|l| l.contains("UPDATE")).unwrap();
        assert!(line.contains("-d odoo_prod"));
        assert!(line.contains("WHERE login = 'admin'"));
    }

    #[test]
    fn test_reset_admin_requires_odoo() {
        let (_dir, stack, runner) = stack_with_compose(Console::yes());

        assert!(reset_admin(&stack, None).is_err());
        assert!(!runner.ran("UPDATE"));
    }

    #[test]
    fn test_reinstall_db_sequence() {
        let (_dir, stack, runner) = stack_with_compose(Console::yes());
        runner.respond("name=odoo_app", ok("odoo_app\n"));

        reinstall_db(&stack, Some("odoo_prod")).unwrap();

        let drop = runner
            .position("-d postgres -c 'DROP DATABASE IF EXISTS \"odoo_prod\" WITH (FORCE);'")
            .unwrap();
        let create = runner
            .position("CREATE DATABASE \"odoo_prod\" OWNER \"odoo\";")
            .unwrap();
        let restart = runner.position(" restart odoo").unwrap();
        assert!(drop < create && create < restart);
    }

    #[test]
    fn test_reinstall_db_cancelled() {
        let (_dir, stack, runner) = stack_with_compose(Console::scripted("n\n"));

        reinstall_db(&stack, None).unwrap();

        assert!(runner.calls().is_empty());
    }
}
