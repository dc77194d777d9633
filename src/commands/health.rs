//! Health checks and addon troubleshooting

use std::{
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use anyhow::{Result, bail};
use colored::Colorize;

use super::lifecycle::web_url;
use crate::addons;
use crate::console::{self, BIN_NAME};
use crate::generate::compose::{ODOO_CONTAINER_PORT, ODOO_SERVICE, POSTGRES_SERVICE};
use crate::stack::{ADDONS_DIR, Stack};

const TOTAL_CHECKS: usize = 5;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Result of a single check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

impl CheckOutcome {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: false,
            detail: detail.into(),
        }
    }

    fn print(&self) {
        if self.passed {
            console::success(&self.detail);
        } else {
            console::error(&self.detail);
        }
    }
}

#[derive(Debug, Default)]
pub struct HealthReport {
    pub checks: Vec<CheckOutcome>,
}

impl HealthReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|check| check.passed)
    }

    pub fn failures(&self) -> Vec<&CheckOutcome> {
        self.checks.iter().filter(|check| !check.passed).collect()
    }

    fn record(&mut self, outcome: CheckOutcome) {
        outcome.print();
        self.checks.push(outcome);
    }
}

/// Try a TCP connection to `host:port`
pub fn tcp_reachable(host: &str, port: u16) -> bool {
    let addrs: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            tracing::debug!(host, port, error = %e, "address resolution failed");
            return false;
        }
    };

    addrs
        .iter()
        .any(|addr| TcpStream::connect_timeout(addr, CONNECT_TIMEOUT).is_ok())
}

/// Host and port to probe for the Odoo web interface
fn web_target(stack: &Stack) -> (String, u16) {
    let port = stack
        .compose_info()
        .ok()
        .and_then(|info| info.host_port(ODOO_SERVICE, ODOO_CONTAINER_PORT))
        .unwrap_or(stack.config.odoo.port);

    let host = match stack.config.odoo.bind_address.as_str() {
        "" | "0.0.0.0" => "127.0.0.1".to_string(),
        other => other.to_string(),
    };
    (host, port)
}

/// Run all checks, printing each as it completes.
///
/// A stopped Docker daemon ends the run early since nothing else can pass.
pub fn run_checks<F>(stack: &Stack, web_probe: F) -> Result<HealthReport>
where
    F: Fn(&str, u16) -> bool,
{
    let mut report = HealthReport::default();

    console::step(1, TOTAL_CHECKS, "Checking Docker...");
    if !stack.docker_running()? {
        report.record(CheckOutcome::fail("docker", "Docker is not running"));
        return Ok(report);
    }
    report.record(CheckOutcome::pass("docker", "Docker is running"));

    console::step(2, TOTAL_CHECKS, "Checking containers...");
    let ps = stack
        .compose()?
        .command(["ps", "--services", "--filter", "status=running"]);
    let output = stack.capture(&ps)?;
    let running = output.stdout_lines();
    let missing: Vec<&str> = [POSTGRES_SERVICE, ODOO_SERVICE]
        .into_iter()
        .filter(|service| !running.iter().any(|name| name == service))
        .collect();
    report.record(if missing.is_empty() {
        CheckOutcome::pass("containers", "PostgreSQL and Odoo containers are running")
    } else {
        CheckOutcome::fail(
            "containers",
            format!("Not running: {}", missing.join(", ")),
        )
    });

    console::step(3, TOTAL_CHECKS, "Checking database...");
    let user = stack.db_user();
    let ready = stack
        .compose()?
        .exec(POSTGRES_SERVICE, ["pg_isready", "-U", user.as_str()]);
    report.record(if stack.capture(&ready)?.success() {
        CheckOutcome::pass("database", "PostgreSQL is accepting connections")
    } else {
        CheckOutcome::fail("database", "PostgreSQL is not ready")
    });

    console::step(4, TOTAL_CHECKS, "Checking web interface...");
    let (host, port) = web_target(stack);
    report.record(if web_probe(&host, port) {
        CheckOutcome::pass("web", format!("Odoo is listening on {}:{}", host, port))
    } else {
        CheckOutcome::fail("web", format!("Nothing is listening on {}:{}", host, port))
    });

    console::step(5, TOTAL_CHECKS, "Checking addons...");
    let addons_dir = &stack.paths.addons_dir;
    report.record(if addons_dir.is_dir() {
        let count = addons::scan(addons_dir)?.len();
        CheckOutcome::pass("addons", format!("{} custom addon(s) in {}/", count, ADDONS_DIR))
    } else {
        CheckOutcome::fail(
            "addons",
            format!("{}/ directory is missing (run '{} setup')", ADDONS_DIR, BIN_NAME),
        )
    });

    Ok(report)
}

/// Quick health check of the whole stack
pub fn quick_test(stack: &Stack) -> Result<()> {
    console::header();
    console::info("Running quick health check...");
    println!();

    stack.require_compose_file()?;
    let report = run_checks(stack, tcp_reachable)?;

    println!();
    if report.all_passed() {
        console::success("All checks passed!");
        console::info(format!("Odoo: {}", web_url(stack).bright_white()));
        return Ok(());
    }

    let failures = report.failures();
    let names: Vec<&str> = failures.iter().map(|check| check.name).collect();
    console::info(format!("Check logs with: {} logs", BIN_NAME));
    bail!(
        "{} of {} checks failed: {}",
        failures.len(),
        TOTAL_CHECKS,
        names.join(", ")
    )
}

/// Make custom addons readable by Odoo and restart it
pub fn fix(stack: &Stack) -> Result<()> {
    console::header();
    console::info("Fixing custom addons...");

    stack.require_service_running(ODOO_SERVICE, "Odoo")?;

    let addons_dir = &stack.paths.addons_dir;
    if !addons_dir.is_dir() {
        bail!(
            "{}/ directory not found. Run '{} setup' first",
            ADDONS_DIR,
            BIN_NAME
        );
    }

    let found = addons::scan(addons_dir)?;
    if found.is_empty() {
        console::warn(format!("No addon folders in {}/", ADDONS_DIR));
    } else {
        console::section("Addons found:");
        for addon in &found {
            if addon.has_manifest {
                println!("  {} {}", "✓".green(), addon.name);
            } else {
                println!(
                    "  {} {} (missing {})",
                    "⚠".yellow(),
                    addon.name,
                    addons::MANIFEST_FILE
                );
            }
        }
    }

    let count = addons::make_accessible(addons_dir)?;
    tracing::debug!(entries = count, "permissions updated");
    console::success("Permissions set to 755");

    console::info("Restarting Odoo...");
    stack.compose_run(["restart", ODOO_SERVICE])?;
    console::success("Odoo restarted");

    println!();
    console::section("Next steps:");
    println!("  1. Open {}", web_url(stack));
    println!("  2. Enable developer mode (Settings > Activate the developer mode)");
    println!("  3. Apps > Update Apps List");
    println!("  4. Search for your addon and install it");

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::console::Console;
    use crate::docker::runner::testing::{fail, ok};
    use crate::stack::testing::stack_with_compose;

    fn healthy(runner: &crate::docker::runner::testing::RecordingRunner) {
        runner.respond("--services --filter status=running", ok("postgres\nodoo\n"));
    }

    #[test]
    fn test_all_checks_pass() {
        let (_dir, stack, runner) = stack_with_compose(Console::yes());
        fs::create_dir_all(stack.paths.addons_dir.join("my_module")).unwrap();
        healthy(&runner);

        let report = run_checks(&stack, |host, port| host == "127.0.0.1" && port == 8069).unwrap();

        assert!(report.all_passed(), "{:?}", report.failures());
        assert_eq!(report.checks.len(), TOTAL_CHECKS);
        assert!(report.checks[4].detail.starts_with("1 custom addon"));
        assert!(runner.ran("exec -T postgres pg_isready -U odoo"));
    }

    #[test]
    fn test_docker_down_stops_early() {
        let (_dir, stack, runner) = stack_with_compose(Console::yes());
        runner.respond("docker info", fail(1, ""));

        let report = run_checks(&stack, |_, _| true).unwrap();

        assert_eq!(report.checks.len(), 1);
        assert!(!report.all_passed());
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_missing_service_reported() {
        let (_dir, stack, runner) = stack_with_compose(Console::yes());
        fs::create_dir_all(&stack.paths.addons_dir).unwrap();
        runner.respond("status=running", ok("postgres\n"));

        let report = run_checks(&stack, |_, _| true).unwrap();

        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].name, "containers");
        assert!(failures[0].detail.contains("odoo"));
    }

    #[test]
    fn test_quick_test_fails_on_any_check() {
        let (_dir, stack, runner) = stack_with_compose(Console::yes());
        healthy(&runner);
        runner.respond("pg_isready", fail(2, "no response"));

        // The addons directory is also missing here
        let err = quick_test(&stack).unwrap_err();
        assert!(err.to_string().contains("database"));
    }

    #[test]
    fn test_web_target_uses_published_port() {
        let (_dir, mut stack, _runner) = stack_with_compose(Console::yes());
        stack.config.odoo.port = 1;
        stack.config.odoo.bind_address = "0.0.0.0".to_string();

        // Port comes from the generated compose file
        assert_eq!(web_target(&stack), ("127.0.0.1".to_string(), 8069));
    }

    #[test]
    fn test_fix_restarts_odoo() {
        let (_dir, stack, runner) = stack_with_compose(Console::yes());
        fs::create_dir_all(stack.paths.addons_dir.join("sale_ext")).unwrap();
        runner.respond("name=odoo_app", ok("odoo_app\n"));

        fix(&stack).unwrap();

        assert!(runner.ran(" restart odoo"));
    }

    #[test]
    fn test_fix_requires_running_odoo() {
        let (_dir, stack, runner) = stack_with_compose(Console::yes());
        fs::create_dir_all(&stack.paths.addons_dir).unwrap();

        assert!(fix(&stack).is_err());
        assert!(!runner.ran("restart"));
    }
}
