//! Container lifecycle: start, stop, teardown and Docker housekeeping

use anyhow::Result;
use colored::Colorize;

use super::setup;
use crate::console::{self, BIN_NAME};
use crate::docker::{engine, runner::CommandSpec};
use crate::stack::Stack;

/// Start Odoo containers
pub fn start(stack: &Stack) -> Result<()> {
    console::header();
    console::info("Starting Odoo...");

    stack.require_compose_file()?;
    stack.require_docker()?;

    stack.compose_run(["up", "-d"])?;

    console::success("Odoo is starting...");
    println!();
    console::info("Waiting for services to be ready (30-60 seconds)...");
    stack.wait_for_startup();

    // Show recent logs
    let logs = stack.compose()?.command(["logs", "--tail=20"]);
    stack.run(&logs)?;

    println!();
    console::success(format!(
        "Odoo should be available at: {}",
        web_url(stack).bright_white()
    ));
    console::info(format!("Check logs with: {} logs", BIN_NAME));

    Ok(())
}

/// Browser URL of the Odoo web interface
pub fn web_url(stack: &Stack) -> String {
    let odoo = &stack.config.odoo;
    let host = match odoo.bind_address.as_str() {
        "127.0.0.1" | "0.0.0.0" | "" => "localhost",
        other => other,
    };
    format!("http://{}:{}", host, odoo.port)
}

/// Stop Odoo containers
pub fn stop(stack: &Stack) -> Result<()> {
    console::header();
    console::info("Stopping Odoo...");
    stack.require_compose_file()?;

    stack.compose_run(["stop"])?;

    console::success("Odoo stopped");
    Ok(())
}

/// Restart Odoo containers
pub fn restart(stack: &Stack) -> Result<()> {
    console::header();
    console::info("Restarting Odoo...");
    stack.require_compose_file()?;

    stack.compose_run(["restart"])?;

    console::success("Odoo restarted");
    console::info(format!("Check status with: {} status", BIN_NAME));
    Ok(())
}

/// Stop and remove containers, keeping volumes
pub fn down(stack: &Stack) -> Result<()> {
    console::header();
    stack.require_compose_file()?;

    if !stack
        .console
        .confirm("This will stop and remove all containers. Continue?")?
    {
        console::info("Cancelled");
        return Ok(());
    }

    stack.compose_run(["down"])?;
    console::success("Containers removed");
    Ok(())
}

/// Stop containers and delete all data volumes
pub fn destroy(stack: &Stack) -> Result<()> {
    console::header();
    stack.require_compose_file()?;

    console::warn("WARNING: This will DELETE ALL DATA including databases!".red().bold());
    if !stack.console.confirm("Are you absolutely sure?")? {
        console::info("Cancelled");
        return Ok(());
    }

    stack.compose_run(["down", "-v"])?;
    console::success("All data destroyed");
    Ok(())
}

/// Clean up unused Docker resources
pub fn clean(stack: &Stack) -> Result<()> {
    console::header();
    console::info("Cleaning up Docker resources...");

    stack.run_checked(&CommandSpec::new("docker").args(["system", "prune", "-f"]))?;

    console::success("Cleanup complete");
    Ok(())
}

/// Pull newer container images
pub fn update(stack: &Stack) -> Result<()> {
    console::header();
    console::info("Updating container images...");
    stack.require_compose_file()?;

    stack.compose_run(["pull"])?;

    console::success("Images updated");
    console::info(format!("Run '{} restart' to use updated images", BIN_NAME));
    Ok(())
}

/// Destroy everything belonging to the stack, prune Docker, optionally set up again
pub fn nuke(stack: &Stack) -> Result<()> {
    console::header();
    console::warn("NUCLEAR OPTION: This will:".red().bold());
    println!("   - Stop all containers");
    println!("   - Delete ALL Odoo databases");
    println!("   - Remove ALL volumes");
    println!("   - Remove ALL networks");
    println!("   - Clean Docker system (all unused images, containers and volumes)");
    println!();

    if !stack
        .console
        .confirm("Are you ABSOLUTELY sure you want to proceed?")?
    {
        console::info("Cancelled");
        return Ok(());
    }

    console::info("Nuking everything...");
    let runner = stack.runner();

    if stack.paths.compose_file.exists() {
        let down = stack
            .compose()?
            .command(["down", "-v", "--remove-orphans"]);
        if !stack.run(&down)?.success() {
            console::warn("docker compose down failed, removing resources directly");
        }
    }

    // Leftovers from earlier runs or hand edits of the compose file
    for container in engine::project_containers(runner, &stack.project)? {
        if engine::remove_container(runner, &container)? {
            console::success(format!("Container removed: {}", container));
        }
    }

    for volume in engine::project_volumes(runner, &stack.project)? {
        if engine::remove_volume(runner, &volume)? {
            console::success(format!("Volume removed: {}", volume));
        } else {
            console::warn(format!("Could not remove volume: {}", volume));
        }
    }

    for network in engine::project_networks(runner, &stack.project)? {
        if engine::remove_network(runner, &network)? {
            console::success(format!("Network removed: {}", network));
        }
    }

    let prune = CommandSpec::new("docker").args(["system", "prune", "-af", "--volumes"]);
    if !stack.run(&prune)?.success() {
        console::warn("docker system prune failed");
    }

    console::success("Everything nuked!");
    println!();

    if stack.console.confirm("Start fresh setup now?")? {
        setup::setup(stack, true)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Console;
    use crate::docker::runner::testing::{fail, ok};
    use crate::stack::testing::{stack, stack_with_compose};

    #[test]
    fn test_start_sequence() {
        let (_dir, stack, runner) = stack_with_compose(Console::yes());

        start(&stack).unwrap();

        let info = runner.position("docker info").unwrap();
        let up = runner.position(" up -d").unwrap();
        let logs = runner.position("logs --tail=20").unwrap();
        assert!(info < up && up < logs);
    }

    #[test]
    fn test_start_requires_setup() {
        let (_dir, stack, runner) = stack(Console::yes());

        let err = start(&stack).unwrap_err();

        assert!(err.to_string().contains("setup"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_start_surfaces_compose_failure() {
        let (_dir, stack, runner) = stack_with_compose(Console::yes());
        runner.respond(" up -d", fail(1, ""));

        let err = start(&stack).unwrap_err();
        assert!(err.to_string().contains("up -d"));
        assert!(!runner.ran("logs"));
    }

    #[test]
    fn test_down_cancelled() {
        let (_dir, stack, runner) = stack_with_compose(Console::scripted("n\n"));

        down(&stack).unwrap();

        assert!(!runner.ran(" down"));
    }

    #[test]
    fn test_destroy_removes_volumes() {
        let (_dir, stack, runner) = stack_with_compose(Console::yes());

        destroy(&stack).unwrap();

        assert!(runner.ran(" down -v"));
    }

    #[test]
    fn test_stop_and_restart() {
        let (_dir, stack, runner) = stack_with_compose(Console::yes());

        stop(&stack).unwrap();
        restart(&stack).unwrap();

        let lines = runner.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("docker-compose.yml stop"));
        assert!(lines[1].ends_with("docker-compose.yml restart"));
    }

    #[test]
    fn test_stop_requires_setup() {
        let (_dir, stack, runner) = stack(Console::yes());

        assert!(stop(&stack).is_err());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_restart_surfaces_compose_failure() {
        let (_dir, stack, runner) = stack_with_compose(Console::yes());
        runner.respond(" restart", fail(1, "no such service"));

        let err = restart(&stack).unwrap_err();
        assert!(err.to_string().contains("no such service"));
    }

    #[test]
    fn test_update_pulls_images() {
        let (_dir, stack, runner) = stack_with_compose(Console::yes());

        update(&stack).unwrap();

        assert!(runner.lines()[0].ends_with("docker-compose.yml pull"));
    }

    #[test]
    fn test_clean_prunes_without_compose_file() {
        let (_dir, stack, runner) = stack(Console::yes());

        clean(&stack).unwrap();

        assert_eq!(runner.lines(), vec!["docker system prune -f"]);
    }

    #[test]
    fn test_web_url() {
        let (_dir, mut stack, _runner) = stack(Console::yes());
        assert_eq!(web_url(&stack), "http://localhost:8069");

        stack.config.odoo.bind_address = "192.168.1.20".to_string();
        stack.config.odoo.port = 9000;
        assert_eq!(web_url(&stack), "http://192.168.1.20:9000");
    }

    #[test]
    fn test_nuke_removes_project_resources() {
        // Decline the trailing "setup now?" prompt
        let (_dir, stack, runner) = stack_with_compose(Console::scripted("yes\nno\n"));
        runner
            .respond("ps -a --filter", ok("odoo_app\nodoo_postgres\n"))
            .respond("volume ls --filter", ok("shop_db_data\n"))
            .respond("network ls --filter", ok("shop_odoo_network\n"));

        nuke(&stack).unwrap();

        assert!(runner.ran("down -v --remove-orphans"));
        assert!(runner.ran("docker rm -f odoo_app"));
        assert!(runner.ran("docker rm -f odoo_postgres"));
        assert!(runner.ran("docker volume rm shop_db_data"));
        assert!(runner.ran("docker network rm shop_odoo_network"));
        assert!(runner.ran("docker system prune -af --volumes"));
        assert!(!runner.ran("docker info"));
    }

    #[test]
    fn test_nuke_cancelled_runs_nothing() {
        let (_dir, stack, runner) = stack_with_compose(Console::scripted("\n"));

        nuke(&stack).unwrap();

        assert!(runner.calls().is_empty());
    }
}
