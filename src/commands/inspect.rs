//! Status, logs and interactive shells

use anyhow::{Result, bail};
use colored::Colorize;

use crate::console;
use crate::docker::engine;
use crate::stack::Stack;

/// Exit code of a process interrupted with Ctrl-C
const SIGINT_EXIT: i32 = 130;

/// Show container logs
pub fn logs(stack: &Stack, service: Option<&str>, follow: bool, tail: Option<u32>) -> Result<()> {
    if let Some(service) = service {
        stack.require_service(service)?;
    } else {
        stack.require_compose_file()?;
    }

    let tail = tail.unwrap_or(stack.config.runtime.log_tail);
    let mut args = vec!["logs".to_string()];
    if follow {
        args.push("-f".to_string());
    }
    args.push(format!("--tail={}", tail));
    if let Some(service) = service {
        args.push(service.to_string());
    }

    let cmd = stack.compose()?.command(args);
    let output = stack.run(&cmd)?;

    if follow && matches!(output.code, None | Some(SIGINT_EXIT)) {
        println!();
        console::info("Stopped following logs");
        return Ok(());
    }

    output.checked(&cmd)?;
    Ok(())
}

/// Show container, volume and network status
pub fn status(stack: &Stack) -> Result<()> {
    console::header();
    let info = stack.compose_info()?;

    console::section("Services:");
    for service in info.services.values() {
        println!(
            "  {} {} [{}]",
            service.name.bright_white(),
            service.image.as_deref().unwrap_or("(build)"),
            service.networks.join(", ")
        );
    }
    println!();

    console::section("Container Status:");
    let ps = stack.compose()?.command(["ps"]);
    stack.run_checked(&ps)?;

    println!();
    console::section("Volume Status:");
    stack.run(&engine::volume_table(&stack.project))?;

    println!();
    console::section("Network Status:");
    let network = stack.network_name();
    match engine::inspect_network(stack.runner(), &network) {
        Ok(Some(details)) => {
            let endpoints = details.endpoints();
            println!(
                "Network {} ({})",
                details.name.bright_white(),
                if details.driver.is_empty() { "unknown driver" } else { details.driver.as_str() }
            );
            println!("Connected containers: {}", endpoints.len());
            for endpoint in endpoints {
                println!("  - {}: {}", endpoint.name.bright_white(), endpoint.ipv4_address);
            }
        }
        Ok(None) => println!("Network {} not found or not created yet", network),
        Err(e) => {
            tracing::debug!(error = %e, "network inspect parse failed");
            println!("Network found but couldn't parse details");
        }
    }

    Ok(())
}

/// Open an interactive bash shell in a service container
pub fn shell(stack: &Stack, service: &str) -> Result<()> {
    stack.require_service(service)?;

    console::info(format!("Opening shell in {} container...", service));
    let cmd = stack.compose()?.command(["exec", service, "/bin/bash"]);
    let output = stack.run(&cmd)?;

    // Other exit codes come from the shell session itself
    if output.code == Some(1) && !service_running(stack, service)? {
        bail!(
            "Could not open a shell in '{}'. Is the stack running? Try '{} start'",
            service,
            console::BIN_NAME
        );
    }

    Ok(())
}

fn service_running(stack: &Stack, service: &str) -> Result<bool> {
    let info = stack.compose_info()?;
    match info.container_name(service, &stack.project) {
        Some(container) => engine::container_running(stack.runner(), &container),
        None => Ok(false),
    }
}
