//! First-time setup and configuration display

use std::fs;

use anyhow::{Context, Result};
use colored::Colorize;

use crate::config::STACK_CONFIG_FILE;
use crate::console::{self, BIN_NAME};
use crate::generate::{
    compose::generate_compose_file,
    env::{Credentials, generate_env_file},
};
use crate::stack::{COMPOSE_FILE, ENV_FILE, Stack};

/// Setup the Odoo Docker environment: config files and addons directory
pub fn setup(stack: &Stack, force: bool) -> Result<()> {
    console::header();
    console::info("Setting up Odoo Docker environment...");

    stack.require_docker()?;
    let compose = stack.compose()?;
    console::success(format!("Docker is running, using {}", compose.flavor()));

    generate_compose(stack, force)?;
    generate_env(stack, force)?;

    if !stack.paths.addons_dir.exists() {
        fs::create_dir_all(&stack.paths.addons_dir)
            .context("Failed to create addons directory")?;
        console::success("Created addons directory");
    }

    // Let Compose itself check the generated file
    let validation = stack.capture(&compose.command(["config", "--quiet"]))?;
    if validation.success() {
        console::success(format!("{} is valid", COMPOSE_FILE));
    } else {
        console::warn(format!(
            "{} did not validate: {}",
            COMPOSE_FILE,
            validation.stderr_text().trim()
        ));
    }

    console::success("Setup complete!");
    println!();
    console::info(format!("Run '{} start' to start Odoo", BIN_NAME));

    Ok(())
}

fn generate_compose(stack: &Stack, force: bool) -> Result<()> {
    console::info(format!("Generating {}...", COMPOSE_FILE));

    if stack.paths.compose_file.exists()
        && !force
        && !stack
            .console
            .confirm(&format!("{} already exists. Overwrite?", COMPOSE_FILE))?
    {
        console::info(format!("Skipping {} generation", COMPOSE_FILE));
        return Ok(());
    }

    generate_compose_file(&stack.paths.compose_file, &stack.config)?;
    console::success(format!("Generated {}", COMPOSE_FILE));

    Ok(())
}

fn generate_env(stack: &Stack, force: bool) -> Result<()> {
    console::info(format!("Generating {} file...", ENV_FILE));

    if stack.paths.env_file.exists()
        && !force
        && !stack
            .console
            .confirm(&format!("{} already exists. Overwrite?", ENV_FILE))?
    {
        console::info(format!("Skipping {} generation", ENV_FILE));
        return Ok(());
    }

    let creds = Credentials::generate(&stack.config.postgres.database, &stack.config.postgres.user);
    generate_env_file(&stack.paths.env_file, &creds)?;
    console::success(format!("Generated {} file with secure password", ENV_FILE));

    Ok(())
}

/// Print the effective configuration, optionally saving it to the stack directory
pub fn show_config(stack: &Stack, write: bool) -> Result<()> {
    let content = stack.config.to_toml()?;

    println!("{}", "Effective configuration:".blue());
    println!("{}", format!("# project: {}", stack.project).bright_black());
    println!();
    print!("{}", content);

    if !write {
        return Ok(());
    }

    println!();
    if stack.paths.config_file.exists()
        && !stack
            .console
            .confirm(&format!("{} already exists. Overwrite?", STACK_CONFIG_FILE))?
    {
        console::info("Cancelled");
        return Ok(());
    }

    let header = "# odm stack configuration\n# Values here override the global config.toml\n\n";
    fs::write(&stack.paths.config_file, format!("{}{}", header, content))
        .context(format!("Failed to write {}", STACK_CONFIG_FILE))?;
    console::success(format!("Wrote {}", stack.paths.config_file.display()));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackConfig;
    use crate::console::Console;
    use crate::docker::runner::testing::fail;
    use crate::generate::env::read_env_file;
    use crate::stack::testing::stack;

    #[test]
    fn test_setup_generates_files() {
        let (_dir, stack, runner) = stack(Console::yes());

        setup(&stack, false).unwrap();

        assert!(stack.paths.compose_file.is_file());
        assert!(stack.paths.addons_dir.is_dir());
        let env = read_env_file(&stack.paths.env_file).unwrap().unwrap();
        assert_eq!(env["POSTGRES_USER"], "odoo");
        assert_eq!(env["POSTGRES_PASSWORD"].len(), 32);

        assert_eq!(runner.position("docker info"), Some(0));
        assert!(runner.ran("config --quiet"));
    }

    #[test]
    fn test_setup_keeps_existing_files_when_declined() {
        let (_dir, stack, _runner) = stack(Console::scripted("n\nn\n"));
        fs::write(&stack.paths.compose_file, "# mine\n").unwrap();
        fs::write(&stack.paths.env_file, "POSTGRES_PASSWORD=keep\n").unwrap();

        setup(&stack, false).unwrap();

        assert_eq!(fs::read_to_string(&stack.paths.compose_file).unwrap(), "# mine\n");
        assert_eq!(
            fs::read_to_string(&stack.paths.env_file).unwrap(),
            "POSTGRES_PASSWORD=keep\n"
        );
    }

    #[test]
    fn test_setup_force_overwrites_without_prompt() {
        let (_dir, stack, _runner) = stack(Console::scripted(""));
        fs::write(&stack.paths.compose_file, "# mine\n").unwrap();

        setup(&stack, true).unwrap();

        let content = fs::read_to_string(&stack.paths.compose_file).unwrap();
        assert!(content.contains("odoo:17"));
    }

    #[test]
    fn test_setup_stops_when_docker_is_down() {
        let (_dir, stack, runner) = stack(Console::yes());
        runner.respond("docker info", fail(1, "Cannot connect"));

        let err = setup(&stack, false).unwrap_err();

        assert!(err.to_string().contains("Docker is not running"));
        assert!(!stack.paths.compose_file.exists());
    }

    #[test]
    fn test_show_config_write() {
        let (_dir, stack, _runner) = stack(Console::yes());

        show_config(&stack, true).unwrap();

        let written = fs::read_to_string(&stack.paths.config_file).unwrap();
        let parsed: StackConfig = toml::from_str(&written).unwrap();
        assert_eq!(parsed, stack.config);
    }
}
