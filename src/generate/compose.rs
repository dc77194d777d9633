//! docker-compose.yml generator
//!
//! Renders the fixed two-service stack (PostgreSQL + Odoo) from the
//! effective configuration. The rendered text is parsed back before it is
//! written so a broken template never reaches disk.

use std::{fs, path::Path};

use anyhow::{Context, Result, bail};

use crate::config::StackConfig;
use crate::docker::compose::ComposeInfo;

pub const POSTGRES_SERVICE: &str = "postgres";
pub const ODOO_SERVICE: &str = "odoo";

/// Port Odoo listens on inside its container
pub const ODOO_CONTAINER_PORT: u16 = 8069;

const DB_VOLUME: &str = "db_data";
const ODOO_VOLUME: &str = "odoo_data";

/// Generate docker-compose.yml content
pub fn generate_compose_content(config: &StackConfig) -> String {
    let network = &config.network.name;

    let mut content = String::from("# Generated by odm (Odoo Docker Manager)\n");
    content.push_str("services:\n");
    content.push_str(&postgres_block(config, network));
    content.push_str(&odoo_block(config, network));

    content.push_str(&format!("networks:\n  {}:\n    driver: bridge\n", network));

    content.push_str("\nvolumes:\n");
    content.push_str(&format!("  {}:\n", DB_VOLUME));
    content.push_str(&format!("  {}:\n", ODOO_VOLUME));

    content
}

fn postgres_block(config: &StackConfig, network: &str) -> String {
    let pg = &config.postgres;
    let mut block = format!("  {}:\n", POSTGRES_SERVICE);

    block.push_str(&format!("    image: {}\n", pg.image));
    block.push_str(&format!("    container_name: {}\n", pg.container_name));
    block.push_str("    env_file: .env\n");

    block.push_str("    volumes:\n");
    block.push_str(&format!("      - {}:/var/lib/postgresql/data\n", DB_VOLUME));

    block.push_str("    networks:\n");
    block.push_str(&format!("      - {}\n", network));

    block.push_str("    restart: always\n");

    block.push_str("    healthcheck:\n");
    block.push_str(&format!(
        "      test: [\"CMD-SHELL\", \"pg_isready -U {}\"]\n",
        pg.user
    ));
    block.push_str("      interval: 10s\n");
    block.push_str("      timeout: 5s\n");
    block.push_str("      retries: 5\n");

    block.push('\n');
    block
}

fn odoo_block(config: &StackConfig, network: &str) -> String {
    let odoo = &config.odoo;
    let mut block = format!("  {}:\n", ODOO_SERVICE);

    block.push_str(&format!("    image: {}\n", odoo.image));
    block.push_str(&format!("    container_name: {}\n", odoo.container_name));
    block.push_str("    env_file: .env\n");

    block.push_str("    depends_on:\n");
    block.push_str(&format!("      {}:\n", POSTGRES_SERVICE));
    block.push_str("        condition: service_healthy\n");

    block.push_str("    ports:\n");
    block.push_str(&format!(
        "      - \"{}:{}:{}\"\n",
        odoo.bind_address, odoo.port, ODOO_CONTAINER_PORT
    ));

    block.push_str("    volumes:\n");
    block.push_str(&format!("      - {}:/var/lib/odoo\n", ODOO_VOLUME));
    block.push_str("      - ./addons:/mnt/extra-addons\n");

    block.push_str("    networks:\n");
    block.push_str(&format!("      - {}\n", network));

    block.push_str("    restart: always\n");

    block.push('\n');
    block
}

/// Parse rendered content and check the keys the stack relies on
pub fn validate_compose_content(content: &str) -> Result<ComposeInfo> {
    let info = ComposeInfo::from_yaml(content)?;

    for service in [POSTGRES_SERVICE, ODOO_SERVICE] {
        if info.service(service).is_none() {
            bail!("Generated compose file is missing service '{}'", service);
        }
    }
    if info.networks.is_empty() {
        bail!("Generated compose file defines no networks");
    }
    for volume in [DB_VOLUME, ODOO_VOLUME] {
        if !info.volumes.contains(volume) {
            bail!("Generated compose file is missing volume '{}'", volume);
        }
    }

    Ok(info)
}

/// Generate docker-compose.yml file
pub fn generate_compose_file(path: &Path, config: &StackConfig) -> Result<()> {
    let content = generate_compose_content(config);
    validate_compose_content(&content)?;
    fs::write(path, content).context("Failed to write docker-compose.yml")?;
    Ok(())
}
