//! Docker engine queries
//!
//! Thin wrappers over `docker ps`, `docker volume`, `docker network` and
//! `docker info` used by the stack commands.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::runner::{CommandSpec, Runner};

/// Label Compose puts on every container, volume and network it creates
const PROJECT_LABEL: &str = "com.docker.compose.project";

fn docker() -> CommandSpec {
    CommandSpec::new("docker")
}

fn project_filter(project: &str) -> String {
    format!("label={}={}", PROJECT_LABEL, project)
}

/// Check whether the Docker daemon answers `docker info`
pub fn daemon_running(runner: &dyn Runner) -> Result<bool> {
    let output = runner.capture(&docker().arg("info"))?;
    Ok(output.success())
}

/// Check if a container with exactly this name is running
pub fn container_running(runner: &dyn Runner, name: &str) -> Result<bool> {
    let output = runner
        .capture(&docker().args([
            "ps",
            "--filter",
            &format!("name={}", name),
            "--format",
            "{{.Names}}",
        ]))
        .context("Failed to check container status")?;

    // The name filter matches substrings, so compare whole lines
    Ok(output.success() && output.stdout_lines().iter().any(|line| line == name))
}

/// All containers (running or stopped) belonging to a Compose project
pub fn project_containers(runner: &dyn Runner, project: &str) -> Result<Vec<String>> {
    list_names(
        runner,
        docker().args([
            "ps",
            "-a",
            "--filter",
            &project_filter(project),
            "--format",
            "{{.Names}}",
        ]),
    )
}

/// All volumes belonging to a Compose project
pub fn project_volumes(runner: &dyn Runner, project: &str) -> Result<Vec<String>> {
    list_names(
        runner,
        docker().args([
            "volume",
            "ls",
            "--filter",
            &project_filter(project),
            "--format",
            "{{.Name}}",
        ]),
    )
}

/// All networks belonging to a Compose project
pub fn project_networks(runner: &dyn Runner, project: &str) -> Result<Vec<String>> {
    list_names(
        runner,
        docker().args([
            "network",
            "ls",
            "--filter",
            &project_filter(project),
            "--format",
            "{{.Name}}",
        ]),
    )
}

/// `docker volume ls` for a project, attached to the terminal
pub fn volume_table(project: &str) -> CommandSpec {
    docker().args(["volume", "ls", "--filter", &project_filter(project)])
}

fn list_names(runner: &dyn Runner, cmd: CommandSpec) -> Result<Vec<String>> {
    let output = runner.capture(&cmd)?;
    if !output.success() {
        return Ok(Vec::new());
    }
    Ok(output.stdout_lines())
}

/// Force-remove a container. Returns whether Docker reported success.
pub fn remove_container(runner: &dyn Runner, name: &str) -> Result<bool> {
    Ok(runner.capture(&docker().args(["rm", "-f", name]))?.success())
}

/// Remove a volume. Returns whether Docker reported success.
pub fn remove_volume(runner: &dyn Runner, name: &str) -> Result<bool> {
    Ok(runner
        .capture(&docker().args(["volume", "rm", name]))?
        .success())
}

/// Remove a network. Returns whether Docker reported success.
pub fn remove_network(runner: &dyn Runner, name: &str) -> Result<bool> {
    Ok(runner
        .capture(&docker().args(["network", "rm", name]))?
        .success())
}

/// Subset of `docker network inspect` output
#[derive(Debug, Deserialize)]
pub struct NetworkDetails {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Driver", default)]
    pub driver: String,
    #[serde(rename = "Containers", default)]
    pub containers: Option<HashMap<String, NetworkEndpoint>>,
}

/// A container attached to a network
#[derive(Debug, Deserialize)]
pub struct NetworkEndpoint {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "IPv4Address", default)]
    pub ipv4_address: String,
}

impl NetworkDetails {
    /// Attached containers sorted by name
    pub fn endpoints(&self) -> Vec<&NetworkEndpoint> {
        let mut endpoints: Vec<&NetworkEndpoint> = self
            .containers
            .as_ref()
            .map(|c| c.values().collect())
            .unwrap_or_default();
        endpoints.sort_by(|a, b| a.name.cmp(&b.name));
        endpoints
    }
}

/// Inspect a network. `Ok(None)` when it does not exist.
pub fn inspect_network(runner: &dyn Runner, name: &str) -> Result<Option<NetworkDetails>> {
    let output = runner.capture(&docker().args(["network", "inspect", name]))?;
    if !output.success() {
        return Ok(None);
    }

    parse_network_inspect(&output.stdout)
}

fn parse_network_inspect(json: &[u8]) -> Result<Option<NetworkDetails>> {
    let mut networks: Vec<NetworkDetails> =
        serde_json::from_slice(json).context("Failed to parse docker network inspect output")?;

    if networks.is_empty() {
        Ok(None)
    } else {
        Ok(Some(networks.remove(0)))
    }
}
