//! Docker Compose invocation
//!
//! Builds command lines for either the `docker compose` plugin or the
//! standalone `docker-compose` binary. Every invocation is pinned to the
//! stack's project name and compose file so container, network and volume
//! names do not depend on where the tool is run from.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use anyhow::{Result, bail};
use tracing::debug;

use super::runner::{CommandSpec, Runner};
use crate::config::ComposeMode;

/// Which Compose implementation to call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeFlavor {
    /// `docker compose` (v2 CLI plugin)
    Plugin,
    /// `docker-compose` (standalone binary)
    Standalone,
}

impl fmt::Display for ComposeFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComposeFlavor::Plugin => write!(f, "docker compose"),
            ComposeFlavor::Standalone => write!(f, "docker-compose"),
        }
    }
}

impl ComposeFlavor {
    fn base(self) -> CommandSpec {
        match self {
            ComposeFlavor::Plugin => CommandSpec::new("docker").arg("compose"),
            ComposeFlavor::Standalone => CommandSpec::new("docker-compose"),
        }
    }

    /// Resolve the configured mode to a concrete flavor.
    ///
    /// `auto` probes the plugin first, then the standalone binary.
    pub fn detect(runner: &dyn Runner, mode: ComposeMode) -> Result<Self> {
        match mode {
            ComposeMode::Plugin => return Ok(ComposeFlavor::Plugin),
            ComposeMode::Standalone => return Ok(ComposeFlavor::Standalone),
            ComposeMode::Auto => {}
        }

        let probes = [
            (ComposeFlavor::Plugin, ComposeFlavor::Plugin.base().arg("version")),
            (
                ComposeFlavor::Standalone,
                ComposeFlavor::Standalone.base().arg("--version"),
            ),
        ];

        for (flavor, probe) in probes {
            match runner.capture(&probe) {
                Ok(output) if output.success() => {
                    debug!(%flavor, version = %output.stdout_text().trim(), "compose detected");
                    return Ok(flavor);
                }
                Ok(_) => debug!(%flavor, "compose probe failed"),
                Err(e) => debug!(%flavor, error = %e, "compose probe failed"),
            }
        }

        bail!(
            "Docker Compose is not installed\n\
            Install the compose plugin (e.g. 'sudo apt-get install docker-compose-plugin') \
            or the standalone docker-compose binary"
        )
    }
}

/// Compose command builder bound to one project
#[derive(Debug, Clone)]
pub struct Compose {
    flavor: ComposeFlavor,
    project: String,
    file: PathBuf,
    dir: PathBuf,
}

impl Compose {
    pub fn new(flavor: ComposeFlavor, project: &str, file: &Path, dir: &Path) -> Self {
        Self {
            flavor,
            project: project.to_string(),
            file: file.to_path_buf(),
            dir: dir.to_path_buf(),
        }
    }

    pub fn flavor(&self) -> ComposeFlavor {
        self.flavor
    }

    /// `<compose> -p <project> -f <file> <args...>`, run from the stack directory
    pub fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flavor
            .base()
            .arg("-p")
            .arg(self.project.clone())
            .arg("-f")
            .arg(self.file.to_string_lossy())
            .args(args)
            .current_dir(self.dir.clone())
    }

    /// Non-interactive `exec -T <service> <args...>`
    pub fn exec<I, S>(&self, service: &str, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command(["exec", "-T", service]).args(args)
    }
}
