//! Stack context
//!
//! A [`Stack`] bundles everything a command needs: the stack directory
//! layout, the effective configuration, the Compose project name, the
//! process runner and the console used for prompts.

use std::{
    cell::OnceCell,
    env,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::config::{STACK_CONFIG_FILE, StackConfig};
use crate::console::{self, BIN_NAME, Console};
use crate::docker::compose::ComposeInfo;
use crate::docker::compose_cli::{Compose, ComposeFlavor};
use crate::docker::engine;
use crate::docker::runner::{CommandOutput, CommandSpec, Runner};
use crate::generate::compose::POSTGRES_SERVICE;
use crate::generate::env::read_env_file;

pub const COMPOSE_FILE: &str = "docker-compose.yml";
pub const ENV_FILE: &str = ".env";
pub const ADDONS_DIR: &str = "addons";
pub const BACKUP_DIR: &str = "backups";

/// Files and directories of a stack
#[derive(Debug, Clone)]
pub struct StackPaths {
    pub root: PathBuf,
    pub compose_file: PathBuf,
    pub env_file: PathBuf,
    pub addons_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub config_file: PathBuf,
}

impl StackPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            compose_file: root.join(COMPOSE_FILE),
            env_file: root.join(ENV_FILE),
            addons_dir: root.join(ADDONS_DIR),
            backup_dir: root.join(BACKUP_DIR),
            config_file: root.join(STACK_CONFIG_FILE),
        }
    }
}

pub struct Stack {
    pub paths: StackPaths,
    pub config: StackConfig,
    /// Compose project name
    pub project: String,
    pub console: Console,
    runner: Box<dyn Runner>,
    compose: OnceCell<Compose>,
}

impl Stack {
    /// Open the stack in `directory` (default: current directory)
    pub fn open(
        directory: Option<PathBuf>,
        console: Console,
        runner: Box<dyn Runner>,
    ) -> Result<Self> {
        let root = match directory {
            Some(dir) => dir,
            None => env::current_dir().context("Failed to get current directory")?,
        };

        if !root.is_dir() {
            bail!("Directory not found: {}", root.display());
        }
        let root = root
            .canonicalize()
            .context(format!("Failed to resolve directory: {:?}", root))?;

        let config = StackConfig::load(&root)?;
        Ok(Self::with_parts(&root, config, console, runner))
    }

    pub fn with_parts(
        root: &Path,
        config: StackConfig,
        console: Console,
        runner: Box<dyn Runner>,
    ) -> Self {
        let project = config.project_name(root);
        debug!(root = %root.display(), %project, "stack opened");

        Self {
            paths: StackPaths::new(root),
            config,
            project,
            console,
            runner,
            compose: OnceCell::new(),
        }
    }

    pub fn runner(&self) -> &dyn Runner {
        self.runner.as_ref()
    }

    /// Compose builder, detecting the flavor on first use
    pub fn compose(&self) -> Result<&Compose> {
        if let Some(compose) = self.compose.get() {
            return Ok(compose);
        }

        let flavor = ComposeFlavor::detect(self.runner(), self.config.runtime.compose)?;
        let compose = Compose::new(
            flavor,
            &self.project,
            &self.paths.compose_file,
            &self.paths.root,
        );

        Ok(self.compose.get_or_init(|| compose))
    }

    /// Run attached to the terminal, without checking the exit code
    pub fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput> {
        Ok(self.runner.run(cmd)?)
    }

    /// Run attached to the terminal and fail on a non-zero exit
    pub fn run_checked(&self, cmd: &CommandSpec) -> Result<()> {
        self.runner.run(cmd)?.checked(cmd)?;
        Ok(())
    }

    /// Run with captured output, without checking the exit code
    pub fn capture(&self, cmd: &CommandSpec) -> Result<CommandOutput> {
        Ok(self.runner.capture(cmd)?)
    }

    pub fn capture_with_input(&self, cmd: &CommandSpec, input: &[u8]) -> Result<CommandOutput> {
        Ok(self.runner.capture_with_input(cmd, input)?)
    }

    /// `compose <args>` attached, failing on a non-zero exit
    pub fn compose_run<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cmd = self.compose()?.command(args);
        self.run_checked(&cmd)
    }

    /// Database role: POSTGRES_USER from .env when present, else the configured user
    pub fn db_user(&self) -> String {
        match read_env_file(&self.paths.env_file) {
            Ok(Some(vars)) => vars
                .get("POSTGRES_USER")
                .filter(|user| !user.is_empty())
                .cloned()
                .unwrap_or_else(|| self.config.postgres.user.clone()),
            Ok(None) => self.config.postgres.user.clone(),
            Err(e) => {
                debug!(error = %e, "falling back to configured database user");
                self.config.postgres.user.clone()
            }
        }
    }

    /// `psql -U <user> -d <database> -c <sql>` inside the postgres container
    pub fn psql(&self, database: &str, sql: &str) -> Result<CommandOutput> {
        let user = self.db_user();
        let cmd = self.compose()?.exec(
            POSTGRES_SERVICE,
            ["psql", "-U", user.as_str(), "-d", database, "-c", sql],
        );
        self.capture(&cmd)
    }

    pub fn require_compose_file(&self) -> Result<()> {
        if !self.paths.compose_file.exists() {
            bail!(
                "{} not found in {}\nRun '{} setup' first",
                COMPOSE_FILE,
                self.paths.root.display(),
                BIN_NAME
            );
        }
        Ok(())
    }

    /// Parsed docker-compose.yml
    pub fn compose_info(&self) -> Result<ComposeInfo> {
        self.require_compose_file()?;
        ComposeInfo::parse(&self.paths.compose_file)
    }

    /// Fail unless `service` is defined in docker-compose.yml
    pub fn require_service(&self, service: &str) -> Result<()> {
        let info = self.compose_info()?;
        if info.service(service).is_none() {
            bail!(
                "Unknown service '{}'. Available services: {}",
                service,
                info.service_names().join(", ")
            );
        }
        Ok(())
    }

    pub fn docker_running(&self) -> Result<bool> {
        engine::daemon_running(self.runner())
    }

    /// Fail with a hint when the Docker daemon is down
    pub fn require_docker(&self) -> Result<()> {
        if !self.docker_running()? {
            console::info("Start Docker with: sudo systemctl start docker");
            bail!("Docker is not running");
        }
        Ok(())
    }

    /// Fail unless the named container is running
    pub fn require_running(&self, container: &str, label: &str) -> Result<()> {
        if !engine::container_running(self.runner(), container)? {
            bail!(
                "{} container ({}) is not running. Start it with '{} start'",
                label,
                container,
                BIN_NAME
            );
        }
        Ok(())
    }

    /// Container backing `service`, as named in docker-compose.yml
    pub fn container_for(&self, service: &str) -> Result<String> {
        let info = self.compose_info()?;
        info.container_name(service, &self.project)
            .with_context(|| format!("Service '{}' is not defined in {}", service, COMPOSE_FILE))
    }

    /// Fail unless the container of `service` is running
    pub fn require_service_running(&self, service: &str, label: &str) -> Result<()> {
        let container = self.container_for(service)?;
        self.require_running(&container, label)
    }

    /// Name of the stack network as created by Compose
    pub fn network_name(&self) -> String {
        format!("{}_{}", self.project, self.config.network.name)
    }

    /// Sleep for the configured startup grace period
    pub fn wait_for_startup(&self) {
        let secs = self.config.runtime.startup_wait_secs;
        if secs > 0 {
            thread::sleep(Duration::from_secs(secs));
        }
    }
}
