//! Backup archives and restore

use std::{
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::{Context, Result, bail};
use chrono::Local;
use colored::Colorize;
use regex::Regex;

use crate::config::STACK_CONFIG_FILE;
use crate::console::{self, BIN_NAME};
use crate::docker::runner::CommandSpec;
use crate::generate::compose::{ODOO_SERVICE, POSTGRES_SERVICE};
use crate::generate::env::read_env_file;
use crate::stack::{ADDONS_DIR, BACKUP_DIR, COMPOSE_FILE, ENV_FILE, Stack};

const ARCHIVE_PREFIX: &str = "odoo_backup_";
const ARCHIVE_SUFFIX: &str = ".tar.gz";

static DUMP_MEMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|/)db_\d{8}_\d{6}\.sql$").expect("static regex"));

/// Stack files restored by `--with-config`
const CONFIG_MEMBERS: [&str; 3] = [ENV_FILE, COMPOSE_FILE, STACK_CONFIG_FILE];

fn is_archive_name(name: &str) -> bool {
    name.starts_with(ARCHIVE_PREFIX) && name.ends_with(ARCHIVE_SUFFIX)
}

/// Backup archives in `dir`, newest first
pub fn list_backups(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut archives: Vec<PathBuf> = fs::read_dir(dir)
        .context(format!("Failed to read backup directory: {:?}", dir))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(is_archive_name)
        })
        .collect();

    // Timestamped names sort chronologically
    archives.sort();
    archives.reverse();
    Ok(archives)
}

/// Delete archives beyond the newest `keep` (0 keeps everything)
pub fn prune_old_backups(dir: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    if keep == 0 {
        return Ok(Vec::new());
    }

    let mut removed = Vec::new();
    for archive in list_backups(dir)?.into_iter().skip(keep) {
        match fs::remove_file(&archive) {
            Ok(()) => removed.push(archive),
            Err(e) => tracing::warn!(archive = %archive.display(), error = %e, "could not remove old backup"),
        }
    }
    Ok(removed)
}

/// The database dump entry in a `tar -t` listing
pub fn find_dump_member(listing: &str) -> Option<String> {
    listing
        .lines()
        .map(str::trim)
        .find(|line| DUMP_MEMBER.is_match(line))
        .map(str::to_string)
}

/// Dump all databases and archive them with the stack files
pub fn backup(stack: &Stack) -> Result<PathBuf> {
    console::header();
    console::info("Creating backup...");

    stack.require_compose_file()?;
    stack.require_service_running(POSTGRES_SERVICE, "PostgreSQL")?;

    let backup_dir = &stack.paths.backup_dir;
    fs::create_dir_all(backup_dir).context("Failed to create backup directory")?;

    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let dump_name = format!("db_{}.sql", timestamp);
    let dump_path = backup_dir.join(&dump_name);
    let archive = backup_dir.join(format!("{}{}{}", ARCHIVE_PREFIX, timestamp, ARCHIVE_SUFFIX));

    console::info("Dumping databases...");
    let user = stack.db_user();
    let dump_cmd = stack.compose()?.exec(
        POSTGRES_SERVICE,
        ["pg_dumpall", "-U", user.as_str(), "--clean", "--if-exists"],
    );
    let dump = stack
        .capture(&dump_cmd)?
        .checked(&dump_cmd)
        .context("Database dump failed")?;
    fs::write(&dump_path, &dump.stdout).context("Failed to write database dump")?;

    console::info("Archiving...");
    let mut tar = CommandSpec::new("tar")
        .arg("-czf")
        .arg(archive.to_string_lossy())
        .arg("-C")
        .arg(stack.paths.root.to_string_lossy());
    for member in [ENV_FILE, COMPOSE_FILE, ADDONS_DIR, STACK_CONFIG_FILE] {
        if stack.paths.root.join(member).exists() {
            tar = tar.arg(member);
        }
    }
    tar = tar.arg(format!("{}/{}", BACKUP_DIR, dump_name));

    let archived = stack.capture(&tar);
    if let Err(e) = fs::remove_file(&dump_path) {
        tracing::warn!(dump = %dump_path.display(), error = %e, "could not remove temporary dump");
    }
    archived?.checked(&tar).context("Failed to create backup archive")?;

    console::success(format!("Backup created: {}", archive.display()));
    if let Ok(meta) = fs::metadata(&archive) {
        console::info(format!(
            "Size: {:.2} MB",
            meta.len() as f64 / (1024.0 * 1024.0)
        ));
    }

    for removed in prune_old_backups(backup_dir, stack.config.backup.keep)? {
        console::info(format!("Removed old backup: {}", removed.display()));
    }

    Ok(archive)
}

/// Resolve the archive to restore: an explicit path or the newest backup
fn select_archive(stack: &Stack, archive: Option<PathBuf>, latest: bool) -> Result<PathBuf> {
    if let Some(path) = archive {
        if path.is_file() {
            return Ok(path);
        }
        let in_backup_dir = stack.paths.backup_dir.join(&path);
        if in_backup_dir.is_file() {
            return Ok(in_backup_dir);
        }
        bail!("Backup archive not found: {}", path.display());
    }

    let backups = list_backups(&stack.paths.backup_dir)?;
    if latest {
        return backups
            .into_iter()
            .next()
            .with_context(|| format!("No backups found in {}", stack.paths.backup_dir.display()));
    }

    if backups.is_empty() {
        bail!(
            "No backups found in {}\nCreate one with '{} backup'",
            stack.paths.backup_dir.display(),
            BIN_NAME
        );
    }
    console::section("Available backups:");
    for backup in &backups {
        if let Some(name) = backup.file_name() {
            println!("  {}", name.to_string_lossy());
        }
    }
    bail!("Specify an archive to restore or pass --latest")
}

fn member_name(line: &str) -> &str {
    line.trim().trim_start_matches("./")
}

/// Restore databases (and optionally stack files) from a backup archive
pub fn restore(
    stack: &Stack,
    archive: Option<PathBuf>,
    latest: bool,
    with_config: bool,
) -> Result<()> {
    console::header();
    stack.require_compose_file()?;

    let archive = select_archive(stack, archive, latest)?;
    let archive_arg = archive.to_string_lossy().to_string();
    console::info(format!("Restoring from {}", archive.display()));

    let list = CommandSpec::new("tar").args(["-tzf", archive_arg.as_str()]);
    let listing = stack
        .capture(&list)?
        .checked(&list)
        .context("Failed to read backup archive")?
        .stdout_text();
    let member = find_dump_member(&listing)
        .with_context(|| format!("No database dump found in {}", archive.display()))?;

    console::warn(
        "This will overwrite ALL databases with the contents of the backup!"
            .red()
            .bold(),
    );
    if !stack.console.confirm("Continue with restore?")? {
        console::info("Cancelled");
        return Ok(());
    }

    let mut restored_config: Vec<&str> = Vec::new();
    if with_config {
        let members: Vec<&str> = listing
            .lines()
            .map(member_name)
            .filter(|name| CONFIG_MEMBERS.contains(name))
            .collect();
        if members.is_empty() {
            console::warn("Archive contains no configuration files");
        } else {
            let extract = CommandSpec::new("tar")
                .args(["-xzf", archive_arg.as_str(), "-C"])
                .arg(stack.paths.root.to_string_lossy())
                .args(members.iter().copied());
            stack
                .capture(&extract)?
                .checked(&extract)
                .context("Failed to extract configuration files")?;
            console::success(format!("Restored {}", members.join(", ")));
            restored_config = members;
        }
    }

    stack.require_service_running(POSTGRES_SERVICE, "PostgreSQL")?;

    let read = CommandSpec::new("tar").args(["-xzOf", archive_arg.as_str(), member.as_str()]);
    let dump = stack
        .capture(&read)?
        .checked(&read)
        .context("Failed to read database dump from archive")?;

    console::info("Stopping Odoo...");
    stack.compose_run(["stop", ODOO_SERVICE])?;

    console::info("Restoring databases...");
    let user = stack.db_user();
    let psql = stack.compose()?.exec(
        POSTGRES_SERVICE,
        ["psql", "-q", "-U", user.as_str(), "-d", "postgres"],
    );
    let restored = stack.capture_with_input(&psql, &dump.stdout)?;

    // The dump carries the role password from backup time
    if !restored_config.contains(&ENV_FILE) {
        reapply_db_password(stack, &user)?;
    }

    if restored_config.is_empty() {
        console::info("Starting Odoo...");
        stack.compose_run(["start", ODOO_SERVICE])?;
    } else {
        // Running containers still hold the previous environment
        console::info("Recreating containers with the restored configuration...");
        stack.compose_run(["up", "-d", "--force-recreate"])?;
    }

    let stderr = restored.stderr_text();
    let errors = stderr.lines().filter(|line| line.contains("ERROR")).count();
    if !restored.success() {
        bail!("Restore failed: {}", stderr.trim());
    }
    if errors > 0 {
        console::warn(format!("psql reported {} error(s) during restore", errors));
        for line in stderr.lines().filter(|line| line.contains("ERROR")).take(5) {
            println!("  {}", line.trim());
        }
    }

    console::success("Restore complete");
    Ok(())
}

/// Quote a value as a SQL string literal
fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Set the role password back to POSTGRES_PASSWORD from the current .env
fn reapply_db_password(stack: &Stack, user: &str) -> Result<()> {
    let password = read_env_file(&stack.paths.env_file)?
        .and_then(|vars| vars.get("POSTGRES_PASSWORD").cloned())
        .filter(|password| !password.is_empty());
    let Some(password) = password else {
        console::warn(format!(
            "No POSTGRES_PASSWORD in {}; the role keeps the password from the backup",
            ENV_FILE
        ));
        return Ok(());
    };

    let sql = format!(
        "ALTER ROLE \"{}\" PASSWORD {};",
        user,
        sql_literal(&password)
    );
    let output = stack.psql("postgres", &sql)?;
    if output.success() {
        console::success(format!("Database password synced with {}", ENV_FILE));
    } else {
        console::warn(format!(
            "Could not reset the database password: {}",
            output.stderr_text().trim()
        ));
    }
    Ok(())
}
