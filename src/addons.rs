//! Custom addons directory helpers

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

/// File every Odoo module must carry
pub const MANIFEST_FILE: &str = "__manifest__.py";

/// An addon folder found in the addons directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addon {
    pub name: String,
    pub path: PathBuf,
    pub has_manifest: bool,
}

/// List addon folders (non-hidden directories), sorted by name
pub fn scan(addons_dir: &Path) -> Result<Vec<Addon>> {
    let entries = fs::read_dir(addons_dir)
        .context(format!("Failed to read addons directory: {:?}", addons_dir))?;

    let mut addons = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if name.starts_with('.') || !path.is_dir() {
            continue;
        }

        addons.push(Addon {
            has_manifest: path.join(MANIFEST_FILE).is_file(),
            name,
            path,
        });
    }

    addons.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(addons)
}

/// Recursively set mode 755 so the Odoo container user can read everything.
/// Symlinks are not followed. Returns the number of entries visited.
#[cfg(unix)]
pub fn make_accessible(path: &Path) -> Result<usize> {
    use std::os::unix::fs::PermissionsExt;

    let metadata =
        fs::symlink_metadata(path).context(format!("Failed to stat {:?}", path))?;
    if metadata.file_type().is_symlink() {
        return Ok(0);
    }

    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .context(format!("Failed to set permissions on {:?}", path))?;
    let mut visited = 1;

    if metadata.is_dir() {
        for entry in fs::read_dir(path).context(format!("Failed to read {:?}", path))? {
            visited += make_accessible(&entry?.path())?;
        }
    }

    Ok(visited)
}

#[cfg(not(unix))]
pub fn make_accessible(_path: &Path) -> Result<usize> {
    Ok(0)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_scan_lists_addon_folders() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sale_custom")).unwrap();
        fs::write(dir.path().join("sale_custom").join(MANIFEST_FILE), "{}").unwrap();
        fs::create_dir(dir.path().join("broken_module")).unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("README.md"), "notes").unwrap();

        let addons = scan(dir.path()).unwrap();
        let names: Vec<&str> = addons.iter().map(|a| a.name.as_str()).collect();

        assert_eq!(names, vec!["broken_module", "sale_custom"]);
        assert!(!addons[0].has_manifest);
        assert!(addons[1].has_manifest);
    }

    #[cfg(unix)]
    #[test]
    fn test_make_accessible_sets_mode_recursively() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let module = dir.path().join("module");
        fs::create_dir(&module).unwrap();
        let file = module.join(MANIFEST_FILE);
        fs::write(&file, "{}").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o600)).unwrap();

        let visited = make_accessible(dir.path()).unwrap();

        assert_eq!(visited, 3);
        let mode = fs::metadata(&file).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }
}
