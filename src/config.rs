//! Tool path resolution (C9).
//!
//! Ported from `cljob/rsh.py::search_path`: find an executable on `PATH`,
//! honoring an environment-variable override before falling back to the
//! search. This crate loads no per-user config file — see SPEC_FULL.md's
//! "AMBIENT STACK" section for why that's out of scope.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::exec::ToolPaths;

/// Search `PATH` for `executable`, returning the first entry for which it is
/// accessible and executable. Ported from `cljob/rsh.py::search_path`.
pub fn search_path(executable: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(executable))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Resolve one tool: `env_override` wins outright (no existence check, to
/// let tests and unusual setups point at wrapper scripts); otherwise search
/// `PATH` for `default_name`.
fn resolve_one(env_var: &str, default_name: &str) -> Result<String> {
    if let Ok(value) = std::env::var(env_var) {
        return Ok(value);
    }
    search_path(default_name)
        .map(|p| p.to_string_lossy().into_owned())
        .with_context(|| format!("`{default_name}` not found on PATH (set {env_var} to override)"))
}

/// Resolve both `rsh` and `rsync` binary paths, honoring `CLFLEET_RSH` /
/// `CLFLEET_RSYNC` overrides.
pub fn resolve_tools() -> Result<ToolPaths> {
    let rsh = resolve_one("CLFLEET_RSH", "rsh")?;
    let rsync = resolve_one("CLFLEET_RSYNC", "rsync")?;
    Ok(ToolPaths { rsh, rsync })
}

/// Validate a handful of CLI invariants that don't fit cleanly into clap's
/// declarative validators (e.g. cross-field checks).
pub fn require_non_empty(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{name} must not be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_wins_without_path_search() {
        // SAFETY: test runs single-threaded w.r.t. this env var.
        unsafe {
            std::env::set_var("CLFLEET_TEST_RSH_OVERRIDE", "/custom/rsh");
        }
        let resolved = resolve_one("CLFLEET_TEST_RSH_OVERRIDE", "definitely-not-a-real-executable-name-xyz");
        unsafe {
            std::env::remove_var("CLFLEET_TEST_RSH_OVERRIDE");
        }
        assert_eq!(resolved.unwrap(), "/custom/rsh");
    }

    #[test]
    fn search_path_finds_known_unix_tool() {
        // `sh` is guaranteed present on any unix CI/dev box this runs on.
        let found = search_path("sh");
        assert!(found.is_some());
    }

    #[test]
    fn search_path_returns_none_for_bogus_executable() {
        let found = search_path("definitely-not-a-real-executable-name-xyz");
        assert!(found.is_none());
    }

    #[test]
    fn require_non_empty_rejects_blank() {
        assert!(require_non_empty("host", "   ").is_err());
        assert!(require_non_empty("host", "h1").is_ok());
    }
}
