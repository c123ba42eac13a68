//! Snapshot artifact checks.
//!
//! A snapshot must be portable across nodes, so host-specific control and
//! state files must never be captured in it. Validation works on the member
//! listing only; the archive is never unpacked.
use crate::error::{HarnessError, HarnessResult};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Platform configuration and process-id files that are node-local.
const FORBIDDEN_STATIC: [&str; 2] = ["openshift.conf", "httpd.pid"];
const REQUIRED_MEMBER: &str = "app-root/runtime";

/// Names that must not appear anywhere in `app`'s snapshot listing.
pub fn forbidden_members(app: &str) -> Vec<String> {
    let mut forbidden = vec![format!("{app}_ctl.sh")];
    forbidden.extend(FORBIDDEN_STATIC.iter().map(|name| name.to_string()));
    forbidden
}

/// Enforce forbidden/required member rules against an archive listing.
pub fn validate_members(app: &str, members: &[String]) -> HarnessResult<()> {
    for forbidden in forbidden_members(app) {
        if let Some(member) = members.iter().find(|member| member.contains(&forbidden)) {
            return Err(HarnessError::IntegrityViolation {
                app: app.to_string(),
                detail: format!("found illegal file '{forbidden}' in snapshot ({member})"),
            });
        }
    }
    if !members.iter().any(|member| member.contains(REQUIRED_MEMBER)) {
        return Err(HarnessError::IntegrityViolation {
            app: app.to_string(),
            detail: format!("snapshot missing required member '{REQUIRED_MEMBER}'"),
        });
    }
    Ok(())
}

/// Require `path` to be an existing, non-empty file. Returns its size.
pub fn check_artifact(app: &str, path: &Path) -> HarnessResult<u64> {
    let metadata = fs::metadata(path).map_err(|_| HarnessError::SnapshotMissing {
        app: app.to_string(),
        path: path.to_path_buf(),
    })?;
    if !metadata.is_file() {
        return Err(HarnessError::SnapshotMissing {
            app: app.to_string(),
            path: path.to_path_buf(),
        });
    }
    if metadata.len() == 0 {
        return Err(HarnessError::SnapshotEmpty {
            app: app.to_string(),
            path: path.to_path_buf(),
        });
    }
    Ok(metadata.len())
}

/// Copy `snapshot` into a fresh directory under `preserve_root` so a later
/// snapshot of the same app cannot overwrite it.
pub fn preserve(snapshot: &Path, preserve_root: &Path) -> Result<PathBuf> {
    fs::create_dir_all(preserve_root)
        .with_context(|| format!("create {}", preserve_root.display()))?;
    let file_name = snapshot
        .file_name()
        .with_context(|| format!("snapshot path {} has no file name", snapshot.display()))?;
    let dir = tempfile::Builder::new()
        .prefix("preserved-")
        .tempdir_in(preserve_root)
        .with_context(|| format!("create preserve dir under {}", preserve_root.display()))?
        .keep();
    let target = dir.join(file_name);
    fs::copy(snapshot, &target).with_context(|| {
        format!("copy {} to {}", snapshot.display(), target.display())
    })?;
    Ok(target)
}
