//! Listing snapshot archive members without unpacking them.
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::Command;

pub trait ArchiveLister: Sync {
    fn list_members(&self, archive: &Path) -> Result<Vec<String>>;
}

/// Lists gzip'd tarballs with `tar -tzf`.
pub struct TarLister;

impl ArchiveLister for TarLister {
    fn list_members(&self, archive: &Path) -> Result<Vec<String>> {
        let output = Command::new("tar")
            .arg("-tzf")
            .arg(archive)
            .output()
            .with_context(|| format!("run tar on {}", archive.display()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "tar failed listing {}: {}",
                archive.display(),
                stderr.trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}
