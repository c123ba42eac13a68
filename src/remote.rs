//! Remote client boundary.
//!
//! Lifecycle mutations are delegated to an external client. The orchestrators
//! only see typed requests going in and a [`RemoteStatus`] coming out; building
//! argv, parsing client output and editing deploy checkouts all live behind
//! this trait.
mod deploy;
mod rhc;

use crate::app::TestApp;
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use deploy::DeployChange;
pub use rhc::RhcClient;

/// Outcome of one remote call. A zero code denotes success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteStatus {
    pub code: i32,
    /// Unix user backing the app, when the call reports it.
    pub uid: Option<String>,
    /// Connection parameters reported by a cartridge (e.g. HOSTNAME/USER/PASSWORD).
    pub params: BTreeMap<String, String>,
}

impl RemoteStatus {
    pub fn code(code: i32) -> Self {
        RemoteStatus {
            code,
            ..RemoteStatus::default()
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Operations the platform client performs on behalf of the harness.
///
/// `Err` means the client itself could not be run; a client that ran and
/// reported failure returns `Ok` with a non-zero code.
pub trait RemoteClient: Sync {
    fn register_user(&self, login: &str, password: &str) -> Result<RemoteStatus>;
    fn create_domain(&self, app: &TestApp) -> Result<RemoteStatus>;
    fn create_app(
        &self,
        app: &TestApp,
        scalable: bool,
        extra_flags: &[String],
    ) -> Result<RemoteStatus>;
    fn embed_cartridge(&self, app: &TestApp, cartridge: &str) -> Result<RemoteStatus>;
    fn remove_cartridge(&self, app: &TestApp, cartridge: &str) -> Result<RemoteStatus>;
    fn start(&self, app: &TestApp) -> Result<RemoteStatus>;
    fn stop(&self, app: &TestApp) -> Result<RemoteStatus>;
    fn restart(&self, app: &TestApp) -> Result<RemoteStatus>;
    fn destroy(&self, app: &TestApp) -> Result<RemoteStatus>;
    fn add_alias(&self, app: &TestApp, alias: &str) -> Result<RemoteStatus>;
    fn remove_alias(&self, app: &TestApp, alias: &str) -> Result<RemoteStatus>;
    fn update_namespace(&self, app: &TestApp, namespace: &str) -> Result<RemoteStatus>;
    /// Save a snapshot of `app` to `path`.
    fn snapshot(&self, app: &TestApp, path: &Path) -> Result<RemoteStatus>;
    fn restore(&self, app: &TestApp, path: &Path) -> Result<RemoteStatus>;
    fn tidy(&self, app: &TestApp) -> Result<RemoteStatus>;
    fn reload(&self, app: &TestApp) -> Result<RemoteStatus>;
    /// Commit and push a content change from the app's local checkout.
    fn deploy(&self, app: &TestApp, change: &DeployChange) -> Result<RemoteStatus>;
}

/// Where a client writes per-step output for later diagnosis.
pub fn step_log_path(log_dir: &Path, app: &TestApp, step: &str) -> PathBuf {
    log_dir.join(app.log_name(step))
}
