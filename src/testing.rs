//! In-memory collaborators for orchestrator tests.
use crate::app::TestApp;
use crate::archive::ArchiveLister;
use crate::remote::{DeployChange, RemoteClient, RemoteStatus};
use anyhow::Result;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

struct Failure {
    op: &'static str,
    nth: Option<usize>,
    code: i32,
}

#[derive(Default)]
struct RemoteLog {
    ops: Vec<&'static str>,
    apps: Vec<(&'static str, String)>,
    alias: Option<String>,
    restore: Option<PathBuf>,
    deploy: Option<DeployChange>,
}

/// Records every call and answers with scripted exit codes (0 by default).
pub struct FakeRemote {
    log: Mutex<RemoteLog>,
    failures: Mutex<Vec<Failure>>,
    uid: Mutex<Option<String>>,
    params: Mutex<BTreeMap<String, String>>,
    snapshot_bytes: Mutex<Option<Vec<u8>>>,
}

impl Default for FakeRemote {
    fn default() -> Self {
        FakeRemote {
            log: Mutex::new(RemoteLog::default()),
            failures: Mutex::new(Vec::new()),
            uid: Mutex::new(None),
            params: Mutex::new(BTreeMap::new()),
            snapshot_bytes: Mutex::new(Some(b"snapshot-bytes".to_vec())),
        }
    }
}

impl FakeRemote {
    /// Every call of `op` exits with `code`.
    pub fn fail(&self, op: &'static str, code: i32) {
        self.failures.lock().unwrap().push(Failure {
            op,
            nth: None,
            code,
        });
    }

    /// Only the `nth` (1-based) call of `op` exits with `code`.
    pub fn fail_nth(&self, op: &'static str, nth: usize, code: i32) {
        self.failures.lock().unwrap().push(Failure {
            op,
            nth: Some(nth),
            code,
        });
    }

    pub fn set_uid(&self, uid: &str) {
        *self.uid.lock().unwrap() = Some(uid.to_string());
    }

    pub fn set_params(&self, params: BTreeMap<String, String>) {
        *self.params.lock().unwrap() = params;
    }

    /// Bytes written by `snapshot`; `None` writes nothing.
    pub fn set_snapshot_bytes(&self, bytes: Option<Vec<u8>>) {
        *self.snapshot_bytes.lock().unwrap() = bytes;
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().ops.clone()
    }

    /// App names that `op` was invoked for, in call order.
    pub fn apps_for(&self, op: &str) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .apps
            .iter()
            .filter(|(logged, _)| *logged == op)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn last_alias(&self) -> Option<String> {
        self.log.lock().unwrap().alias.clone()
    }

    pub fn last_restore(&self) -> Option<PathBuf> {
        self.log.lock().unwrap().restore.clone()
    }

    pub fn last_deploy(&self) -> Option<DeployChange> {
        self.log.lock().unwrap().deploy.clone()
    }

    fn answer(&self, op: &'static str, app: Option<&TestApp>) -> RemoteStatus {
        let count = {
            let mut log = self.log.lock().unwrap();
            log.ops.push(op);
            if let Some(app) = app {
                log.apps.push((op, app.name.clone()));
            }
            log.ops.iter().filter(|logged| **logged == op).count()
        };
        let failures = self.failures.lock().unwrap();
        let code = failures
            .iter()
            .find(|failure| {
                failure.op == op && (failure.nth.is_none() || failure.nth == Some(count))
            })
            .map_or(0, |failure| failure.code);
        RemoteStatus {
            code,
            uid: self.uid.lock().unwrap().clone(),
            params: self.params.lock().unwrap().clone(),
        }
    }
}

impl RemoteClient for FakeRemote {
    fn register_user(&self, _login: &str, _password: &str) -> Result<RemoteStatus> {
        Ok(self.answer("register_user", None))
    }

    fn create_domain(&self, app: &TestApp) -> Result<RemoteStatus> {
        Ok(self.answer("create_domain", Some(app)))
    }

    fn create_app(
        &self,
        app: &TestApp,
        _scalable: bool,
        _extra_flags: &[String],
    ) -> Result<RemoteStatus> {
        Ok(self.answer("create_app", Some(app)))
    }

    fn embed_cartridge(&self, app: &TestApp, _cartridge: &str) -> Result<RemoteStatus> {
        Ok(self.answer("embed_cartridge", Some(app)))
    }

    fn remove_cartridge(&self, app: &TestApp, _cartridge: &str) -> Result<RemoteStatus> {
        Ok(self.answer("remove_cartridge", Some(app)))
    }

    fn start(&self, app: &TestApp) -> Result<RemoteStatus> {
        Ok(self.answer("start", Some(app)))
    }

    fn stop(&self, app: &TestApp) -> Result<RemoteStatus> {
        Ok(self.answer("stop", Some(app)))
    }

    fn restart(&self, app: &TestApp) -> Result<RemoteStatus> {
        Ok(self.answer("restart", Some(app)))
    }

    fn destroy(&self, app: &TestApp) -> Result<RemoteStatus> {
        Ok(self.answer("destroy", Some(app)))
    }

    fn add_alias(&self, app: &TestApp, alias: &str) -> Result<RemoteStatus> {
        self.log.lock().unwrap().alias = Some(alias.to_string());
        Ok(self.answer("add_alias", Some(app)))
    }

    fn remove_alias(&self, app: &TestApp, _alias: &str) -> Result<RemoteStatus> {
        Ok(self.answer("remove_alias", Some(app)))
    }

    fn update_namespace(&self, app: &TestApp, _namespace: &str) -> Result<RemoteStatus> {
        Ok(self.answer("update_namespace", Some(app)))
    }

    fn snapshot(&self, app: &TestApp, path: &Path) -> Result<RemoteStatus> {
        let status = self.answer("snapshot", Some(app));
        if status.success() {
            match self.snapshot_bytes.lock().unwrap().as_ref() {
                Some(bytes) => fs::write(path, bytes)?,
                None => {
                    let _ = fs::remove_file(path);
                }
            }
        }
        Ok(status)
    }

    fn restore(&self, app: &TestApp, path: &Path) -> Result<RemoteStatus> {
        self.log.lock().unwrap().restore = Some(path.to_path_buf());
        Ok(self.answer("restore", Some(app)))
    }

    fn tidy(&self, app: &TestApp) -> Result<RemoteStatus> {
        Ok(self.answer("tidy", Some(app)))
    }

    fn reload(&self, app: &TestApp) -> Result<RemoteStatus> {
        Ok(self.answer("reload", Some(app)))
    }

    fn deploy(&self, app: &TestApp, change: &DeployChange) -> Result<RemoteStatus> {
        self.log.lock().unwrap().deploy = Some(change.clone());
        Ok(self.answer("deploy", Some(app)))
    }
}

/// Returns a fixed member listing for any archive.
pub struct FakeLister {
    members: Vec<String>,
}

impl FakeLister {
    pub fn new(members: &[&str]) -> Self {
        FakeLister {
            members: members.iter().map(|member| member.to_string()).collect(),
        }
    }

    pub fn portable() -> Self {
        Self::new(&["./", "./gear/app-root/runtime/", "./gear/app-root/runtime/repo/"])
    }
}

impl ArchiveLister for FakeLister {
    fn list_members(&self, _archive: &Path) -> Result<Vec<String>> {
        Ok(self.members.clone())
    }
}
