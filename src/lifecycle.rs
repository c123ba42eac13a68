//! Single-application lifecycle orchestration.
//!
//! Each operation checks the app's state against the lifecycle state machine,
//! makes exactly one remote call (no retries), records what it observed on the
//! app and fails fast with the operation, app and exit code on any non-zero
//! status:
//!
//! ```text
//! unregistered -> domain-pending -> domain-ready -> app-pending -> live
//! live <-> stopped, live <-> aliased, live -> snapshotted,
//! live -> restoring -> live, live|stopped -> destroyed
//! ```
use crate::app::{AppState, TestApp};
use crate::archive::ArchiveLister;
use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::hooks::HookRegistry;
use crate::remote::{DeployChange, RemoteClient, RemoteStatus};
use crate::snapshot;
use std::fs;
use std::path::{Path, PathBuf};

/// States in which the app has been created and is expected to serve.
const RUNNING: &[AppState] = &[AppState::Live, AppState::Aliased, AppState::Snapshotted];
const CREATED: &[AppState] = &[
    AppState::Live,
    AppState::Aliased,
    AppState::Snapshotted,
    AppState::Stopped,
];

pub struct Lifecycle<'a> {
    config: &'a HarnessConfig,
    remote: &'a dyn RemoteClient,
    lister: &'a dyn ArchiveLister,
    hooks: &'a HookRegistry,
}

impl<'a> Lifecycle<'a> {
    pub fn new(
        config: &'a HarnessConfig,
        remote: &'a dyn RemoteClient,
        lister: &'a dyn ArchiveLister,
        hooks: &'a HookRegistry,
    ) -> Self {
        Lifecycle {
            config,
            remote,
            lister,
            hooks,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        self.config
    }

    pub fn register_user(&self, app: &TestApp) -> HarnessResult<()> {
        if !self.config.registration_required {
            return Ok(());
        }
        require_credentials("register-user", app)?;
        let status = self.invoke("register-user", app, || {
            self.remote.register_user(&app.login, &app.password)
        })?;
        check("register-user", app, &status)
    }

    pub fn create_domain(&self, app: &mut TestApp) -> HarnessResult<()> {
        require_credentials("create-domain", app)?;
        require_state("create-domain", app, &[AppState::Unregistered])?;
        app.state = AppState::DomainPending;
        let status = self.invoke("create-domain", app, || self.remote.create_domain(app))?;
        app.create_domain_code = Some(status.code);
        check("create-domain", app, &status)?;
        app.state = AppState::DomainReady;
        Ok(())
    }

    /// Create the app in its registered domain.
    ///
    /// On a non-zero code the app stays `app-pending` with the code recorded,
    /// so callers expecting failure can inspect it.
    pub fn create_app(
        &self,
        app: &mut TestApp,
        scalable: bool,
        extra_flags: &[String],
    ) -> HarnessResult<()> {
        require_state("create-app", app, &[AppState::DomainReady])?;
        app.state = AppState::AppPending;
        app.scalable = scalable;
        let status = self.invoke("create-app", app, || {
            self.remote.create_app(app, scalable, extra_flags)
        })?;
        app.create_app_code = Some(status.code);
        check("create-app", app, &status)?;
        if status.uid.is_some() {
            app.uid = status.uid;
        }
        app.state = AppState::Live;
        Ok(())
    }

    /// Register (if configured), create the domain and the app, then run
    /// type-specific hooks.
    pub fn create_new(&self, app: &mut TestApp, scalable: bool) -> HarnessResult<()> {
        self.create_with_flags(app, scalable, &[])
    }

    /// [`Lifecycle::create_new`] passing `extra_flags` through to create-app.
    pub fn create_with_flags(
        &self,
        app: &mut TestApp,
        scalable: bool,
        extra_flags: &[String],
    ) -> HarnessResult<()> {
        self.register_user(app)?;
        self.create_domain(app)?;
        self.create_app(app, scalable, extra_flags)?;
        self.hooks.run(app)
    }

    /// Creation that must be rejected by the platform.
    ///
    /// A successful create-app is the failure here. Domain failures are not
    /// what the scenario is probing and still propagate.
    pub fn create_expecting_failure(&self, app: &mut TestApp, scalable: bool) -> HarnessResult<()> {
        self.register_user(app)?;
        self.create_domain(app)?;
        match self.create_app(app, scalable, &[]) {
            Ok(()) => Err(HarnessError::UnexpectedSuccess {
                app: app.name.clone(),
                uid: app.uid.clone().unwrap_or_else(|| "unknown".to_string()),
            }),
            Err(err) => match err.remote_code() {
                Some(code) => {
                    tracing::info!(app = %app.name, code, "create-app failed as expected");
                    Ok(())
                }
                None => Err(err),
            },
        }
    }

    /// Run type hooks for an app adopted from a previous run.
    pub fn adopted(&self, app: &mut TestApp) -> HarnessResult<()> {
        require_state("adopt", app, CREATED)?;
        if !app.is_live() {
            return Err(HarnessError::precondition(
                "adopt",
                &app.name,
                "application was never created successfully",
            ));
        }
        self.hooks.run(app)
    }

    pub fn embed_cartridge(&self, app: &mut TestApp, cartridge: &str) -> HarnessResult<()> {
        require_state("embed-cartridge", app, RUNNING)?;
        let status = self.invoke("embed-cartridge", app, || {
            self.remote.embed_cartridge(app, cartridge)
        })?;
        check("embed-cartridge", app, &status)?;
        app.embedded.insert(cartridge.to_string());
        if !status.params.is_empty() {
            app.cartridge_params
                .insert(cartridge.to_string(), status.params);
        }
        Ok(())
    }

    pub fn remove_cartridge(&self, app: &mut TestApp, cartridge: &str) -> HarnessResult<()> {
        require_state("remove-cartridge", app, RUNNING)?;
        if !app.embedded.contains(cartridge) {
            return Err(HarnessError::precondition(
                "remove-cartridge",
                &app.name,
                format!("cartridge {cartridge} is not embedded"),
            ));
        }
        let status = self.invoke("remove-cartridge", app, || {
            self.remote.remove_cartridge(app, cartridge)
        })?;
        check("remove-cartridge", app, &status)?;
        app.embedded.remove(cartridge);
        app.cartridge_params.remove(cartridge);
        Ok(())
    }

    pub fn start(&self, app: &mut TestApp) -> HarnessResult<()> {
        require_state("start", app, CREATED)?;
        let status = self.invoke("start", app, || self.remote.start(app))?;
        check("start", app, &status)?;
        if app.state == AppState::Stopped {
            app.state = app.serving_state();
        }
        Ok(())
    }

    pub fn stop(&self, app: &mut TestApp) -> HarnessResult<()> {
        require_state("stop", app, CREATED)?;
        let status = self.invoke("stop", app, || self.remote.stop(app))?;
        check("stop", app, &status)?;
        app.state = AppState::Stopped;
        Ok(())
    }

    pub fn restart(&self, app: &mut TestApp) -> HarnessResult<()> {
        require_state("restart", app, CREATED)?;
        let status = self.invoke("restart", app, || self.remote.restart(app))?;
        check("restart", app, &status)?;
        if app.state == AppState::Stopped {
            app.state = app.serving_state();
        }
        Ok(())
    }

    pub fn destroy(&self, app: &mut TestApp) -> HarnessResult<()> {
        require_state("destroy", app, CREATED)?;
        let status = self.invoke("destroy", app, || self.remote.destroy(app))?;
        check("destroy", app, &status)?;
        app.state = AppState::Destroyed;
        Ok(())
    }

    pub fn alias(&self, app: &mut TestApp) -> HarnessResult<()> {
        require_state("alias", app, &[AppState::Live, AppState::Snapshotted])?;
        let alias = app.alias_hostname(&self.config.alias_domain);
        let status = self.invoke("alias", app, || self.remote.add_alias(app, &alias))?;
        check("alias", app, &status)?;
        app.aliased = true;
        app.state = AppState::Aliased;
        Ok(())
    }

    pub fn unalias(&self, app: &mut TestApp) -> HarnessResult<()> {
        require_state("unalias", app, CREATED)?;
        if !app.aliased {
            return Err(HarnessError::precondition(
                "unalias",
                &app.name,
                "no alias is registered",
            ));
        }
        let alias = app.alias_hostname(&self.config.alias_domain);
        let status = self.invoke("unalias", app, || self.remote.remove_alias(app, &alias))?;
        check("unalias", app, &status)?;
        app.aliased = false;
        if app.state == AppState::Aliased {
            app.state = AppState::Live;
        }
        Ok(())
    }

    pub fn update_namespace(&self, app: &mut TestApp, namespace: &str) -> HarnessResult<()> {
        require_state("update-namespace", app, CREATED)?;
        if namespace.trim().is_empty() || namespace == app.namespace {
            return Err(HarnessError::precondition(
                "update-namespace",
                &app.name,
                format!("new namespace {namespace:?} must differ from {:?}", app.namespace),
            ));
        }
        let status = self.invoke("update-namespace", app, || {
            self.remote.update_namespace(app, namespace)
        })?;
        check("update-namespace", app, &status)?;
        app.namespace = namespace.to_string();
        Ok(())
    }

    pub fn tidy(&self, app: &mut TestApp) -> HarnessResult<()> {
        require_state("tidy", app, CREATED)?;
        let status = self.invoke("tidy", app, || self.remote.tidy(app))?;
        check("tidy", app, &status)
    }

    pub fn reload(&self, app: &mut TestApp) -> HarnessResult<()> {
        require_state("reload", app, CREATED)?;
        let status = self.invoke("reload", app, || self.remote.reload(app))?;
        check("reload", app, &status)
    }

    /// Save a snapshot and bind it to the app. The artifact must exist and be
    /// non-empty afterwards.
    pub fn snapshot(&self, app: &mut TestApp) -> HarnessResult<PathBuf> {
        require_state("snapshot", app, CREATED)?;
        let path = self.config.snapshot_dir.join(format!("{}.tar.gz", app.name));
        fs::create_dir_all(&self.config.snapshot_dir).map_err(|err| {
            HarnessError::collaborator("snapshot", &app.name, anyhow::Error::new(err))
        })?;
        let status = self.invoke("snapshot", app, || self.remote.snapshot(app, &path))?;
        check("snapshot", app, &status)?;
        let size = snapshot::check_artifact(&app.name, &path)?;
        tracing::info!(app = %app.name, path = %path.display(), size, "snapshot saved");
        app.snapshot = Some(path.clone());
        if app.state == AppState::Live {
            app.state = AppState::Snapshotted;
        }
        Ok(path)
    }

    /// Copy the bound snapshot aside so it survives later snapshots.
    pub fn preserve_snapshot(&self, app: &TestApp) -> HarnessResult<PathBuf> {
        let path = bound_snapshot("preserve-snapshot", app)?;
        snapshot::check_artifact(&app.name, path)?;
        snapshot::preserve(path, &self.config.snapshot_dir.join("preserved"))
            .map_err(|err| HarnessError::collaborator("preserve-snapshot", &app.name, err))
    }

    /// Restore from the bound snapshot, or from `from` when given.
    ///
    /// The archive is validated before the remote client is called; an
    /// integrity violation aborts without touching the app.
    pub fn restore(&self, app: &mut TestApp, from: Option<&Path>) -> HarnessResult<()> {
        require_state("restore", app, CREATED)?;
        if let Some(from) = from {
            app.snapshot = Some(from.to_path_buf());
        }
        let path = bound_snapshot("restore", app)?.to_path_buf();
        snapshot::check_artifact(&app.name, &path)?;
        let members = self
            .lister
            .list_members(&path)
            .map_err(|err| HarnessError::collaborator("restore", &app.name, err))?;
        snapshot::validate_members(&app.name, &members)?;

        let prior = app.state;
        app.state = AppState::Restoring;
        let result = self
            .invoke("restore", app, || self.remote.restore(app, &path))
            .and_then(|status| check("restore", app, &status));
        match result {
            Ok(()) => {
                app.state = app.serving_state();
                Ok(())
            }
            Err(err) => {
                app.state = prior;
                Err(err)
            }
        }
    }

    /// Push a content change through the app's checkout.
    pub fn deploy(&self, app: &mut TestApp, change: &DeployChange) -> HarnessResult<()> {
        require_state("deploy", app, RUNNING)?;
        let status = self.invoke("deploy", app, || self.remote.deploy(app, change))?;
        check("deploy", app, &status)
    }

    fn invoke(
        &self,
        op: &'static str,
        app: &TestApp,
        call: impl FnOnce() -> anyhow::Result<RemoteStatus>,
    ) -> HarnessResult<RemoteStatus> {
        tracing::info!(op, app = %app.name, namespace = %app.namespace, "remote call");
        call().map_err(|err| HarnessError::collaborator(op, &app.name, err))
    }
}

fn check(op: &'static str, app: &TestApp, status: &RemoteStatus) -> HarnessResult<()> {
    if status.success() {
        return Ok(());
    }
    tracing::warn!(op, app = %app.name, code = status.code, "remote call failed");
    Err(HarnessError::RemoteFailure {
        op,
        app: app.name.clone(),
        code: status.code,
    })
}

fn require_state(op: &'static str, app: &TestApp, allowed: &[AppState]) -> HarnessResult<()> {
    if app.state == AppState::Destroyed {
        return Err(HarnessError::precondition(
            op,
            &app.name,
            "application has been destroyed",
        ));
    }
    if allowed.contains(&app.state) {
        return Ok(());
    }
    let expected: Vec<&str> = allowed.iter().map(|state| state.as_str()).collect();
    Err(HarnessError::precondition(
        op,
        &app.name,
        format!("state is {}, expected {}", app.state, expected.join("|")),
    ))
}

fn require_credentials(op: &'static str, app: &TestApp) -> HarnessResult<()> {
    if app.has_credentials() {
        return Ok(());
    }
    Err(HarnessError::precondition(
        op,
        &app.name,
        "login and password must be set",
    ))
}

fn bound_snapshot<'t>(op: &'static str, app: &'t TestApp) -> HarnessResult<&'t Path> {
    app.snapshot
        .as_deref()
        .ok_or_else(|| HarnessError::precondition(op, &app.name, "no snapshot bound"))
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
