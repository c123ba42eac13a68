//! Test application model.
//!
//! A `TestApp` is a plain record of one hosted application under test. It
//! carries identity, credentials and the last observed lifecycle state; the
//! derivations here are pure so orchestrators can reason about an app without
//! touching the network.
use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Longest type prefix kept in a generated name.
const MAX_TYPE_PREFIX: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppState {
    Unregistered,
    DomainPending,
    DomainReady,
    AppPending,
    Live,
    Stopped,
    Aliased,
    Snapshotted,
    Restoring,
    Destroyed,
}

impl AppState {
    pub fn as_str(self) -> &'static str {
        match self {
            AppState::Unregistered => "unregistered",
            AppState::DomainPending => "domain-pending",
            AppState::DomainReady => "domain-ready",
            AppState::AppPending => "app-pending",
            AppState::Live => "live",
            AppState::Stopped => "stopped",
            AppState::Aliased => "aliased",
            AppState::Snapshotted => "snapshotted",
            AppState::Restoring => "restoring",
            AppState::Destroyed => "destroyed",
        }
    }
}

impl std::fmt::Display for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestApp {
    pub name: String,
    #[serde(rename = "type")]
    pub app_type: String,
    #[serde(default)]
    pub embedded: BTreeSet<String>,
    /// Connection parameters reported when a cartridge was embedded.
    #[serde(default)]
    pub cartridge_params: BTreeMap<String, BTreeMap<String, String>>,
    pub login: String,
    pub password: String,
    /// Host suffix the platform serves apps under.
    pub domain: String,
    pub namespace: String,
    #[serde(default)]
    pub uid: Option<String>,
    pub state: AppState,
    /// The alias is registered on the platform, whatever the run state.
    #[serde(default)]
    pub aliased: bool,
    #[serde(default)]
    pub scalable: bool,
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
    #[serde(default)]
    pub create_domain_code: Option<i32>,
    #[serde(default)]
    pub create_app_code: Option<i32>,
    #[serde(default)]
    pub repo: Option<PathBuf>,
    #[serde(default)]
    pub jenkins_url: Option<String>,
}

impl TestApp {
    /// Allocate a fresh identity for `app_type` with nothing embedded.
    pub fn create_unique(
        app_type: &str,
        scalable: bool,
        config: &HarnessConfig,
        names: &mut NameAllocator,
    ) -> TestApp {
        let (name, namespace) = names.allocate(app_type);
        TestApp {
            login: format!("paas-accept+{namespace}@example.com"),
            password: config.default_password.clone(),
            repo: Some(config.repo_dir.join(&name)),
            name,
            app_type: app_type.to_string(),
            embedded: BTreeSet::new(),
            cartridge_params: BTreeMap::new(),
            domain: config.app_domain.clone(),
            namespace,
            uid: None,
            state: AppState::Unregistered,
            aliased: false,
            scalable,
            snapshot: None,
            create_domain_code: None,
            create_app_code: None,
            jenkins_url: None,
        }
    }

    /// Pick the first discovered app of `app_type` whose embedded set equals `embed`.
    ///
    /// No match is a fatal precondition failure; adoption is never retried.
    pub fn adopt(
        candidates: Vec<TestApp>,
        app_type: &str,
        embed: &BTreeSet<String>,
    ) -> HarnessResult<TestApp> {
        candidates
            .into_iter()
            .find(|app| app.matches_fixture(app_type, embed))
            .ok_or_else(|| {
                let wanted = if embed.is_empty() {
                    "no embedded cartridges".to_string()
                } else {
                    format!(
                        "embedded {}",
                        embed.iter().cloned().collect::<Vec<_>>().join(",")
                    )
                };
                HarnessError::precondition(
                    "adopt",
                    app_type,
                    format!("no existing {app_type} application with {wanted}"),
                )
            })
    }

    pub fn matches_fixture(&self, app_type: &str, embed: &BTreeSet<String>) -> bool {
        self.app_type == app_type && &self.embedded == embed && self.state != AppState::Destroyed
    }

    pub fn hostname(&self) -> String {
        format!("{}-{}.{}", self.name, self.namespace, self.domain)
    }

    pub fn alias_hostname(&self, alias_domain: &str) -> String {
        format!("{}-{}.{}", self.name, self.namespace, alias_domain)
    }

    pub fn has_credentials(&self) -> bool {
        !self.login.trim().is_empty() && !self.password.is_empty()
    }

    /// State an app returns to once it is serving again.
    pub fn serving_state(&self) -> AppState {
        if self.aliased {
            AppState::Aliased
        } else {
            AppState::Live
        }
    }

    pub fn is_live(&self) -> bool {
        self.create_domain_code == Some(0) && self.create_app_code == Some(0)
    }

    /// Params of the first embedded cartridge whose name starts with `family`.
    pub fn cartridge_params_for(&self, family: &str) -> Option<&BTreeMap<String, String>> {
        self.cartridge_params
            .iter()
            .find(|(cartridge, _)| cartridge.starts_with(family))
            .map(|(_, params)| params)
    }

    /// Name used for log files of a given step.
    pub fn log_name(&self, step: &str) -> String {
        format!("{}-{step}.log", self.name)
    }
}

/// Hands out run-unique app names and namespaces.
#[derive(Debug)]
pub struct NameAllocator {
    seed: String,
    next: u32,
    taken: BTreeSet<String>,
}

impl NameAllocator {
    pub fn new(seed: u64) -> Self {
        NameAllocator {
            seed: format!("{:x}", seed & 0xff_ffff),
            next: 0,
            taken: BTreeSet::new(),
        }
    }

    /// Seed from the wall clock and pid so concurrent runs diverge.
    pub fn from_clock() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| u64::from(elapsed.subsec_nanos()) ^ elapsed.as_secs())
            .unwrap_or(0);
        Self::new(nanos ^ u64::from(std::process::id()))
    }

    /// Mark names already in use (e.g. from the fixture store) as taken.
    pub fn reserve<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.taken.extend(names.into_iter().map(Into::into));
    }

    fn allocate(&mut self, app_type: &str) -> (String, String) {
        let mut prefix: String = app_type
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric())
            .map(|ch| ch.to_ascii_lowercase())
            .take(MAX_TYPE_PREFIX)
            .collect();
        if prefix.is_empty() {
            prefix.push_str("app");
        }
        loop {
            self.next += 1;
            let suffix = format!("{}{}", self.seed, self.next);
            let name = format!("{prefix}{suffix}");
            if self.taken.insert(name.clone()) {
                return (name, format!("ns{suffix}"));
            }
        }
    }
}
