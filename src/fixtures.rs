//! On-disk records of applications created by earlier harness runs.
//!
//! Every app the harness touches is written to `<state>/apps/<name>.json`.
//! Discovery reads the same records back, which is how "an existing
//! application" scenarios find something to adopt.
use crate::app::TestApp;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const BATCH_SCHEMA_VERSION: u32 = 1;

pub trait FixtureDiscovery {
    fn find_on_fs(&self) -> Result<Vec<TestApp>>;
}

#[derive(Debug, Serialize, Deserialize)]
struct BatchRecord {
    schema_version: u32,
    apps: Vec<String>,
}

pub struct AppStore {
    root: PathBuf,
}

impl AppStore {
    pub fn new(state_dir: &Path) -> Self {
        AppStore {
            root: state_dir.to_path_buf(),
        }
    }

    fn apps_dir(&self) -> PathBuf {
        self.root.join("apps")
    }

    fn app_path(&self, name: &str) -> PathBuf {
        self.apps_dir().join(format!("{name}.json"))
    }

    fn batch_path(&self) -> PathBuf {
        self.root.join("batch.json")
    }

    pub fn save(&self, app: &TestApp) -> Result<()> {
        let dir = self.apps_dir();
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        let path = self.app_path(&app.name);
        let text = serde_json::to_string_pretty(app).context("serialize app record")?;
        fs::write(&path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn load(&self, name: &str) -> Result<TestApp> {
        let path = self.app_path(name);
        if !path.is_file() {
            return Err(anyhow!("no recorded application named {name:?}"));
        }
        read_app(&path)
    }

    pub fn list(&self) -> Result<Vec<TestApp>> {
        let dir = self.apps_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("read {}", dir.display()))? {
            let path = entry.context("read app dir entry")?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();
        paths.iter().map(|path| read_app(path)).collect()
    }

    /// Remember which apps make up the current batch.
    pub fn save_batch(&self, names: &[String]) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("create {}", self.root.display()))?;
        let record = BatchRecord {
            schema_version: BATCH_SCHEMA_VERSION,
            apps: names.to_vec(),
        };
        let path = self.batch_path();
        let text = serde_json::to_string_pretty(&record).context("serialize batch record")?;
        fs::write(&path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn load_batch(&self) -> Result<Vec<TestApp>> {
        let path = self.batch_path();
        let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        let record: BatchRecord = serde_json::from_slice(&bytes).context("parse batch record")?;
        if record.schema_version != BATCH_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported batch schema_version {}",
                record.schema_version
            ));
        }
        record.apps.iter().map(|name| self.load(name)).collect()
    }
}

impl FixtureDiscovery for AppStore {
    fn find_on_fs(&self) -> Result<Vec<TestApp>> {
        self.list()
    }
}

fn read_app(path: &Path) -> Result<TestApp> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse app record {}", path.display()))
}
