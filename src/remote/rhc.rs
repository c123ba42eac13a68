//! Remote client backed by the `rhc` command line tool.
use super::deploy::{apply_to_checkout, index_file, DeployChange};
use super::{step_log_path, RemoteClient, RemoteStatus};
use crate::app::TestApp;
use crate::config::HarnessConfig;
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

pub struct RhcClient {
    program: PathBuf,
    base_args: Vec<String>,
    log_dir: PathBuf,
}

impl RhcClient {
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        let mut argv = shell_words::split(&config.rhc_command).context("parse rhc_command")?;
        if argv.is_empty() {
            return Err(anyhow!("rhc_command is empty"));
        }
        let program = argv.remove(0);
        let program =
            which::which(&program).with_context(|| format!("locate client {program:?}"))?;
        fs::create_dir_all(&config.log_dir)
            .with_context(|| format!("create log dir {}", config.log_dir.display()))?;
        Ok(RhcClient {
            program,
            base_args: argv,
            log_dir: config.log_dir.clone(),
        })
    }

    fn run(&self, app: &TestApp, step: &str, args: &[String]) -> Result<RemoteStatus> {
        let mut command = Command::new(&self.program);
        command.args(&self.base_args).args(args);
        command.args(["-l", app.login.as_str(), "-p", app.password.as_str(), "--noprompt"]);
        tracing::debug!(app = %app.name, step, args = ?args, "invoking client");
        let output = command
            .output()
            .with_context(|| format!("run {} for {step}", self.program.display()))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        append_log(
            &step_log_path(&self.log_dir, app, step),
            &[stdout.as_ref(), stderr.as_ref()],
        )?;
        Ok(RemoteStatus {
            code: output.status.code().unwrap_or(-1),
            uid: parse_uid(&stdout),
            params: parse_cartridge_params(&stdout),
        })
    }

    fn app_args(app: &TestApp, verb: &[&str]) -> Vec<String> {
        let mut args: Vec<String> = verb.iter().map(|part| part.to_string()).collect();
        args.extend(["-a".to_string(), app.name.clone()]);
        args.extend(["-n".to_string(), app.namespace.clone()]);
        args
    }

    fn git(&self, app: &TestApp, repo: &Path, step: &str, args: &[&str]) -> Result<i32> {
        let output = Command::new("git")
            .args(args)
            .current_dir(repo)
            .output()
            .with_context(|| format!("run git {}", args.join(" ")))?;
        append_log(
            &step_log_path(&self.log_dir, app, step),
            &[
                String::from_utf8_lossy(&output.stdout).as_ref(),
                String::from_utf8_lossy(&output.stderr).as_ref(),
            ],
        )?;
        Ok(output.status.code().unwrap_or(-1))
    }
}

impl RemoteClient for RhcClient {
    fn register_user(&self, login: &str, password: &str) -> Result<RemoteStatus> {
        let output = Command::new(&self.program)
            .args(&self.base_args)
            .args(["setup", "-l", login, "-p", password, "--noprompt"])
            .output()
            .with_context(|| format!("run {} setup", self.program.display()))?;
        Ok(RemoteStatus::code(output.status.code().unwrap_or(-1)))
    }

    fn create_domain(&self, app: &TestApp) -> Result<RemoteStatus> {
        let args = vec![
            "domain".to_string(),
            "create".to_string(),
            app.namespace.clone(),
        ];
        self.run(app, "create_domain", &args)
    }

    fn create_app(
        &self,
        app: &TestApp,
        scalable: bool,
        extra_flags: &[String],
    ) -> Result<RemoteStatus> {
        let mut args = vec![
            "app".to_string(),
            "create".to_string(),
            app.name.clone(),
            app.app_type.clone(),
            "-n".to_string(),
            app.namespace.clone(),
        ];
        if scalable {
            args.push("--scaling".to_string());
        }
        match &app.repo {
            Some(repo) => {
                if let Some(parent) = repo.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("create {}", parent.display()))?;
                }
                args.push("--repo".to_string());
                args.push(repo.display().to_string());
            }
            None => args.push("--no-git".to_string()),
        }
        args.extend(extra_flags.iter().cloned());
        self.run(app, "create_app", &args)
    }

    fn embed_cartridge(&self, app: &TestApp, cartridge: &str) -> Result<RemoteStatus> {
        let args = Self::app_args(app, &["cartridge", "add", cartridge]);
        self.run(app, "embed", &args)
    }

    fn remove_cartridge(&self, app: &TestApp, cartridge: &str) -> Result<RemoteStatus> {
        let mut args = Self::app_args(app, &["cartridge", "remove", cartridge]);
        args.push("--confirm".to_string());
        self.run(app, "unembed", &args)
    }

    fn start(&self, app: &TestApp) -> Result<RemoteStatus> {
        self.run(app, "start", &Self::app_args(app, &["app", "start"]))
    }

    fn stop(&self, app: &TestApp) -> Result<RemoteStatus> {
        self.run(app, "stop", &Self::app_args(app, &["app", "stop"]))
    }

    fn restart(&self, app: &TestApp) -> Result<RemoteStatus> {
        self.run(app, "restart", &Self::app_args(app, &["app", "restart"]))
    }

    fn destroy(&self, app: &TestApp) -> Result<RemoteStatus> {
        let mut args = Self::app_args(app, &["app", "delete"]);
        args.push("--confirm".to_string());
        self.run(app, "destroy", &args)
    }

    fn add_alias(&self, app: &TestApp, alias: &str) -> Result<RemoteStatus> {
        let args = Self::app_args(app, &["alias", "add", alias]);
        self.run(app, "alias", &args)
    }

    fn remove_alias(&self, app: &TestApp, alias: &str) -> Result<RemoteStatus> {
        let args = Self::app_args(app, &["alias", "remove", alias]);
        self.run(app, "unalias", &args)
    }

    fn update_namespace(&self, app: &TestApp, namespace: &str) -> Result<RemoteStatus> {
        let args = vec![
            "domain".to_string(),
            "update".to_string(),
            app.namespace.clone(),
            namespace.to_string(),
        ];
        self.run(app, "update_namespace", &args)
    }

    fn snapshot(&self, app: &TestApp, path: &Path) -> Result<RemoteStatus> {
        let mut args = Self::app_args(app, &["snapshot", "save"]);
        args.extend(["--filepath".to_string(), path.display().to_string()]);
        self.run(app, "snapshot", &args)
    }

    fn restore(&self, app: &TestApp, path: &Path) -> Result<RemoteStatus> {
        let mut args = Self::app_args(app, &["snapshot", "restore"]);
        args.extend(["--filepath".to_string(), path.display().to_string()]);
        self.run(app, "restore", &args)
    }

    fn tidy(&self, app: &TestApp) -> Result<RemoteStatus> {
        self.run(app, "tidy", &Self::app_args(app, &["app", "tidy"]))
    }

    fn reload(&self, app: &TestApp) -> Result<RemoteStatus> {
        self.run(app, "reload", &Self::app_args(app, &["app", "reload"]))
    }

    fn deploy(&self, app: &TestApp, change: &DeployChange) -> Result<RemoteStatus> {
        let repo = app
            .repo
            .as_deref()
            .ok_or_else(|| anyhow!("{} has no local checkout", app.name))?;
        let step = change.log_step();
        let mut submodule_dir = None;
        if let DeployChange::Submodule { repo: source } = change {
            let source = source.display().to_string();
            let code = self.git(app, repo, step, &["submodule", "add", source.as_str()])?;
            if code != 0 {
                return Ok(RemoteStatus::code(code));
            }
            let name = Path::new(&source)
                .file_name()
                .ok_or_else(|| anyhow!("submodule path {source:?} has no name"))?;
            submodule_dir = Some(repo.join(name));
        }
        apply_to_checkout(
            repo,
            index_file(&app.app_type),
            change,
            submodule_dir.as_deref(),
        )?;
        let code = self.git(app, repo, step, &["commit", "-a", "-m", change.commit_message()])?;
        if code != 0 {
            return Ok(RemoteStatus::code(code));
        }
        let code = self.git(app, repo, step, &["push"])?;
        Ok(RemoteStatus::code(code))
    }
}

fn append_log(path: &Path, chunks: &[&str]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log {}", path.display()))?;
    for chunk in chunks {
        file.write_all(chunk.as_bytes())
            .with_context(|| format!("write log {}", path.display()))?;
    }
    Ok(())
}

static UID_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)SSH:\s+(?:ssh://)?([0-9A-Za-z]+)@").expect("uid pattern compiles")
});

/// Labels database cartridges print their connection parameters under on add.
static CARTRIDGE_PARAMS: LazyLock<[(&str, Regex); 3]> = LazyLock::new(|| {
    [
        ("USER", r"(?m)^\s*Root User:\s*(\S+)"),
        ("PASSWORD", r"(?m)^\s*Root Password:\s*(\S+)"),
        ("HOSTNAME", r"(?m)^\s*Connection URL:\s*\w+://([^:/\s]+)"),
    ]
    .map(|(key, pattern)| (key, Regex::new(pattern).expect("param pattern compiles")))
});

/// Pull the gear uid out of an `SSH: <uid>@<host>` line.
fn parse_uid(stdout: &str) -> Option<String> {
    UID_LINE
        .captures(stdout)
        .and_then(|caps| caps.get(1))
        .map(|uid| uid.as_str().to_string())
}

fn parse_cartridge_params(stdout: &str) -> BTreeMap<String, String> {
    CARTRIDGE_PARAMS
        .iter()
        .filter_map(|(key, re)| {
            re.captures(stdout)
                .and_then(|caps| caps.get(1))
                .map(|value| (key.to_string(), value.as_str().to_string()))
        })
        .collect()
}
