//! Shared test infrastructure for integration tests.
//!
//! Each test gets its own state dir and a fake `rhc` script that logs its
//! argv, prints what the real client prints for the fields the harness
//! parses and writes a small portable snapshot archive on `snapshot save`.
//! `FAKE_RHC_FAIL` fails calls whose argv starts with it; `FAKE_RHC_FAIL_GLOB`
//! fails calls whose argv matches it as a shell pattern.

use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::thread;
use tempfile::TempDir;

const FAKE_RHC: &str = r#"#!/bin/sh
echo "$*" >> "$FAKE_RHC_LOG"
if [ -n "$FAKE_RHC_FAIL" ]; then
  case "$*" in
    "$FAKE_RHC_FAIL"*) echo "failing $FAKE_RHC_FAIL" >&2; exit 1 ;;
  esac
fi
if [ -n "$FAKE_RHC_FAIL_GLOB" ]; then
  case "$*" in
    $FAKE_RHC_FAIL_GLOB) echo "failing $*" >&2; exit 1 ;;
  esac
fi
case "$1 $2" in
  "app create")
    echo "$3 @ http://$3.example.com/"
    echo "  SSH: 5a1b2c@$3.example.com"
    ;;
  "cartridge add")
    echo "  Root User: admin1"
    echo "  Root Password: pw1"
    echo "  Connection URL: mysql://127.0.0.9:3306/"
    ;;
  "snapshot save")
    prev=""
    for arg in "$@"; do
      if [ "$prev" = "--filepath" ]; then target="$arg"; fi
      prev="$arg"
    done
    work=$(mktemp -d)
    mkdir -p "$work/gear/app-root/runtime/repo"
    echo hello > "$work/gear/app-root/runtime/repo/index.php"
    tar -czf "$target" -C "$work" gear
    rm -rf "$work"
    ;;
esac
exit 0
"#;

pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    /// `None` when the tools the fake client needs are unavailable.
    pub fn new() -> Option<Self> {
        for tool in ["sh", "tar"] {
            if which::which(tool).is_err() {
                eprintln!("Skipping: {tool} not available");
                return None;
            }
        }
        let dir = TempDir::new().expect("create sandbox dir");
        fs::write(dir.path().join("rhc.sh"), FAKE_RHC).expect("write fake rhc");
        Some(Sandbox { dir })
    }

    #[allow(dead_code)]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    #[allow(dead_code)]
    pub fn state_dir(&self) -> PathBuf {
        self.root().join("state")
    }

    /// Every argv the fake client has seen, one line per call.
    pub fn rhc_calls(&self) -> Vec<String> {
        fs::read_to_string(self.root().join("rhc.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn run(&self, args: &[&str]) -> Output {
        self.run_with(args, &[])
    }

    pub fn run_with(&self, args: &[&str], envs: &[(&str, &str)]) -> Output {
        let script = self.root().join("rhc.sh");
        let mut command = Command::new(env!("CARGO_BIN_EXE_paas-accept"));
        command
            .args(args)
            .arg("--state-dir")
            .arg(self.state_dir())
            .env(
                "PAAS_ACCEPT_RHC_COMMAND",
                format!("sh {}", shell_words::quote(&script.display().to_string())),
            )
            .env("FAKE_RHC_LOG", self.root().join("rhc.log"))
            .env_remove("FAKE_RHC_FAIL")
            .env_remove("FAKE_RHC_FAIL_GLOB")
            .env_remove("PAAS_ACCEPT_ALIAS_DOMAIN")
            .env("PAAS_ACCEPT_LOG", "warn");
        for proxy in ["http_proxy", "https_proxy", "all_proxy"] {
            command.env_remove(proxy).env_remove(proxy.to_ascii_uppercase());
        }
        for (key, value) in envs {
            command.env(key, value);
        }
        command.output().expect("run paas-accept")
    }

    /// Run and require success, returning trimmed stdout.
    pub fn ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "{args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    #[allow(dead_code)]
    /// Patch fields of the state dir's config.json.
    pub fn configure(&self, patch: serde_json::Value) {
        self.ok(&["init", "--force"]);
        let path = self.state_dir().join("config.json");
        let text = fs::read_to_string(&path).expect("read config");
        let mut config: serde_json::Value = serde_json::from_str(&text).expect("parse config");
        if let (Some(target), Some(fields)) = (config.as_object_mut(), patch.as_object()) {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }
        fs::write(&path, serde_json::to_string_pretty(&config).expect("serialize config"))
            .expect("write config");
    }

    pub fn show(&self, app: &str) -> serde_json::Value {
        let stdout = self.ok(&["show", "--app", app]);
        serde_json::from_str(&stdout).expect("show prints app JSON")
    }
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Answers every connection with a fixed 200 page.
#[allow(dead_code)]
pub fn serve_ok(body: &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind local server");
    let port = listener.local_addr().expect("local addr").port();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else {
                continue;
            };
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
    port
}

/// Run git in `dir` with a fixed identity, requiring success.
#[allow(dead_code)]
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=paas-accept", "-c", "user.email=paas-accept@example.com"])
        .args(["-c", "protocol.file.allow=always", "-c", "init.defaultBranch=master"])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}
