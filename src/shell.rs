//! Running commands on (or against) platform nodes.
use anyhow::{Context, Result};
use std::process::Command;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutput {
    pub code: i32,
    pub stdout: String,
}

pub trait ShellExecutor {
    fn run(&self, program: &str, args: &[String]) -> Result<ShellOutput>;
}

pub struct ProcessShell;

impl ShellExecutor for ProcessShell {
    fn run(&self, program: &str, args: &[String]) -> Result<ShellOutput> {
        tracing::info!(program, args = ?args, "executing command");
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("run {program}"))?;
        Ok(ShellOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}
