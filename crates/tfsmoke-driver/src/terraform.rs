use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tfsmoke_domain::{var_args, EnvOverrides};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::driver::{CommandLog, Provisioner, TerraformOptions};
use crate::error::DriverError;

// ── TerraformRunner ───────────────────────────────────────────────────────────

/// Drives a module through the `terraform` (or `tofu`) binary.
///
/// Commands always run non-interactively: stdin is closed and
/// `TF_IN_AUTOMATION` / `TF_INPUT=0` are set before the caller's env overrides.
/// No retries happen here; a non-zero exit is returned as
/// [`DriverError::CommandFailed`] with the captured log.
#[derive(Debug, Clone)]
pub struct TerraformRunner {
    pub binary: String,
    /// Wall-clock limit per sub-command. `None` leaves cancellation to the tool.
    pub timeout: Option<Duration>,
}

impl Default for TerraformRunner {
    fn default() -> Self {
        Self { binary: "terraform".into(), timeout: None }
    }
}

impl TerraformRunner {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into(), timeout: None }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn init_args() -> Vec<String> {
        ["init", "-upgrade=false", "-input=false", "-no-color"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn apply_args(opts: &TerraformOptions) -> Vec<String> {
        let mut args: Vec<String> = ["apply", "-input=false", "-auto-approve", "-lock=false", "-no-color"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.extend(var_args(&opts.vars));
        args
    }

    fn destroy_args(opts: &TerraformOptions) -> Vec<String> {
        let mut args: Vec<String> = ["destroy", "-input=false", "-auto-approve", "-lock=false", "-no-color"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.extend(var_args(&opts.vars));
        args
    }

    /// Run a sub-command and fail on non-zero exit.
    async fn run_checked(
        &self,
        workdir: &Path,
        args: &[String],
        env: &EnvOverrides,
    ) -> Result<CommandLog, DriverError> {
        let log = self.run_tf(workdir, args, env).await?;
        if !log.succeeded() {
            return Err(DriverError::CommandFailed {
                command: log.command,
                exit_code: log.exit_code,
                log: log.output,
            });
        }
        Ok(log)
    }

    // ── Process execution ─────────────────────────────────────────────────────

    /// Run a sub-command, capturing combined stdout+stderr.
    async fn run_tf(
        &self,
        workdir: &Path,
        args: &[String],
        env: &EnvOverrides,
    ) -> Result<CommandLog, DriverError> {
        let command = format!(
            "{} {}",
            self.binary,
            args.first().map(String::as_str).unwrap_or("")
        );
        info!(binary = %self.binary, ?args, workdir = %workdir.display(), "running IaC command");

        let started_at = Utc::now();
        let mut child = Command::new(&self.binary)
            .args(args)
            .current_dir(workdir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .envs(env)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DriverError::Spawn { binary: self.binary.clone(), source: e })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Internal("child stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DriverError::Internal("child stderr not captured".into()))?;

        // Both streams feed one channel so lines keep their arrival order.
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();

        let tx1 = tx.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = tx1.send(line);
            }
        });

        let tx2 = tx.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = tx2.send(line);
            }
        });

        drop(tx);

        let mut output = String::new();
        let collect = async {
            while let Some(line) = rx.recv().await {
                debug!(target: "tfsmoke::iac", "{}", line);
                output.push_str(&line);
                output.push('\n');
            }
        };
        let timed_out = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, collect).await.is_err(),
            None => {
                collect.await;
                false
            }
        };

        if timed_out {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            return Err(DriverError::TimedOut {
                command,
                secs: self.timeout.map(|t| t.as_secs()).unwrap_or_default(),
            });
        }

        stdout_task.await.ok();
        stderr_task.await.ok();

        let status = child
            .wait()
            .await
            .map_err(|e| DriverError::Internal(format!("wait {}: {}", self.binary, e)))?;

        let exit_code = status.code().unwrap_or(-1);
        if exit_code != 0 {
            warn!(binary = %self.binary, exit_code, "IaC command exited non-zero");
        }

        Ok(CommandLog {
            id: Uuid::new_v4(),
            command,
            started_at,
            finished_at: Utc::now(),
            exit_code,
            output,
        })
    }
}

#[async_trait]
impl Provisioner for TerraformRunner {
    fn name(&self) -> &str {
        &self.binary
    }

    async fn init_and_apply(&self, opts: &TerraformOptions) -> Result<Vec<CommandLog>, DriverError> {
        let init = self.run_checked(&opts.dir, &Self::init_args(), &opts.env).await?;
        let apply = self.run_checked(&opts.dir, &Self::apply_args(opts), &opts.env).await?;
        Ok(vec![init, apply])
    }

    async fn destroy(&self, opts: &TerraformOptions) -> Result<CommandLog, DriverError> {
        self.run_checked(&opts.dir, &Self::destroy_args(opts), &opts.env).await
    }

    async fn outputs(
        &self,
        opts: &TerraformOptions,
    ) -> Result<BTreeMap<String, serde_json::Value>, DriverError> {
        let args: Vec<String> = ["output", "-json", "-no-color"].iter().map(|s| s.to_string()).collect();
        let log = self.run_checked(&opts.dir, &args, &opts.env).await?;
        parse_outputs(&log.output)
    }
}

/// Flatten `terraform output -json` into `name -> value`.
fn parse_outputs(raw: &str) -> Result<BTreeMap<String, serde_json::Value>, DriverError> {
    let doc: BTreeMap<String, serde_json::Value> = serde_json::from_str(raw.trim())
        .map_err(|e| DriverError::Internal(format!("parse terraform output: {}", e)))?;
    Ok(doc
        .into_iter()
        .map(|(name, entry)| {
            let value = entry.get("value").cloned().unwrap_or(serde_json::Value::Null);
            (name, value)
        })
        .collect())
}
