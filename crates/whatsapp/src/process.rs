//! Lifecycle of the Node.js sidecar process.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use {
    anyhow::{Context, Result, bail},
    tokio::{
        io::{AsyncBufReadExt, BufReader},
        process::{Child, Command},
    },
    tracing::{debug, error, info, warn},
};

use crate::sidecar::DEFAULT_SIDECAR_PORT;

/// Env var naming the sidecar directory.
pub const SIDECAR_DIR_ENV: &str = "COURIER_SIDECAR_DIR";

/// Sidecar location relative to a checkout or install prefix.
const SIDECAR_REL_PATH: &str = "sidecar/whatsapp";

const STOP_GRACE: Duration = Duration::from_secs(5);

/// A running sidecar process.
pub struct SidecarProcess {
    child: Child,
    port: u16,
}

impl SidecarProcess {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// SIGTERM, then kill if the process outlives the grace period.
    pub async fn stop(&mut self) -> Result<()> {
        info!(port = self.port, "stopping whatsapp sidecar");

        #[cfg(unix)]
        {
            use nix::{
                sys::signal::{Signal, kill},
                unistd::Pid,
            };

            if let Some(pid) = self.child.id()
                && let Ok(pid) = i32::try_from(pid)
                && let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM)
            {
                debug!(pid, error = %e, "SIGTERM failed");
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }

        match tokio::time::timeout(STOP_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => info!(?status, "whatsapp sidecar exited"),
            Ok(Err(e)) => warn!(error = %e, "error waiting for whatsapp sidecar"),
            Err(_) => {
                warn!("whatsapp sidecar ignored SIGTERM, killing");
                self.child
                    .kill()
                    .await
                    .context("failed to kill whatsapp sidecar")?;
            },
        }
        Ok(())
    }
}

/// How to launch the sidecar.
#[derive(Debug, Clone)]
pub struct SidecarConfig {
    /// Directory containing the sidecar's `package.json`.
    pub sidecar_dir: PathBuf,
    pub port: u16,
    /// Base directory for per-session credentials.
    pub auth_dir: Option<PathBuf>,
}

impl SidecarConfig {
    pub fn new(sidecar_dir: PathBuf) -> Self {
        Self {
            sidecar_dir,
            port: DEFAULT_SIDECAR_PORT,
            auth_dir: None,
        }
    }
}

fn has_package_json(dir: &Path) -> bool {
    dir.join("package.json").exists()
}

/// Locate the sidecar directory.
///
/// Searches in order:
/// 1. `explicit` when given (no fallback if it is wrong)
/// 2. `$COURIER_SIDECAR_DIR`
/// 3. `../sidecar/whatsapp` and `../../sidecar/whatsapp` next to the executable
/// 4. the same relative paths from the working directory
pub fn find_sidecar_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if has_package_json(path) {
            return Ok(path.to_path_buf());
        }
        bail!("no package.json in sidecar directory {}", path.display());
    }

    if let Ok(dir) = std::env::var(SIDECAR_DIR_ENV) {
        let path = PathBuf::from(&dir);
        if has_package_json(&path) {
            return Ok(path);
        }
        warn!(path = %dir, "{SIDECAR_DIR_ENV} set but package.json not found");
    }

    let mut candidates = Vec::new();
    if let Ok(exe) = std::env::current_exe()
        && let Some(exe_dir) = exe.parent()
    {
        candidates.push(exe_dir.join("..").join(SIDECAR_REL_PATH));
        candidates.push(exe_dir.join("../..").join(SIDECAR_REL_PATH));
    }
    for prefix in [".", "..", "../.."] {
        candidates.push(Path::new(prefix).join(SIDECAR_REL_PATH));
    }

    candidates
        .into_iter()
        .find(|p| has_package_json(p))
        .map(|p| p.canonicalize().unwrap_or(p))
        .with_context(|| {
            format!("whatsapp sidecar not found; set {SIDECAR_DIR_ENV} or create {SIDECAR_REL_PATH}")
        })
}

pub fn is_sidecar_built(sidecar_dir: &Path) -> bool {
    sidecar_dir.join("dist/index.js").exists()
}

/// Build if needed, spawn `node dist/index.js`, and wire its output into tracing.
pub async fn start_sidecar(config: SidecarConfig) -> Result<SidecarProcess> {
    let dir = &config.sidecar_dir;
    if !has_package_json(dir) {
        bail!(
            "whatsapp sidecar not found at {}; run `npm install && npm run build` there",
            dir.display()
        );
    }

    if !is_sidecar_built(dir) {
        info!(path = %dir.display(), "building whatsapp sidecar");
        if !dir.join("node_modules").exists() {
            npm(dir, &["install"]).await?;
        }
        npm(dir, &["run", "build"]).await?;
    }

    info!(path = %dir.display(), port = config.port, "starting whatsapp sidecar");

    let mut cmd = Command::new("node");
    cmd.arg("dist/index.js")
        .current_dir(dir)
        .env("COURIER_WHATSAPP_PORT", config.port.to_string())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(auth_dir) = &config.auth_dir {
        cmd.env("COURIER_WHATSAPP_AUTH_DIR", auth_dir);
    }

    let mut child = cmd.spawn().context("failed to spawn whatsapp sidecar")?;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                forward_log_line(&line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target: "whatsapp_sidecar", "{line}");
            }
        });
    }

    // Give it a moment to fail on startup errors such as a taken port.
    tokio::time::sleep(Duration::from_millis(500)).await;
    if let Some(status) = child
        .try_wait()
        .context("failed to check whatsapp sidecar status")?
    {
        bail!("whatsapp sidecar exited immediately with {status}");
    }

    info!(port = config.port, "whatsapp sidecar started");
    Ok(SidecarProcess {
        child,
        port: config.port,
    })
}

async fn npm(dir: &Path, args: &[&str]) -> Result<()> {
    let rendered = args.join(" ");
    info!(path = %dir.display(), "running npm {rendered}");
    let output = Command::new("npm")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .with_context(|| format!("failed to run npm {rendered}"))?;
    if !output.status.success() {
        bail!(
            "npm {rendered} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}

/// Log severity of one sidecar output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Split a pino JSON line into level and message; plain lines log at info.
fn parse_log_line(line: &str) -> (LogLevel, String) {
    let parsed = line
        .starts_with('{')
        .then(|| serde_json::from_str::<serde_json::Value>(line).ok())
        .flatten();
    let Some(log) = parsed else {
        return (LogLevel::Info, line.to_string());
    };
    let level = match log.get("level").and_then(|v| v.as_u64()).unwrap_or(30) {
        10 | 20 => LogLevel::Debug,
        30 => LogLevel::Info,
        40 => LogLevel::Warn,
        _ => LogLevel::Error,
    };
    let msg = log
        .get("msg")
        .and_then(|v| v.as_str())
        .unwrap_or(line)
        .to_string();
    (level, msg)
}

fn forward_log_line(line: &str) {
    let (level, msg) = parse_log_line(line);
    match level {
        LogLevel::Debug => debug!(target: "whatsapp_sidecar", "{msg}"),
        LogLevel::Info => info!(target: "whatsapp_sidecar", "{msg}"),
        LogLevel::Warn => warn!(target: "whatsapp_sidecar", "{msg}"),
        LogLevel::Error => error!(target: "whatsapp_sidecar", "{msg}"),
    }
}
