use crate::address::probe_host;
use anyhow::{Context, Result};
use pingwatch_model::{ProbeFailure, ProbeResult};
use process_control::{ChildExt, Control, Output};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::debug;

/// Something that can measure one echo round-trip to an address.
///
/// Implementations must return within roughly `timeout`, whatever the
/// underlying mechanism does.
pub trait ProbeRunner: Send + Sync {
    fn probe(&self, address: &str, timeout: Duration) -> ProbeResult;
}

#[derive(Debug, Clone)]
pub struct PingSettings {
    pub program: String,
}

impl Default for PingSettings {
    fn default() -> Self {
        Self {
            program: "ping".to_string(),
        }
    }
}

/// Probes by running the system `ping` binary once per call.
#[derive(Debug, Clone, Default)]
pub struct SystemPingRunner {
    settings: PingSettings,
}

impl SystemPingRunner {
    pub fn new(settings: PingSettings) -> Self {
        Self { settings }
    }
}

impl ProbeRunner for SystemPingRunner {
    fn probe(&self, address: &str, timeout: Duration) -> ProbeResult {
        let host = match probe_host(address) {
            Ok(host) => host,
            Err(err) => return ProbeResult::failed(ProbeFailure::Transport(err.to_string())),
        };

        match run_ping(&self.settings, &host, timeout) {
            Ok(Some(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                if output.status.success() {
                    ProbeResult::replied(stdout)
                } else {
                    let status = output.status.code().and_then(|code| i32::try_from(code).ok());
                    debug!(%host, ?status, "ping exited without reply");
                    ProbeResult::failed(ProbeFailure::NoReply { status }).with_raw_output(stdout)
                }
            }
            Ok(None) => {
                debug!(%host, ?timeout, "ping terminated after timeout");
                ProbeResult::timed_out()
            }
            Err(err) => ProbeResult::failed(ProbeFailure::Transport(format!("{err:#}"))),
        }
    }
}

/// Run a single ping against an already validated host.
///
/// Returns `Ok(None)` when `timeout` elapsed; the child has been terminated
/// and reaped by then.
pub fn run_ping(settings: &PingSettings, host: &str, timeout: Duration) -> Result<Option<Output>> {
    let child = Command::new(&settings.program)
        .args(ping_args(host, timeout))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn {} for {host}", settings.program))?;

    child
        .controlled_with_output()
        .time_limit(timeout)
        .terminate_for_timeout()
        .wait()
        .with_context(|| format!("failed to wait for {} on {host}", settings.program))
}

/// Argument vector for one echo request, in the dialect of the host OS.
pub fn ping_args(host: &str, timeout: Duration) -> Vec<String> {
    let timeout_ms = timeout.as_millis().max(1);

    if cfg!(target_os = "windows") {
        vec![
            "-n".to_string(),
            "1".to_string(),
            "-w".to_string(),
            timeout_ms.to_string(),
            host.to_string(),
        ]
    } else if cfg!(target_os = "macos") {
        vec![
            "-n".to_string(),
            "-c".to_string(),
            "1".to_string(),
            "-W".to_string(),
            timeout_ms.to_string(),
            host.to_string(),
        ]
    } else {
        let timeout_secs = ((timeout_ms + 999) / 1000).max(1);
        vec![
            "-n".to_string(),
            "-c".to_string(),
            "1".to_string(),
            "-W".to_string(),
            timeout_secs.to_string(),
            host.to_string(),
        ]
    }
}
