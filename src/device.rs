//! Device presence probe and port forwarding

use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::{RelayError, Result};

/// External device the relay is gated on.
///
/// All methods are best effort. `probe` folds every failure into "not
/// present"; the others log and return.
#[async_trait::async_trait]
pub trait DeviceBridge: Send + 'static {
    /// Whether the device is currently attached and usable.
    async fn probe(&mut self) -> bool;

    /// Map local TCP `local_port` to `remote_port` on the device.
    async fn forward_port(&mut self, local_port: u16, remote_port: u16);

    /// Reset the bridge (e.g. restart the adb server). No-op by default.
    async fn restart_server(&mut self) {}
}

/// [`DeviceBridge`] backed by the `adb` command line tool.
#[derive(Debug, Clone)]
pub struct AdbBridge {
    program: String,
    reported_missing: bool,
}

impl Default for AdbBridge {
    fn default() -> Self {
        Self::new("adb")
    }
}

impl AdbBridge {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), reported_missing: false }
    }

    /// Output of `adb get-state`, trimmed. `"device"` means attached.
    pub async fn get_state(&self) -> Result<String> {
        let output = self.run(&["get-state"]).await?;
        if !output.status.success() {
            return Err(RelayError::probe_failed(format!(
                "{} get-state exited with {}",
                self.program, output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                RelayError::probe_failed_with_source(format!("cannot run {}", self.program), e)
            })
    }

    async fn run_logged(&self, args: &[&str]) -> bool {
        match self.run(args).await {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                warn!(command = ?args, status = %output.status, "{} command failed", self.program);
                false
            }
            Err(e) => {
                warn!(command = ?args, "{}", e);
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl DeviceBridge for AdbBridge {
    async fn probe(&mut self) -> bool {
        match self.get_state().await {
            Ok(state) => {
                self.reported_missing = false;
                debug!(state = %state, "adb get-state");
                state == "device"
            }
            Err(RelayError::Probe { source: Some(source), .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                if !self.reported_missing {
                    error!(
                        program = %self.program,
                        "adb binary not found. Ensure 'adb' is installed and in your PATH"
                    );
                    self.reported_missing = true;
                }
                false
            }
            Err(e) => {
                debug!("Probe reports no device: {}", e);
                false
            }
        }
    }

    async fn forward_port(&mut self, local_port: u16, remote_port: u16) {
        let local = format!("tcp:{local_port}");
        let remote = format!("tcp:{remote_port}");
        if self.run_logged(&["forward", &local, &remote]).await {
            info!("Forwarded {} → {}", local, remote);
        }
    }

    async fn restart_server(&mut self) {
        self.run_logged(&["kill-server"]).await;
        if self.run_logged(&["start-server"]).await {
            info!("ADB server restarted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_probes_as_disconnected() {
        let mut bridge = AdbBridge::new("definitely-not-an-adb-binary-7f3a");
        assert!(!bridge.probe().await);
        assert!(bridge.reported_missing);

        let err = bridge.get_state().await.unwrap_err();
        assert!(matches!(err, RelayError::Probe { source: Some(_), .. }));
    }

    #[tokio::test]
    async fn missing_binary_forward_does_not_fail() {
        let mut bridge = AdbBridge::new("definitely-not-an-adb-binary-7f3a");
        bridge.forward_port(9999, 9999).await;
        bridge.restart_server().await;
    }
}
