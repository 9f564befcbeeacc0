//! Site hook script invocation.
//!
//! The bare-metal adapter has no power control of its own; power and
//! provisioning actions are delegated to an optional site script called as
//! `<script> <action> [args...] <node1,node2,...>`. Failures are logged and
//! otherwise ignored.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

/// Runs the configured hook script, if any.
#[derive(Debug, Clone, Default)]
pub struct HookRunner {
    script: Option<PathBuf>,
}

impl HookRunner {
    /// Create a runner for an optional script.
    #[must_use]
    pub fn new(script: Option<PathBuf>) -> Self {
        Self { script }
    }

    /// Returns true if a script is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.script.is_some()
    }

    /// Run `action` for the given nodes.
    pub async fn run(&self, action: &str, args: &[&str], nodes: &[&str]) {
        let Some(script) = &self.script else {
            return;
        };
        if nodes.is_empty() {
            return;
        }

        let node_list = nodes.join(",");
        debug!(script = %script.display(), action, ?args, nodes = %node_list, "running hook");

        let status = Command::new(script)
            .arg(action)
            .args(args)
            .arg(&node_list)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => {}
            Ok(status) => {
                warn!(action, nodes = %node_list, %status, "hook script failed");
            }
            Err(e) => {
                warn!(action, nodes = %node_list, error = %e, "hook script could not be run");
            }
        }
    }
}
