//! DHCP packet capture.
//!
//! A capture session is a stream of text lines plus, for subprocess-backed
//! captures, the child process that produces them. Terminating the session
//! kills and reaps the child.

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use corral_core::MacAddress;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::{AdapterError, Result};

/// A live capture: a line stream and the process behind it.
pub struct CaptureSession {
    lines: BoxStream<'static, io::Result<String>>,
    child: Option<Child>,
}

impl CaptureSession {
    /// A session reading from a child process.
    #[must_use]
    pub fn new(lines: BoxStream<'static, io::Result<String>>, child: Child) -> Self {
        Self {
            lines,
            child: Some(child),
        }
    }

    /// A session over an in-memory line source.
    #[must_use]
    pub fn from_lines(lines: BoxStream<'static, io::Result<String>>) -> Self {
        Self { lines, child: None }
    }

    /// Wait for the next line. `None` means the capture output closed.
    pub async fn next_line(&mut self) -> Option<io::Result<String>> {
        self.lines.next().await
    }

    /// Forcibly stop the capture and reap the process.
    pub async fn terminate(mut self) {
        if let Some(mut child) = self.child.take() {
            let pid = child.id();
            if let Err(e) = child.kill().await {
                warn!(pid = ?pid, error = %e, "failed to kill capture process");
            } else {
                debug!(pid = ?pid, "capture process terminated");
            }
        }
    }
}

/// Opens DHCP captures on a network device.
#[async_trait]
pub trait PacketCapture: Send + Sync {
    /// Start capturing DHCP traffic on `device`.
    ///
    /// # Errors
    ///
    /// Returns an error if the capture cannot be started.
    async fn open(&self, device: &str) -> Result<CaptureSession>;
}

/// Captures DHCP requests with `tcpdump`.
#[derive(Debug, Clone)]
pub struct TcpdumpCapture {
    program: String,
}

impl TcpdumpCapture {
    /// Create a capture running `program` (normally `tcpdump`).
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The command line arguments used for a device.
    #[must_use]
    pub fn args(device: &str) -> Vec<String> {
        ["-i", device, "-lne", "port", "67", "or", "port", "68"]
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

#[async_trait]
impl PacketCapture for TcpdumpCapture {
    async fn open(&self, device: &str) -> Result<CaptureSession> {
        let mut child = Command::new(&self.program)
            .args(Self::args(device))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            AdapterError::OperationFailed("capture process has no stdout".to_string())
        })?;

        let reader = BufReader::new(stdout).lines();
        let lines = stream::unfold(reader, |mut reader| async move {
            match reader.next_line().await {
                Ok(Some(line)) => Some((Ok(line), reader)),
                Ok(None) => None,
                Err(e) => Some((Err(e), reader)),
            }
        })
        .boxed();

        debug!(program = %self.program, device, pid = ?child.id(), "capture started");
        Ok(CaptureSession::new(lines, child))
    }
}

/// Extract the client MAC address from a capture line.
///
/// Takes the first colon-separated MAC token that is not the broadcast
/// address.
#[must_use]
pub fn mac_from_capture_line(line: &str) -> Option<MacAddress> {
    line.split_whitespace()
        .map(|token| token.trim_end_matches(','))
        .filter(|token| token.contains(':'))
        .filter_map(|token| token.parse::<MacAddress>().ok())
        .find(|mac| !mac.is_broadcast())
}
