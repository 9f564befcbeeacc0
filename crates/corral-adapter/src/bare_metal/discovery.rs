//! The DHCP discovery provisioning loop.
//!
//! Discovery is a small state machine driven by a bounded wait on the
//! capture output:
//!
//! ```text
//!   Capturing ──line──▶ Draining ──▶ Capturing
//!       │                   │
//!       ├─ abort flag       └─ count satisfied
//!       ├─ output closed              │
//!       └─ read error                 ▼
//!                  ───────────────▶ Stopped
//! ```
//!
//! The abort flag is only checked when entering `Capturing`, so a
//! cancellation is observed within one poll interval. Per-line failures are
//! logged and the line is skipped. Nodes created before the loop stops stay
//! in the store.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use corral_core::{AddHostSessionId, MacAddress};
use corral_store::{HardwareProfile, Node, SoftwareProfile, Store};
use tracing::{debug, error, info, warn};

use super::boot::{BootConfigWriter, BootEntry};
use super::capture::{mac_from_capture_line, CaptureSession};
use super::hooks::HookRunner;
use crate::node_factory::{create_new_node, NewNode, NodeOptions};
use crate::types::NicDetails;

/// Why the discovery loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The requested number of nodes was created.
    CountSatisfied,
    /// The capture output stream closed.
    CaptureClosed,
    /// The abort flag was set.
    Aborted,
    /// Reading the capture failed.
    Failed,
}

/// State of the discovery loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryState {
    /// Waiting for capture output.
    Capturing,
    /// Processing one captured line.
    Draining(String),
    /// Finished.
    Stopped(StopReason),
}

/// Result of a discovery run.
#[derive(Debug)]
pub struct DiscoveryOutcome {
    /// Nodes created, in discovery order.
    pub nodes: Vec<Node>,
    /// Why the loop stopped.
    pub reason: StopReason,
}

/// Everything a discovery run needs, borrowed for its duration.
pub struct Discovery<'a> {
    /// Store new nodes are persisted to.
    pub store: &'a dyn Store,
    /// Hardware profile of the new nodes.
    pub hardware_profile: &'a HardwareProfile,
    /// Software profile of the new nodes.
    pub software_profile: &'a SoftwareProfile,
    /// Boot configuration writer.
    pub boot: &'a dyn BootConfigWriter,
    /// Hook runner for `pre-add-host`.
    pub hooks: &'a HookRunner,
    /// Node creation options.
    pub options: NodeOptions<'a>,
    /// Batch identifier of the new nodes.
    pub add_host_session: AddHostSessionId,
    /// Tags applied to the new nodes.
    pub tags: BTreeMap<String, String>,
    /// Cancellation flag.
    pub abort: Arc<AtomicBool>,
    /// Upper bound on one wait for capture output.
    pub poll_interval: Duration,
    /// Number of nodes to create; `0` means until aborted.
    pub count: u32,
}

impl Discovery<'_> {
    /// Run the loop over a capture session until it stops.
    ///
    /// The capture is always terminated before returning.
    pub async fn run(self, mut session: CaptureSession) -> DiscoveryOutcome {
        let mut runner = Runner {
            discovery: &self,
            seen: HashSet::new(),
            nodes: Vec::new(),
        };

        if self.count > 0 {
            info!(
                count = self.count,
                hardware_profile = %self.hardware_profile.name,
                "waiting for new nodes"
            );
        } else {
            info!(hardware_profile = %self.hardware_profile.name, "waiting for new nodes until aborted");
        }

        let mut state = DiscoveryState::Capturing;
        let reason = loop {
            state = match state {
                DiscoveryState::Capturing => self.poll(&mut session).await,
                DiscoveryState::Draining(line) => {
                    runner.drain(&line).await;
                    if self.count > 0 && runner.nodes.len() >= self.count as usize {
                        DiscoveryState::Stopped(StopReason::CountSatisfied)
                    } else {
                        DiscoveryState::Capturing
                    }
                }
                DiscoveryState::Stopped(reason) => break reason,
            };
        };

        session.terminate().await;
        debug!(?reason, created = runner.nodes.len(), "discovery stopped");

        DiscoveryOutcome {
            nodes: runner.nodes,
            reason,
        }
    }

    async fn poll(&self, session: &mut CaptureSession) -> DiscoveryState {
        if self.abort.load(Ordering::SeqCst) {
            return DiscoveryState::Stopped(StopReason::Aborted);
        }

        match tokio::time::timeout(self.poll_interval, session.next_line()).await {
            Err(_) => DiscoveryState::Capturing,
            Ok(None) => {
                debug!("DHCP packet capture ended");
                DiscoveryState::Stopped(StopReason::CaptureClosed)
            }
            Ok(Some(Err(e))) => {
                error!(error = %e, "DHCP discovery failed");
                DiscoveryState::Stopped(StopReason::Failed)
            }
            Ok(Some(Ok(line))) => DiscoveryState::Draining(line),
        }
    }
}

/// One NIC per provisioning network of the hardware profile. The
/// discovered MAC lands on the NIC of the network it was captured on.
fn discovered_nics(hardware_profile: &HardwareProfile, mac: MacAddress) -> Vec<NicDetails> {
    hardware_profile
        .provisioning_nics
        .iter()
        .enumerate()
        .map(|(i, nic)| NicDetails {
            mac: (i == 0).then_some(mac),
            ip: None,
            device: Some(nic.device.clone()),
        })
        .collect()
}

struct Runner<'d, 'a> {
    discovery: &'d Discovery<'a>,
    seen: HashSet<MacAddress>,
    nodes: Vec<Node>,
}

impl Runner<'_, '_> {
    fn is_known(&self, mac: &MacAddress) -> bool {
        if self.seen.contains(mac) {
            return true;
        }
        match self.discovery.store.get_node_by_mac(mac) {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!(%mac, error = %e, "MAC lookup failed, ignoring request");
                true
            }
        }
    }

    async fn drain(&mut self, line: &str) {
        let d = self.discovery;

        let Some(mac) = mac_from_capture_line(line) else {
            return;
        };
        if self.is_known(&mac) {
            debug!(%mac, "MAC address is already known");
            return;
        }
        debug!(%mac, "discovered MAC address");

        let request = NewNode {
            name: None,
            nics: discovered_nics(d.hardware_profile, mac),
            add_host_session: Some(d.add_host_session),
            tags: d.tags.clone(),
        };

        let node = match create_new_node(
            d.store,
            &request,
            d.hardware_profile,
            Some(d.software_profile),
            d.options,
        ) {
            Ok(node) => node,
            Err(e) if e.is_duplicate() => {
                debug!(%mac, error = %e, "node already exists");
                return;
            }
            Err(e) => {
                warn!(%mac, error = %e, "failed to create discovered node");
                return;
            }
        };
        self.seen.insert(mac);

        if let Err(e) = d
            .boot
            .write(&node, BootEntry::for_node(&node, &d.software_profile.name))
            .await
        {
            warn!(node = %node.name, error = %e, "failed to write boot configuration");
        }

        let ip = node
            .provisioning_nic()
            .and_then(|nic| nic.ip)
            .map(|ip| ip.to_string());
        info!(node = %node.name, ip = ?ip, %mac, "added node");

        let mut args = vec![
            d.hardware_profile.name.as_str(),
            d.software_profile.name.as_str(),
        ];
        if let Some(ip) = &ip {
            args.push(ip);
        }
        d.hooks.run("pre-add-host", &args, &[&node.name]).await;

        self.nodes.push(node);
    }
}
