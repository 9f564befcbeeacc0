//! The reference bare-metal resource adapter.
//!
//! Nodes are provisioned either from caller-supplied descriptions
//! (predefined) or by watching DHCP requests on the provisioning network
//! (discovery). Boot behaviour is controlled through PXE configuration files,
//! and power actions are delegated to a site hook script.

pub mod boot;
pub mod capture;
pub mod config;
pub mod discovery;
pub mod hooks;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use corral_core::HardwareProfileId;
use corral_store::{HardwareProfile, Location, Node, NodeState, SoftwareProfile, Store};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::adapter::ResourceAdapter;
use crate::node_factory::{create_new_node, node_name_taken, NewNode, NodeOptions};
use crate::types::{AddNodesRequest, AdapterContext, BootMethod, NodeTransfer};
use crate::{AdapterError, Result};

pub use boot::{BootConfigWriter, BootEntry, PxeBootWriter};
pub use capture::{CaptureSession, PacketCapture, TcpdumpCapture};
pub use config::BareMetalConfig;
pub use discovery::{Discovery, DiscoveryOutcome, StopReason};
pub use hooks::HookRunner;

/// Name the bare-metal adapter registers under.
pub const ADAPTER_NAME: &str = "default";

/// Component an installer's software profile must carry to serve DHCP.
const DHCP_COMPONENT: &str = "dhcpd";

/// Resource adapter for physical nodes on a local provisioning network.
pub struct BareMetalAdapter {
    config: BareMetalConfig,
    boot: Arc<dyn BootConfigWriter>,
    capture: Arc<dyn PacketCapture>,
    hooks: HookRunner,
    discoveries: Mutex<Vec<(HardwareProfileId, Arc<AtomicBool>)>>,
}

/// Removes a discovery's abort flag from the adapter when dropped.
struct ActiveDiscovery<'a> {
    discoveries: &'a Mutex<Vec<(HardwareProfileId, Arc<AtomicBool>)>>,
    flag: Arc<AtomicBool>,
}

impl<'a> ActiveDiscovery<'a> {
    fn register(
        discoveries: &'a Mutex<Vec<(HardwareProfileId, Arc<AtomicBool>)>>,
        hardware_profile: HardwareProfileId,
    ) -> Self {
        let flag = Arc::new(AtomicBool::new(false));
        discoveries.lock().push((hardware_profile, Arc::clone(&flag)));
        Self { discoveries, flag }
    }
}

impl Drop for ActiveDiscovery<'_> {
    fn drop(&mut self) {
        self.discoveries
            .lock()
            .retain(|(_, flag)| !Arc::ptr_eq(flag, &self.flag));
    }
}

impl BareMetalAdapter {
    /// Create an adapter with PXE boot files and `tcpdump` discovery.
    #[must_use]
    pub fn new(config: BareMetalConfig) -> Self {
        let boot = Arc::new(PxeBootWriter::new(config.tftp_root.clone()));
        let capture = Arc::new(TcpdumpCapture::new(config.capture_program.clone()));
        Self::with_backends(config, boot, capture)
    }

    /// Create an adapter with explicit boot and capture backends.
    #[must_use]
    pub fn with_backends(
        config: BareMetalConfig,
        boot: Arc<dyn BootConfigWriter>,
        capture: Arc<dyn PacketCapture>,
    ) -> Self {
        let hooks = HookRunner::new(config.hook_script.clone());
        Self {
            config,
            boot,
            capture,
            hooks,
            discoveries: Mutex::new(Vec::new()),
        }
    }

    /// Get a reference to the adapter config.
    #[must_use]
    pub fn config(&self) -> &BareMetalConfig {
        &self.config
    }

    /// Number of discovery runs currently in progress.
    #[must_use]
    pub fn active_discoveries(&self) -> usize {
        self.discoveries.lock().len()
    }

    /// Number of discovery runs in progress for one hardware profile.
    #[must_use]
    pub fn active_discoveries_for(&self, hardware_profile: &HardwareProfileId) -> usize {
        self.discoveries
            .lock()
            .iter()
            .filter(|(id, _)| id == hardware_profile)
            .count()
    }

    fn node_options(&self) -> NodeOptions<'_> {
        NodeOptions {
            generate_ip: true,
            dns_zone: self.config.dns_zone.as_deref(),
        }
    }

    fn check_installer(&self, store: &dyn Store) -> Result<()> {
        let Some(installer) = &self.config.installer_node else {
            return Ok(());
        };

        let node = store.get_node_by_name(installer)?.ok_or_else(|| {
            AdapterError::CommandFailed(format!("installer node [{installer}] not found"))
        })?;

        let software_profile = match node.software_profile_id {
            Some(id) => store.get_software_profile(&id)?,
            None => None,
        };

        if software_profile.is_some_and(|sw| sw.has_component(DHCP_COMPONENT)) {
            Ok(())
        } else {
            Err(AdapterError::CommandFailed(format!(
                "{DHCP_COMPONENT} component must be enabled on the installer node [{installer}]"
            )))
        }
    }

    async fn add_predefined(
        &self,
        ctx: &AdapterContext<'_>,
        request: &AddNodesRequest,
        hardware_profile: &HardwareProfile,
        software_profile: &SoftwareProfile,
    ) -> Result<Vec<Node>> {
        let mut nodes = Vec::with_capacity(request.node_details.len());

        for details in &request.node_details {
            let new_node = NewNode {
                name: details.name.clone(),
                nics: details.nics.clone(),
                add_host_session: Some(ctx.add_host_session),
                tags: request.tags.clone(),
            };
            let node = create_new_node(
                ctx.store,
                &new_node,
                hardware_profile,
                Some(software_profile),
                self.node_options(),
            )?;

            if hardware_profile.location == Location::Local {
                self.boot
                    .write(&node, BootEntry::for_node(&node, &software_profile.name))
                    .await?;
            }

            let ip = node
                .provisioning_nic()
                .and_then(|nic| nic.ip)
                .map(|ip| ip.to_string());
            let mut args = vec![hardware_profile.name.as_str(), software_profile.name.as_str()];
            if let Some(ip) = &ip {
                args.push(ip);
            }
            self.hooks.run("pre-add-host", &args, &[&node.name]).await;

            info!(node = %node.name, ip = ?ip, "added node");
            nodes.push(node);
        }

        Ok(nodes)
    }

    async fn add_discovered(
        &self,
        ctx: &AdapterContext<'_>,
        request: &AddNodesRequest,
        hardware_profile: &HardwareProfile,
        software_profile: &SoftwareProfile,
    ) -> Result<Vec<Node>> {
        let device = hardware_profile
            .provisioning_nic()
            .map(|nic| nic.device.clone())
            .ok_or_else(|| {
                AdapterError::CommandFailed(format!(
                    "hardware profile [{}] has no provisioning NIC for discovery",
                    hardware_profile.name
                ))
            })?;

        let active =
            ActiveDiscovery::register(&self.discoveries, hardware_profile.hardware_profile_id);
        let session = self.capture.open(&device).await?;

        let outcome = Discovery {
            store: ctx.store,
            hardware_profile,
            software_profile,
            boot: self.boot.as_ref(),
            hooks: &self.hooks,
            options: self.node_options(),
            add_host_session: ctx.add_host_session,
            tags: request.tags.clone(),
            abort: Arc::clone(&active.flag),
            poll_interval: self.config.discovery_poll_interval,
            count: request.count.unwrap_or(0),
        }
        .run(session)
        .await;

        if matches!(outcome.reason, StopReason::Aborted | StopReason::Failed) {
            warn!(
                reason = ?outcome.reason,
                created = outcome.nodes.len(),
                "discovery ended early, created nodes are kept"
            );
        }
        Ok(outcome.nodes)
    }

    fn node_names(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }
}

fn power_mode(soft: bool) -> &'static str {
    if soft {
        "soft"
    } else {
        "hard"
    }
}

#[async_trait]
impl ResourceAdapter for BareMetalAdapter {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    async fn validate_start_arguments(
        &self,
        ctx: &AdapterContext<'_>,
        request: &AddNodesRequest,
        hardware_profile: &HardwareProfile,
        software_profile: Option<&SoftwareProfile>,
    ) -> Result<()> {
        if software_profile.is_none() {
            return Err(AdapterError::CommandFailed(
                "software profile must be specified".to_string(),
            ));
        }

        if hardware_profile.location == Location::Local {
            if hardware_profile.provisioning_nic().is_none() {
                return Err(AdapterError::CommandFailed(format!(
                    "hardware profile [{}] does not have a provisioning NIC",
                    hardware_profile.name
                )));
            }
            self.check_installer(ctx.store)?;
        }

        if hardware_profile.name_format == "*"
            && (request.node_details.is_empty()
                || request.node_details.iter().any(|d| d.name.is_none()))
        {
            return Err(AdapterError::CommandFailed(format!(
                "host names must be specified for nodes in hardware profile [{}]",
                hardware_profile.name
            )));
        }

        for name in request.node_details.iter().filter_map(|d| d.name.as_deref()) {
            if node_name_taken(ctx.store, name)? {
                return Err(AdapterError::NodeAlreadyExists(name.to_string()));
            }
        }

        Ok(())
    }

    async fn start(
        &self,
        ctx: &AdapterContext<'_>,
        request: &AddNodesRequest,
        hardware_profile: &HardwareProfile,
        software_profile: Option<&SoftwareProfile>,
    ) -> Result<Vec<Node>> {
        let software_profile = software_profile.ok_or_else(|| {
            AdapterError::CommandFailed("software profile must be specified".to_string())
        })?;

        if request.is_predefined() {
            self.add_predefined(ctx, request, hardware_profile, software_profile)
                .await
        } else if request.is_discovery() {
            self.add_discovered(ctx, request, hardware_profile, software_profile)
                .await
        } else {
            Err(AdapterError::CommandFailed(
                "either node details or a node count must be specified".to_string(),
            ))
        }
    }

    async fn delete_node(&self, nodes: &[Node]) -> Result<()> {
        self.hooks.run("delete", &[], &Self::node_names(nodes)).await;
        for node in nodes {
            self.boot.remove(node).await?;
            debug!(node = %node.name, "boot configuration removed");
        }
        Ok(())
    }

    async fn transfer_node(
        &self,
        transfers: &[NodeTransfer],
        new_software_profile: &str,
    ) -> Result<()> {
        for transfer in transfers {
            self.boot
                .write(
                    &transfer.node,
                    BootEntry::Install {
                        software_profile: new_software_profile,
                    },
                )
                .await?;
        }

        let names: Vec<&str> = transfers.iter().map(|t| t.node.name.as_str()).collect();
        self.hooks.run("reset", &["hard"], &names).await;
        Ok(())
    }

    async fn idle_active_node(&self, nodes: &[Node]) -> Result<NodeState> {
        self.hooks
            .run("shutdown", &["hard"], &Self::node_names(nodes))
            .await;
        Ok(NodeState::Discovered)
    }

    async fn activate_idle_node(
        &self,
        node: &mut Node,
        software_profile: &str,
        profile_changed: bool,
    ) -> Result<()> {
        node.boot_from = if profile_changed {
            corral_store::BootFrom::Network
        } else {
            corral_store::BootFrom::Local
        };
        self.boot
            .write(node, BootEntry::for_node(node, software_profile))
            .await
    }

    async fn startup_node(
        &self,
        nodes: &[Node],
        remaining_nodes: &[String],
        boot_method: BootMethod,
    ) -> Result<()> {
        if boot_method == BootMethod::Local {
            for node in nodes {
                self.boot.write(node, BootEntry::LocalDisk).await?;
            }
        }
        if !remaining_nodes.is_empty() {
            debug!(?remaining_nodes, "remaining nodes are not used by this adapter");
        }
        self.hooks.run("start", &[], &Self::node_names(nodes)).await;
        Ok(())
    }

    async fn shutdown_node(&self, nodes: &[Node], soft: bool) -> Result<()> {
        self.hooks
            .run("shutdown", &[power_mode(soft)], &Self::node_names(nodes))
            .await;
        Ok(())
    }

    async fn reboot_node(&self, nodes: &[Node], soft: bool) -> Result<()> {
        self.hooks
            .run("reset", &[power_mode(soft)], &Self::node_names(nodes))
            .await;
        Ok(())
    }

    fn abort(&self, hardware_profile: &HardwareProfile) {
        let mut count = 0;
        for (id, flag) in self.discoveries.lock().iter() {
            if *id == hardware_profile.hardware_profile_id {
                flag.store(true, Ordering::SeqCst);
                count += 1;
            }
        }
        info!(hardware_profile = %hardware_profile.name, count, "abort requested");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NicDetails, NodeDetails};
    use corral_store::{BootFrom, ProvisioningNic, RocksStore};
    use futures::stream::{self, StreamExt};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Capture backend replaying fixed lines, or waiting forever when empty.
    struct ScriptedCapture {
        lines: Vec<String>,
    }

    #[async_trait]
    impl PacketCapture for ScriptedCapture {
        async fn open(&self, _device: &str) -> Result<CaptureSession> {
            if self.lines.is_empty() {
                return Ok(CaptureSession::from_lines(stream::pending().boxed()));
            }
            let lines: Vec<std::io::Result<String>> =
                self.lines.iter().cloned().map(Ok).collect();
            Ok(CaptureSession::from_lines(stream::iter(lines).boxed()))
        }
    }

    struct Fixture {
        store: RocksStore,
        hw: HardwareProfile,
        sw: SoftwareProfile,
        boot: Arc<PxeBootWriter>,
        dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path().join("db")).unwrap();
        let mut hw = HardwareProfile::new("rack1", Some(ADAPTER_NAME));
        hw.name_format = "compute-#NN".to_string();
        hw.provisioning_nics.push(ProvisioningNic {
            device: "eth1".to_string(),
            network: "10.2.0.0/24".parse().unwrap(),
        });
        let sw = SoftwareProfile::new("compute");
        store.put_hardware_profile(&hw).unwrap();
        store.put_software_profile(&sw).unwrap();
        store
            .add_profile_mapping(&sw.software_profile_id, &hw.hardware_profile_id)
            .unwrap();
        let boot = Arc::new(PxeBootWriter::new(dir.path().join("tftp")));
        Fixture {
            store,
            hw,
            sw,
            boot,
            dir,
        }
    }

    fn adapter(f: &Fixture, lines: &[&str], config: BareMetalConfig) -> BareMetalAdapter {
        let capture = ScriptedCapture {
            lines: lines.iter().map(ToString::to_string).collect(),
        };
        BareMetalAdapter::with_backends(config, f.boot.clone(), Arc::new(capture))
    }

    fn predefined(names: &[&str]) -> AddNodesRequest {
        AddNodesRequest {
            hardware_profile: "rack1".to_string(),
            software_profile: Some("compute".to_string()),
            node_details: names
                .iter()
                .enumerate()
                .map(|(i, name)| NodeDetails {
                    name: Some((*name).to_string()),
                    nics: vec![NicDetails {
                        mac: Some(format!("52:54:00:00:01:{i:02x}").parse().unwrap()),
                        ip: None,
                        device: Some("eth1".to_string()),
                    }],
                })
                .collect(),
            ..AddNodesRequest::default()
        }
    }

    #[tokio::test]
    async fn predefined_start_creates_nodes_with_boot_files() {
        let f = fixture();
        let adapter = adapter(&f, &[], BareMetalConfig::default());
        let ctx = AdapterContext::new(&f.store);
        let request = predefined(&["n1", "n2"]);

        adapter
            .validate_start_arguments(&ctx, &request, &f.hw, Some(&f.sw))
            .await
            .unwrap();
        let nodes = adapter
            .start(&ctx, &request, &f.hw, Some(&f.sw))
            .await
            .unwrap();

        assert_eq!(nodes.len(), 2);
        for node in &nodes {
            assert_eq!(node.add_host_session, Some(ctx.add_host_session));
            let mac = node.provisioning_nic().unwrap().mac.unwrap();
            assert!(f.boot.config_path(&mac).exists());
        }
        let session = f.store.list_nodes_by_session(&ctx.add_host_session).unwrap();
        assert_eq!(session.len(), 2);

        // Same names again are rejected up front
        let err = adapter
            .validate_start_arguments(&ctx, &request, &f.hw, Some(&f.sw))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::NodeAlreadyExists(_)));
    }

    #[tokio::test]
    async fn start_without_mode_fails() {
        let f = fixture();
        let adapter = adapter(&f, &[], BareMetalConfig::default());
        let ctx = AdapterContext::new(&f.store);
        let request = AddNodesRequest {
            hardware_profile: "rack1".to_string(),
            software_profile: Some("compute".to_string()),
            ..AddNodesRequest::default()
        };

        let err = adapter
            .start(&ctx, &request, &f.hw, Some(&f.sw))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::CommandFailed(_)));
    }

    #[tokio::test]
    async fn validation_rules() {
        let f = fixture();
        let ctx = AdapterContext::new(&f.store);
        let adapter = adapter(&f, &[], BareMetalConfig::default());
        let request = predefined(&["n1"]);

        let err = adapter
            .validate_start_arguments(&ctx, &request, &f.hw, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::CommandFailed(_)));

        let mut no_nic = f.hw.clone();
        no_nic.provisioning_nics.clear();
        assert!(adapter
            .validate_start_arguments(&ctx, &request, &no_nic, Some(&f.sw))
            .await
            .is_err());

        // Remote profiles need no provisioning NIC
        no_nic.location = Location::Remote;
        adapter
            .validate_start_arguments(&ctx, &request, &no_nic, Some(&f.sw))
            .await
            .unwrap();

        let mut wildcard = f.hw.clone();
        wildcard.name_format = "*".to_string();
        let discovery = AddNodesRequest {
            count: Some(2),
            ..AddNodesRequest::default()
        };
        assert!(adapter
            .validate_start_arguments(&ctx, &discovery, &wildcard, Some(&f.sw))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn installer_needs_dhcpd() {
        let f = fixture();
        let ctx = AdapterContext::new(&f.store);
        let mut installer = Node::new(
            "installer",
            f.hw.hardware_profile_id,
            Some(f.sw.software_profile_id),
        );
        installer.state = NodeState::Installed;
        f.store.insert_node(&installer).unwrap();

        let config = BareMetalConfig {
            installer_node: Some("installer".to_string()),
            ..BareMetalConfig::default()
        };
        let adapter = adapter(&f, &[], config);
        let request = predefined(&["n1"]);

        let err = adapter
            .validate_start_arguments(&ctx, &request, &f.hw, Some(&f.sw))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::CommandFailed(_)));

        let mut sw = f.sw.clone();
        sw.components.push("dhcpd".to_string());
        f.store.put_software_profile(&sw).unwrap();
        adapter
            .validate_start_arguments(&ctx, &request, &f.hw, Some(&sw))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn discovery_start_uses_capture() {
        let f = fixture();
        let adapter = adapter(
            &f,
            &[
                "12:00:00.000001 52:54:00:00:02:01 > ff:ff:ff:ff:ff:ff, length 342",
                "12:00:00.000002 52:54:00:00:02:02 > ff:ff:ff:ff:ff:ff, length 342",
            ],
            BareMetalConfig::default(),
        );
        let ctx = AdapterContext::new(&f.store);
        let request = AddNodesRequest {
            hardware_profile: "rack1".to_string(),
            software_profile: Some("compute".to_string()),
            count: Some(2),
            ..AddNodesRequest::default()
        };

        let nodes = adapter
            .start(&ctx, &request, &f.hw, Some(&f.sw))
            .await
            .unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(adapter.active_discoveries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_stops_discovery() {
        let f = fixture();
        let adapter = adapter(&f, &[], BareMetalConfig::default());
        let ctx = AdapterContext::new(&f.store);
        let request = AddNodesRequest {
            hardware_profile: "rack1".to_string(),
            software_profile: Some("compute".to_string()),
            count: Some(0),
            ..AddNodesRequest::default()
        };

        let run = adapter.start(&ctx, &request, &f.hw, Some(&f.sw));
        let stop = async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            assert_eq!(adapter.active_discoveries(), 1);
            adapter.abort(&f.hw);
        };
        let (nodes, ()) = tokio::join!(run, stop);

        assert!(nodes.unwrap().is_empty());
        assert_eq!(adapter.active_discoveries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_leaves_other_profiles_discovering() {
        let f = fixture();
        let mut rack2 = HardwareProfile::new("rack2", Some(ADAPTER_NAME));
        rack2.provisioning_nics.clone_from(&f.hw.provisioning_nics);
        f.store.put_hardware_profile(&rack2).unwrap();
        f.store
            .add_profile_mapping(&f.sw.software_profile_id, &rack2.hardware_profile_id)
            .unwrap();

        let adapter = adapter(&f, &[], BareMetalConfig::default());
        let ctx = AdapterContext::new(&f.store);
        let request = |hardware_profile: &str| AddNodesRequest {
            hardware_profile: hardware_profile.to_string(),
            software_profile: Some("compute".to_string()),
            count: Some(0),
            ..AddNodesRequest::default()
        };
        let (rack1_request, rack2_request) = (request("rack1"), request("rack2"));

        let rack1_run = adapter.start(&ctx, &rack1_request, &f.hw, Some(&f.sw));
        let rack2_run = adapter.start(&ctx, &rack2_request, &rack2, Some(&f.sw));
        let stop = async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            assert_eq!(adapter.active_discoveries(), 2);
            adapter.abort(&f.hw);

            // Observed by rack1 within one poll interval
            tokio::time::sleep(Duration::from_secs(5)).await;
            assert_eq!(adapter.active_discoveries_for(&f.hw.hardware_profile_id), 0);
            assert_eq!(adapter.active_discoveries_for(&rack2.hardware_profile_id), 1);
            adapter.abort(&rack2);
        };
        let (rack1_nodes, rack2_nodes, ()) = tokio::join!(rack1_run, rack2_run, stop);

        assert!(rack1_nodes.unwrap().is_empty());
        assert!(rack2_nodes.unwrap().is_empty());
        assert_eq!(adapter.active_discoveries(), 0);
    }

    #[tokio::test]
    async fn lifecycle_actions() {
        let f = fixture();
        let adapter = adapter(&f, &[], BareMetalConfig::default());
        let ctx = AdapterContext::new(&f.store);
        let mut nodes = adapter
            .start(&ctx, &predefined(&["n1"]), &f.hw, Some(&f.sw))
            .await
            .unwrap();
        let mac = nodes[0].provisioning_nic().unwrap().mac.unwrap();
        let path = f.boot.config_path(&mac);

        let state = adapter.idle_active_node(&nodes).await.unwrap();
        assert_eq!(state, NodeState::Discovered);

        adapter
            .activate_idle_node(&mut nodes[0], "compute", false)
            .await
            .unwrap();
        assert_eq!(nodes[0].boot_from, BootFrom::Local);
        assert!(std::fs::read_to_string(&path).unwrap().contains("LOCALBOOT"));

        adapter
            .activate_idle_node(&mut nodes[0], "compute", true)
            .await
            .unwrap();
        assert_eq!(nodes[0].boot_from, BootFrom::Network);
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("profiles/compute/vmlinuz"));

        let transfers = vec![NodeTransfer {
            node: nodes[0].clone(),
            previous_software_profile: Some(f.sw.software_profile_id),
        }];
        adapter.transfer_node(&transfers, "gpu").await.unwrap();
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("profiles/gpu/vmlinuz"));

        adapter.shutdown_node(&nodes, true).await.unwrap();
        adapter.reboot_node(&nodes, false).await.unwrap();
        adapter
            .startup_node(&nodes, &[], BootMethod::Local)
            .await
            .unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("LOCALBOOT"));

        assert!(!adapter.suspend_active_node(&nodes[0]).await.unwrap());
        assert!(matches!(
            adapter.checkpoint_node(&nodes[0]).await,
            Err(AdapterError::UnsupportedOperation { .. })
        ));

        adapter.delete_node(&nodes).await.unwrap();
        assert!(!path.exists());
        assert!(f.dir.path().join("tftp/pxelinux.cfg").exists());
    }
}
