//! The lifecycle orchestrator.
//!
//! Every operation runs against a caller-supplied [`Transaction`]. Batch
//! operations check each node, group the eligible ones by hardware profile,
//! call the group's resource adapter once per group, commit, and only then
//! fire change events. Per-node precondition and lock failures are
//! collected into an [`OperationReport`]; selector, adapter and store errors
//! abort the call and discard whatever it had staged but not committed.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use corral_adapter::{
    AdapterContext, AdapterRegistry, AddNodesRequest, NodeTransfer, ResourceAdapter,
    UpdateNodeRequest,
};
use corral_core::{HardwareProfileId, NodeId};
use corral_store::{
    BootFrom, HardwareProfile, LockState, Node, NodeState, SoftwareProfile, Store, Transaction,
};
use tracing::{debug, info, warn};

use crate::error::{ControlError, Result};
use crate::events::{EventSink, NodeStateChanged};
use crate::lifecycle;
use crate::profiles::ProfileModel;
use crate::types::{
    AddNodesOutcome, FailureKind, NodeFailure, NodeSelector, OperationReport, StartupOptions,
    TransferOutcome,
};

/// A hardware profile and the adapter serving it.
struct Resolved {
    hardware_profile: HardwareProfile,
    adapter: Arc<dyn ResourceAdapter>,
}

/// Adapters resolved during one orchestrator call.
///
/// Never shared between calls.
struct AdapterCache<'r> {
    registry: &'r AdapterRegistry,
    entries: HashMap<HardwareProfileId, Resolved>,
}

impl<'r> AdapterCache<'r> {
    fn new(registry: &'r AdapterRegistry) -> Self {
        Self {
            registry,
            entries: HashMap::new(),
        }
    }

    fn get(&mut self, store: &dyn Store, id: &HardwareProfileId) -> Result<&Resolved> {
        match self.entries.entry(*id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let hardware_profile = store
                    .get_hardware_profile(id)?
                    .ok_or_else(|| ControlError::HardwareProfileNotFound(id.to_string()))?;
                let adapter = self.registry.resolve(&hardware_profile)?;
                debug!(
                    hardware_profile = %hardware_profile.name,
                    adapter = adapter.name(),
                    "resolved resource adapter"
                );
                Ok(entry.insert(Resolved {
                    hardware_profile,
                    adapter,
                }))
            }
        }
    }

    fn adapter(
        &mut self,
        store: &dyn Store,
        id: &HardwareProfileId,
    ) -> Result<Arc<dyn ResourceAdapter>> {
        Ok(Arc::clone(&self.get(store, id)?.adapter))
    }
}

fn group_by_hardware_profile(nodes: Vec<Node>) -> BTreeMap<HardwareProfileId, Vec<Node>> {
    let mut groups: BTreeMap<HardwareProfileId, Vec<Node>> = BTreeMap::new();
    for node in nodes {
        groups.entry(node.hardware_profile_id).or_default().push(node);
    }
    groups
}

/// Discard uncommitted changes of a failed call.
fn settle<T>(txn: &mut Transaction<'_>, result: Result<T>) -> Result<T> {
    if result.is_err() {
        txn.rollback();
    }
    result
}

/// The node lifecycle orchestrator.
pub struct Orchestrator<S: Store> {
    store: Arc<S>,
    registry: Arc<AdapterRegistry>,
    events: Arc<dyn EventSink>,
}

impl<S: Store + 'static> Orchestrator<S> {
    /// Create a new orchestrator.
    #[must_use]
    pub fn new(store: Arc<S>, registry: Arc<AdapterRegistry>, events: Arc<dyn EventSink>) -> Self {
        Self {
            store,
            registry,
            events,
        }
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get a reference to the adapter registry.
    #[must_use]
    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Begin a transaction against the store.
    #[must_use]
    pub fn begin(&self) -> Transaction<'_> {
        Transaction::new(self.store.as_ref())
    }

    /// Profile model queries against the store.
    #[must_use]
    pub fn profiles(&self) -> ProfileModel<'_> {
        ProfileModel::new(self.store.as_ref())
    }

    /// Resolve the adapter of a hardware profile.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` if the profile has no registered adapter.
    pub fn resolve_adapter(&self, hardware_profile: &HardwareProfile) -> Result<Arc<dyn ResourceAdapter>> {
        Ok(self.registry.resolve(hardware_profile)?)
    }

    fn fire_changes(&self, committed: &[Node], previous: &HashMap<NodeId, NodeState>) {
        for node in committed {
            let Some(before) = previous.get(&node.node_id) else {
                continue;
            };
            if *before == node.state {
                continue;
            }
            if let Some(event) = NodeStateChanged::new(node, before) {
                self.events.fire(event);
            }
        }
    }

    // =========================================================================
    // Selection
    // =========================================================================

    /// Resolve a selector to live nodes, seen through the transaction.
    ///
    /// # Errors
    ///
    /// Returns `NodeNotFound` for a name or id that does not resolve, or a
    /// profile not-found error for an unknown profile name.
    pub fn resolve_nodes(&self, txn: &Transaction<'_>, selector: &NodeSelector) -> Result<Vec<Node>> {
        let store = txn.store();
        let profiles = ProfileModel::new(store);

        let nodes = match selector {
            NodeSelector::Names(names) => {
                let mut nodes = Vec::with_capacity(names.len());
                for name in names {
                    let node = store
                        .get_node_by_name(name)?
                        .filter(|n| !n.is_deleted())
                        .ok_or_else(|| ControlError::NodeNotFound(name.clone()))?;
                    nodes.push(node);
                }
                nodes
            }
            NodeSelector::Ids(ids) => {
                let mut nodes = Vec::with_capacity(ids.len());
                for id in ids {
                    let node = txn
                        .node(id)?
                        .filter(|n| !n.is_deleted())
                        .ok_or_else(|| ControlError::NodeNotFound(id.to_string()))?;
                    nodes.push(node);
                }
                nodes
            }
            NodeSelector::Macs(macs) => {
                let mut nodes = Vec::with_capacity(macs.len());
                for mac in macs {
                    let node = store
                        .get_node_by_mac(mac)?
                        .filter(|n| !n.is_deleted())
                        .ok_or_else(|| ControlError::NodeNotFound(mac.to_string()))?;
                    nodes.push(node);
                }
                nodes
            }
            NodeSelector::SoftwareProfile(name) => {
                let sw = profiles.software_profile(name)?;
                store.list_nodes_by_software_profile(&sw.software_profile_id)?
            }
            NodeSelector::HardwareProfile(name) => {
                let hw = profiles.hardware_profile(name)?;
                store.list_nodes_by_hardware_profile(&hw.hardware_profile_id)?
            }
            NodeSelector::Session(session) => store.list_nodes_by_session(session)?,
            NodeSelector::Tags(tags) => store.list_nodes_by_tags(tags)?,
            NodeSelector::NameFilter(pattern) => store.list_nodes_matching(pattern)?,
            NodeSelector::All => store.list_all_nodes()?,
        };

        let mut seen = HashSet::new();
        Ok(txn
            .overlay(nodes)
            .into_iter()
            .filter(|n| !n.is_deleted() && seen.insert(n.node_id))
            .collect())
    }

    // =========================================================================
    // Transfer
    // =========================================================================

    /// Move nodes to another software profile, staging the change.
    ///
    /// Nodes are checked in order: profile mapping, installed state (unless
    /// `force`), same profile, lock. Nothing is committed; the returned
    /// transfers are for the caller to commit and dispatch.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the destination is an idle profile.
    pub fn transfer(
        &self,
        txn: &mut Transaction<'_>,
        nodes: Vec<Node>,
        destination: &SoftwareProfile,
        force: bool,
    ) -> Result<TransferOutcome> {
        self.stage_transfer(txn, nodes, destination, force, false)
    }

    fn stage_transfer(
        &self,
        txn: &mut Transaction<'_>,
        nodes: Vec<Node>,
        destination: &SoftwareProfile,
        force: bool,
        allow_soft_locked: bool,
    ) -> Result<TransferOutcome> {
        if destination.is_idle {
            return Err(ControlError::InvalidArgument(format!(
                "idle software profile [{}] cannot be a transfer destination",
                destination.name
            )));
        }

        let allowed = txn
            .store()
            .allowed_hardware_profiles(&destination.software_profile_id)?;

        let mut outcome = TransferOutcome::default();
        for mut node in nodes {
            let usable = allowed.contains(&node.hardware_profile_id);
            if let Err(failure) =
                lifecycle::check_transfer(&node, destination, usable, force, allow_soft_locked)
            {
                debug!(node = %failure.node, kind = %failure.kind, "{}", failure.message);
                outcome.failures.push(failure);
                continue;
            }

            let previous = node.software_profile_id.replace(destination.software_profile_id);
            txn.stage(node.clone());
            outcome.transfers.push(NodeTransfer {
                node,
                previous_software_profile: previous,
            });
        }
        Ok(outcome)
    }

    /// Transfer the selected nodes to `destination` and reprovision them.
    ///
    /// Transferred nodes become `Expired` until reinstalled.
    ///
    /// # Errors
    ///
    /// Returns a selector error, `InvalidArgument` for an idle destination,
    /// or an adapter or store error.
    pub async fn transfer_nodes(
        &self,
        txn: &mut Transaction<'_>,
        selector: &NodeSelector,
        destination: &str,
        force: bool,
    ) -> Result<OperationReport> {
        let result = async {
            let destination = ProfileModel::new(txn.store()).software_profile(destination)?;
            let nodes = self.resolve_nodes(txn, selector)?;
            self.run_transfer(txn, nodes, &destination, force, false).await
        }
        .await;
        settle(txn, result)
    }

    /// Transfer `count` nodes to `destination`.
    ///
    /// Candidates come from `source` or, without one, from every hardware
    /// profile that may run the destination. Unlocked candidates are used up
    /// before soft-locked ones; hard-locked, idle and deleted nodes are never
    /// candidates.
    ///
    /// # Errors
    ///
    /// Returns `NodeTransferNotValid` if no candidate exists or fewer than
    /// `count` do, and otherwise the errors of [`Self::transfer_nodes`].
    pub async fn transfer_count_nodes(
        &self,
        txn: &mut Transaction<'_>,
        source: Option<&str>,
        destination: &str,
        count: usize,
        force: bool,
    ) -> Result<OperationReport> {
        let result = async {
            if count == 0 {
                return Err(ControlError::InvalidArgument(
                    "node count must be at least 1".to_string(),
                ));
            }
            let destination = ProfileModel::new(txn.store()).software_profile(destination)?;
            let nodes = Self::transfer_candidates(txn, source, &destination, count, force)?;
            self.run_transfer(txn, nodes, &destination, force, true).await
        }
        .await;
        settle(txn, result)
    }

    fn transfer_candidates(
        txn: &Transaction<'_>,
        source: Option<&str>,
        destination: &SoftwareProfile,
        count: usize,
        force: bool,
    ) -> Result<Vec<Node>> {
        let store = txn.store();
        let allowed: BTreeSet<HardwareProfileId> =
            store.allowed_hardware_profiles(&destination.software_profile_id)?;

        let pool = match source {
            Some(name) => {
                let source = ProfileModel::new(store).software_profile(name)?;
                txn.query(|s| s.list_nodes_by_software_profile(&source.software_profile_id))?
            }
            None => {
                let mut nodes = Vec::new();
                for hw in &allowed {
                    nodes.extend(txn.query(|s| s.list_nodes_by_hardware_profile(hw))?);
                }
                nodes
            }
        };

        let (unlocked, soft_locked): (Vec<Node>, Vec<Node>) = pool
            .into_iter()
            .filter(|n| {
                !n.is_deleted()
                    && !n.is_idle
                    && !lifecycle::is_hard_locked(n)
                    && allowed.contains(&n.hardware_profile_id)
                    && n.software_profile_id != Some(destination.software_profile_id)
                    && (force || lifecycle::is_installed(n))
            })
            .partition(|n| n.lock_state == LockState::Unlocked);

        let available = unlocked.len() + soft_locked.len();
        if available == 0 {
            return Err(ControlError::NodeTransferNotValid(format!(
                "no nodes available to transfer to software profile [{}]",
                destination.name
            )));
        }
        if available < count {
            return Err(ControlError::NodeTransferNotValid(format!(
                "only {available} of {count} requested nodes are available to transfer to software profile [{}]",
                destination.name
            )));
        }

        let from_unlocked = count.min(unlocked.len());
        let mut selected: Vec<Node> = unlocked.into_iter().take(from_unlocked).collect();
        selected.extend(soft_locked.into_iter().take(count - from_unlocked));

        debug!(
            count,
            unlocked = from_unlocked,
            soft_locked = count - from_unlocked,
            destination = %destination.name,
            "selected transfer candidates"
        );
        Ok(selected)
    }

    async fn run_transfer(
        &self,
        txn: &mut Transaction<'_>,
        nodes: Vec<Node>,
        destination: &SoftwareProfile,
        force: bool,
        allow_soft_locked: bool,
    ) -> Result<OperationReport> {
        let outcome = self.stage_transfer(txn, nodes, destination, force, allow_soft_locked)?;
        let mut report = OperationReport {
            succeeded: Vec::new(),
            failures: outcome.failures,
        };
        if outcome.transfers.is_empty() {
            return Ok(report);
        }

        let mut cache = AdapterCache::new(&self.registry);
        let mut previous = HashMap::new();
        for transfer in &outcome.transfers {
            cache.get(txn.store(), &transfer.node.hardware_profile_id)?;
            previous.insert(transfer.node.node_id, transfer.node.state.clone());

            let mut node = transfer.node.clone();
            node.state = NodeState::Expired;
            txn.stage(node);
        }

        let committed = txn.commit()?;
        let by_id: HashMap<NodeId, &Node> = committed.iter().map(|n| (n.node_id, n)).collect();

        let mut groups: BTreeMap<HardwareProfileId, Vec<NodeTransfer>> = BTreeMap::new();
        for transfer in outcome.transfers {
            let node = by_id
                .get(&transfer.node.node_id)
                .map_or(transfer.node, |n| (*n).clone());
            groups
                .entry(node.hardware_profile_id)
                .or_default()
                .push(NodeTransfer {
                    node,
                    previous_software_profile: transfer.previous_software_profile,
                });
        }

        let dispatch = async {
            for (hw_id, group) in &groups {
                let adapter = cache.adapter(txn.store(), hw_id)?;
                adapter.transfer_node(group, &destination.name).await?;
                info!(
                    count = group.len(),
                    software_profile = %destination.name,
                    adapter = adapter.name(),
                    "nodes transferred"
                );
            }
            Ok::<(), ControlError>(())
        }
        .await;

        self.fire_changes(&committed, &previous);
        dispatch?;

        report.succeeded = committed;
        Ok(report)
    }

    // =========================================================================
    // Idle / activate
    // =========================================================================

    /// Move nodes into their hardware profile's idle pool.
    ///
    /// Each node is first offered to the adapter for suspension in place;
    /// a suspended node keeps its software profile. Other nodes move to the
    /// hardware profile's idle software profile (none if it has none), and
    /// each group's adapter idles them in one call, returning the state all
    /// of them take.
    ///
    /// # Errors
    ///
    /// Returns an adapter or store error.
    pub async fn idle(&self, txn: &mut Transaction<'_>, nodes: Vec<Node>) -> Result<OperationReport> {
        let result = self.idle_inner(txn, nodes).await;
        settle(txn, result)
    }

    async fn idle_inner(&self, txn: &mut Transaction<'_>, nodes: Vec<Node>) -> Result<OperationReport> {
        let mut report = OperationReport::default();
        let mut cache = AdapterCache::new(&self.registry);
        let mut previous = HashMap::new();
        let mut to_idle = Vec::new();

        for mut node in nodes {
            if let Err(failure) = lifecycle::check_idle(&node) {
                report.fail(failure);
                continue;
            }

            let resolved = cache.get(txn.store(), &node.hardware_profile_id)?;
            let adapter = Arc::clone(&resolved.adapter);
            let idle_profile = resolved.hardware_profile.idle_software_profile_id;

            previous.insert(node.node_id, node.state.clone());
            node.is_idle = true;

            let suspended = match adapter.suspend_active_node(&node).await {
                Ok(suspended) => suspended,
                Err(e) => {
                    warn!(node = %node.name, error = %e, "suspend failed, idling instead");
                    false
                }
            };

            if suspended {
                debug!(node = %node.name, "node suspended in place");
                txn.stage(node);
            } else {
                node.software_profile_id = idle_profile;
                to_idle.push(node);
            }
        }

        for (hw_id, mut group) in group_by_hardware_profile(to_idle) {
            let adapter = cache.adapter(txn.store(), &hw_id)?;
            let state = adapter.idle_active_node(&group).await?;
            info!(count = group.len(), %state, adapter = adapter.name(), "nodes idled");
            for node in &mut group {
                node.state = state.clone();
            }
            txn.stage_all(group);
        }

        let committed = txn.commit()?;
        self.fire_changes(&committed, &previous);
        report.succeeded = committed;
        Ok(report)
    }

    /// Bring idle nodes back into service.
    ///
    /// Without a destination each node returns to the software profile it
    /// holds. The profile assignment is committed before any adapter is
    /// called.
    ///
    /// # Errors
    ///
    /// Returns `SoftwareProfileNotFound` for an unknown destination, or an
    /// adapter or store error.
    pub async fn activate(
        &self,
        txn: &mut Transaction<'_>,
        nodes: Vec<Node>,
        destination: Option<&str>,
    ) -> Result<OperationReport> {
        let result = self.activate_inner(txn, nodes, destination).await;
        settle(txn, result)
    }

    async fn activate_inner(
        &self,
        txn: &mut Transaction<'_>,
        nodes: Vec<Node>,
        destination: Option<&str>,
    ) -> Result<OperationReport> {
        let store = txn.store();
        let destination = destination
            .map(|name| ProfileModel::new(store).software_profile(name))
            .transpose()?;

        let mut report = OperationReport::default();
        let mut cache = AdapterCache::new(&self.registry);
        let mut previous = HashMap::new();
        let mut pending: HashMap<NodeId, (String, bool)> = HashMap::new();

        for mut node in nodes {
            if let Err(failure) = lifecycle::check_is_idle(&node) {
                report.fail(failure);
                continue;
            }

            let target = match &destination {
                Some(sw) => Some(sw.clone()),
                None => match &node.software_profile_id {
                    Some(id) => store.get_software_profile(id)?,
                    None => None,
                },
            };
            let Some(target) = target else {
                report.fail(NodeFailure::new(
                    &node,
                    FailureKind::SoftwareProfileNotFound,
                    "node has no software profile to return to",
                ));
                continue;
            };

            let usable = store.is_usable(&node.hardware_profile_id, &target.software_profile_id)?;
            if let Err(failure) = lifecycle::check_activate(&node, &target, usable) {
                report.fail(failure);
                continue;
            }

            cache.get(store, &node.hardware_profile_id)?;

            let changed = node.software_profile_id != Some(target.software_profile_id);
            previous.insert(node.node_id, node.state.clone());
            node.software_profile_id = Some(target.software_profile_id);
            pending.insert(node.node_id, (target.name, changed));
            txn.stage(node);
        }

        if pending.is_empty() {
            return Ok(report);
        }

        let assigned = txn.commit()?;
        debug!(count = assigned.len(), "software profile assignment committed");

        for (hw_id, group) in group_by_hardware_profile(assigned) {
            let adapter = cache.adapter(store, &hw_id)?;
            for mut node in group {
                let Some((software_profile, changed)) = pending.get(&node.node_id) else {
                    continue;
                };
                adapter
                    .activate_idle_node(&mut node, software_profile, *changed)
                    .await?;
                node.is_idle = false;
                info!(node = %node.name, %software_profile, changed, "node activated");
                txn.stage(node);
            }
        }

        let committed = txn.commit()?;
        self.fire_changes(&committed, &previous);
        report.succeeded = committed;
        Ok(report)
    }

    // =========================================================================
    // Power
    // =========================================================================

    fn power_targets(nodes: Vec<Node>, report: &mut OperationReport) -> Vec<Node> {
        let mut eligible = Vec::with_capacity(nodes.len());
        for node in nodes {
            match lifecycle::check_power(&node) {
                Ok(()) => eligible.push(node),
                Err(failure) => report.fail(failure),
            }
        }
        eligible
    }

    /// Power on nodes. Hard-locked nodes are reported and skipped.
    ///
    /// # Errors
    ///
    /// Returns an adapter or store error.
    pub async fn startup(
        &self,
        txn: &Transaction<'_>,
        nodes: Vec<Node>,
        options: &StartupOptions,
    ) -> Result<OperationReport> {
        let mut report = OperationReport::default();
        let mut cache = AdapterCache::new(&self.registry);

        for (hw_id, group) in group_by_hardware_profile(Self::power_targets(nodes, &mut report)) {
            let adapter = cache.adapter(txn.store(), &hw_id)?;
            adapter
                .startup_node(&group, &options.remaining_nodes, options.boot_method)
                .await?;
            info!(count = group.len(), boot_method = ?options.boot_method, "nodes started");
            report.succeeded.extend(group);
        }
        Ok(report)
    }

    /// Power off nodes. Hard-locked nodes are reported and skipped.
    ///
    /// # Errors
    ///
    /// Returns an adapter or store error.
    pub async fn shutdown(
        &self,
        txn: &Transaction<'_>,
        nodes: Vec<Node>,
        soft: bool,
    ) -> Result<OperationReport> {
        let mut report = OperationReport::default();
        let mut cache = AdapterCache::new(&self.registry);

        for (hw_id, group) in group_by_hardware_profile(Self::power_targets(nodes, &mut report)) {
            let adapter = cache.adapter(txn.store(), &hw_id)?;
            adapter.shutdown_node(&group, soft).await?;
            info!(count = group.len(), soft, "nodes shut down");
            report.succeeded.extend(group);
        }
        Ok(report)
    }

    /// Power cycle nodes. Hard-locked nodes are reported and skipped.
    ///
    /// # Errors
    ///
    /// Returns an adapter or store error.
    pub async fn reboot(
        &self,
        txn: &Transaction<'_>,
        nodes: Vec<Node>,
        soft: bool,
    ) -> Result<OperationReport> {
        let mut report = OperationReport::default();
        let mut cache = AdapterCache::new(&self.registry);

        for (hw_id, group) in group_by_hardware_profile(Self::power_targets(nodes, &mut report)) {
            let adapter = cache.adapter(txn.store(), &hw_id)?;
            adapter.reboot_node(&group, soft).await?;
            info!(count = group.len(), soft, "nodes rebooted");
            report.succeeded.extend(group);
        }
        Ok(report)
    }

    // =========================================================================
    // Single-node passthroughs
    // =========================================================================

    fn adapter_for(&self, store: &dyn Store, node: &Node) -> Result<Arc<dyn ResourceAdapter>> {
        AdapterCache::new(&self.registry).adapter(store, &node.hardware_profile_id)
    }

    /// Snapshot a node.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` if the hardware profile has no adapter, or
    /// the adapter's error.
    pub async fn checkpoint(&self, txn: &Transaction<'_>, node: &Node) -> Result<()> {
        self.adapter_for(txn.store(), node)?
            .checkpoint_node(node)
            .await?;
        info!(node = %node.name, "node checkpointed");
        Ok(())
    }

    /// Restore a node from its snapshot.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` if the hardware profile has no adapter, or
    /// the adapter's error.
    pub async fn revert_to_checkpoint(&self, txn: &Transaction<'_>, node: &Node) -> Result<()> {
        self.adapter_for(txn.store(), node)?
            .revert_node_to_checkpoint(node)
            .await?;
        info!(node = %node.name, "node reverted to checkpoint");
        Ok(())
    }

    /// Move a node to other backing capacity.
    ///
    /// # Errors
    ///
    /// Returns `NodeLocked` for a hard-locked node, or the adapter's error.
    pub async fn migrate_node(
        &self,
        txn: &Transaction<'_>,
        node: &Node,
        remaining_nodes: &[String],
        live: bool,
    ) -> Result<()> {
        if lifecycle::is_hard_locked(node) {
            return Err(ControlError::NodeLocked(node.name.clone()));
        }
        self.adapter_for(txn.store(), node)?
            .migrate_node(node, remaining_nodes, live)
            .await?;
        info!(node = %node.name, live, "node migrated");
        Ok(())
    }

    /// Apply adapter-level changes and replace the node's tags.
    ///
    /// # Errors
    ///
    /// Returns an adapter or store error.
    pub async fn update_node(
        &self,
        txn: &mut Transaction<'_>,
        node: Node,
        request: &UpdateNodeRequest,
    ) -> Result<Node> {
        let result = async {
            let mut node = node;
            self.adapter_for(txn.store(), &node)?
                .update_node(&mut node, request)
                .await?;
            if let Some(tags) = &request.tags {
                node.tags.clone_from(tags);
            }
            txn.stage(node);
            Self::single(txn.commit()?)
        }
        .await;
        settle(txn, result)
    }

    /// Set a node's state and boot source, firing an event if the state
    /// changed.
    ///
    /// # Errors
    ///
    /// Returns `NodeLocked` when changing the state of a hard-locked node,
    /// or a store error.
    pub fn update_node_status(
        &self,
        txn: &mut Transaction<'_>,
        node: Node,
        state: Option<NodeState>,
        boot_from: Option<BootFrom>,
    ) -> Result<Node> {
        let mut node = node;
        let previous = node.state.clone();

        if let Some(state) = state {
            if state != node.state && lifecycle::is_hard_locked(&node) {
                return Err(ControlError::NodeLocked(node.name.clone()));
            }
            node.state = state;
        }
        if let Some(boot_from) = boot_from {
            node.boot_from = boot_from;
        }

        txn.stage(node);
        let result = txn.commit().map_err(ControlError::from).and_then(Self::single);
        let committed = settle(txn, result)?;

        if committed.state != previous {
            info!(node = %committed.name, %previous, state = %committed.state, "node status updated");
            if let Some(event) = NodeStateChanged::new(&committed, &previous) {
                self.events.fire(event);
            }
        }
        Ok(committed)
    }

    fn single(mut committed: Vec<Node>) -> Result<Node> {
        committed
            .pop()
            .ok_or_else(|| ControlError::Internal("commit returned no node".to_string()))
    }

    // =========================================================================
    // Locking and deletion
    // =========================================================================

    /// Set the lock state of the selected nodes.
    ///
    /// # Errors
    ///
    /// Returns a selector or store error.
    pub fn set_lock_state(
        &self,
        txn: &mut Transaction<'_>,
        selector: &NodeSelector,
        lock_state: LockState,
    ) -> Result<OperationReport> {
        let result = self.set_lock_state_inner(txn, selector, lock_state);
        settle(txn, result)
    }

    fn set_lock_state_inner(
        &self,
        txn: &mut Transaction<'_>,
        selector: &NodeSelector,
        lock_state: LockState,
    ) -> Result<OperationReport> {
        let mut report = OperationReport::default();
        for mut node in self.resolve_nodes(txn, selector)? {
            if node.lock_state == lock_state {
                report.succeeded.push(node);
                continue;
            }
            node.lock_state = lock_state;
            txn.stage(node);
        }
        let committed = txn.commit()?;
        info!(count = committed.len(), %lock_state, "lock state updated");
        report.succeeded.extend(committed);
        Ok(report)
    }

    /// Delete the selected nodes.
    ///
    /// Locked nodes are reported and kept. The adapter releases the backing
    /// resources of the rest, which then become `Deleted`.
    ///
    /// # Errors
    ///
    /// Returns a selector, adapter or store error.
    pub async fn delete_nodes(
        &self,
        txn: &mut Transaction<'_>,
        selector: &NodeSelector,
    ) -> Result<OperationReport> {
        let result = self.delete_inner(txn, selector).await;
        settle(txn, result)
    }

    async fn delete_inner(
        &self,
        txn: &mut Transaction<'_>,
        selector: &NodeSelector,
    ) -> Result<OperationReport> {
        let mut report = OperationReport::default();
        let mut cache = AdapterCache::new(&self.registry);
        let mut eligible = Vec::new();

        for node in self.resolve_nodes(txn, selector)? {
            match lifecycle::check_delete(&node) {
                Ok(()) => {
                    cache.get(txn.store(), &node.hardware_profile_id)?;
                    eligible.push(node);
                }
                Err(failure) => report.fail(failure),
            }
        }

        let mut previous = HashMap::new();
        for (hw_id, group) in group_by_hardware_profile(eligible) {
            let adapter = cache.adapter(txn.store(), &hw_id)?;
            adapter.delete_node(&group).await?;
            info!(count = group.len(), adapter = adapter.name(), "nodes deleted");

            for mut node in group {
                previous.insert(node.node_id, node.state.clone());
                node.state = NodeState::Deleted;
                txn.stage(node);
            }
        }

        let committed = txn.commit()?;
        self.fire_changes(&committed, &previous);
        report.succeeded = committed;
        Ok(report)
    }

    // =========================================================================
    // Provisioning
    // =========================================================================

    /// Provision new nodes through the hardware profile's adapter.
    ///
    /// # Errors
    ///
    /// Returns a profile not-found error, `InvalidArgument` for an idle
    /// software profile, `ProfileMappingNotAllowed`, `OperationFailed` if the
    /// hardware profile has no adapter, or the adapter's error.
    pub async fn add_nodes(&self, request: &AddNodesRequest) -> Result<AddNodesOutcome> {
        let profiles = self.profiles();
        let hardware_profile = profiles.hardware_profile(&request.hardware_profile)?;
        let software_profile = request
            .software_profile
            .as_deref()
            .map(|name| profiles.software_profile(name))
            .transpose()?;

        if let Some(sw) = &software_profile {
            if sw.is_idle {
                return Err(ControlError::InvalidArgument(format!(
                    "cannot add nodes on idle software profile [{}]",
                    sw.name
                )));
            }
            if !profiles.is_usable(&hardware_profile, sw)? {
                return Err(ControlError::ProfileMappingNotAllowed {
                    hardware_profile: hardware_profile.name.clone(),
                    software_profile: sw.name.clone(),
                });
            }
        }

        let adapter = self.resolve_adapter(&hardware_profile)?;
        let ctx = AdapterContext::new(self.store.as_ref());

        adapter
            .validate_start_arguments(&ctx, request, &hardware_profile, software_profile.as_ref())
            .await?;
        let nodes = adapter
            .start(&ctx, request, &hardware_profile, software_profile.as_ref())
            .await?;

        info!(
            count = nodes.len(),
            hardware_profile = %hardware_profile.name,
            session = %ctx.add_host_session,
            "nodes added"
        );
        Ok(AddNodesOutcome {
            add_host_session: ctx.add_host_session,
            nodes,
        })
    }

    /// Ask running provisioning for a hardware profile to stop. Provisioning
    /// for other hardware profiles on the same adapter continues.
    ///
    /// # Errors
    ///
    /// Returns `HardwareProfileNotFound` or `OperationFailed`.
    pub fn abort_add_nodes(&self, hardware_profile: &str) -> Result<()> {
        let hardware_profile = self.profiles().hardware_profile(hardware_profile)?;
        self.resolve_adapter(&hardware_profile)?.abort(&hardware_profile);
        info!(hardware_profile = %hardware_profile.name, "provisioning abort requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventSink;
    use corral_adapter::{AdapterCall, MockAdapter};
    use corral_store::RocksStore;
    use tempfile::TempDir;

    struct Setup {
        orchestrator: Orchestrator<RocksStore>,
        mock: Arc<MockAdapter>,
        hw: HardwareProfile,
        sw: SoftwareProfile,
        _dir: TempDir,
    }

    fn setup() -> Setup {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let hw = HardwareProfile::new("rack1", Some("mock"));
        let sw = SoftwareProfile::new("compute");
        store.put_hardware_profile(&hw).unwrap();
        store.put_software_profile(&sw).unwrap();
        store
            .add_profile_mapping(&sw.software_profile_id, &hw.hardware_profile_id)
            .unwrap();

        let mock = Arc::new(MockAdapter::new("mock"));
        let registry = Arc::new(AdapterRegistry::new());
        registry.register(mock.clone());

        Setup {
            orchestrator: Orchestrator::new(store, registry, Arc::new(RecordingEventSink::new())),
            mock,
            hw,
            sw,
            _dir: dir,
        }
    }

    fn add_node(s: &Setup, name: &str) -> Node {
        let mut node = Node::new(name, s.hw.hardware_profile_id, Some(s.sw.software_profile_id));
        node.state = NodeState::Installed;
        s.orchestrator.store().insert_node(&node).unwrap()
    }

    #[test]
    fn resolve_by_name_and_id() {
        let s = setup();
        let n1 = add_node(&s, "n1.cluster");
        let n2 = add_node(&s, "n2.cluster");
        let txn = s.orchestrator.begin();

        let nodes = s
            .orchestrator
            .resolve_nodes(&txn, &NodeSelector::names(["n1", "N2.cluster"]))
            .unwrap();
        assert_eq!(nodes.len(), 2);

        let by_id = s
            .orchestrator
            .resolve_nodes(&txn, &NodeSelector::Ids(vec![n2.node_id, n1.node_id, n2.node_id]))
            .unwrap();
        assert_eq!(by_id.len(), 2);

        let missing = s
            .orchestrator
            .resolve_nodes(&txn, &NodeSelector::names(["n3"]));
        assert!(matches!(missing, Err(ControlError::NodeNotFound(_))));

        let missing_profile = s
            .orchestrator
            .resolve_nodes(&txn, &NodeSelector::SoftwareProfile("nope".into()));
        assert!(matches!(
            missing_profile,
            Err(ControlError::SoftwareProfileNotFound(_))
        ));
    }

    #[test]
    fn resolve_by_mac() {
        let s = setup();
        let mut node = Node::new("n1", s.hw.hardware_profile_id, Some(s.sw.software_profile_id));
        node.nics.push(corral_store::Nic {
            mac: Some("52:54:00:00:00:01".parse().unwrap()),
            boot: true,
            ..corral_store::Nic::default()
        });
        s.orchestrator.store().insert_node(&node).unwrap();
        let txn = s.orchestrator.begin();

        let selector = NodeSelector::macs_from_strs(["52-54-00-00-00-01"]).unwrap();
        let nodes = s.orchestrator.resolve_nodes(&txn, &selector).unwrap();
        assert_eq!(nodes[0].name, "n1");

        let unknown = NodeSelector::macs_from_strs(["52:54:00:00:00:02"]).unwrap();
        assert!(matches!(
            s.orchestrator.resolve_nodes(&txn, &unknown),
            Err(ControlError::NodeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleted_nodes_are_never_selected() {
        let s = setup();
        add_node(&s, "n1");
        add_node(&s, "n2");
        let mut txn = s.orchestrator.begin();

        let report = s
            .orchestrator
            .delete_nodes(&mut txn, &NodeSelector::names(["n1"]))
            .await
            .unwrap();
        assert_eq!(report.succeeded_names(), vec!["n1"]);
        assert_eq!(report.succeeded[0].state, NodeState::Deleted);
        assert_eq!(s.mock.calls(), vec![AdapterCall::Delete(vec!["n1".into()])]);

        let all = s.orchestrator.resolve_nodes(&txn, &NodeSelector::All).unwrap();
        assert_eq!(all.len(), 1);
        assert!(matches!(
            s.orchestrator
                .resolve_nodes(&txn, &NodeSelector::names(["n1"])),
            Err(ControlError::NodeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn missing_adapter_aborts_without_changes() {
        let s = setup();
        let orphan_hw = HardwareProfile::new("rack2", None);
        s.orchestrator.store().put_hardware_profile(&orphan_hw).unwrap();
        let node = s
            .orchestrator
            .store()
            .insert_node(&Node::new("orphan", orphan_hw.hardware_profile_id, None))
            .unwrap();

        let mut txn = s.orchestrator.begin();
        let result = s.orchestrator.idle(&mut txn, vec![node.clone()]).await;
        assert!(matches!(result, Err(ControlError::OperationFailed(_))));
        assert!(txn.is_clean());

        let stored = s.orchestrator.store().get_node(&node.node_id).unwrap().unwrap();
        assert!(!stored.is_idle);

        assert!(matches!(
            s.orchestrator.checkpoint(&txn, &node).await,
            Err(ControlError::OperationFailed(_))
        ));
    }

    #[tokio::test]
    async fn checkpoint_and_migrate_pass_through() {
        let s = setup();
        let node = add_node(&s, "n1");
        let txn = s.orchestrator.begin();

        s.orchestrator.checkpoint(&txn, &node).await.unwrap();
        s.orchestrator.revert_to_checkpoint(&txn, &node).await.unwrap();
        s.orchestrator
            .migrate_node(&txn, &node, &["n2".to_string()], true)
            .await
            .unwrap();
        assert_eq!(
            s.mock.calls(),
            vec![
                AdapterCall::Checkpoint("n1".into()),
                AdapterCall::Revert("n1".into()),
                AdapterCall::Migrate("n1".into(), true),
            ]
        );
    }

    #[tokio::test]
    async fn update_node_and_status() {
        let s = setup();
        let node = add_node(&s, "n1");
        let mut txn = s.orchestrator.begin();

        let request = UpdateNodeRequest {
            tags: Some([("rack".to_string(), "r7".to_string())].into()),
            ..UpdateNodeRequest::default()
        };
        let node = s
            .orchestrator
            .update_node(&mut txn, node, &request)
            .await
            .unwrap();
        assert_eq!(node.tags.get("rack").map(String::as_str), Some("r7"));

        let node = s
            .orchestrator
            .update_node_status(&mut txn, node, Some(NodeState::Provisioned), Some(BootFrom::Local))
            .unwrap();
        assert_eq!(node.state, NodeState::Provisioned);
        assert_eq!(node.boot_from, BootFrom::Local);

        let mut locked = node.clone();
        locked.lock_state = LockState::HardLocked;
        let locked = s
            .orchestrator
            .update_node_status(&mut txn, locked, None, None)
            .unwrap();
        assert!(matches!(
            s.orchestrator
                .update_node_status(&mut txn, locked, Some(NodeState::Installed), None),
            Err(ControlError::NodeLocked(_))
        ));
    }

    #[test]
    fn set_lock_state_commits_changes() {
        let s = setup();
        add_node(&s, "n1");
        add_node(&s, "n2");
        let mut txn = s.orchestrator.begin();

        let report = s
            .orchestrator
            .set_lock_state(&mut txn, &NodeSelector::names(["n1"]), LockState::SoftLocked)
            .unwrap();
        assert_eq!(report.succeeded_names(), vec!["n1"]);

        let report = s
            .orchestrator
            .set_lock_state(&mut txn, &NodeSelector::All, LockState::SoftLocked)
            .unwrap();
        assert_eq!(report.succeeded.len(), 2);
        assert!(report
            .succeeded
            .iter()
            .all(|n| n.lock_state == LockState::SoftLocked));
    }
}
