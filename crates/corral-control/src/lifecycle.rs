//! Node lifecycle predicates.
//!
//! Each check returns the first failing precondition for one node. The
//! orchestrator collects these as [`NodeFailure`]s rather than aborting the
//! batch.
//!
//! # Lock states
//!
//! ```text
//!   Unlocked ──── every operation
//!   SoftLocked ── fallback transfer candidate only
//!   HardLocked ── no lifecycle mutation at all
//! ```

use corral_store::{LockState, Node, NodeState, SoftwareProfile};

use crate::types::{FailureKind, NodeFailure};

/// Outcome of a single-node check.
pub type Check = std::result::Result<(), NodeFailure>;

/// Returns true if the node is soft or hard locked.
#[must_use]
pub fn is_locked(node: &Node) -> bool {
    node.lock_state != LockState::Unlocked
}

/// Returns true if the node is hard locked.
#[must_use]
pub fn is_hard_locked(node: &Node) -> bool {
    node.lock_state == LockState::HardLocked
}

/// Returns true if the node is in service.
#[must_use]
pub fn is_installed(node: &Node) -> bool {
    node.state == NodeState::Installed
}

/// Check that `node` may move to `destination`.
///
/// The checks run in a fixed order: profile mapping, installed state
/// (skipped when `force` is set), same profile, lock. `allow_soft_locked`
/// admits soft-locked nodes picked as fallback candidates by a
/// count-based transfer.
///
/// # Errors
///
/// Returns the first failing check.
pub fn check_transfer(
    node: &Node,
    destination: &SoftwareProfile,
    usable: bool,
    force: bool,
    allow_soft_locked: bool,
) -> Check {
    if !usable {
        return Err(NodeFailure::new(
            node,
            FailureKind::ProfileMappingNotAllowed,
            format!(
                "hardware profile of node is not usable with software profile [{}]",
                destination.name
            ),
        ));
    }

    if !force && !is_installed(node) {
        return Err(NodeFailure::new(
            node,
            FailureKind::NodeTransferNotValid,
            format!("node is in state [{}], not Installed", node.state),
        ));
    }

    if node.software_profile_id == Some(destination.software_profile_id) {
        return Err(NodeFailure::new(
            node,
            FailureKind::NodeTransferNotValid,
            format!("node is already on software profile [{}]", destination.name),
        ));
    }

    let locked = match node.lock_state {
        LockState::Unlocked => false,
        LockState::SoftLocked => !allow_soft_locked,
        LockState::HardLocked => true,
    };
    if locked {
        return Err(NodeFailure::new(
            node,
            FailureKind::NodeSoftwareProfileLocked,
            format!("node is {}", node.lock_state),
        ));
    }

    Ok(())
}

/// Check that `node` may be idled.
///
/// # Errors
///
/// Returns `NodeAlreadyIdle` or `NodeSoftwareProfileLocked`.
pub fn check_idle(node: &Node) -> Check {
    if node.is_idle {
        return Err(NodeFailure::new(
            node,
            FailureKind::NodeAlreadyIdle,
            "node is already idle",
        ));
    }
    if is_locked(node) {
        return Err(NodeFailure::new(
            node,
            FailureKind::NodeSoftwareProfileLocked,
            format!("node is {}", node.lock_state),
        ));
    }
    Ok(())
}

/// Check that an idle node may be activated on `destination`.
///
/// Whether the node is idle at all is checked by the caller before the
/// destination is resolved.
///
/// # Errors
///
/// Returns `InvalidArgument`, `NodeSoftwareProfileLocked` or
/// `ProfileMappingNotAllowed`.
pub fn check_activate(node: &Node, destination: &SoftwareProfile, usable: bool) -> Check {
    if destination.is_idle {
        return Err(NodeFailure::new(
            node,
            FailureKind::InvalidArgument,
            format!(
                "cannot activate node on idle software profile [{}]",
                destination.name
            ),
        ));
    }
    if is_locked(node) {
        return Err(NodeFailure::new(
            node,
            FailureKind::NodeSoftwareProfileLocked,
            format!("node is {}", node.lock_state),
        ));
    }
    if !usable {
        return Err(NodeFailure::new(
            node,
            FailureKind::ProfileMappingNotAllowed,
            format!(
                "hardware profile of node is not usable with software profile [{}]",
                destination.name
            ),
        ));
    }
    Ok(())
}

/// Check that the node is idle, as activation requires.
///
/// # Errors
///
/// Returns `NodeAlreadyActive` if the node is not idle.
pub fn check_is_idle(node: &Node) -> Check {
    if node.is_idle {
        Ok(())
    } else {
        Err(NodeFailure::new(
            node,
            FailureKind::NodeAlreadyActive,
            "node is already active",
        ))
    }
}

/// Check that the orchestrator may power-manage the node.
///
/// # Errors
///
/// Returns `NodeSoftwareProfileLocked` for hard-locked nodes.
pub fn check_power(node: &Node) -> Check {
    if is_hard_locked(node) {
        return Err(NodeFailure::new(
            node,
            FailureKind::NodeSoftwareProfileLocked,
            "node is HardLocked",
        ));
    }
    Ok(())
}

/// Check that the node may be deleted.
///
/// # Errors
///
/// Returns `NodeSoftwareProfileLocked` for any locked node.
pub fn check_delete(node: &Node) -> Check {
    if is_locked(node) {
        return Err(NodeFailure::new(
            node,
            FailureKind::NodeSoftwareProfileLocked,
            format!("node is {}, unlock it before deleting", node.lock_state),
        ));
    }
    Ok(())
}
