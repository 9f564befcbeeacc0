//! Node state change notifications.
//!
//! Events are fired only after the change they describe has been committed.
//! Delivery is best-effort: a sink never reports failure back to the
//! orchestrator.

use corral_store::{Node, NodeState};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Payload of a node state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStateChanged {
    /// The node after the change.
    pub node: serde_json::Value,
    /// The state before the change.
    pub previous_state: String,
}

impl NodeStateChanged {
    /// Build the event for a committed node. Returns `None` if the node
    /// cannot be serialized.
    #[must_use]
    pub fn new(node: &Node, previous_state: &NodeState) -> Option<Self> {
        match serde_json::to_value(node) {
            Ok(value) => Some(Self {
                node: value,
                previous_state: previous_state.to_string(),
            }),
            Err(e) => {
                warn!(node = %node.name, error = %e, "failed to serialize node for event");
                None
            }
        }
    }

    /// Name of the node in the payload.
    #[must_use]
    pub fn node_name(&self) -> Option<&str> {
        self.node.get("name").and_then(serde_json::Value::as_str)
    }

    /// State of the node in the payload.
    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.node.get("state").and_then(serde_json::Value::as_str)
    }
}

/// Receives node state change events.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    fn fire(&self, event: NodeStateChanged);
}

/// Logs events and drops them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn fire(&self, event: NodeStateChanged) {
        info!(
            node = event.node_name().unwrap_or_default(),
            previous_state = %event.previous_state,
            state = event.state().unwrap_or_default(),
            "node state changed"
        );
    }
}

/// Publishes events on a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<NodeStateChanged>,
}

impl BroadcastEventSink {
    /// Create a sink with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events fired from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<NodeStateChanged> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn fire(&self, event: NodeStateChanged) {
        if self.sender.send(event).is_err() {
            debug!("no event subscribers");
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use recording::RecordingEventSink;

#[cfg(any(test, feature = "test-utils"))]
mod recording {
    use parking_lot::Mutex;

    use super::{EventSink, NodeStateChanged};

    /// Keeps every event in memory.
    #[derive(Debug, Default)]
    pub struct RecordingEventSink {
        events: Mutex<Vec<NodeStateChanged>>,
    }

    impl RecordingEventSink {
        /// Create an empty sink.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// All events fired so far.
        #[must_use]
        pub fn events(&self) -> Vec<NodeStateChanged> {
            self.events.lock().clone()
        }

        /// Names of the nodes events were fired for, in order.
        #[must_use]
        pub fn node_names(&self) -> Vec<String> {
            self.events
                .lock()
                .iter()
                .filter_map(|e| e.node_name().map(ToString::to_string))
                .collect()
        }

        /// Forget recorded events.
        pub fn clear(&self) {
            self.events.lock().clear();
        }
    }

    impl EventSink for RecordingEventSink {
        fn fire(&self, event: NodeStateChanged) {
            self.events.lock().push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::HardwareProfileId;

    #[tokio::test]
    async fn broadcast_delivers_payload() {
        let sink = BroadcastEventSink::new(8);
        let mut rx = sink.subscribe();

        let mut node = Node::new("n1", HardwareProfileId::generate(), None);
        node.state = NodeState::Installed;
        sink.fire(NodeStateChanged::new(&node, &NodeState::Discovered).unwrap());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.node_name(), Some("n1"));
        assert_eq!(event.state(), Some("Installed"));
        assert_eq!(event.previous_state, "Discovered");
    }

    #[test]
    fn firing_without_subscribers_is_fine() {
        let sink = BroadcastEventSink::new(1);
        let node = Node::new("n1", HardwareProfileId::generate(), None);
        sink.fire(NodeStateChanged::new(&node, &NodeState::Installed).unwrap());
        TracingEventSink.fire(NodeStateChanged::new(&node, &NodeState::Installed).unwrap());
    }
}
