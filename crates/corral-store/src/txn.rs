//! Request-scoped unit of work over a [`Store`].
//!
//! A transaction stages node mutations in memory. Reads through the
//! transaction see staged copies; [`Transaction::commit`] writes them in one
//! atomic [`Store::commit_nodes`] call, which fails with
//! [`StoreError::Conflict`](crate::StoreError::Conflict) if any node changed
//! since it was read. The transaction stays usable after a commit.

use std::collections::BTreeMap;

use corral_core::NodeId;
use tracing::debug;

use crate::error::Result;
use crate::types::Node;
use crate::Store;

/// A request-scoped unit of work.
pub struct Transaction<'a> {
    store: &'a dyn Store,
    staged: BTreeMap<NodeId, Node>,
}

impl<'a> Transaction<'a> {
    /// Begin a transaction against a store.
    #[must_use]
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            staged: BTreeMap::new(),
        }
    }

    /// The underlying store, for reads that bypass staged nodes.
    #[must_use]
    pub fn store(&self) -> &'a dyn Store {
        self.store
    }

    /// Read a node, preferring the staged copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn node(&self, node_id: &NodeId) -> Result<Option<Node>> {
        if let Some(node) = self.staged.get(node_id) {
            return Ok(Some(node.clone()));
        }
        self.store.get_node(node_id)
    }

    /// Run a store query and replace results with their staged copies.
    ///
    /// # Errors
    ///
    /// Returns whatever error the query returns.
    pub fn query<F>(&self, fetch: F) -> Result<Vec<Node>>
    where
        F: FnOnce(&dyn Store) -> Result<Vec<Node>>,
    {
        Ok(self.overlay(fetch(self.store)?))
    }

    /// Replace nodes with their staged copies.
    #[must_use]
    pub fn overlay(&self, nodes: Vec<Node>) -> Vec<Node> {
        nodes
            .into_iter()
            .map(|node| self.staged.get(&node.node_id).cloned().unwrap_or(node))
            .collect()
    }

    /// Stage a modified node for the next commit.
    pub fn stage(&mut self, node: Node) {
        self.staged.insert(node.node_id, node);
    }

    /// Stage several modified nodes.
    pub fn stage_all(&mut self, nodes: impl IntoIterator<Item = Node>) {
        for node in nodes {
            self.stage(node);
        }
    }

    /// Returns true if nothing is staged.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty()
    }

    /// Write all staged nodes atomically and return the committed copies.
    ///
    /// On error nothing is written and the staged nodes are discarded.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if a staged node was modified
    /// concurrently, or any other error from [`Store::commit_nodes`].
    pub fn commit(&mut self) -> Result<Vec<Node>> {
        if self.staged.is_empty() {
            return Ok(Vec::new());
        }
        let staged: Vec<Node> = std::mem::take(&mut self.staged).into_values().collect();
        let committed = self.store.commit_nodes(&staged)?;
        debug!(count = committed.len(), "transaction committed");
        Ok(committed)
    }

    /// Discard all staged nodes.
    pub fn rollback(&mut self) {
        if !self.staged.is_empty() {
            debug!(count = self.staged.len(), "transaction rolled back");
        }
        self.staged.clear();
    }
}
