//! Validity propagation from a changed node up to the root.

use tracing::trace;

use crate::model::{NodeId, NodeKind, ParameterTree, ValidityEvent};
use crate::serialize::active_children;
use crate::validate::Validity;
use crate::TreeError;

impl ParameterTree {
    /// Recompute `id` and every ancestor, notifying each node's observers.
    ///
    /// Branches only ever become `Valid` or `Unset`; `Invalid` stays on leaves.
    pub fn recompute_validity(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.get(id)?;
        let mut current = Some(id);
        while let Some(node_id) = current {
            let validity = self.local_validity(node_id);
            let node = &mut self.nodes[node_id.0];
            trace!(node = %node.name, validity = %validity, "recomputed validity");
            node.validity = validity.clone();
            current = node.parent;
            self.notify(node_id, validity);
        }
        Ok(())
    }

    /// Recompute every node bottom-up. Observers are not notified.
    pub fn revalidate_all(&mut self) {
        let order = self.descendants(self.root);
        for id in order.into_iter().rev() {
            let validity = self.local_validity(id);
            self.nodes[id.0].validity = validity;
        }
    }

    fn local_validity(&self, id: NodeId) -> Validity {
        let node = &self.nodes[id.0];
        if !node.enabled {
            return Validity::Unset;
        }
        match &node.kind {
            NodeKind::Leaf(leaf) if !leaf.has_input() => Validity::Valid,
            NodeKind::Leaf(leaf) => leaf.verdict().clone(),
            NodeKind::Branch { .. } => {
                let mut considered = active_children(self, id).peekable();
                if considered.peek().is_none() {
                    return Validity::Unset;
                }
                if considered.all(|child| self.nodes[child.0].validity.is_valid()) {
                    Validity::Valid
                } else {
                    Validity::Unset
                }
            }
        }
    }

    fn notify(&mut self, node: NodeId, validity: Validity) {
        if let Some(observers) = self.observers.get_mut(&node) {
            let event = ValidityEvent { node, validity };
            for observer in observers.iter_mut() {
                observer(&event);
            }
        }
    }
}
