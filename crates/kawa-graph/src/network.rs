//! The graph under construction.
//!
//! [`Network`] holds the node and link arenas while the walker runs,
//! together with the queue of links that still need walking. All
//! mutators are idempotent and total: repeating a registration changes
//! nothing, and operations on ids that do not exist are no-ops, so the
//! walker never has to guard its bookkeeping calls.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::raster::Skeleton;
use crate::types::{Link, LinkId, Node, NodeId, SkeletonGraph};

/// Insertion-ordered set of links still awaiting a walk.
///
/// Removal just drops the id from the membership set; the order list is
/// cleaned lazily when the front is read. This keeps both operations
/// cheap while preserving first-enqueued-first-walked order.
#[derive(Debug, Default)]
struct PendingLinks {
    order: Vec<LinkId>,
    members: HashSet<LinkId>,
    head: usize,
}

impl PendingLinks {
    fn insert(&mut self, id: LinkId) {
        if self.members.insert(id) {
            self.order.push(id);
        }
    }

    fn remove(&mut self, id: LinkId) {
        self.members.remove(&id);
    }

    fn contains(&self, id: LinkId) -> bool {
        self.members.contains(&id)
    }

    fn first(&mut self) -> Option<LinkId> {
        while let Some(&id) = self.order.get(self.head) {
            if self.members.contains(&id) {
                return Some(id);
            }
            self.head += 1;
        }
        None
    }

    fn len(&self) -> usize {
        self.members.len()
    }
}

/// Mutable node/link store used while resolving a skeleton.
#[derive(Debug, Default)]
pub struct Network {
    nodes: BTreeMap<NodeId, Node>,
    links: BTreeMap<LinkId, Link>,
    node_at: HashMap<usize, NodeId>,
    next_node: usize,
    next_link: usize,
    pending: PendingLinks,
}

impl Network {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a link id without registering a link. Ids are handed
    /// out in increasing order and never reused.
    pub fn fresh_link_id(&mut self) -> LinkId {
        let id = LinkId(self.next_link);
        self.next_link += 1;
        id
    }

    /// Register (or look up) the node at `pixel` and record `link` as
    /// incident on it. Calling this again with the same arguments
    /// changes nothing.
    pub fn update_node(&mut self, pixel: usize, link: LinkId) -> NodeId {
        let id = self.ensure_node(pixel);
        if let Some(node) = self.nodes.get_mut(&id) {
            if !node.conn.contains(&link) {
                node.conn.push(link);
            }
        }
        id
    }

    /// Register the node at `pixel` if it does not exist yet.
    pub fn ensure_node(&mut self, pixel: usize) -> NodeId {
        if let Some(&id) = self.node_at.get(&pixel) {
            return id;
        }
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.node_at.insert(pixel, id);
        self.nodes.insert(
            id,
            Node {
                idx: pixel,
                conn: Vec::new(),
            },
        );
        id
    }

    /// Register a link under a previously allocated id, seeding its
    /// chain with `pixels` and its first endpoint with `node`. If the
    /// link already exists its chain is left alone and `node` is only
    /// recorded when no endpoint has been set yet.
    pub fn init_link(&mut self, id: LinkId, pixels: &[usize], node: NodeId) {
        let link = self.links.entry(id).or_insert_with(|| Link {
            idx: Vec::new(),
            conn: Vec::new(),
        });
        if link.idx.is_empty() {
            link.idx.extend_from_slice(pixels);
        }
        if link.conn.is_empty() {
            link.conn.push(node);
        }
    }

    /// Append a pixel to a link's chain. Appending the pixel already at
    /// the end of the chain, or appending to an unknown link, is a
    /// no-op.
    pub fn push_pixel(&mut self, id: LinkId, pixel: usize) {
        if let Some(link) = self.links.get_mut(&id) {
            if link.idx.last() != Some(&pixel) {
                link.idx.push(pixel);
            }
        }
    }

    /// Record the terminating endpoint of a link. Links keep at most
    /// two endpoints; once both are set further calls change nothing.
    pub fn finalize_link(&mut self, id: LinkId, node: NodeId) {
        if let Some(link) = self.links.get_mut(&id) {
            if link.conn.len() < 2 {
                link.conn.push(node);
            }
        }
    }

    /// Remove a link entirely: drop it from the arena, from the pending
    /// queue, and from the incidence lists of its endpoint nodes. Nodes
    /// left with no incident links stay registered. Unknown ids are a
    /// no-op.
    pub fn delete_link(&mut self, id: LinkId) {
        let Some(link) = self.links.remove(&id) else {
            return;
        };
        self.pending.remove(id);
        for node_id in link.conn {
            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.conn.retain(|&l| l != id);
            }
        }
    }

    /// The pixel chain of a link; empty for unknown ids.
    #[must_use]
    pub fn chain(&self, id: LinkId) -> &[usize] {
        self.links.get(&id).map_or(&[], |l| &l.idx)
    }

    /// The endpoint nodes recorded so far for a link.
    #[must_use]
    pub fn endpoints(&self, id: LinkId) -> &[NodeId] {
        self.links.get(&id).map_or(&[], |l| &l.conn)
    }

    /// Look up the node registered at a pixel, if any.
    #[must_use]
    pub fn node_id_at(&self, pixel: usize) -> Option<NodeId> {
        self.node_at.get(&pixel).copied()
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Ids of the links incident on the node at `pixel`; empty when no
    /// node is registered there.
    #[must_use]
    pub fn links_at(&self, pixel: usize) -> Vec<LinkId> {
        self.node_at
            .get(&pixel)
            .and_then(|id| self.nodes.get(id))
            .map_or_else(Vec::new, |n| n.conn.clone())
    }

    /// Queue a link for walking. Re-queueing a queued link changes
    /// nothing.
    pub fn enqueue(&mut self, id: LinkId) {
        self.pending.insert(id);
    }

    /// The oldest link still awaiting a walk.
    pub fn pending_first(&mut self) -> Option<LinkId> {
        self.pending.first()
    }

    /// Drop a link from the pending queue without deleting it.
    pub fn pending_remove(&mut self, id: LinkId) {
        self.pending.remove(id);
    }

    /// Whether a link is still awaiting a walk.
    #[must_use]
    pub fn is_pending(&self, id: LinkId) -> bool {
        self.pending.contains(id)
    }

    /// Number of links awaiting a walk.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Freeze into the public graph, remapping every pixel index from
    /// the padded working raster back to the caller's coordinates.
    #[must_use]
    pub fn into_graph(self, skel: &Skeleton, width: u32, height: u32) -> SkeletonGraph {
        let nodes = self
            .nodes
            .into_iter()
            .map(|(id, mut node)| {
                node.idx = skel.unpad_index(node.idx);
                (id, node)
            })
            .collect();
        let links = self
            .links
            .into_iter()
            .map(|(id, mut link)| {
                for idx in &mut link.idx {
                    *idx = skel.unpad_index(*idx);
                }
                (id, link)
            })
            .collect();
        SkeletonGraph::new(width, height, nodes, links)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn node_registration_is_idempotent() {
        let mut net = Network::new();
        let link = net.fresh_link_id();
        let a = net.update_node(10, link);
        let b = net.update_node(10, link);
        assert_eq!(a, b);
        assert_eq!(net.node(a).unwrap().conn, vec![link]);
    }

    #[test]
    fn distinct_pixels_get_distinct_nodes() {
        let mut net = Network::new();
        let a = net.ensure_node(10);
        let b = net.ensure_node(11);
        assert_ne!(a, b);
        assert_eq!(net.node_id_at(10), Some(a));
        assert_eq!(net.node_id_at(11), Some(b));
    }

    #[test]
    fn link_ids_are_never_reused() {
        let mut net = Network::new();
        let a = net.fresh_link_id();
        let n = net.ensure_node(1);
        net.init_link(a, &[1], n);
        net.delete_link(a);
        let b = net.fresh_link_id();
        assert_ne!(a, b);
    }

    #[test]
    fn init_link_does_not_clobber() {
        let mut net = Network::new();
        let id = net.fresh_link_id();
        let n0 = net.update_node(5, id);
        net.init_link(id, &[5, 6], n0);
        let n1 = net.ensure_node(99);
        net.init_link(id, &[7, 8], n1);
        assert_eq!(net.chain(id), &[5, 6]);
        assert_eq!(net.endpoints(id), &[n0]);
    }

    #[test]
    fn push_pixel_skips_duplicate_tail() {
        let mut net = Network::new();
        let id = net.fresh_link_id();
        let n = net.update_node(5, id);
        net.init_link(id, &[5], n);
        net.push_pixel(id, 6);
        net.push_pixel(id, 6);
        net.push_pixel(id, 7);
        assert_eq!(net.chain(id), &[5, 6, 7]);
    }

    #[test]
    fn finalize_caps_endpoints_at_two() {
        let mut net = Network::new();
        let id = net.fresh_link_id();
        let n0 = net.update_node(0, id);
        net.init_link(id, &[0], n0);
        let n1 = net.update_node(9, id);
        net.finalize_link(id, n1);
        let n2 = net.ensure_node(50);
        net.finalize_link(id, n2);
        assert_eq!(net.endpoints(id), &[n0, n1]);
    }

    #[test]
    fn delete_link_cleans_node_incidence() {
        let mut net = Network::new();
        let id = net.fresh_link_id();
        let n0 = net.update_node(0, id);
        let n1 = net.update_node(9, id);
        net.init_link(id, &[0], n0);
        net.finalize_link(id, n1);
        net.enqueue(id);

        net.delete_link(id);
        assert!(net.chain(id).is_empty());
        assert!(net.node(n0).unwrap().conn.is_empty());
        assert!(net.node(n1).unwrap().conn.is_empty());
        assert!(!net.is_pending(id));
        // The nodes themselves survive at degree zero.
        assert_eq!(net.node_id_at(0), Some(n0));
    }

    #[test]
    fn mutators_are_total_on_unknown_ids() {
        let mut net = Network::new();
        let ghost = LinkId(999);
        net.push_pixel(ghost, 1);
        net.finalize_link(ghost, NodeId(0));
        net.delete_link(ghost);
        assert!(net.chain(ghost).is_empty());
        assert!(net.endpoints(ghost).is_empty());
    }

    #[test]
    fn pending_preserves_insertion_order() {
        let mut net = Network::new();
        let a = net.fresh_link_id();
        let b = net.fresh_link_id();
        let c = net.fresh_link_id();
        net.enqueue(a);
        net.enqueue(b);
        net.enqueue(c);
        net.enqueue(a);

        assert_eq!(net.pending_first(), Some(a));
        net.pending_remove(a);
        assert_eq!(net.pending_first(), Some(b));
        net.pending_remove(b);
        net.pending_remove(c);
        assert_eq!(net.pending_first(), None);
        assert_eq!(net.pending_len(), 0);
    }

    #[test]
    fn into_graph_remaps_padded_indices() {
        use crate::raster::PAD;
        use image::{GrayImage, Luma};

        let mut img = GrayImage::new(3, 1);
        for x in 0..3 {
            img.put_pixel(x, 0, Luma([255]));
        }
        let skel = Skeleton::from_mask(&img);
        let start = skel.index(PAD, PAD);

        let mut net = Network::new();
        let id = net.fresh_link_id();
        let n0 = net.update_node(start, id);
        net.init_link(id, &[start], n0);
        net.push_pixel(id, start + 1);
        net.push_pixel(id, start + 2);
        let n1 = net.update_node(start + 2, id);
        net.finalize_link(id, n1);

        let graph = net.into_graph(&skel, 3, 1);
        let (_, link) = graph.links().next().unwrap();
        assert_eq!(link.idx, vec![0, 1, 2]);
        assert_eq!(graph.node(n0).unwrap().idx, 0);
        assert_eq!(graph.node(n1).unwrap().idx, 2);
    }
}
