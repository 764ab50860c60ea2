//! Shared types for the skeleton resolution pipeline.

use std::collections::BTreeMap;
use std::fmt;

use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can hand masks to this
/// crate without depending on `image` directly.
pub use image::GrayImage;

/// Identifier of a node in the resolved graph.
///
/// Ids are dense, monotonically increasing, and stable for a given input
/// raster. They are never reused, even after duplicate-link removal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The raw integer behind this id.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Identifier of a link in the resolved graph.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LinkId(pub(crate) usize);

impl LinkId {
    /// The raw integer behind this id.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{}", self.0)
    }
}

/// A junction or endpoint pixel of the skeleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Flat row-major pixel index of the node within the raster.
    pub idx: usize,
    /// Ids of the links incident on this node, in discovery order.
    pub conn: Vec<LinkId>,
}

/// An ordered pixel chain between two nodes with no internal branching.
///
/// `idx` runs from the start node's pixel to the end node's pixel, so
/// `idx[0]` is the pixel of `conn[0]` and `idx[last]` the pixel of
/// `conn[1]`. A link that starts and ends at the same node (a loop)
/// lists that node twice in `conn`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Flat row-major pixel indices of the chain, in walk order.
    pub idx: Vec<usize>,
    /// The node at each end; the second entry appears once the walk
    /// terminates.
    pub conn: Vec<NodeId>,
}

/// The resolved topological graph of a skeleton raster.
///
/// Pixel indices are flat row-major offsets into the caller's original
/// (unpadded) mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkeletonGraph {
    width: u32,
    height: u32,
    nodes: BTreeMap<NodeId, Node>,
    links: BTreeMap<LinkId, Link>,
}

impl SkeletonGraph {
    pub(crate) const fn new(
        width: u32,
        height: u32,
        nodes: BTreeMap<NodeId, Node>,
        links: BTreeMap<LinkId, Link>,
    ) -> Self {
        Self {
            width,
            height,
            nodes,
            links,
        }
    }

    /// Width of the source raster in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height of the source raster in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of links in the graph.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Iterate over all nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().map(|(&id, n)| (id, n))
    }

    /// Iterate over all links in id order.
    pub fn links(&self) -> impl Iterator<Item = (LinkId, &Link)> {
        self.links.iter().map(|(&id, l)| (id, l))
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Look up a link by id.
    #[must_use]
    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    /// Find the node registered at a given pixel index, if any.
    #[must_use]
    pub fn node_at(&self, pixel: usize) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, n)| n.idx == pixel)
            .map(|(&id, _)| id)
    }

    /// Degree of a node: the number of incident links.
    #[must_use]
    pub fn degree(&self, id: NodeId) -> Option<usize> {
        self.nodes.get(&id).map(|n| n.conn.len())
    }

    /// Convert to a `petgraph` undirected graph for downstream network
    /// analysis. Node weights are [`NodeId`]s and edge weights the
    /// [`LinkId`] of the pixel chain they stand for; unresolved links
    /// (which cannot occur in a fully resolved graph) are skipped.
    #[must_use]
    pub fn to_petgraph(&self) -> UnGraph<NodeId, LinkId> {
        let mut graph = UnGraph::new_undirected();
        let mut index_of: BTreeMap<NodeId, NodeIndex> = BTreeMap::new();
        for (&id, _) in &self.nodes {
            index_of.insert(id, graph.add_node(id));
        }
        for (&id, link) in &self.links {
            if let (Some(&a), Some(&b)) = (
                link.conn.first().and_then(|n| index_of.get(n)),
                link.conn.get(1).and_then(|n| index_of.get(n)),
            ) {
                graph.add_edge(a, b, id);
            }
        }
        graph
    }
}

/// Configuration for skeleton resolution.
///
/// All parameters have defaults suitable for well-formed, properly
/// skeletonized masks; the caps exist so degenerate inputs surface as
/// structured errors instead of unbounded work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveConfig {
    /// Upper bound on either dimension of the adaptive analysis window
    /// used by the branchpoint classifier. A junction whose
    /// over-connected component cannot be enclosed within this bound is
    /// reported as [`SkeletonError::WindowOverflow`].
    pub max_window: usize,

    /// Hard cap on total walk iterations. `None` derives a generous
    /// cap from the raster size. Exceeding the cap is reported as
    /// [`SkeletonError::IterationLimit`].
    pub max_iterations: Option<usize>,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            max_window: 51,
            max_iterations: None,
        }
    }
}

/// Errors that can occur during skeleton resolution.
#[derive(Debug, thiserror::Error)]
pub enum SkeletonError {
    /// The classifier's adaptive window grew past the configured bound,
    /// meaning the local topology around the pixel is degenerate.
    #[error(
        "branchpoint analysis window around pixel {idx} exceeded the \
         {limit}-pixel bound"
    )]
    WindowOverflow {
        /// Flat pixel index being classified.
        idx: usize,
        /// The configured `max_window` bound.
        limit: usize,
    },

    /// The walk failed to converge within the iteration cap, which on a
    /// well-formed skeleton cannot happen.
    #[error("skeleton walk did not converge within {0} iterations")]
    IterationLimit(usize),

    /// The input raster contains no on pixels.
    #[error("skeleton raster contains no on pixels")]
    EmptySkeleton,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn id_display() {
        assert_eq!(NodeId(3).to_string(), "n3");
        assert_eq!(LinkId(7).to_string(), "l7");
    }

    #[test]
    fn config_defaults() {
        let config = ResolveConfig::default();
        assert_eq!(config.max_window, 51);
        assert!(config.max_iterations.is_none());
    }

    #[test]
    fn config_serde_round_trip() {
        let config = ResolveConfig {
            max_window: 31,
            max_iterations: Some(10_000),
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ResolveConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn error_display() {
        let err = SkeletonError::WindowOverflow { idx: 42, limit: 51 };
        assert_eq!(
            err.to_string(),
            "branchpoint analysis window around pixel 42 exceeded the 51-pixel bound"
        );
        assert_eq!(
            SkeletonError::EmptySkeleton.to_string(),
            "skeleton raster contains no on pixels"
        );
    }

    #[test]
    fn graph_serde_round_trip() {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            NodeId(0),
            Node {
                idx: 5,
                conn: vec![LinkId(0)],
            },
        );
        nodes.insert(
            NodeId(1),
            Node {
                idx: 9,
                conn: vec![LinkId(0)],
            },
        );
        let mut links = BTreeMap::new();
        links.insert(
            LinkId(0),
            Link {
                idx: vec![5, 6, 7, 8, 9],
                conn: vec![NodeId(0), NodeId(1)],
            },
        );
        let graph = SkeletonGraph::new(5, 3, nodes, links);

        let json = serde_json::to_string(&graph).unwrap();
        let back: SkeletonGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(graph, back);
    }

    #[test]
    fn petgraph_conversion() {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            NodeId(0),
            Node {
                idx: 0,
                conn: vec![LinkId(0)],
            },
        );
        nodes.insert(
            NodeId(1),
            Node {
                idx: 4,
                conn: vec![LinkId(0)],
            },
        );
        let mut links = BTreeMap::new();
        links.insert(
            LinkId(0),
            Link {
                idx: vec![0, 1, 2, 3, 4],
                conn: vec![NodeId(0), NodeId(1)],
            },
        );
        let graph = SkeletonGraph::new(5, 1, nodes, links);

        let pg = graph.to_petgraph();
        assert_eq!(pg.node_count(), 2);
        assert_eq!(pg.edge_count(), 1);
    }

    #[test]
    fn node_at_finds_pixel() {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            NodeId(0),
            Node {
                idx: 12,
                conn: vec![],
            },
        );
        let graph = SkeletonGraph::new(4, 4, nodes, BTreeMap::new());
        assert_eq!(graph.node_at(12), Some(NodeId(0)));
        assert_eq!(graph.node_at(13), None);
    }
}
