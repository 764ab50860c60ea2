//! Convert a skeletonized binary mask into a topological node/link
//! graph.
//!
//! The input is a 1-px-wide skeleton raster ([`GrayImage`], nonzero is
//! on). Resolution walks the skeleton pixel by pixel: junctions are
//! classified into a parsimonious set of branchpoints, links are
//! ordered pixel chains between nodes, and the result is a
//! [`SkeletonGraph`] whose indices refer to the caller's raster.
//!
//! ```no_run
//! use kawa_graph::{skeleton_to_graph, GrayImage, ResolveConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mask = GrayImage::new(64, 64);
//! let graph = skeleton_to_graph(&mask, &ResolveConfig::default())?;
//! for (id, node) in graph.nodes() {
//!     println!("{id}: pixel {} degree {}", node.idx, node.conn.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod branchpoint;
pub mod cluster;
pub mod neighbor;
pub mod network;
pub mod raster;
pub mod types;
pub mod walker;

pub use branchpoint::Classifier;
pub use raster::Skeleton;
pub use types::{
    GrayImage, Link, LinkId, Node, NodeId, ResolveConfig, SkeletonError, SkeletonGraph,
};

/// Resolve a skeleton mask into its node/link graph.
///
/// # Errors
///
/// Returns [`SkeletonError::EmptySkeleton`] when the mask has no
/// nonzero pixels, [`SkeletonError::WindowOverflow`] when a junction
/// is too degenerate to classify within `config.max_window`, and
/// [`SkeletonError::IterationLimit`] when the walk exceeds the
/// configured cap.
pub fn skeleton_to_graph(
    mask: &GrayImage,
    config: &ResolveConfig,
) -> Result<SkeletonGraph, SkeletonError> {
    let skel = Skeleton::from_mask(mask);
    if skel.on_pixels().next().is_none() {
        return Err(SkeletonError::EmptySkeleton);
    }
    let mut classifier = Classifier::new(&skel, config.max_window);
    let net = walker::resolve(&mut classifier, config)?;
    Ok(net.into_graph(&skel, mask.width(), mask.height()))
}
