//! Branchpoint clusters.
//!
//! Skeleton junctions often arrive as several mutually adjacent
//! branchpoints rather than a single pixel. The walker treats such a
//! cluster as one junction: every member becomes a node and the links
//! leaving the junction start from the cluster's emanators.

use std::collections::BTreeSet;

use crate::branchpoint::Classifier;
use crate::neighbor::neighbors_on;
use crate::raster::Skeleton;
use crate::types::SkeletonError;

/// All branchpoints 8-connected (transitively) to `seed`, including
/// `seed` itself. `seed` is kept even if the classifier would reject
/// it; the caller has already decided it is a junction pixel.
///
/// # Errors
///
/// Propagates [`SkeletonError::WindowOverflow`] from classification.
pub fn branchpoint_cluster(
    classifier: &mut Classifier<'_>,
    seed: usize,
) -> Result<BTreeSet<usize>, SkeletonError> {
    let skel = classifier.skeleton();
    let mut cluster = BTreeSet::from([seed]);
    let mut worklist: BTreeSet<usize> =
        neighbors_on(skel.buf(), skel.width(), seed).into_iter().collect();

    while let Some(pixel) = worklist.pop_first() {
        if cluster.contains(&pixel) || !classifier.is_branchpoint(pixel)? {
            continue;
        }
        cluster.insert(pixel);
        for n in neighbors_on(skel.buf(), skel.width(), pixel) {
            if !cluster.contains(&n) {
                worklist.insert(n);
            }
        }
    }
    Ok(cluster)
}

/// Pixels adjacent to a cluster but not part of it: the first pixel of
/// every link leaving the junction.
#[must_use]
pub fn emanators(skel: &Skeleton, cluster: &BTreeSet<usize>) -> BTreeSet<usize> {
    let mut out = BTreeSet::new();
    for &bp in cluster {
        out.extend(neighbors_on(skel.buf(), skel.width(), bp));
    }
    for bp in cluster {
        out.remove(bp);
    }
    out
}
