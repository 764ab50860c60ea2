//! The link walker.
//!
//! Resolution is a single synchronous loop over a pending-link queue.
//! Each pending link is extended one pixel at a time until it hits a
//! dead end (endpoint node) or a branchpoint. Branchpoints spawn the
//! links leaving their cluster back onto the queue, so the walk
//! discovers the network as it goes; the loop converges when the queue
//! empties.

use std::collections::{BTreeSet, HashSet};

use crate::branchpoint::Classifier;
use crate::cluster::{branchpoint_cluster, emanators};
use crate::neighbor::{apply_offset, neighbors_on, no_turnaround, walkable_neighbors};
use crate::network::Network;
use crate::types::{LinkId, ResolveConfig, SkeletonError};

/// Walk the whole skeleton into a [`Network`].
///
/// # Errors
///
/// Returns [`SkeletonError::EmptySkeleton`] for a raster with no on
/// pixels, [`SkeletonError::WindowOverflow`] when a junction cannot be
/// classified, and [`SkeletonError::IterationLimit`] when the walk
/// fails to converge within the configured cap.
pub fn resolve(
    classifier: &mut Classifier<'_>,
    config: &ResolveConfig,
) -> Result<Network, SkeletonError> {
    let skel = classifier.skeleton();
    let start = find_start(classifier)?;
    let mut net = Network::new();

    if classifier.is_branchpoint(start)? {
        // No walkable seed exists when the first pixel is itself a
        // junction (e.g. a plus cross, whose tips all have three
        // neighbors); spawn the junction's links directly.
        spawn_cluster_links(&mut net, classifier, start, &[])?;
    } else {
        let id = net.fresh_link_id();
        let origin = net.update_node(start, id);
        net.init_link(id, &[start], origin);
        net.enqueue(id);
    }

    let cap = config
        .max_iterations
        .unwrap_or_else(|| skel.len() * 8 + 1024);
    let mut steps = 0_usize;

    while let Some(link) = net.pending_first() {
        let exclusions = cant_walk(&net, classifier, link)?;

        loop {
            steps += 1;
            if steps > cap {
                return Err(SkeletonError::IterationLimit(cap));
            }

            let candidates = next_steps(classifier, &net, link, &exclusions);
            let Some(&last) = net.chain(link).last() else {
                net.pending_remove(link);
                break;
            };

            if candidates.is_empty() {
                net.pending_remove(link);
                if net.chain(link).len() == 1 {
                    // An isolated pixel yields a lone node, not a
                    // one-pixel loop link.
                    net.update_node(last, link);
                    net.delete_link(link);
                } else {
                    let end = net.update_node(last, link);
                    net.finalize_link(link, end);
                    check_dup_links(&mut net, link);
                }
                break;
            }

            let mut bp_step = None;
            for &c in &candidates {
                if classifier.is_branchpoint(c)? {
                    bp_step = Some(c);
                    break;
                }
            }

            if let Some(bp) = bp_step {
                net.push_pixel(link, bp);
                handle_bp(&mut net, classifier, link, bp)?;
                check_dup_links(&mut net, link);
                break;
            }

            // Prefer the 4-connected continuation, then the smallest
            // index, so ties resolve the same way on every run.
            let step = candidates
                .iter()
                .copied()
                .find(|&c| {
                    let d = c.abs_diff(last);
                    d == 1 || d == skel.width()
                })
                .or_else(|| candidates.iter().copied().min());
            match step {
                Some(s) => net.push_pixel(link, s),
                None => break,
            }
        }
    }

    Ok(net)
}

/// Admissible next pixels for a link, in ascending order.
///
/// A freshly seeded one-pixel link may step to any on neighbor; once a
/// direction exists only the three non-reversing offsets are
/// considered, minus the link's exclusion set.
fn next_steps(
    classifier: &Classifier<'_>,
    net: &Network,
    link: LinkId,
    exclusions: &HashSet<usize>,
) -> Vec<usize> {
    let skel = classifier.skeleton();
    let chain = net.chain(link);
    match chain {
        [] => Vec::new(),
        [_] => walkable_neighbors(skel.buf(), skel.width(), chain),
        [.., prev, last] => no_turnaround(*prev, *last, skel.width())
            .map_or_else(Vec::new, |offsets| {
                let mut out: Vec<usize> = offsets
                    .iter()
                    .filter_map(|&o| apply_offset(*last, o, skel.len()))
                    .filter(|&p| skel.is_on(p) && !exclusions.contains(&p))
                    .collect();
                out.sort_unstable();
                out
            }),
    }
}

/// First pixel to walk from: the lowest-index endpoint (exactly one
/// neighbor), else the lowest-index branchpoint, else the lowest on
/// pixel (a pure ring).
///
/// # Errors
///
/// [`SkeletonError::EmptySkeleton`] when the raster has no on pixels;
/// classification errors propagate.
pub fn find_start(classifier: &mut Classifier<'_>) -> Result<usize, SkeletonError> {
    let skel = classifier.skeleton();
    let mut first_on = None;
    for p in skel.on_pixels() {
        if first_on.is_none() {
            first_on = Some(p);
        }
        if neighbors_on(skel.buf(), skel.width(), p).len() == 1 {
            return Ok(p);
        }
    }
    let Some(first_on) = first_on else {
        return Err(SkeletonError::EmptySkeleton);
    };
    for p in skel.on_pixels() {
        if classifier.is_branchpoint(p)? {
            return Ok(p);
        }
    }
    Ok(first_on)
}

/// Connect a link that walked into a branchpoint and spawn the other
/// links leaving that junction.
///
/// If the branch pixel is already a node the junction was resolved
/// from another link; the current link just connects and no new links
/// spawn.
fn handle_bp(
    net: &mut Network,
    classifier: &mut Classifier<'_>,
    link: LinkId,
    bp_pixel: usize,
) -> Result<(), SkeletonError> {
    net.pending_remove(link);

    let already_resolved = net.node_id_at(bp_pixel).is_some();
    let node = net.update_node(bp_pixel, link);
    net.finalize_link(link, node);
    if already_resolved {
        return Ok(());
    }

    let chain: Vec<usize> = net.chain(link).to_vec();
    spawn_cluster_links(net, classifier, bp_pixel, &chain)
}

/// Resolve the cluster around `bp_pixel` and create its outgoing
/// links: immediate two-pixel links between adjacent cluster members,
/// then pending links toward every emanator not already covered.
/// 4-connected emanators are enqueued before diagonal ones so they are
/// walked first.
fn spawn_cluster_links(
    net: &mut Network,
    classifier: &mut Classifier<'_>,
    bp_pixel: usize,
    exclude_chain: &[usize],
) -> Result<(), SkeletonError> {
    let skel = classifier.skeleton();
    let width = skel.width();
    let cluster = branchpoint_cluster(classifier, bp_pixel)?;

    let mut ems = emanators(skel, &cluster);
    for p in exclude_chain {
        ems.remove(p);
    }

    // Pair each cluster member with its 4-connected emanators first;
    // whatever remains can only be reached diagonally.
    let mut four_pairs: Vec<(usize, usize)> = Vec::new();
    let mut claimed: BTreeSet<usize> = BTreeSet::new();
    for &b in &cluster {
        for &e in &ems {
            let d = b.abs_diff(e);
            if d == 1 || d == width {
                four_pairs.push((b, e));
                claimed.insert(e);
            }
        }
    }
    let mut diag_pairs: Vec<(usize, usize)> = Vec::new();
    for &b in &cluster {
        for &e in &ems {
            if claimed.contains(&e) {
                continue;
            }
            let d = b.abs_diff(e);
            if d == width + 1 || d == width - 1 {
                diag_pairs.push((b, e));
            }
        }
    }

    // Adjacent branchpoints connect through immediate two-pixel links,
    // preserving 4-connectivity across multi-pixel junctions. These
    // are fully resolved at creation and never queued.
    let mut bp_pairs: BTreeSet<(usize, usize)> = BTreeSet::new();
    for &a in &cluster {
        for n in neighbors_on(skel.buf(), width, a) {
            if cluster.contains(&n) {
                bp_pairs.insert((a.min(n), a.max(n)));
            }
        }
    }
    for (a, b) in bp_pairs {
        let id = net.fresh_link_id();
        let na = net.update_node(a, id);
        let nb = net.update_node(b, id);
        net.init_link(id, &[a, b], na);
        net.finalize_link(id, nb);
    }

    for (b, e) in four_pairs.into_iter().chain(diag_pairs) {
        if link_already_spawned(net, b, e) {
            continue;
        }
        let id = net.fresh_link_id();
        net.enqueue(id);
        let origin = net.update_node(b, id);
        net.init_link(id, &[b, e], origin);
    }
    Ok(())
}

/// Whether any link registered on the node at `b` already covers the
/// step from `b` to `e` (its last two pixels are exactly that pair).
fn link_already_spawned(net: &Network, b: usize, e: usize) -> bool {
    let pair = BTreeSet::from([b, e]);
    net.links_at(b).into_iter().any(|l| {
        let chain = net.chain(l);
        chain.len() >= 2 && chain[chain.len() - 2..].iter().copied().collect::<BTreeSet<_>>() == pair
    })
}

/// Pixels a link must never step onto: its origin's branchpoint
/// cluster, that cluster's emanators, and the chains of every link
/// already walked from the same origin node.
fn cant_walk(
    net: &Network,
    classifier: &mut Classifier<'_>,
    link: LinkId,
) -> Result<HashSet<usize>, SkeletonError> {
    let skel = classifier.skeleton();
    let Some(&origin) = net.chain(link).first() else {
        return Ok(HashSet::new());
    };

    let cluster = branchpoint_cluster(classifier, origin)?;
    let mut walked: HashSet<usize> = cluster.iter().copied().collect();
    for &bp in &cluster {
        walked.extend(neighbors_on(skel.buf(), skel.width(), bp));
    }

    for sibling in net.links_at(origin) {
        let chain = net.chain(sibling);
        if chain.first() == Some(&origin) {
            // Walked away from our node: everything but its live tip.
            walked.extend(chain.iter().take(chain.len().saturating_sub(1)));
        } else {
            walked.extend(chain.iter().skip(1));
        }
    }
    Ok(walked)
}

/// After a link resolves its second endpoint, delete any other link on
/// that node whose first two pixels match this link's last two: both
/// cover the same skeleton step and only one may survive.
fn check_dup_links(net: &mut Network, link: LinkId) {
    let chain = net.chain(link);
    if chain.len() < 2 {
        return;
    }
    let tail: BTreeSet<usize> = chain[chain.len() - 2..].iter().copied().collect();
    let Some(&end) = net.endpoints(link).get(1) else {
        return;
    };
    let Some(end_node) = net.node(end) else {
        return;
    };

    let others: Vec<LinkId> = end_node.conn.iter().copied().filter(|&l| l != link).collect();
    for other in others {
        let head: BTreeSet<usize> = net.chain(other).iter().take(2).copied().collect();
        if head.len() == 2 && head == tail {
            net.delete_link(other);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::raster::{Skeleton, PAD};
    use image::{GrayImage, Luma};

    fn skel(rows: &[&str]) -> Skeleton {
        let h = rows.len() as u32;
        let w = rows[0].len() as u32;
        let mut img = GrayImage::new(w, h);
        for (y, row) in rows.iter().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                if ch == '#' {
                    img.put_pixel(x as u32, y as u32, Luma([255]));
                }
            }
        }
        Skeleton::from_mask(&img)
    }

    fn walk(rows: &[&str]) -> (Skeleton, Network) {
        let s = skel(rows);
        let mut classifier = Classifier::new(&s, 51);
        let net = resolve(&mut classifier, &ResolveConfig::default()).unwrap();
        (s, net)
    }

    #[test]
    fn empty_raster_is_an_error() {
        let s = skel(&["..."]);
        let mut classifier = Classifier::new(&s, 51);
        let err = resolve(&mut classifier, &ResolveConfig::default()).unwrap_err();
        assert!(matches!(err, SkeletonError::EmptySkeleton));
    }

    #[test]
    fn find_start_prefers_endpoints() {
        let s = skel(&["#####"]);
        let mut classifier = Classifier::new(&s, 51);
        let start = find_start(&mut classifier).unwrap();
        assert_eq!(start, s.index(PAD, PAD));
    }

    #[test]
    fn find_start_falls_back_to_a_branchpoint() {
        // A small plus has no 1-neighbor pixels: every tip touches the
        // center plus two tips diagonally.
        let s = skel(&[
            ".#.", //
            "###", //
            ".#.",
        ]);
        let mut classifier = Classifier::new(&s, 51);
        let start = find_start(&mut classifier).unwrap();
        assert_eq!(start, s.index(PAD + 1, PAD + 1));
    }

    #[test]
    fn straight_line_walks_into_one_ordered_link() {
        let (s, net) = walk(&["#####"]);
        let link = LinkId(0);
        let expected: Vec<usize> = (0..5).map(|c| s.index(PAD, PAD + c)).collect();
        assert_eq!(net.chain(link), expected.as_slice());
        assert_eq!(net.endpoints(link).len(), 2);
        assert_eq!(net.pending_len(), 0);
    }

    #[test]
    fn isolated_pixel_becomes_a_lone_node() {
        let (s, net) = walk(&["#"]);
        let p = s.index(PAD, PAD);
        let node = net.node_id_at(p).unwrap();
        assert!(net.node(node).unwrap().conn.is_empty());
        assert_eq!(net.pending_len(), 0);
    }

    #[test]
    fn plus_cross_spawns_four_links_from_the_center() {
        let (s, net) = walk(&[
            ".#.", //
            "###", //
            ".#.",
        ]);
        let center = s.index(PAD + 1, PAD + 1);
        let center_node = net.node_id_at(center).unwrap();
        assert_eq!(net.node(center_node).unwrap().conn.len(), 4);
        for link in &net.node(center_node).unwrap().conn {
            assert_eq!(net.chain(*link).len(), 2);
            assert_eq!(net.endpoints(*link).len(), 2);
        }
        assert_eq!(net.pending_len(), 0);
    }

    #[test]
    fn t_junction_resolves_around_the_stem_branchpoint() {
        let (s, net) = walk(&[
            "#####", //
            "..#..", //
            "..#..",
        ]);
        let stem = s.index(PAD + 1, PAD + 2);
        let junction = net.node_id_at(stem).unwrap();
        assert_eq!(net.node(junction).unwrap().conn.len(), 4);
        // Every on pixel ends up in some chain.
        let covered: HashSet<usize> = net
            .node(junction)
            .unwrap()
            .conn
            .iter()
            .flat_map(|&l| net.chain(l).iter().copied())
            .collect();
        assert!(covered.contains(&s.index(PAD, PAD)));
        assert!(covered.contains(&s.index(PAD, PAD + 4)));
        assert!(covered.contains(&s.index(PAD + 2, PAD + 2)));
    }

    #[test]
    fn ring_with_tail_converges() {
        // Walking the ring returns to already-resolved junction nodes,
        // exercising the revisit guard and duplicate reconciliation.
        let (s, net) = walk(&[
            ".###.", //
            ".#.#.", //
            ".###.", //
            "..#..", //
            "..#..",
        ]);
        assert_eq!(net.pending_len(), 0);
        let tail_tip = net.node_id_at(s.index(PAD + 4, PAD + 2));
        assert!(tail_tip.is_some());
    }

    #[test]
    fn iteration_cap_is_enforced() {
        let s = skel(&["#####"]);
        let mut classifier = Classifier::new(&s, 51);
        let config = ResolveConfig {
            max_window: 51,
            max_iterations: Some(2),
        };
        let err = resolve(&mut classifier, &config).unwrap_err();
        assert!(matches!(err, SkeletonError::IterationLimit(2)));
    }
}
