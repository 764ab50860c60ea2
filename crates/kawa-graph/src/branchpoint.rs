//! Branchpoint classification.
//!
//! A branchpoint is not simply a skeleton pixel with more than two
//! neighbors. Junctions in a 1-px skeleton usually arrive as small
//! clumps of over-connected pixels, and naively noding every one of
//! them shreds the topology. [`Classifier::is_branchpoint`] instead
//! isolates the over-connected clump around a pixel in an adaptive
//! analysis window, then picks the smallest set of pixels from which
//! the whole local sub-skeleton can be walked without revisiting a
//! pixel. The queried pixel is a branchpoint iff it lands in that set.
//!
//! Classification is pure with respect to the raster, so results are
//! memoized per pixel; the walker asks about the same junction pixels
//! repeatedly.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::neighbor::{four_connected_on, neighbors_on};
use crate::raster::{Skeleton, Window};
use crate::types::SkeletonError;

/// Initial analysis window edge length.
const INITIAL_WINDOW: usize = 7;
/// How much an analysis window axis grows per retry.
const WINDOW_GROWTH: usize = 4;

/// (conn, naxes, nfour) signatures that always demand a branchpoint.
const MUST_KEEP: [[u8; 3]; 6] = [
    [6, 4, 2],
    [5, 3, 1],
    [5, 3, 4],
    [3, 3, 2],
    [3, 3, 1],
    [4, 2, 4],
];

/// Memoizing branchpoint classifier over one skeleton.
#[derive(Debug)]
pub struct Classifier<'a> {
    skel: &'a Skeleton,
    max_window: usize,
    cache: HashMap<usize, bool>,
}

impl<'a> Classifier<'a> {
    #[must_use]
    pub fn new(skel: &'a Skeleton, max_window: usize) -> Self {
        Self {
            skel,
            max_window,
            cache: HashMap::new(),
        }
    }

    /// The skeleton this classifier reads.
    #[must_use]
    pub const fn skeleton(&self) -> &'a Skeleton {
        self.skel
    }

    /// Whether the pixel at `idx` is a branchpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SkeletonError::WindowOverflow`] when the junction's
    /// over-connected clump cannot be enclosed within the configured
    /// window bound.
    pub fn is_branchpoint(&mut self, idx: usize) -> Result<bool, SkeletonError> {
        if let Some(&hit) = self.cache.get(&idx) {
            return Ok(hit);
        }
        let result = self.classify(idx)?;
        self.cache.insert(idx, result);
        Ok(result)
    }

    fn classify(&self, idx: usize) -> Result<bool, SkeletonError> {
        // One or two neighbors can never branch.
        if neighbors_on(self.skel.buf(), self.skel.width(), idx).len() < 3 {
            return Ok(false);
        }

        let (mut win, center, labels, center_label) = self.enclosing_window(idx)?;
        let width = win.width();
        let height = win.height();
        let mut conn = conn_image(win.buf(), width);

        // Clip the on image to the clump's bounding box plus one pixel
        // of margin, then keep only the largest remaining blob so
        // border stragglers cannot influence the analysis.
        let (min_r, max_r, min_c, max_c) = component_bbox(&labels, center_label, width);
        {
            let buf = win.buf_mut();
            for p in 0..buf.len() {
                let r = p / width;
                let c = p % width;
                if r + 1 < min_r || r > max_r + 1 || c + 1 < min_c || c > max_c + 1 {
                    buf[p] = false;
                }
            }
            keep_largest_blob(buf, width, height);
        }

        // Demote over-connected pixels outside the clump and erase
        // connectivity for anything no longer on.
        for p in 0..conn.len() {
            if labels[p] != center_label && conn[p] > 2 {
                conn[p] = 1;
            }
            if !win.buf()[p] {
                conn[p] = 0;
            }
        }

        let over: Vec<usize> = (0..conn.len()).filter(|&p| conn[p] > 2).collect();
        if over.len() == 1 {
            return Ok(over[0] == center);
        }

        let naxes = naxes_image(win.buf(), width);
        let nfour = nfour_image(win.buf(), width);
        let bps = parsimonious(win.buf(), &conn, &naxes, &nfour, width);
        Ok(bps.contains(&center))
    }

    /// Grow the analysis window until the 4-connected clump of
    /// over-connected pixels around `idx` sits clear of the border.
    fn enclosing_window(
        &self,
        idx: usize,
    ) -> Result<(Window, usize, Vec<u32>, u32), SkeletonError> {
        let mut win_h = INITIAL_WINDOW;
        let mut win_w = INITIAL_WINDOW;
        loop {
            if win_h > self.max_window || win_w > self.max_window {
                return Err(SkeletonError::WindowOverflow {
                    idx: self.skel.unpad_index(idx),
                    limit: self.max_window,
                });
            }
            let win = self.skel.window(idx, win_h, win_w);
            let width = win.width();
            let height = win.height();
            // The window always contains its nominal center.
            let Some(center) = win.localize(idx, self.skel.width()) else {
                return Err(SkeletonError::WindowOverflow {
                    idx: self.skel.unpad_index(idx),
                    limit: self.max_window,
                });
            };

            let conn = conn_image(win.buf(), width);
            let over: Vec<bool> = conn.iter().map(|&c| c > 2).collect();
            let labels = label_components(&over, width, height, Connectivity::Four);
            let center_label = labels[center];

            let mut fits = true;
            for (p, &label) in labels.iter().enumerate() {
                if label != center_label {
                    continue;
                }
                let r = p / width;
                let c = p % width;
                if (r <= 1 || r >= height - 2) && win_h < self.skel.height() {
                    win_h += WINDOW_GROWTH;
                    fits = false;
                }
                if (c <= 1 || c >= width - 2) && win_w < self.skel.width() {
                    win_w += WINDOW_GROWTH;
                    fits = false;
                }
                if !fits {
                    break;
                }
            }
            if fits {
                return Ok((win, center, labels, center_label));
            }
        }
    }
}

/// Pick the smallest set of branchpoints that lets the whole local
/// sub-skeleton be walked without revisiting a pixel.
fn parsimonious(
    on: &[bool],
    conn: &[u8],
    naxes: &[u8],
    nfour: &[u8],
    width: usize,
) -> BTreeSet<usize> {
    let height = on.len() / width;
    let candidates: Vec<usize> = (0..conn.len())
        .filter(|&p| conn[p] > 2 && !on_edge(p, width, height))
        .collect();
    if candidates.is_empty() {
        return BTreeSet::new();
    }

    let closures: Vec<BTreeSet<usize>> = candidates
        .iter()
        .map(|&c| walk_closure(on, width, &BTreeSet::from([c])))
        .collect();

    // Candidates whose closure needs no further branchpoints.
    let solo: Vec<usize> = closures
        .iter()
        .zip(&candidates)
        .filter(|(set, _)| set.len() == 1)
        .map(|(_, &c)| c)
        .collect();

    if !solo.is_empty() {
        return BTreeSet::from([pick_solo(&solo, naxes, nfour)]);
    }

    // Signatures that force a branchpoint regardless of the walks.
    let mut must: BTreeSet<usize> = BTreeSet::new();
    for kv in MUST_KEEP {
        must.extend(
            (0..conn.len())
                .filter(|&p| conn[p] == kv[0] && naxes[p] == kv[1] && nfour[p] == kv[2]),
        );
    }
    let special: Vec<usize> = (0..conn.len())
        .filter(|&p| conn[p] == 4 && naxes[p] == 4 && nfour[p] == 2)
        .collect();
    if special.len() == 2 {
        must.insert(special[0]);
    }
    if !must.is_empty() {
        return walk_closure(on, width, &must);
    }

    // No forced placements; fall back to the smallest closure if it is
    // unique, otherwise to the pixel most closures agree on.
    let min_len = closures.iter().map(BTreeSet::len).min().unwrap_or(0);
    let smallest: Vec<&BTreeSet<usize>> =
        closures.iter().filter(|s| s.len() == min_len).collect();
    if let [only] = smallest.as_slice() {
        return (*only).clone();
    }

    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for set in &closures {
        for &p in set {
            *counts.entry(p).or_insert(0) += 1;
        }
    }
    // BTreeMap iteration breaks count ties toward the smallest pixel.
    let mode = counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(&p, _)| p);
    mode.map_or_else(BTreeSet::new, |m| {
        walk_closure(on, width, &BTreeSet::from([m]))
    })
}

/// Break ties among candidates that each suffice alone: prefer the
/// unique maximum of axis connectivity, then of 4-connectivity, then
/// the highest 4-connectivity within the axis maximum, smallest pixel
/// last.
fn pick_solo(solo: &[usize], naxes: &[u8], nfour: &[u8]) -> usize {
    let max_nax = solo.iter().map(|&p| naxes[p]).max().unwrap_or(0);
    let by_nax: Vec<usize> = solo.iter().copied().filter(|&p| naxes[p] == max_nax).collect();
    if let [only] = by_nax.as_slice() {
        return *only;
    }

    let max_four = solo.iter().map(|&p| nfour[p]).max().unwrap_or(0);
    let by_four: Vec<usize> = solo
        .iter()
        .copied()
        .filter(|&p| nfour[p] == max_four)
        .collect();
    if let [only] = by_four.as_slice() {
        return *only;
    }

    let max_four_nax = by_nax.iter().map(|&p| nfour[p]).max().unwrap_or(0);
    by_nax
        .iter()
        .copied()
        .filter(|&p| nfour[p] == max_four_nax)
        .min()
        .unwrap_or(by_nax[0])
}

/// Walk the sub-skeleton outward from `seeds`, adding a branchpoint
/// wherever a walk meets more than one unvisited neighbor, until every
/// reachable pixel has been visited exactly once.
fn walk_closure(on: &[bool], width: usize, seeds: &BTreeSet<usize>) -> BTreeSet<usize> {
    let height = on.len() / width;
    let mut bps = seeds.clone();

    // 4-connected emanators walk before diagonal ones.
    let mut do_first: BTreeSet<usize> = BTreeSet::new();
    let mut emanators: BTreeSet<usize> = BTreeSet::new();
    for &bp in &bps {
        emanators.extend(neighbors_on(on, width, bp));
        do_first.extend(four_connected_on(on, width, bp));
    }

    let mut walked: HashSet<usize> = bps.iter().copied().chain(emanators.iter().copied()).collect();

    while !emanators.is_empty() {
        let mut idx = if let Some(f) = do_first.pop_first() {
            emanators.remove(&f);
            f
        } else if let Some(e) = emanators.pop_first() {
            e
        } else {
            break;
        };

        loop {
            walked.insert(idx);
            let neighs: Vec<usize> = neighbors_on(on, width, idx)
                .into_iter()
                .filter(|n| !walked.contains(n))
                .collect();
            match neighs.as_slice() {
                [] => break,
                [next] => {
                    idx = *next;
                    // Border pixels mark the window edge, not a real
                    // terminus; stop without claiming them.
                    if on_edge(idx, width, height) {
                        break;
                    }
                }
                _ => {
                    // A walk that fans out needs a branchpoint here.
                    bps.insert(idx);
                    for &n in &neighs {
                        let d = n.abs_diff(idx);
                        if d == 1 || d == width {
                            do_first.insert(n);
                        }
                        emanators.insert(n);
                        walked.insert(n);
                    }
                    break;
                }
            }
        }
    }

    bps
}

/// Count of on 8-neighbors for every on pixel; 0 elsewhere.
fn conn_image(on: &[bool], width: usize) -> Vec<u8> {
    let mut out = vec![0_u8; on.len()];
    for p in 0..on.len() {
        if on[p] {
            out[p] = neighbors_on(on, width, p).len() as u8;
        }
    }
    out
}

/// Number of connectivity axes (horizontal, vertical, two diagonals,
/// max 4) for every interior on pixel; edge pixels read 0.
fn naxes_image(on: &[bool], width: usize) -> Vec<u8> {
    let height = on.len() / width;
    let w = width as isize;
    let axes: [[isize; 2]; 4] = [[1, -1], [w, -w], [w + 1, -w - 1], [w - 1, -w + 1]];
    let mut out = vec![0_u8; on.len()];
    for p in 0..on.len() {
        if !on[p] || on_edge(p, width, height) {
            continue;
        }
        for pair in axes {
            if pair
                .iter()
                .any(|&d| on[(p as isize + d) as usize])
            {
                out[p] += 1;
            }
        }
    }
    out
}

/// Count of on 4-neighbors for every interior on pixel; edge pixels
/// read 0.
fn nfour_image(on: &[bool], width: usize) -> Vec<u8> {
    let height = on.len() / width;
    let mut out = vec![0_u8; on.len()];
    for p in 0..on.len() {
        if on[p] && !on_edge(p, width, height) {
            out[p] = four_connected_on(on, width, p).len() as u8;
        }
    }
    out
}

const fn on_edge(p: usize, width: usize, height: usize) -> bool {
    let r = p / width;
    let c = p % width;
    r == 0 || c == 0 || r == height - 1 || c == width - 1
}

/// Label connected components of a boolean mask; background is 0.
fn label_components(mask: &[bool], width: usize, height: usize, conn: Connectivity) -> Vec<u32> {
    let img = GrayImage::from_fn(width as u32, height as u32, |x, y| {
        Luma([u8::from(mask[y as usize * width + x as usize]) * 255])
    });
    let labeled = connected_components(&img, conn, Luma([0_u8]));
    labeled.pixels().map(|p| p.0[0]).collect()
}

/// Bounding box (rows then cols, inclusive) of the pixels carrying
/// `label`.
fn component_bbox(labels: &[u32], label: u32, width: usize) -> (usize, usize, usize, usize) {
    let mut min_r = usize::MAX;
    let mut max_r = 0;
    let mut min_c = usize::MAX;
    let mut max_c = 0;
    for (p, &l) in labels.iter().enumerate() {
        if l == label {
            let r = p / width;
            let c = p % width;
            min_r = min_r.min(r);
            max_r = max_r.max(r);
            min_c = min_c.min(c);
            max_c = max_c.max(c);
        }
    }
    (min_r, max_r, min_c, max_c)
}

/// Zero every on pixel outside the largest 8-connected blob. Blob size
/// ties resolve toward the earliest-labeled (topmost-leftmost) blob.
fn keep_largest_blob(on: &mut [bool], width: usize, height: usize) {
    let labels = label_components(on, width, height, Connectivity::Eight);
    let mut sizes: BTreeMap<u32, usize> = BTreeMap::new();
    for &l in &labels {
        if l != 0 {
            *sizes.entry(l).or_insert(0) += 1;
        }
    }
    let Some(keep) = sizes
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(&l, _)| l)
    else {
        return;
    };
    for (p, &l) in labels.iter().enumerate() {
        if l != keep {
            on[p] = false;
        }
    }
}
