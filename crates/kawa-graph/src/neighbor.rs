//! Neighbor finding on flat-indexed binary buffers.
//!
//! These functions are shared by the full raster and by the classifier's
//! local analysis windows, so they operate on a raw `(&[bool], width)`
//! pair rather than on a concrete raster type. All results come back in
//! ascending index order, which keeps every downstream traversal
//! deterministic.

/// Flat indices of the on pixels among the 8 cells surrounding `idx`,
/// in ascending order. An isolated pixel yields an empty vector.
#[must_use]
pub fn neighbors_on(buf: &[bool], width: usize, idx: usize) -> Vec<usize> {
    let height = buf.len() / width;
    let row = idx / width;
    let col = idx % width;
    let mut out = Vec::with_capacity(8);
    for dr in -1_isize..=1 {
        for dc in -1_isize..=1 {
            if dr == 0 && dc == 0 {
                continue;
            }
            let r = row as isize + dr;
            let c = col as isize + dc;
            if r < 0 || c < 0 || r >= height as isize || c >= width as isize {
                continue;
            }
            let n = r as usize * width + c as usize;
            if buf[n] {
                out.push(n);
            }
        }
    }
    out
}

/// The 4-connected subset of [`neighbors_on`]: on pixels directly
/// above, below, left, or right of `idx`, in ascending order.
#[must_use]
pub fn four_connected_on(buf: &[bool], width: usize, idx: usize) -> Vec<usize> {
    neighbors_on(buf, width, idx)
        .into_iter()
        .filter(|&n| {
            let d = n.abs_diff(idx);
            d == 1 || d == width
        })
        .collect()
}

/// Walkable next steps from the end of a pixel chain: the on neighbors
/// of the chain's last pixel, minus the chain's own last two pixels
/// (which prevents an immediate step back onto already-placed pixels).
#[must_use]
pub fn walkable_neighbors(buf: &[bool], width: usize, chain: &[usize]) -> Vec<usize> {
    let Some(&last) = chain.last() else {
        return Vec::new();
    };
    let tail_start = chain.len().saturating_sub(2);
    let tail = &chain[tail_start..];
    neighbors_on(buf, width, last)
        .into_iter()
        .filter(|n| !tail.contains(n))
        .collect()
}

/// The three next-step offsets that do not reverse direction, given the
/// displacement from the second-to-last to the last chain pixel.
///
/// Each of the 8 directional cases maps to a fixed set of three
/// distinct offsets: the continuation of the current direction and its
/// two 45-degree deviations. Returns `None` for displacements that are
/// not a single king move, which a chain built by single steps never
/// produces.
#[must_use]
pub fn no_turnaround(prev: usize, last: usize, width: usize) -> Option<[isize; 3]> {
    let w = width as isize;
    let d = last as isize - prev as isize;
    let offsets = match d {
        1 => [1, -w + 1, w + 1],                  // moving right
        _ if d == -1 => [-1, -w - 1, w - 1],      // moving left
        _ if d == w => [w, w - 1, w + 1],         // moving down
        _ if d == -w => [-w, -w - 1, -w + 1],     // moving up
        _ if d == w + 1 => [1, w, w + 1],         // down-right
        _ if d == w - 1 => [-1, w, w - 1],        // down-left
        _ if d == -w + 1 => [1, -w, -w + 1],      // up-right
        _ if d == -w - 1 => [-1, -w, -w - 1],     // up-left
        _ => return None,
    };
    Some(offsets)
}

/// Apply a signed offset to a flat index, returning `None` when the
/// result falls outside `0..len`.
#[must_use]
pub fn apply_offset(idx: usize, offset: isize, len: usize) -> Option<usize> {
    let target = idx as isize + offset;
    (target >= 0 && (target as usize) < len).then_some(target as usize)
}
