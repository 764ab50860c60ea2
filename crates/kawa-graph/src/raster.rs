//! Flat-indexed binary raster addressing.
//!
//! Every other module talks about pixels as flat row-major indices, so
//! all width-derived offset arithmetic (index ± 1 horizontal,
//! index ± width vertical, index ± (width ± 1) diagonal) lives here in
//! one place: [`Skeleton`] for the full raster and [`Window`] for the
//! square sub-images the branchpoint classifier analyzes.
//!
//! The skeleton carries an internal all-zero border pad so neighbor
//! arithmetic can never wrap across row boundaries onto an on pixel and
//! so classifier windows always have dark margin to work with. Callers
//! never see padded coordinates; [`Skeleton::unpad_index`] maps back.

use image::GrayImage;

/// Width of the all-zero border added around the input mask.
pub(crate) const PAD: usize = 2;

/// An immutable binary raster with flat row-major addressing.
#[derive(Debug, Clone)]
pub struct Skeleton {
    on: Vec<bool>,
    width: usize,
    height: usize,
}

impl Skeleton {
    /// Build a padded skeleton from a grayscale mask. Any nonzero pixel
    /// counts as on.
    #[must_use]
    pub fn from_mask(mask: &GrayImage) -> Self {
        let width = mask.width() as usize + 2 * PAD;
        let height = mask.height() as usize + 2 * PAD;
        let mut on = vec![false; width * height];
        for (x, y, pixel) in mask.enumerate_pixels() {
            if pixel.0[0] != 0 {
                on[(y as usize + PAD) * width + x as usize + PAD] = true;
            }
        }
        Self { on, width, height }
    }

    /// Padded raster width in pixels.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Padded raster height in pixels.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Total number of pixels in the padded raster.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.on.len()
    }

    /// Returns `true` if the raster has no pixels at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.on.is_empty()
    }

    /// The raw pixel buffer, row-major.
    #[must_use]
    pub fn buf(&self) -> &[bool] {
        &self.on
    }

    /// Whether the pixel at a flat index is on. Out-of-range indices
    /// are off.
    #[must_use]
    pub fn is_on(&self, idx: usize) -> bool {
        self.on.get(idx).copied().unwrap_or(false)
    }

    /// Iterate over the flat indices of all on pixels in ascending
    /// order.
    pub fn on_pixels(&self) -> impl Iterator<Item = usize> + '_ {
        self.on
            .iter()
            .enumerate()
            .filter_map(|(i, &v)| v.then_some(i))
    }

    /// Split a flat index into (row, col).
    #[must_use]
    pub const fn row_col(&self, idx: usize) -> (usize, usize) {
        (idx / self.width, idx % self.width)
    }

    /// Flat index of a (row, col) pair.
    #[must_use]
    pub const fn index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    /// Map a padded flat index back to the caller's original
    /// coordinates. Only meaningful for on pixels, which by
    /// construction lie inside the pad margin.
    #[must_use]
    pub const fn unpad_index(&self, idx: usize) -> usize {
        let row = idx / self.width;
        let col = idx % self.width;
        (row - PAD) * (self.width - 2 * PAD) + (col - PAD)
    }

    /// Extract a `height` x `width` window nominally centered on `center`,
    /// shifted as needed to fit inside the raster (and clamped to the
    /// raster dimensions when the request is larger than the raster).
    #[must_use]
    pub fn window(&self, center: usize, height: usize, width: usize) -> Window {
        let h = height.min(self.height);
        let w = width.min(self.width);
        let (row, col) = self.row_col(center);
        let row0 = row.saturating_sub((h - 1) / 2).min(self.height - h);
        let col0 = col.saturating_sub((w - 1) / 2).min(self.width - w);

        let mut on = vec![false; h * w];
        for r in 0..h {
            let src = (row0 + r) * self.width + col0;
            on[r * w..(r + 1) * w].copy_from_slice(&self.on[src..src + w]);
        }
        Window {
            on,
            width: w,
            height: h,
            row0,
            col0,
        }
    }
}

/// A square sub-image extracted from a [`Skeleton`], with its own local
/// flat addressing and the offsets needed to translate back.
#[derive(Debug, Clone)]
pub struct Window {
    on: Vec<bool>,
    width: usize,
    height: usize,
    row0: usize,
    col0: usize,
}

impl Window {
    /// Window width in pixels.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Window height in pixels.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// The local pixel buffer, row-major.
    #[must_use]
    pub fn buf(&self) -> &[bool] {
        &self.on
    }

    pub(crate) fn buf_mut(&mut self) -> &mut [bool] {
        &mut self.on
    }

    /// Translate a global flat index into this window's local flat
    /// index, if it falls inside the window.
    #[must_use]
    pub fn localize(&self, global: usize, raster_width: usize) -> Option<usize> {
        let row = global / raster_width;
        let col = global % raster_width;
        let r = row.checked_sub(self.row0)?;
        let c = col.checked_sub(self.col0)?;
        (r < self.height && c < self.width).then_some(r * self.width + c)
    }

    /// Translate a local flat index back to the global raster.
    #[must_use]
    pub const fn globalize(&self, local: usize, raster_width: usize) -> usize {
        let r = local / self.width;
        let c = local % self.width;
        (self.row0 + r) * raster_width + self.col0 + c
    }

    /// Whether a local flat index lies on the window border. Border
    /// pixels terminate closure walks: they mark the edge of the
    /// analysis window, not a true skeleton terminus.
    #[must_use]
    pub const fn is_border(&self, local: usize) -> bool {
        let r = local / self.width;
        let c = local % self.width;
        r == 0 || c == 0 || r == self.height - 1 || c == self.width - 1
    }
}
