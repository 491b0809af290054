//! Block geometry and snap detection

use serde::Serialize;

/// Axis-aligned box of a block or group on the patch surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Same size, new origin
    pub fn moved_to(&self, x: f64, y: f64) -> Self {
        Self { x, y, ..*self }
    }

    /// Smallest box containing both
    pub fn union(&self, other: &Rect) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Self {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }
}

/// Length of the shared span of two intervals (negative when disjoint)
fn span_overlap(start_a: f64, end_a: f64, start_b: f64, end_b: f64) -> f64 {
    end_a.min(end_b) - start_a.max(start_b)
}

/// When two blocks count as snapped together
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapRules {
    /// Largest gap between facing edges
    pub tolerance: f64,
    /// Smallest shared span along the touching edge
    pub min_overlap: f64,
}

impl Default for SnapRules {
    fn default() -> Self {
        Self {
            tolerance: 1.0,
            min_overlap: 1.0,
        }
    }
}

impl SnapRules {
    /// Whether `a` and `b` share an edge
    ///
    /// Side by side: `a`'s right edge meets `b`'s left edge (or the reverse)
    /// and the vertical spans overlap. Stacked: same on the other axis.
    pub fn touches(&self, a: &Rect, b: &Rect) -> bool {
        let side_by_side = ((a.right() - b.x).abs() <= self.tolerance
            || (b.right() - a.x).abs() <= self.tolerance)
            && span_overlap(a.y, a.bottom(), b.y, b.bottom()) >= self.min_overlap;

        let stacked = ((a.bottom() - b.y).abs() <= self.tolerance
            || (b.bottom() - a.y).abs() <= self.tolerance)
            && span_overlap(a.x, a.right(), b.x, b.right()) >= self.min_overlap;

        side_by_side || stacked
    }
}

/// Default placement of blocks on a grid, in inventory order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    pub block_width: f64,
    pub block_height: f64,
    pub columns: usize,
    pub spacing: f64,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            block_width: 120.0,
            block_height: 300.0,
            columns: 8,
            spacing: 20.0,
        }
    }
}

impl GridLayout {
    /// Box of the `index`-th block
    pub fn cell(&self, index: usize) -> Rect {
        let columns = self.columns.max(1);
        let col = (index % columns) as f64;
        let row = (index / columns) as f64;
        Rect::new(
            self.spacing + col * (self.block_width + self.spacing),
            self.spacing + row * (self.block_height + self.spacing),
            self.block_width,
            self.block_height,
        )
    }

    /// Box of a single block at an arbitrary origin
    pub fn block_at(&self, x: f64, y: f64) -> Rect {
        Rect::new(x, y, self.block_width, self.block_height)
    }
}
