//! Geometric helpers for overlap detection between rectangles on a sheet.
//!
//! The packer never needs these to find positions (guillotine free
//! rectangles are disjoint by construction), but every finished layout is
//! checked with them before its performance is recorded.

use crate::model::PlacedBox;
use crate::types::{EPSILON_GENERAL, Rect};

/// Checks whether two placed boxes overlap on the sheet.
///
/// Boxes that only share an edge do not overlap.
pub fn intersects(a: &PlacedBox, b: &PlacedBox) -> bool {
    a.rect().intersects(&b.rect(), EPSILON_GENERAL)
}

/// Returns the indices of the first pair of overlapping rectangles, if any.
///
/// Pairs are visited in index order, so the result is deterministic.
pub fn first_overlap(rects: &[Rect]) -> Option<(usize, usize)> {
    for (i, a) in rects.iter().enumerate() {
        for (offset, b) in rects[i + 1..].iter().enumerate() {
            if a.intersects(b, EPSILON_GENERAL) {
                return Some((i, i + 1 + offset));
            }
        }
    }
    None
}
