//! A single packing trial for one fixed (score, split) pair.
//!
//! The packer consumes its own copies of placement units and sheets, so
//! trials can run side by side without sharing mutable state.

use std::cmp::Ordering;

use serde::Serialize;
use utoipa::ToSchema;

use crate::heuristics::{Score, Split};
use crate::model::{Bin, ContainerBin, PackItem};
use crate::optimizer::PackingConfig;
use crate::types::Dimensional;

/// Aggregate metrics of a finished trial, used for ranking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, ToSchema)]
pub struct Performance {
    pub nb_boxes_packed: usize,
    pub nb_bins: usize,
    pub nb_leftovers: usize,
    pub largest_leftover_length: f64,
    pub largest_leftover_width: f64,
    pub largest_leftover_area: f64,
}

impl Performance {
    /// Measures the sheets of a finished layout.
    ///
    /// The three largest-leftover values are taken independently, so they
    /// may stem from different rectangles.
    pub fn measure(bins: &[ContainerBin]) -> Self {
        let mut performance = Performance {
            nb_bins: bins.len(),
            ..Default::default()
        };
        for bin in bins {
            performance.nb_boxes_packed += bin.placed().len();
            for (_, rect) in bin.free_rects() {
                performance.nb_leftovers += 1;
                performance.largest_leftover_length =
                    performance.largest_leftover_length.max(rect.length);
                performance.largest_leftover_width =
                    performance.largest_leftover_width.max(rect.width);
                performance.largest_leftover_area =
                    performance.largest_leftover_area.max(rect.area());
            }
        }
        performance
    }

    /// Ranks two layouts after their unplaced counts have tied.
    ///
    /// Fewer sheets first, then larger leftovers (length, width, area), then
    /// fewer leftover pieces.
    pub fn rank(&self, other: &Self) -> Ordering {
        self.nb_bins
            .cmp(&other.nb_bins)
            .then_with(|| {
                other
                    .largest_leftover_length
                    .total_cmp(&self.largest_leftover_length)
            })
            .then_with(|| {
                other
                    .largest_leftover_width
                    .total_cmp(&self.largest_leftover_width)
            })
            .then_with(|| {
                other
                    .largest_leftover_area
                    .total_cmp(&self.largest_leftover_area)
            })
            .then_with(|| self.nb_leftovers.cmp(&other.nb_leftovers))
    }
}

/// Outcome of one trial.
#[derive(Clone, Debug)]
pub struct Trial {
    pub score: Score,
    pub split: Split,
    pub container_bins: Vec<ContainerBin>,
    pub unused_bins: Vec<Bin>,
    pub unplaced: Vec<PackItem>,
    /// `None` when the finished layout broke a geometric invariant.
    pub performance: Option<Performance>,
}

impl Trial {
    /// Number of caller pieces left unplaced.
    pub fn unplaced_count(&self) -> usize {
        self.unplaced.iter().map(PackItem::box_count).sum()
    }

    /// Total ranking order between two valid trials; lower is better.
    pub fn compare(&self, other: &Self) -> Ordering {
        let by_unplaced = self.unplaced_count().cmp(&other.unplaced_count());
        match (&self.performance, &other.performance) {
            (Some(a), Some(b)) => by_unplaced.then_with(|| a.rank(b)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => by_unplaced,
        }
    }
}

/// Runs one trial with a fixed heuristic pair.
#[derive(Clone, Copy, Debug)]
pub struct Packer {
    score: Score,
    split: Split,
    trimsize: f64,
    saw_kerf: f64,
}

impl Packer {
    pub fn new(score: Score, split: Split, config: &PackingConfig) -> Self {
        Self {
            score,
            split,
            trimsize: config.trimsize,
            saw_kerf: config.saw_kerf,
        }
    }

    /// Packs `items` in order onto `bins`, opening `base` sheets when the pool runs dry.
    ///
    /// Each item goes to the best-scoring free rectangle over all open
    /// sheets; ties keep the first candidate in sheet-then-rectangle order.
    /// When no open sheet can take an item, the first pool sheet that can is
    /// opened, falling back to a fresh base sheet.
    pub fn pack(&self, items: Vec<PackItem>, bins: Vec<Bin>, base: Option<Bin>) -> Trial {
        let mut pool = bins;
        let mut open: Vec<ContainerBin> = Vec::new();
        let mut unplaced = Vec::new();

        for item in items {
            if let Some((bin_idx, free_idx)) = self.best_position(&open, &item) {
                self.place_or_keep(&mut open[bin_idx], item, free_idx, &mut unplaced);
                continue;
            }

            let Some((mut container, from_pool)) =
                self.open_bin(&mut pool, base, &item, open.len())
            else {
                unplaced.push(item);
                continue;
            };
            let placed = match self.best_position(std::slice::from_ref(&container), &item) {
                Some((_, free_idx)) => {
                    self.place_or_keep(&mut container, item, free_idx, &mut unplaced)
                }
                None => {
                    unplaced.push(item);
                    false
                }
            };
            if placed {
                open.push(container);
            } else if from_pool {
                pool.push(container.bin);
            }
        }

        let performance = if open.iter().all(ContainerBin::verify) {
            Some(Performance::measure(&open))
        } else {
            log::error!(
                "Trial {}/{} produced an inconsistent layout",
                self.score.code(),
                self.split.code()
            );
            None
        };

        Trial {
            score: self.score,
            split: self.split,
            container_bins: open,
            unused_bins: pool,
            unplaced,
            performance,
        }
    }

    /// Finds the sheet and free rectangle where `item` scores best.
    fn best_position(&self, bins: &[ContainerBin], item: &PackItem) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize, f64)> = None;
        for (bin_idx, bin) in bins.iter().enumerate() {
            for (free_idx, rect) in bin.free_rects() {
                if !item.fits_in(rect.length, rect.width) {
                    continue;
                }
                let key = self.score.evaluate(item, rect);
                if best.is_none_or(|(_, _, current)| key < current) {
                    best = Some((bin_idx, free_idx, key));
                }
            }
        }
        best.map(|(bin_idx, free_idx, _)| (bin_idx, free_idx))
    }

    /// Places `item` on `bin`, or moves it to `unplaced` when the sheet rejects it.
    fn place_or_keep(
        &self,
        bin: &mut ContainerBin,
        item: PackItem,
        free_idx: usize,
        unplaced: &mut Vec<PackItem>,
    ) -> bool {
        if bin.place(&item, free_idx, self.split) {
            return true;
        }
        log::warn!(
            "Sheet {} rejected a piece at free rectangle {}",
            bin.index,
            free_idx
        );
        unplaced.push(item);
        false
    }

    /// Opens the first fitting pool sheet, else a fresh base sheet.
    /// The flag tells whether the sheet was taken from the pool.
    fn open_bin(
        &self,
        pool: &mut Vec<Bin>,
        base: Option<Bin>,
        item: &PackItem,
        index: usize,
    ) -> Option<(ContainerBin, bool)> {
        let (bin, from_pool) = match pool.iter().position(|b| b.admits(item, self.trimsize)) {
            Some(pos) => (pool.remove(pos), true),
            None => (base.filter(|b| b.admits(item, self.trimsize))?, false),
        };
        Some((
            ContainerBin::new(bin, index, self.trimsize, self.saw_kerf),
            from_pool,
        ))
    }
}
