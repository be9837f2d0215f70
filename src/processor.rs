//! Preprocessing of pieces and sheets before the search.
//!
//! Every step returns new collections and leaves its inputs untouched, so
//! the engine can preprocess once and hand copies to each trial.

use std::cmp::Ordering;

use crate::model::{Bin, Box2D, PackItem, Stacking, SuperBox};
use crate::optimizer::PackingConfig;
use crate::types::{Dimensional, EPSILON_GENERAL};

/// Orders larger pieces first: by area, then long side, then short side.
pub fn compare_by_size(a: &impl Dimensional, b: &impl Dimensional) -> Ordering {
    b.area()
        .partial_cmp(&a.area())
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            b.long_side()
                .partial_cmp(&a.long_side())
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| {
            b.short_side()
                .partial_cmp(&a.short_side())
                .unwrap_or(Ordering::Equal)
        })
}

#[derive(Clone, Copy, Debug)]
pub struct Processor {
    trimsize: f64,
    saw_kerf: f64,
    stacking: Stacking,
}

impl Processor {
    pub fn new(config: &PackingConfig) -> Self {
        Self {
            trimsize: config.trimsize,
            saw_kerf: config.saw_kerf,
            stacking: config.stacking,
        }
    }

    /// Stable sort, largest piece first.
    pub fn sort_boxes(&self, boxes: &[Box2D]) -> Vec<Box2D> {
        let mut sorted = boxes.to_vec();
        sorted.sort_by(|a, b| compare_by_size(a, b));
        sorted
    }

    /// Gives sheets with an unset (zero) dimension a concrete size.
    ///
    /// The missing dimension becomes the largest matching piece dimension
    /// plus trim on both edges, so every piece fits that way.
    pub fn max_size_bins(&self, bins: &[Bin], boxes: &[Box2D]) -> Vec<Bin> {
        let max_length = boxes.iter().map(|b| b.length).fold(0.0, f64::max);
        let max_width = boxes.iter().map(|b| b.width).fold(0.0, f64::max);
        bins.iter()
            .map(|bin| {
                let mut sized = *bin;
                if sized.length <= EPSILON_GENERAL && max_length > 0.0 {
                    sized.length = max_length + 2.0 * self.trimsize;
                }
                if sized.width <= EPSILON_GENERAL && max_width > 0.0 {
                    sized.width = max_width + 2.0 * self.trimsize;
                }
                sized
            })
            .collect()
    }

    /// Splits pieces into those that fit on at least one of `bins` and the rest.
    ///
    /// Both partitions keep the input order.
    pub fn remove_oversized(&self, boxes: Vec<Box2D>, bins: &[Bin]) -> (Vec<Box2D>, Vec<Box2D>) {
        boxes
            .into_iter()
            .partition(|b| bins.iter().any(|bin| bin.admits(b, self.trimsize)))
    }

    /// Chains consecutive pieces of equal width along the length axis.
    pub fn make_sboxes_lengthwise(&self, boxes: Vec<Box2D>, bins: &[Bin]) -> Vec<PackItem> {
        self.make_sboxes(Stacking::Length, boxes, bins)
    }

    /// Chains consecutive pieces of equal length along the width axis.
    pub fn make_sboxes_widthwise(&self, boxes: Vec<Box2D>, bins: &[Bin]) -> Vec<PackItem> {
        self.make_sboxes(Stacking::Width, boxes, bins)
    }

    /// Turns sorted pieces into placement units according to the stacking setting.
    pub fn make_items(&self, boxes: Vec<Box2D>, bins: &[Bin]) -> Vec<PackItem> {
        match self.stacking {
            Stacking::None => boxes.into_iter().map(PackItem::Single).collect(),
            Stacking::Length => self.make_sboxes_lengthwise(boxes, bins),
            Stacking::Width => self.make_sboxes_widthwise(boxes, bins),
        }
    }

    fn make_sboxes(&self, direction: Stacking, boxes: Vec<Box2D>, bins: &[Bin]) -> Vec<PackItem> {
        let mut items = Vec::new();
        let mut current: Option<SuperBox> = None;

        for b in boxes {
            let limit = self.stack_limit(direction, &b, bins);
            let stackable = current
                .as_ref()
                .is_some_and(|stack| stack.can_stack(&b, limit));
            if stackable {
                if let Some(stack) = current.as_mut() {
                    stack.push(b);
                }
                continue;
            }
            if let Some(done) = current.take() {
                items.push(done.into_item());
            }
            current = Some(SuperBox::new(direction, self.saw_kerf, b));
        }
        if let Some(done) = current.take() {
            items.push(done.into_item());
        }

        // stacks grow, so restore largest-first order
        items.sort_by(|a, b| compare_by_size(a, b));
        items
    }

    /// Longest stack extent that still fits on a sheet taking `b`'s cross-section.
    fn stack_limit(&self, direction: Stacking, b: &Box2D, bins: &[Bin]) -> f64 {
        bins.iter()
            .filter_map(|bin| {
                let (length, width) = bin.usable_size(self.trimsize);
                match direction {
                    Stacking::Width if b.length <= length + EPSILON_GENERAL => Some(width),
                    Stacking::Length if b.width <= width + EPSILON_GENERAL => Some(length),
                    _ => None,
                }
            })
            .fold(0.0, f64::max)
    }
}
