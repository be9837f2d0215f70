//! Placement and split heuristics for guillotine packing.
//!
//! A packing trial is driven by one `Score`, which picks the free rectangle
//! a piece goes into, and one `Split`, which picks the axis of the cut that
//! divides the remaining space.

use serde::Serialize;
use utoipa::ToSchema;

use crate::model::CutAxis;
use crate::types::{Dimensional, Rect};

/// Rule for ranking the free rectangles that can take a piece.
///
/// `evaluate` returns a key where lower is better; "worst" variants negate
/// the corresponding "best" measure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    BestAreaFit,
    BestShortSideFit,
    BestLongSideFit,
    WorstAreaFit,
    WorstShortSideFit,
    WorstLongSideFit,
}

impl Score {
    /// Every variant, in search order.
    pub const ALL: [Score; 6] = [
        Score::BestAreaFit,
        Score::BestShortSideFit,
        Score::BestLongSideFit,
        Score::WorstAreaFit,
        Score::WorstShortSideFit,
        Score::WorstLongSideFit,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Score::BestAreaFit => "best_area_fit",
            Score::BestShortSideFit => "best_short_side_fit",
            Score::BestLongSideFit => "best_long_side_fit",
            Score::WorstAreaFit => "worst_area_fit",
            Score::WorstShortSideFit => "worst_short_side_fit",
            Score::WorstLongSideFit => "worst_long_side_fit",
        }
    }

    /// Scores placing `item` into `free`. The caller checks that it fits.
    pub fn evaluate(&self, item: &impl Dimensional, free: &Rect) -> f64 {
        let leftover_length = free.length - item.length();
        let leftover_width = free.width - item.width();
        match self {
            Score::BestAreaFit => free.area() - item.area(),
            Score::BestShortSideFit => leftover_length.min(leftover_width),
            Score::BestLongSideFit => leftover_length.max(leftover_width),
            Score::WorstAreaFit => -(free.area() - item.area()),
            Score::WorstShortSideFit => -leftover_length.min(leftover_width),
            Score::WorstLongSideFit => -leftover_length.max(leftover_width),
        }
    }
}

/// Rule for choosing the axis of the cut made after a placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    ShorterLeftoverAxis,
    LongerLeftoverAxis,
    MinimizeArea,
    MaximizeArea,
    ShorterAxis,
    LongerAxis,
}

impl Split {
    /// Every variant, in search order.
    pub const ALL: [Split; 6] = [
        Split::ShorterLeftoverAxis,
        Split::LongerLeftoverAxis,
        Split::MinimizeArea,
        Split::MaximizeArea,
        Split::ShorterAxis,
        Split::LongerAxis,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Split::ShorterLeftoverAxis => "shorter_leftover_axis",
            Split::LongerLeftoverAxis => "longer_leftover_axis",
            Split::MinimizeArea => "minimize_area",
            Split::MaximizeArea => "maximize_area",
            Split::ShorterAxis => "shorter_axis",
            Split::LongerAxis => "longer_axis",
        }
    }

    /// Chooses the cut axis after a `length` x `width` piece went into `free`.
    ///
    /// A lengthwise cut keeps a strip spanning the full length of `free`
    /// above the piece; a widthwise cut keeps a strip spanning its full width
    /// beside the piece.
    pub fn axis(&self, free: &Rect, length: f64, width: f64) -> CutAxis {
        let leftover_length = free.length - length;
        let leftover_width = free.width - width;
        let lengthwise = match self {
            Split::ShorterLeftoverAxis => leftover_length <= leftover_width,
            Split::LongerLeftoverAxis => leftover_length > leftover_width,
            Split::MinimizeArea => length * leftover_width > leftover_length * width,
            Split::MaximizeArea => length * leftover_width <= leftover_length * width,
            Split::ShorterAxis => free.length <= free.width,
            Split::LongerAxis => free.length > free.width,
        };
        if lengthwise {
            CutAxis::Lengthwise
        } else {
            CutAxis::Widthwise
        }
    }
}

/// Every (score, split) pair of one search phase, score-major.
pub fn combinations() -> Vec<(Score, Split)> {
    Score::ALL
        .iter()
        .flat_map(|&score| Split::ALL.iter().map(move |&split| (score, split)))
        .collect()
}
