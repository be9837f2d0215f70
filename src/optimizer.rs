//! Two-phase search for the best guillotine layout.
//!
//! The engine first tries to cut all pieces from leftover sheets registered
//! by the caller, then cuts whatever is left from fresh sheets of the
//! configured base size. Each phase runs one packing trial per
//! (score, split) pair and keeps the best-ranked trial.

use rayon::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::heuristics::{Score, Split, combinations};
use crate::model::{Bin, BinType, Box2D, ContainerBin, PackItem, Stacking};
use crate::packer::{Packer, Performance, Trial};
use crate::processor::Processor;
use crate::types::EPSILON_GENERAL;

/// Configuration of the packing engine.
#[derive(Copy, Clone, Debug)]
pub struct PackingConfig {
    /// Whether pieces sharing a cross-section are stacked before the search
    pub stacking: Stacking,
    /// Margin removed from every sheet edge before placement
    pub trimsize: f64,
    /// Material consumed by every cut
    pub saw_kerf: f64,
    /// Length of fresh stock; 0 is sized from the largest piece
    pub base_bin_length: f64,
    /// Width of fresh stock; 0 is sized from the largest piece
    pub base_bin_width: f64,
    /// Run the trials of a phase on the rayon thread pool
    pub parallel_trials: bool,
}

impl PackingConfig {
    pub const DEFAULT_STACKING: Stacking = Stacking::None;
    pub const DEFAULT_TRIMSIZE: f64 = 0.0;
    pub const DEFAULT_SAW_KERF: f64 = 0.0;
    pub const DEFAULT_BASE_BIN_LENGTH: f64 = 0.0;
    pub const DEFAULT_BASE_BIN_WIDTH: f64 = 0.0;
    pub const DEFAULT_PARALLEL_TRIALS: bool = true;

    /// Creates a builder for custom configuration.
    pub fn builder() -> PackingConfigBuilder {
        PackingConfigBuilder::default()
    }

    /// The sheet used for fresh stock, if any base dimension is set.
    ///
    /// An unset dimension stays 0 until the engine sizes it from the pieces.
    pub fn base_bin(&self) -> Option<Bin> {
        if self.base_bin_length > EPSILON_GENERAL || self.base_bin_width > EPSILON_GENERAL {
            Some(Bin::new(
                self.base_bin_length,
                self.base_bin_width,
                BinType::Base,
            ))
        } else {
            None
        }
    }
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            stacking: Self::DEFAULT_STACKING,
            trimsize: Self::DEFAULT_TRIMSIZE,
            saw_kerf: Self::DEFAULT_SAW_KERF,
            base_bin_length: Self::DEFAULT_BASE_BIN_LENGTH,
            base_bin_width: Self::DEFAULT_BASE_BIN_WIDTH,
            parallel_trials: Self::DEFAULT_PARALLEL_TRIALS,
        }
    }
}

/// Builder for PackingConfig.
#[derive(Clone, Debug, Default)]
pub struct PackingConfigBuilder {
    config: PackingConfig,
}

impl PackingConfigBuilder {
    pub fn stacking(mut self, stacking: Stacking) -> Self {
        self.config.stacking = stacking;
        self
    }

    pub fn trimsize(mut self, trimsize: f64) -> Self {
        self.config.trimsize = trimsize;
        self
    }

    pub fn saw_kerf(mut self, saw_kerf: f64) -> Self {
        self.config.saw_kerf = saw_kerf;
        self
    }

    pub fn base_bin_length(mut self, length: f64) -> Self {
        self.config.base_bin_length = length;
        self
    }

    pub fn base_bin_width(mut self, width: f64) -> Self {
        self.config.base_bin_width = width;
        self
    }

    /// Sets both base dimensions at once.
    pub fn base_bin(self, length: f64, width: f64) -> Self {
        self.base_bin_length(length).base_bin_width(width)
    }

    pub fn parallel_trials(mut self, parallel: bool) -> Self {
        self.config.parallel_trials = parallel;
        self
    }

    pub fn build(self) -> PackingConfig {
        self.config
    }
}

/// Outcome code of an engine run.
///
/// `None` and `PlacementIncomplete` come with a usable layout; the other
/// codes mean there is no usable layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    None,
    NoBin,
    NoPlacementPossible,
    PlacementIncomplete,
    BadError,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::None => "none",
            ErrorCode::NoBin => "no_bin",
            ErrorCode::NoPlacementPossible => "no_placement_possible",
            ErrorCode::PlacementIncomplete => "placement_incomplete",
            ErrorCode::BadError => "bad_error",
        }
    }

    /// Whether the run produced no usable layout.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ErrorCode::None | ErrorCode::PlacementIncomplete)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::None => write!(f, "All pieces were placed"),
            ErrorCode::NoBin => write!(
                f,
                "No sheet size available: add leftover sheets or configure a base size"
            ),
            ErrorCode::NoPlacementPossible => {
                write!(f, "No piece could be placed on any sheet")
            }
            ErrorCode::PlacementIncomplete => {
                write!(f, "Some pieces could not be placed")
            }
            ErrorCode::BadError => {
                write!(f, "Internal error: a trial produced an inconsistent layout")
            }
        }
    }
}

impl std::error::Error for ErrorCode {}

/// Search phase of an engine run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Cutting from leftover sheets registered by the caller.
    Leftover,
    /// Cutting from fresh sheets of the base size.
    Base,
}

/// Events emitted during a run, e.g. for live progress streaming.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum PackEvent {
    /// A phase starts its trials.
    PhaseStarted {
        phase: Phase,
        boxes: usize,
        items: usize,
        trials: usize,
    },
    /// One trial finished.
    TrialFinished {
        phase: Phase,
        score: Score,
        split: Split,
        boxes_packed: usize,
        bins_used: usize,
        outcome: ErrorCode,
    },
    /// The best trial of a phase was chosen.
    PhaseSelected {
        phase: Phase,
        score: Score,
        split: Split,
        unplaced: usize,
        bins_used: usize,
    },
    /// No trial of a phase was usable.
    PhaseFailed { phase: Phase, error_code: ErrorCode },
    /// The run is over.
    Finished {
        bins: usize,
        unplaced: usize,
        error_code: ErrorCode,
    },
}

/// Final layout of an engine run.
#[derive(Clone, Debug)]
pub struct PackingResult<T = ()> {
    /// Opened sheets, indexed contiguously from zero.
    pub container_bins: Vec<ContainerBin>,
    /// Leftover sheets that were never touched.
    pub unused_bins: Vec<Bin>,
    /// Pieces without a place, including those too large for any sheet.
    pub unplaced_boxes: Vec<Box2D>,
    pub performance: Performance,
    payloads: Vec<T>,
}

impl<T> PackingResult<T> {
    /// The caller payload attached to `b`.
    pub fn payload(&self, b: &Box2D) -> Option<&T> {
        self.payloads.get(b.id)
    }

    pub fn is_complete(&self) -> bool {
        self.unplaced_boxes.is_empty()
    }

    pub fn bin_count(&self) -> usize {
        self.container_bins.len()
    }

    pub fn placed_count(&self) -> usize {
        self.container_bins.iter().map(|b| b.placed().len()).sum()
    }

    pub fn unplaced_count(&self) -> usize {
        self.unplaced_boxes.len()
    }

    /// Placed area over usable area of all opened sheets, between 0.0 and 1.0.
    pub fn efficiency(&self) -> f64 {
        let usable: f64 = self
            .container_bins
            .iter()
            .map(|b| b.usable_area().area())
            .sum();
        if usable <= EPSILON_GENERAL {
            return 0.0;
        }
        let used: f64 = self.container_bins.iter().map(|b| b.used_area()).sum();
        used / usable
    }
}

/// Collects pieces and sheets and runs the two-phase search.
///
/// # Examples
/// ```
/// use cut_it_now::optimizer::{ErrorCode, PackEngine, PackingConfig};
///
/// let mut engine = PackEngine::new(PackingConfig::default());
/// engine.add_bin(1000.0, 600.0);
/// engine.add_box(500.0, 300.0, "door");
/// engine.add_box(500.0, 300.0, "shelf");
///
/// let (result, code) = engine.run();
/// assert_eq!(code, ErrorCode::None);
/// assert_eq!(result.unwrap().bin_count(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct PackEngine<T = ()> {
    config: PackingConfig,
    processor: Processor,
    bins: Vec<Bin>,
    boxes: Vec<Box2D>,
    payloads: Vec<T>,
}

impl<T: Clone> PackEngine<T> {
    pub fn new(config: PackingConfig) -> Self {
        Self {
            config,
            processor: Processor::new(&config),
            bins: Vec::new(),
            boxes: Vec::new(),
            payloads: Vec::new(),
        }
    }

    /// Registers a leftover sheet. A zero dimension is sized from the largest piece.
    pub fn add_bin(&mut self, length: f64, width: f64) {
        self.add_bin_with_type(length, width, BinType::UserDefined);
    }

    pub fn add_bin_with_type(&mut self, length: f64, width: f64, bin_type: BinType) {
        self.bins.push(Bin::new(length, width, bin_type));
    }

    /// Registers a piece and returns its id. Dimensions must be positive and finite.
    pub fn add_box(&mut self, length: f64, width: f64, payload: T) -> usize {
        let id = self.boxes.len();
        self.boxes.push(Box2D { id, length, width });
        self.payloads.push(payload);
        id
    }

    pub fn box_count(&self) -> usize {
        self.boxes.len()
    }

    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    /// Runs the search. See `run_with_progress`.
    pub fn run(&self) -> (Option<PackingResult<T>>, ErrorCode) {
        self.run_with_progress(|_| {})
    }

    /// Runs the search and reports progress through `on_event`.
    ///
    /// Returns no layout when no sheet size is known or a phase yields no
    /// usable trial. Otherwise the layout is returned with `None`,
    /// `PlacementIncomplete` (some pieces unplaced) or `NoPlacementPossible`
    /// (nothing placed). The engine itself is not modified.
    pub fn run_with_progress(
        &self,
        mut on_event: impl FnMut(&PackEvent),
    ) -> (Option<PackingResult<T>>, ErrorCode) {
        let config = self.config;
        if config.base_bin().is_none() && self.bins.is_empty() {
            log::warn!("No sheet size available for {} pieces", self.boxes.len());
            return finish(None, ErrorCode::NoBin, self.boxes.len(), &mut on_event);
        }

        let sorted = self.processor.sort_boxes(&self.boxes);
        let user_bins = self.processor.max_size_bins(&self.bins, &sorted);
        let base = config
            .base_bin()
            .and_then(|bin| self.processor.max_size_bins(&[bin], &sorted).pop());
        let mut candidates = user_bins.clone();
        candidates.extend(base);
        let (fitting, oversized) = self.processor.remove_oversized(sorted, &candidates);
        let (leftover_boxes, mut remaining) =
            self.processor.remove_oversized(fitting, &user_bins);
        if !oversized.is_empty() {
            log::info!("{} pieces exceed every sheet", oversized.len());
        }

        let mut phases: Vec<Trial> = Vec::new();
        let mut unused_bins: Vec<Bin> = Vec::new();

        if leftover_boxes.is_empty() {
            unused_bins.extend(user_bins.iter().copied());
        } else {
            let items = self.processor.make_items(leftover_boxes, &user_bins);
            match search(&config, Phase::Leftover, items, &user_bins, None, &mut on_event) {
                Ok(mut trial) => {
                    let unplaced = std::mem::take(&mut trial.unplaced);
                    remaining.extend(unplaced.into_iter().flat_map(PackItem::into_boxes));
                    phases.push(trial);
                }
                Err(code) => return finish(None, code, self.boxes.len(), &mut on_event),
            }
        }

        if let Some(base_bin) = base
            && !remaining.is_empty()
        {
            let boxes = self.processor.sort_boxes(&remaining);
            let items = self.processor.make_items(boxes, &[base_bin]);
            match search(&config, Phase::Base, items, &[], Some(base_bin), &mut on_event) {
                Ok(mut trial) => {
                    let unplaced = std::mem::take(&mut trial.unplaced);
                    remaining = unplaced
                        .into_iter()
                        .flat_map(PackItem::into_boxes)
                        .collect();
                    phases.push(trial);
                }
                Err(code) => return finish(None, code, self.boxes.len(), &mut on_event),
            }
        }

        let mut container_bins = Vec::new();
        for trial in phases {
            container_bins.extend(trial.container_bins);
            unused_bins.extend(trial.unused_bins);
        }
        for (index, bin) in container_bins.iter_mut().enumerate() {
            bin.index = index;
        }
        remaining.extend(oversized);

        let performance = Performance::measure(&container_bins);
        let code = if remaining.is_empty() {
            ErrorCode::None
        } else if performance.nb_boxes_packed > 0 {
            ErrorCode::PlacementIncomplete
        } else {
            ErrorCode::NoPlacementPossible
        };
        let unplaced = remaining.len();
        let result = PackingResult {
            container_bins,
            unused_bins,
            unplaced_boxes: remaining,
            performance,
            payloads: self.payloads.clone(),
        };
        finish(Some(result), code, unplaced, &mut on_event)
    }
}

fn finish<T>(
    result: Option<PackingResult<T>>,
    code: ErrorCode,
    unplaced: usize,
    on_event: &mut impl FnMut(&PackEvent),
) -> (Option<PackingResult<T>>, ErrorCode) {
    on_event(&PackEvent::Finished {
        bins: result.as_ref().map_or(0, |r| r.bin_count()),
        unplaced,
        error_code: code,
    });
    (result, code)
}

/// Runs every (score, split) trial of one phase and returns the best one.
///
/// Trials are collected in combination order, so the choice among equally
/// ranked trials does not depend on thread scheduling.
fn search(
    config: &PackingConfig,
    phase: Phase,
    items: Vec<PackItem>,
    bins: &[Bin],
    base: Option<Bin>,
    on_event: &mut impl FnMut(&PackEvent),
) -> Result<Trial, ErrorCode> {
    let expected: usize = items.iter().map(PackItem::box_count).sum();
    let combos = combinations();
    on_event(&PackEvent::PhaseStarted {
        phase,
        boxes: expected,
        items: items.len(),
        trials: combos.len(),
    });

    let run_trial = |&(score, split): &(Score, Split)| {
        Packer::new(score, split, config).pack(items.clone(), bins.to_vec(), base)
    };
    let trials: Vec<Trial> = if config.parallel_trials {
        combos.par_iter().map(run_trial).collect()
    } else {
        combos.iter().map(run_trial).collect()
    };

    let mut error = ErrorCode::None;
    let mut valid = Vec::new();
    for trial in trials {
        let packed = trial.performance.map_or(0, |p| p.nb_boxes_packed);
        let outcome = match trial.performance {
            None => ErrorCode::BadError,
            Some(_) if packed == 0 && expected > 0 => ErrorCode::NoPlacementPossible,
            Some(_) if packed < expected => ErrorCode::PlacementIncomplete,
            Some(_) => ErrorCode::None,
        };
        log::debug!(
            "{:?} trial {}/{}: {}/{} pieces on {} sheets",
            phase,
            trial.score.code(),
            trial.split.code(),
            packed,
            expected,
            trial.container_bins.len()
        );
        on_event(&PackEvent::TrialFinished {
            phase,
            score: trial.score,
            split: trial.split,
            boxes_packed: packed,
            bins_used: trial.container_bins.len(),
            outcome,
        });
        if outcome != ErrorCode::None {
            error = outcome;
        }
        if !outcome.is_fatal() {
            valid.push(trial);
        }
    }

    let Some(best) = valid.into_iter().min_by(|a, b| a.compare(b)) else {
        log::warn!("{:?} phase produced no usable trial: {}", phase, error);
        on_event(&PackEvent::PhaseFailed {
            phase,
            error_code: error,
        });
        return Err(error);
    };

    log::info!(
        "{:?} phase selected {}/{}: {} unplaced, {} sheets",
        phase,
        best.score.code(),
        best.split.code(),
        best.unplaced_count(),
        best.container_bins.len()
    );
    on_event(&PackEvent::PhaseSelected {
        phase,
        score: best.score,
        split: best.split,
        unplaced: best.unplaced_count(),
        bins_used: best.container_bins.len(),
    });
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::geometry::intersects;

    fn sequential() -> PackingConfigBuilder {
        PackingConfig::builder().parallel_trials(false)
    }

    fn placed_ids<T>(result: &PackingResult<T>) -> Vec<usize> {
        result
            .container_bins
            .iter()
            .flat_map(|b| b.placed().iter().map(|p| p.object.id))
            .collect()
    }

    fn assert_conserved<T>(result: &PackingResult<T>, total: usize) {
        let mut ids = placed_ids(result);
        ids.extend(result.unplaced_boxes.iter().map(|b| b.id));
        assert_eq!(ids.len(), total, "pieces lost or duplicated");
        let unique: HashSet<usize> = ids.iter().copied().collect();
        assert_eq!(unique.len(), total, "pieces duplicated");
    }

    fn assert_sound<T>(result: &PackingResult<T>) {
        for (index, bin) in result.container_bins.iter().enumerate() {
            assert_eq!(bin.index, index);
            let usable = bin.usable_area();
            for (i, a) in bin.placed().iter().enumerate() {
                assert!(usable.contains(&a.rect(), EPSILON_GENERAL));
                for b in &bin.placed()[i + 1..] {
                    assert!(!intersects(a, b));
                }
                for leftover in bin.leftovers() {
                    assert!(!a.rect().intersects(&leftover, EPSILON_GENERAL));
                }
            }
        }
    }

    fn mixed_engine(config: PackingConfig) -> PackEngine<usize> {
        let mut engine = PackEngine::new(config);
        engine.add_bin(800.0, 400.0);
        engine.add_bin(300.0, 300.0);
        engine.add_bin(1200.0, 200.0);
        for i in 0..25 {
            let length = 60.0 + (i * 83 % 340) as f64;
            let width = 40.0 + (i * 47 % 180) as f64;
            engine.add_box(length, width, i);
        }
        engine.add_box(5000.0, 5000.0, 99);
        engine
    }

    #[test]
    fn two_boxes_fit_one_leftover_sheet() {
        let mut engine = PackEngine::new(sequential().build());
        engine.add_bin(1000.0, 600.0);
        engine.add_box(500.0, 300.0, ());
        engine.add_box(500.0, 300.0, ());

        let (result, code) = engine.run();
        assert_eq!(code, ErrorCode::None);
        let result = result.expect("layout expected");
        assert_eq!(result.bin_count(), 1);
        assert_eq!(result.placed_count(), 2);
        assert!(result.is_complete());
        assert!(result.unused_bins.is_empty());
        assert_sound(&result);
    }

    #[test]
    fn oversized_box_with_base_stock_is_reported_unplaced() {
        let mut engine = PackEngine::new(sequential().base_bin(1000.0, 1000.0).build());
        engine.add_box(2000.0, 2000.0, ());

        let (result, code) = engine.run();
        assert_eq!(code, ErrorCode::NoPlacementPossible);
        let result = result.expect("layout with unplaced list expected");
        assert_eq!(result.bin_count(), 0);
        assert_eq!(result.unplaced_boxes.len(), 1);
        assert_eq!(result.unplaced_boxes[0].id, 0);
    }

    #[test]
    fn oversized_box_next_to_placeable_box_is_incomplete() {
        let mut engine = PackEngine::new(sequential().base_bin(1000.0, 1000.0).build());
        engine.add_box(2000.0, 2000.0, ());
        engine.add_box(500.0, 500.0, ());

        let (result, code) = engine.run();
        assert_eq!(code, ErrorCode::PlacementIncomplete);
        assert!(!code.is_fatal());
        let result = result.unwrap();
        assert_eq!(placed_ids(&result), vec![1]);
        assert_eq!(result.unplaced_boxes[0].id, 0);
        assert_eq!(result.container_bins[0].bin.bin_type, BinType::Base);
    }

    #[test]
    fn no_bins_and_no_base_size_fails() {
        let mut engine: PackEngine = PackEngine::new(PackingConfig::default());
        engine.add_box(100.0, 100.0, ());

        let (result, code) = engine.run();
        assert!(result.is_none());
        assert_eq!(code, ErrorCode::NoBin);
        assert!(code.is_fatal());
    }

    #[test]
    fn lengthwise_stacking_collapses_and_expands_identical_boxes() {
        let mut engine = PackEngine::new(sequential().stacking(Stacking::Length).build());
        engine.add_bin(1000.0, 100.0);
        for i in 0..10 {
            engine.add_box(100.0, 100.0, i);
        }

        let mut started = Vec::new();
        let (result, code) = engine.run_with_progress(|event| {
            if let PackEvent::PhaseStarted { boxes, items, .. } = event {
                started.push((*boxes, *items));
            }
        });

        assert_eq!(started, vec![(10, 1)]);
        assert_eq!(code, ErrorCode::None);
        let result = result.unwrap();
        assert_eq!(result.bin_count(), 1);
        let mut xs: Vec<f64> = result.container_bins[0]
            .placed()
            .iter()
            .map(|p| p.position.0)
            .collect();
        xs.sort_by(|a, b| a.total_cmp(b));
        let expected: Vec<f64> = (0..10).map(|i| i as f64 * 100.0).collect();
        assert_eq!(xs, expected);
        assert!(result.container_bins[0].leftovers().is_empty());
    }

    fn stacked_on_narrow_sheet(stacking: Stacking) -> (Vec<(usize, usize)>, Vec<(f64, f64)>) {
        let mut engine = PackEngine::new(sequential().stacking(stacking).build());
        engine.add_bin(100.0, 1000.0);
        for i in 0..10 {
            engine.add_box(100.0, 100.0, i);
        }

        let mut started = Vec::new();
        let (result, code) = engine.run_with_progress(|event| {
            if let PackEvent::PhaseStarted { boxes, items, .. } = event {
                started.push((*boxes, *items));
            }
        });
        assert_eq!(code, ErrorCode::None);
        let result = result.unwrap();
        assert_eq!(result.bin_count(), 1);
        assert_sound(&result);

        let mut positions: Vec<(f64, f64)> = result.container_bins[0]
            .placed()
            .iter()
            .map(|p| p.position)
            .collect();
        positions.sort_by(|a, b| a.1.total_cmp(&b.1));
        (started, positions)
    }

    #[test]
    fn sheet_long_along_width_fills_in_one_column() {
        let column: Vec<(f64, f64)> = (0..10).map(|i| (0.0, i as f64 * 100.0)).collect();

        // the sheet is only one piece long, so lengthwise stacks stay single
        let (started, positions) = stacked_on_narrow_sheet(Stacking::Length);
        assert_eq!(started, vec![(10, 10)]);
        assert_eq!(positions, column);

        let (started, positions) = stacked_on_narrow_sheet(Stacking::Width);
        assert_eq!(started, vec![(10, 1)]);
        assert_eq!(positions, column);
    }

    #[test]
    fn every_box_is_accounted_for_exactly_once() {
        let config = sequential().base_bin(1000.0, 500.0).trimsize(5.0).saw_kerf(3.0);
        let engine = mixed_engine(config.build());
        let (result, code) = engine.run();
        let result = result.unwrap();

        assert_eq!(code, ErrorCode::PlacementIncomplete);
        assert_conserved(&result, engine.box_count());
        assert_sound(&result);
        assert_eq!(result.unplaced_boxes.len(), 1);
        assert_eq!(result.payload(&result.unplaced_boxes[0]), Some(&99));
    }

    #[test]
    fn oversized_box_never_reaches_a_sheet() {
        let engine = mixed_engine(sequential().base_bin(1000.0, 500.0).build());
        let (result, _) = engine.run();
        let result = result.unwrap();
        let oversized_id = engine.box_count() - 1;
        assert!(!placed_ids(&result).contains(&oversized_id));
        assert!(result.unplaced_boxes.iter().any(|b| b.id == oversized_id));
    }

    #[test]
    fn leftover_sheets_come_before_base_sheets() {
        let engine = mixed_engine(sequential().base_bin(1000.0, 500.0).build());
        let (result, _) = engine.run();
        let result = result.unwrap();

        let types: Vec<BinType> = result.container_bins.iter().map(|b| b.bin.bin_type).collect();
        let first_base = types.iter().position(|t| *t == BinType::Base).unwrap();
        assert!(types[..first_base].iter().all(|t| *t == BinType::UserDefined));
        assert!(types[first_base..].iter().all(|t| *t == BinType::Base));
        assert_sound(&result);
    }

    #[test]
    fn leftover_phase_alone_reports_incomplete_without_base() {
        let mut engine = PackEngine::new(sequential().build());
        engine.add_bin(500.0, 500.0);
        engine.add_box(400.0, 400.0, "a");
        engine.add_box(400.0, 400.0, "b");

        let (result, code) = engine.run();
        assert_eq!(code, ErrorCode::PlacementIncomplete);
        let result = result.unwrap();
        assert_eq!(result.placed_count(), 1);
        assert_eq!(result.unplaced_count(), 1);
        let unplaced = &result.unplaced_boxes[0];
        assert!(matches!(result.payload(unplaced), Some(&"a") | Some(&"b")));
    }

    #[test]
    fn untouched_leftover_sheets_are_returned_unused() {
        let mut engine = PackEngine::new(sequential().base_bin(2000.0, 1000.0).build());
        engine.add_bin(100.0, 100.0);
        engine.add_box(500.0, 500.0, ());

        let (result, code) = engine.run();
        assert_eq!(code, ErrorCode::None);
        let result = result.unwrap();
        assert_eq!(result.bin_count(), 1);
        assert_eq!(result.container_bins[0].bin.bin_type, BinType::Base);
        assert_eq!(result.unused_bins, vec![Bin::new(100.0, 100.0, BinType::UserDefined)]);
    }

    #[test]
    fn unused_base_typed_caller_sheet_is_returned() {
        let mut engine = PackEngine::new(sequential().build());
        engine.add_bin(1000.0, 600.0);
        engine.add_bin_with_type(100.0, 100.0, BinType::Base);
        engine.add_box(500.0, 300.0, ());

        let (result, code) = engine.run();
        assert_eq!(code, ErrorCode::None);
        let result = result.unwrap();
        assert_eq!(result.bin_count(), 1);
        assert_eq!(result.unused_bins, vec![Bin::new(100.0, 100.0, BinType::Base)]);
    }

    #[test]
    fn unset_leftover_dimension_is_sized_from_largest_box() {
        let mut engine = PackEngine::new(sequential().trimsize(10.0).build());
        engine.add_bin(0.0, 300.0);
        engine.add_box(700.0, 280.0, ());

        let (result, code) = engine.run();
        assert_eq!(code, ErrorCode::None);
        let bin = &result.unwrap().container_bins[0];
        assert!((bin.bin.length - 720.0).abs() < EPSILON_GENERAL);
        assert_eq!(bin.placed()[0].position, (10.0, 10.0));
    }

    #[test]
    fn unset_base_dimension_is_sized_from_largest_box() {
        let mut engine = PackEngine::new(sequential().base_bin_width(500.0).build());
        engine.add_box(700.0, 200.0, ());
        engine.add_box(300.0, 200.0, ());

        let (result, code) = engine.run();
        assert_eq!(code, ErrorCode::None);
        let result = result.unwrap();
        assert_eq!(result.bin_count(), 1);
        let sheet = &result.container_bins[0].bin;
        assert_eq!(sheet.bin_type, BinType::Base);
        assert!((sheet.length - 700.0).abs() < EPSILON_GENERAL);
        assert!((sheet.width - 500.0).abs() < EPSILON_GENERAL);
    }

    #[test]
    fn empty_request_yields_empty_layout() {
        let mut engine: PackEngine = PackEngine::new(sequential().build());
        engine.add_bin(100.0, 100.0);

        let (result, code) = engine.run();
        assert_eq!(code, ErrorCode::None);
        let result = result.unwrap();
        assert_eq!(result.bin_count(), 0);
        assert_eq!(result.unused_bins.len(), 1);
    }

    #[test]
    fn identical_runs_give_identical_layouts() {
        let config = sequential().base_bin(1000.0, 500.0).saw_kerf(2.0);
        let sequential_engine = mixed_engine(config.clone().build());
        let parallel_engine = mixed_engine(config.parallel_trials(true).build());

        let snapshot = |engine: &PackEngine<usize>| {
            let (result, code) = engine.run();
            let result = result.unwrap();
            let placements: Vec<(usize, usize, (f64, f64))> = result
                .container_bins
                .iter()
                .flat_map(|b| b.placed().iter().map(move |p| (b.index, p.object.id, p.position)))
                .collect();
            let unplaced: Vec<usize> = result.unplaced_boxes.iter().map(|b| b.id).collect();
            (code, placements, unplaced)
        };

        let first = snapshot(&sequential_engine);
        assert_eq!(first, snapshot(&sequential_engine));
        assert_eq!(first, snapshot(&parallel_engine));
    }

    #[test]
    fn selected_trial_ranks_no_worse_than_any_other() {
        let config = sequential().build();
        let processor = Processor::new(&config);
        let boxes: Vec<Box2D> = (0..18)
            .map(|i| Box2D::new(i, 50.0 + (i * 71 % 250) as f64, 30.0 + (i * 29 % 160) as f64).unwrap())
            .collect();
        let bins = vec![
            Bin::new(600.0, 400.0, BinType::UserDefined),
            Bin::new(500.0, 300.0, BinType::UserDefined),
        ];
        let items = processor.make_items(processor.sort_boxes(&boxes), &bins);

        let mut all: Vec<Trial> = Vec::new();
        let selected = {
            let mut collect = |_: &PackEvent| {};
            search(&config, Phase::Leftover, items.clone(), &bins, None, &mut collect).unwrap()
        };
        for (score, split) in combinations() {
            all.push(Packer::new(score, split, &config).pack(items.clone(), bins.clone(), None));
        }

        for trial in &all {
            assert_ne!(selected.compare(trial), std::cmp::Ordering::Greater);
        }
    }

    #[test]
    fn progress_events_follow_phase_order() {
        let engine = mixed_engine(sequential().base_bin(1000.0, 500.0).build());
        let mut kinds = Vec::new();
        engine.run_with_progress(|event| {
            let kind = match event {
                PackEvent::PhaseStarted { phase, .. } => format!("start:{:?}", phase),
                PackEvent::PhaseSelected { phase, .. } => format!("selected:{:?}", phase),
                PackEvent::PhaseFailed { .. } => "failed".to_string(),
                PackEvent::TrialFinished { .. } => return,
                PackEvent::Finished { .. } => "finished".to_string(),
            };
            kinds.push(kind);
        });

        assert_eq!(
            kinds,
            vec![
                "start:Leftover",
                "selected:Leftover",
                "start:Base",
                "selected:Base",
                "finished"
            ]
        );
    }

    #[test]
    fn error_codes_have_stable_names() {
        assert_eq!(ErrorCode::None.code(), "none");
        assert_eq!(ErrorCode::NoBin.code(), "no_bin");
        assert_eq!(ErrorCode::NoPlacementPossible.code(), "no_placement_possible");
        assert_eq!(ErrorCode::PlacementIncomplete.code(), "placement_incomplete");
        assert_eq!(ErrorCode::BadError.code(), "bad_error");
        assert_eq!(
            serde_json::to_string(&ErrorCode::PlacementIncomplete).unwrap(),
            "\"placement_incomplete\""
        );
    }
}
