//! Data models for 2D guillotine cutting.
//!
//! This module defines the fundamental data structures of the solver:
//! - `Box2D`: A rectangular piece requested by the caller
//! - `SuperBox`: Pieces stacked along one axis and placed as one unit
//! - `Bin`: A stock sheet definition
//! - `ContainerBin`: The mutable state of one sheet during a packing trial
//! - `Cut`: One guillotine cut in the history of a sheet

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::geometry::first_overlap;
use crate::heuristics::Split;
use crate::types::{Dimensional, EPSILON_GENERAL, Rect, validation};

/// Validation error for piece and sheet data.
#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidDimension(String),
    InvalidMargin(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidDimension(msg) => write!(f, "Invalid dimension: {}", msg),
            ValidationError::InvalidMargin(msg) => write!(f, "Invalid margin: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

fn validate_box_dims(length: f64, width: f64) -> Result<(), ValidationError> {
    validation::validate_dimension(length, "Length").map_err(ValidationError::InvalidDimension)?;
    validation::validate_dimension(width, "Width").map_err(ValidationError::InvalidDimension)?;
    Ok(())
}

/// Validates a trim size or saw kerf.
pub fn validate_margin(value: f64, name: &str) -> Result<(), ValidationError> {
    validation::validate_margin(value, name).map_err(ValidationError::InvalidMargin)
}

/// Direction in which pieces sharing a cross-section are stacked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Stacking {
    #[default]
    None,
    /// Pieces of equal width are chained along the length axis.
    Length,
    /// Pieces of equal length are chained along the width axis.
    Width,
}

impl Stacking {
    pub fn code(&self) -> &'static str {
        match self {
            Stacking::None => "none",
            Stacking::Length => "length",
            Stacking::Width => "width",
        }
    }

    /// Parses the configuration spelling of a stacking direction.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "off" | "0" => Some(Stacking::None),
            "length" | "lengthwise" | "1" => Some(Stacking::Length),
            "width" | "widthwise" | "2" => Some(Stacking::Width),
            _ => None,
        }
    }
}

/// A rectangular piece to be cut from a sheet.
///
/// `id` is the stable identity assigned by the engine; it links the piece
/// back to the caller's payload. Copies are cheap, so every trial works on
/// its own copy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, ToSchema)]
pub struct Box2D {
    pub id: usize,
    pub length: f64,
    pub width: f64,
}

impl Box2D {
    /// Creates a new piece with validation.
    ///
    /// # Examples
    /// ```
    /// use cut_it_now::model::Box2D;
    ///
    /// assert!(Box2D::new(0, 500.0, 300.0).is_ok());
    /// assert!(Box2D::new(1, -5.0, 300.0).is_err());
    /// ```
    pub fn new(id: usize, length: f64, width: f64) -> Result<Self, ValidationError> {
        validate_box_dims(length, width)?;
        Ok(Self { id, length, width })
    }
}

impl Dimensional for Box2D {
    fn length(&self) -> f64 {
        self.length
    }

    fn width(&self) -> f64 {
        self.width
    }
}

/// Pieces stacked along one axis, separated by one saw kerf each.
///
/// All members share the cross-section of the stack (the width for a
/// lengthwise stack, the length for a widthwise stack).
#[derive(Clone, Debug)]
pub struct SuperBox {
    direction: Stacking,
    saw_kerf: f64,
    boxes: Vec<Box2D>,
    length: f64,
    width: f64,
}

impl SuperBox {
    /// Starts a stack with its first member.
    pub fn new(direction: Stacking, saw_kerf: f64, first: Box2D) -> Self {
        Self {
            direction,
            saw_kerf,
            boxes: vec![first],
            length: first.length,
            width: first.width,
        }
    }

    fn len(&self) -> usize {
        self.boxes.len()
    }

    /// Extent of the stack along its stacking axis after adding `b`.
    fn extent_with(&self, b: &Box2D) -> f64 {
        match self.direction {
            Stacking::Width => self.width + self.saw_kerf + b.width,
            _ => self.length + self.saw_kerf + b.length,
        }
    }

    /// Checks whether `b` shares the cross-section and keeps the stack within `max_extent`.
    pub fn can_stack(&self, b: &Box2D, max_extent: f64) -> bool {
        let same_section = match self.direction {
            Stacking::Length => (self.width - b.width).abs() <= EPSILON_GENERAL,
            Stacking::Width => (self.length - b.length).abs() <= EPSILON_GENERAL,
            Stacking::None => false,
        };
        same_section && self.extent_with(b) <= max_extent + EPSILON_GENERAL
    }

    /// Appends `b` to the end of the stack. Call `can_stack` first.
    pub fn push(&mut self, b: Box2D) {
        match self.direction {
            Stacking::Width => self.width = self.extent_with(&b),
            _ => self.length = self.extent_with(&b),
        }
        self.boxes.push(b);
    }

    /// Turns the stack into a placement unit; a one-member stack stays a plain piece.
    pub fn into_item(self) -> PackItem {
        if self.boxes.len() == 1 {
            PackItem::Single(self.boxes[0])
        } else {
            PackItem::Stack(self)
        }
    }

    /// Expands the stack into its members, placed from (`x`, `y`) onwards.
    pub fn expand(&self, x: f64, y: f64) -> Vec<PlacedBox> {
        let mut offset = 0.0;
        self.boxes
            .iter()
            .map(|b| {
                let position = match self.direction {
                    Stacking::Width => (x, y + offset),
                    _ => (x + offset, y),
                };
                offset += match self.direction {
                    Stacking::Width => b.width,
                    _ => b.length,
                } + self.saw_kerf;
                PlacedBox::new(*b, position)
            })
            .collect()
    }
}

impl Dimensional for SuperBox {
    fn length(&self) -> f64 {
        self.length
    }

    fn width(&self) -> f64 {
        self.width
    }
}

/// One placement unit handed to the packer.
#[derive(Clone, Debug)]
pub enum PackItem {
    Single(Box2D),
    Stack(SuperBox),
}

impl PackItem {
    /// Number of caller pieces inside this unit.
    pub fn box_count(&self) -> usize {
        match self {
            PackItem::Single(_) => 1,
            PackItem::Stack(stack) => stack.len(),
        }
    }

    /// Places the unit with its lower-left corner at (`x`, `y`).
    pub fn place_at(&self, x: f64, y: f64) -> Vec<PlacedBox> {
        match self {
            PackItem::Single(b) => vec![PlacedBox::new(*b, (x, y))],
            PackItem::Stack(stack) => stack.expand(x, y),
        }
    }

    /// Dissolves the unit into the caller pieces it contains.
    pub fn into_boxes(self) -> Vec<Box2D> {
        match self {
            PackItem::Single(b) => vec![b],
            PackItem::Stack(stack) => stack.boxes,
        }
    }
}

impl Dimensional for PackItem {
    fn length(&self) -> f64 {
        match self {
            PackItem::Single(b) => b.length,
            PackItem::Stack(stack) => stack.length,
        }
    }

    fn width(&self) -> f64 {
        match self {
            PackItem::Single(b) => b.width,
            PackItem::Stack(stack) => stack.width,
        }
    }
}

/// Origin of a stock sheet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BinType {
    /// Leftover stock registered by the caller.
    #[default]
    UserDefined,
    /// Freshly cut stock of the configured base size.
    Base,
}

/// A stock sheet available for cutting.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, ToSchema)]
pub struct Bin {
    pub length: f64,
    pub width: f64,
    pub bin_type: BinType,
}

impl Bin {
    pub fn new(length: f64, width: f64, bin_type: BinType) -> Self {
        Self {
            length,
            width,
            bin_type,
        }
    }

    /// Creates a leftover sheet with validation. A zero dimension stays unset.
    pub fn checked(length: f64, width: f64) -> Result<Self, ValidationError> {
        for (value, name) in [(length, "Sheet length"), (width, "Sheet width")] {
            if value != 0.0 {
                validation::validate_dimension(value, name)
                    .map_err(ValidationError::InvalidDimension)?;
            }
        }
        Ok(Self::new(length, width, BinType::UserDefined))
    }

    /// Size left for pieces after removing `trimsize` on all four edges.
    pub fn usable_size(&self, trimsize: f64) -> (f64, f64) {
        (
            (self.length - 2.0 * trimsize).max(0.0),
            (self.width - 2.0 * trimsize).max(0.0),
        )
    }

    /// Checks whether `item` fits on an empty sheet of this kind.
    pub fn admits(&self, item: &impl Dimensional, trimsize: f64) -> bool {
        let (length, width) = self.usable_size(trimsize);
        item.fits_in(length, width)
    }
}

impl Dimensional for Bin {
    fn length(&self) -> f64 {
        self.length
    }

    fn width(&self) -> f64 {
        self.width
    }
}

/// A piece at its final position on a sheet.
///
/// # Fields
/// * `object` - The placed piece
/// * `position` - Lower-left corner (x along length, y along width)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacedBox {
    pub object: Box2D,
    pub position: (f64, f64),
}

impl PlacedBox {
    pub fn new(object: Box2D, position: (f64, f64)) -> Self {
        Self { object, position }
    }

    /// Area covered on the sheet.
    #[inline]
    pub fn rect(&self) -> Rect {
        Rect::new(
            self.position.0,
            self.position.1,
            self.object.length,
            self.object.width,
        )
    }
}

/// Orientation of a guillotine cut line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CutAxis {
    /// The cut runs parallel to the length axis over the full length of its parent.
    Lengthwise,
    /// The cut runs parallel to the width axis over the full width of its parent.
    Widthwise,
}

/// A rectangle in the cut history of a sheet.
#[derive(Clone, Copy, Debug)]
pub struct FreeRect {
    pub rect: Rect,
    /// Cut that produced this rectangle; `None` for the usable area itself.
    pub parent_cut: Option<usize>,
}

/// One guillotine cut dividing a free rectangle.
///
/// `parent` and `children` are indices into the rectangle arena of the
/// owning `ContainerBin`. A child is `None` when the kerf or the piece
/// consumed that side completely.
#[derive(Clone, Copy, Debug)]
pub struct Cut {
    pub parent: usize,
    pub axis: CutAxis,
    pub x: f64,
    pub y: f64,
    /// Length of the cut line.
    pub extent: f64,
    pub children: [Option<usize>; 2],
}

/// The state of one sheet during a packing trial.
///
/// Every rectangle ever produced on this sheet is kept in an arena; the
/// free list holds arena indices in creation order.
#[derive(Clone, Debug)]
pub struct ContainerBin {
    pub bin: Bin,
    pub index: usize,
    pub trimsize: f64,
    pub saw_kerf: f64,
    areas: Vec<FreeRect>,
    free: Vec<usize>,
    cuts: Vec<Cut>,
    placed: Vec<PlacedBox>,
}

impl ContainerBin {
    /// Opens a sheet. Its usable area is the only free rectangle.
    pub fn new(bin: Bin, index: usize, trimsize: f64, saw_kerf: f64) -> Self {
        let (length, width) = bin.usable_size(trimsize);
        let usable = Rect::new(trimsize, trimsize, length, width);
        let mut free = Vec::new();
        if !usable.is_degenerate() {
            free.push(0);
        }
        Self {
            bin,
            index,
            trimsize,
            saw_kerf,
            areas: vec![FreeRect {
                rect: usable,
                parent_cut: None,
            }],
            free,
            cuts: Vec::new(),
            placed: Vec::new(),
        }
    }

    /// The sheet minus its trim margins.
    pub fn usable_area(&self) -> Rect {
        self.areas[0].rect
    }

    /// Free rectangles with their arena index, oldest first.
    pub fn free_rects(&self) -> impl Iterator<Item = (usize, &Rect)> + '_ {
        self.free.iter().map(|&idx| (idx, &self.areas[idx].rect))
    }

    /// Rectangles left over after packing.
    pub fn leftovers(&self) -> Vec<Rect> {
        self.free_rects().map(|(_, rect)| *rect).collect()
    }

    pub fn placed(&self) -> &[PlacedBox] {
        &self.placed
    }

    pub fn cuts(&self) -> &[Cut] {
        &self.cuts
    }

    pub fn area(&self, idx: usize) -> Option<&FreeRect> {
        self.areas.get(idx)
    }

    /// Area covered by placed pieces.
    pub fn used_area(&self) -> f64 {
        self.placed.iter().map(|p| p.object.area()).sum()
    }

    /// Share of the usable area covered by pieces, between 0.0 and 1.0.
    pub fn efficiency(&self) -> f64 {
        let total = self.usable_area().area();
        if total <= EPSILON_GENERAL {
            return 0.0;
        }
        self.used_area() / total
    }

    /// Arena indices from `idx` up to the usable area, following parent cuts.
    pub fn lineage(&self, idx: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut current = Some(idx);
        while let Some(i) = current {
            let Some(area) = self.areas.get(i) else {
                break;
            };
            chain.push(i);
            current = area.parent_cut.map(|c| self.cuts[c].parent);
        }
        chain
    }

    /// Places `item` in the lower-left corner of free rectangle `free_idx`.
    ///
    /// The rectangle is removed from the free list and the remaining space is
    /// divided by one guillotine cut whose axis is chosen by `split`. Returns
    /// `false` if `free_idx` is not free or the item does not fit.
    pub fn place(&mut self, item: &PackItem, free_idx: usize, split: Split) -> bool {
        let Some(pos) = self.free.iter().position(|&idx| idx == free_idx) else {
            return false;
        };
        let rect = self.areas[free_idx].rect;
        if !item.fits_in(rect.length, rect.width) {
            return false;
        }
        self.free.remove(pos);
        self.placed.extend(item.place_at(rect.x, rect.y));

        let (length, width) = (item.length(), item.width());
        let leftover_length = rect.length - length;
        let leftover_width = rect.width - width;
        let axis = if leftover_length <= EPSILON_GENERAL && leftover_width <= EPSILON_GENERAL {
            return true;
        } else if leftover_width <= EPSILON_GENERAL {
            CutAxis::Widthwise
        } else if leftover_length <= EPSILON_GENERAL {
            CutAxis::Lengthwise
        } else {
            split.axis(&rect, length, width)
        };

        let kerf = self.saw_kerf;
        let (x, y, extent, side, strip) = match axis {
            CutAxis::Lengthwise => (
                rect.x,
                rect.y + width,
                rect.length,
                Rect::new(
                    rect.x + length + kerf,
                    rect.y,
                    leftover_length - kerf,
                    width,
                ),
                Rect::new(rect.x, rect.y + width + kerf, rect.length, leftover_width - kerf),
            ),
            CutAxis::Widthwise => (
                rect.x + length,
                rect.y,
                rect.width,
                Rect::new(
                    rect.x + length + kerf,
                    rect.y,
                    leftover_length - kerf,
                    rect.width,
                ),
                Rect::new(rect.x, rect.y + width + kerf, length, leftover_width - kerf),
            ),
        };

        let cut_idx = self.cuts.len();
        let mut children = [None, None];
        for (slot, child) in children.iter_mut().zip([side, strip]) {
            if child.is_degenerate() {
                continue;
            }
            let idx = self.areas.len();
            self.areas.push(FreeRect {
                rect: child,
                parent_cut: Some(cut_idx),
            });
            self.free.push(idx);
            *slot = Some(idx);
        }
        self.cuts.push(Cut {
            parent: free_idx,
            axis,
            x,
            y,
            extent,
            children,
        });
        true
    }

    /// Checks the layout invariants of this sheet.
    ///
    /// Placed pieces and free rectangles must lie inside the usable area and
    /// must not overlap each other.
    pub fn verify(&self) -> bool {
        let usable = self.usable_area();
        let mut rects: Vec<Rect> = self.placed.iter().map(PlacedBox::rect).collect();
        rects.extend(self.leftovers());
        rects
            .iter()
            .all(|rect| usable.contains(rect, EPSILON_GENERAL))
            && first_overlap(&rects).is_none()
    }
}
