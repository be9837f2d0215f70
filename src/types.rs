//! Common types and traits for 2D sheet geometry.
//!
//! All lengths share one linear unit chosen by the caller. The `length`
//! axis is the x axis of a sheet, the `width` axis is the y axis.

use serde::Serialize;
use utoipa::ToSchema;

/// Global numerical tolerance for floating-point comparisons.
///
/// Used whenever a dimension is compared against another one, e.g. when
/// checking whether a piece fits into a free rectangle.
pub const EPSILON_GENERAL: f64 = 1e-6;

/// Axis-aligned rectangle with its lower-left corner at (`x`, `y`).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, ToSchema)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub length: f64,
    pub width: f64,
}

impl Rect {
    #[inline]
    pub const fn new(x: f64, y: f64, length: f64, width: f64) -> Self {
        Self {
            x,
            y,
            length,
            width,
        }
    }

    /// Upper end on the length axis.
    #[inline]
    pub fn max_x(&self) -> f64 {
        self.x + self.length
    }

    /// Upper end on the width axis.
    #[inline]
    pub fn max_y(&self) -> f64 {
        self.y + self.width
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.length * self.width
    }

    /// Checks whether the rectangle has a usable extent on both axes.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.length <= EPSILON_GENERAL || self.width <= EPSILON_GENERAL
    }

    /// Checks whether `other` lies completely inside this rectangle.
    ///
    /// # Parameters
    /// * `other` - The rectangle to test
    /// * `tolerance` - Numerical tolerance applied on every edge
    pub fn contains(&self, other: &Self, tolerance: f64) -> bool {
        other.x + tolerance >= self.x
            && other.y + tolerance >= self.y
            && other.max_x() <= self.max_x() + tolerance
            && other.max_y() <= self.max_y() + tolerance
    }

    /// Checks if two rectangles share a region of positive area.
    ///
    /// Rectangles that only touch along an edge do not intersect.
    #[inline]
    pub fn intersects(&self, other: &Self, tolerance: f64) -> bool {
        !(self.max_x() <= other.x + tolerance
            || other.max_x() <= self.x + tolerance
            || self.max_y() <= other.y + tolerance
            || other.max_y() <= self.y + tolerance)
    }
}

/// Trait for objects with a 2D extent.
pub trait Dimensional {
    /// Extent along the length axis.
    fn length(&self) -> f64;

    /// Extent along the width axis.
    fn width(&self) -> f64;

    fn area(&self) -> f64 {
        self.length() * self.width()
    }

    /// The longer of both sides.
    fn long_side(&self) -> f64 {
        self.length().max(self.width())
    }

    /// The shorter of both sides.
    fn short_side(&self) -> f64 {
        self.length().min(self.width())
    }

    /// Checks if this object fits into a `length` x `width` area without rotation.
    fn fits_in(&self, length: f64, width: f64) -> bool {
        self.length() <= length + EPSILON_GENERAL && self.width() <= width + EPSILON_GENERAL
    }
}

impl Dimensional for Rect {
    fn length(&self) -> f64 {
        self.length
    }

    fn width(&self) -> f64 {
        self.width
    }
}

/// Validation functions shared by the model and the API boundary.
pub mod validation {

    /// Validates a single dimension.
    ///
    /// # Parameters
    /// * `value` - The value to validate
    /// * `name` - Name of the dimension for error messages
    ///
    /// # Returns
    /// `Ok(())` for valid values, otherwise error text
    pub fn validate_dimension(value: f64, name: &str) -> Result<(), String> {
        if value.is_nan() {
            return Err(format!("{} must not be NaN", name));
        }
        if value.is_infinite() {
            return Err(format!("{} must not be infinite", name));
        }
        if value <= 0.0 {
            return Err(format!("{} must be positive, got: {}", name, value));
        }
        Ok(())
    }

    /// Validates a margin such as trim size or saw kerf, which may be zero.
    pub fn validate_margin(value: f64, name: &str) -> Result<(), String> {
        if !value.is_finite() {
            return Err(format!("{} must be finite, got: {}", name, value));
        }
        if value < 0.0 {
            return Err(format!("{} must not be negative, got: {}", name, value));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_extent_and_area() {
        let rect = Rect::new(10.0, 5.0, 30.0, 20.0);
        assert!((rect.max_x() - 40.0).abs() < EPSILON_GENERAL);
        assert!((rect.max_y() - 25.0).abs() < EPSILON_GENERAL);
        assert!((rect.area() - 600.0).abs() < EPSILON_GENERAL);
        assert!(!rect.is_degenerate());
        assert!(Rect::new(0.0, 0.0, 10.0, 0.0).is_degenerate());
    }

    #[test]
    fn test_rect_contains() {
        let outer = Rect::new(0.0, 0.0, 100.0, 50.0);
        assert!(outer.contains(&Rect::new(0.0, 0.0, 100.0, 50.0), EPSILON_GENERAL));
        assert!(outer.contains(&Rect::new(10.0, 10.0, 20.0, 20.0), EPSILON_GENERAL));
        assert!(!outer.contains(&Rect::new(90.0, 0.0, 20.0, 20.0), EPSILON_GENERAL));
    }

    #[test]
    fn test_rect_intersects_ignores_shared_edges() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let touching = Rect::new(10.0, 0.0, 10.0, 10.0);
        let overlapping = Rect::new(5.0, 5.0, 10.0, 10.0);

        assert!(!a.intersects(&touching, EPSILON_GENERAL));
        assert!(a.intersects(&overlapping, EPSILON_GENERAL));
    }

    #[test]
    fn test_dimensional_sides() {
        let rect = Rect::new(0.0, 0.0, 30.0, 70.0);
        assert_eq!(rect.long_side(), 70.0);
        assert_eq!(rect.short_side(), 30.0);
        assert!(rect.fits_in(30.0, 70.0));
        assert!(!rect.fits_in(70.0, 30.0));
    }

    #[test]
    fn test_validation_dimension() {
        assert!(validation::validate_dimension(10.0, "Length").is_ok());
        assert!(validation::validate_dimension(0.0, "Length").is_err());
        assert!(validation::validate_dimension(-1.0, "Length").is_err());
        assert!(validation::validate_dimension(f64::NAN, "Length").is_err());
        assert!(validation::validate_dimension(f64::INFINITY, "Length").is_err());
    }

    #[test]
    fn test_validation_margin() {
        assert!(validation::validate_margin(0.0, "Trim size").is_ok());
        assert!(validation::validate_margin(3.5, "Trim size").is_ok());
        assert!(validation::validate_margin(-0.1, "Trim size").is_err());
        assert!(validation::validate_margin(f64::NAN, "Trim size").is_err());
    }
}
