//! # Range Mapping
//!
//! Pure transforms between an absolute range and normalized `[0, 1]` space.
//!
//! The free functions check the range on every call. [`RangeMapper`] checks
//! both axes once at construction so the per-position transforms it performs
//! afterwards cannot fail.

use crate::error::PositionResult;
use crate::types::{AreaConfig, Point, Range};

/// Maps `value` from `range` into normalized space.
///
/// Fails with [`PositionError::DegenerateRange`](crate::PositionError::DegenerateRange)
/// when `range.min == range.max`.
pub fn to_normalized(value: f64, range: Range) -> PositionResult<f64> {
    let span = range.span()?;
    Ok((value - range.min) / span)
}

/// Maps a normalized value back into `range`.
pub fn from_normalized(norm: f64, range: Range) -> PositionResult<f64> {
    let span = range.span()?;
    Ok(norm * span + range.min)
}

/// Two-axis mapper for a validated area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeMapper {
    x_range: Range,
    y_range: Range,
    x_span: f64,
    y_span: f64,
}

impl RangeMapper {
    pub fn new(x_range: Range, y_range: Range) -> PositionResult<Self> {
        Ok(Self {
            x_range,
            y_range,
            x_span: x_range.span()?,
            y_span: y_range.span()?,
        })
    }

    pub fn from_area(area: &AreaConfig) -> PositionResult<Self> {
        Self::new(area.x_range, area.y_range)
    }

    pub fn to_normalized(&self, absolute: Point) -> Point {
        Point::new(
            (absolute.x - self.x_range.min) / self.x_span,
            (absolute.y - self.y_range.min) / self.y_span,
        )
    }

    pub fn from_normalized(&self, normalized: Point) -> Point {
        Point::new(
            normalized.x * self.x_span + self.x_range.min,
            normalized.y * self.y_span + self.y_range.min,
        )
    }
}
