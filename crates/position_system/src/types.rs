//! # Core Type Definitions
//!
//! This module contains the fundamental types shared by the server and its clients:
//! client identity, the declared area, per-client position records and the
//! trigger set driving proximity detection.
//!
//! ## Key Types
//!
//! - [`ClientId`] - Opaque key identifying one connected client session
//! - [`Range`] - One axis of the area, serialized as `[min, max]`
//! - [`AreaConfig`] - The server-owned area every position is expressed in
//! - [`PositionRecord`] - The client-owned absolute + normalized position
//! - [`TriggerSet`] - Moving trigger points and the radius around them
//!
//! Field names follow the camelCase wire format clients read and write
//! (`xRange`, `normX`, `backgroundImage`, ...).

use crate::error::{PositionError, PositionResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Identity
// ============================================================================

/// Unique identifier for a connected client session.
///
/// Client records are keyed by this id rather than by live references, so a
/// record's lifetime is governed by explicit attach and detach calls.
///
/// # Examples
///
/// ```rust
/// use position_system::ClientId;
///
/// let client_id = ClientId::new();
/// let parsed: ClientId = client_id.to_string().parse().unwrap();
/// assert_eq!(client_id, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Creates a new random client ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::str::FromStr for ClientId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// Closed interval on one axis of the area.
///
/// Serialized as a two element array so the wire format stays
/// `xRange: [min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Width of the interval, rejecting ranges that cannot be mapped.
    pub fn span(&self) -> PositionResult<f64> {
        let span = self.max - self.min;
        if span == 0.0 || !span.is_finite() {
            return Err(PositionError::DegenerateRange {
                min: self.min,
                max: self.max,
            });
        }
        Ok(span)
    }
}

impl Default for Range {
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}

impl From<[f64; 2]> for Range {
    fn from(bounds: [f64; 2]) -> Self {
        Self::new(bounds[0], bounds[1])
    }
}

impl From<Range> for [f64; 2] {
    fn from(range: Range) -> Self {
        [range.min, range.max]
    }
}

/// A point in area units (or normalized units, depending on context).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

// ============================================================================
// Area configuration
// ============================================================================

/// The declared 2-D area, created once by the server and broadcast read-only.
///
/// `background_image`, when present, is a self-contained payload (usually a
/// base64 `data:` URI) so clients never need a separate file fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaConfig {
    pub x_range: Range,
    pub y_range: Range,
    #[serde(default)]
    pub background_image: Option<String>,
}

impl Default for AreaConfig {
    fn default() -> Self {
        Self {
            x_range: Range::default(),
            y_range: Range::default(),
            background_image: None,
        }
    }
}

// ============================================================================
// Position record
// ============================================================================

/// Position state of one client.
///
/// Absolute (`x`, `y`) and normalized (`norm_x`, `norm_y`) coordinates are
/// always written together, so one pair is never stale relative to the other.
/// A fresh record is empty until the client first sets a position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub norm_x: Option<f64>,
    pub norm_y: Option<f64>,
    pub label: Option<String>,
}

impl PositionRecord {
    pub(crate) fn populated(absolute: Point, normalized: Point, label: Option<String>) -> Self {
        Self {
            x: Some(absolute.x),
            y: Some(absolute.y),
            norm_x: Some(normalized.x),
            norm_y: Some(normalized.y),
            label,
        }
    }

    /// Whether a position has been set at least once.
    pub fn is_set(&self) -> bool {
        self.position().is_some()
    }

    /// Absolute position, if one has been set.
    pub fn position(&self) -> Option<Point> {
        match (self.x, self.y) {
            (Some(x), Some(y)) => Some(Point::new(x, y)),
            _ => None,
        }
    }

    /// Normalized position, if one has been set.
    pub fn normalized(&self) -> Option<Point> {
        match (self.norm_x, self.norm_y) {
            (Some(x), Some(y)) => Some(Point::new(x, y)),
            _ => None,
        }
    }

    pub fn absolute_view(&self) -> AbsolutePosition {
        AbsolutePosition {
            x: self.x,
            y: self.y,
            label: self.label.clone(),
        }
    }

    pub fn normalized_view(&self) -> NormalizedPosition {
        NormalizedPosition {
            norm_x: self.norm_x,
            norm_y: self.norm_y,
            label: self.label.clone(),
        }
    }
}

/// `{ x, y, label }` view of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsolutePosition {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub label: Option<String>,
}

/// `{ normX, normY, label }` view of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPosition {
    pub norm_x: Option<f64>,
    pub norm_y: Option<f64>,
    pub label: Option<String>,
}

// ============================================================================
// Trigger set
// ============================================================================

/// Shared set of moving trigger points.
///
/// An empty `triggers` list means no trigger is active anywhere. Updates are
/// whole-object replacements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSet {
    pub x_range: Range,
    pub y_range: Range,
    pub radius: f64,
    #[serde(default)]
    pub triggers: Vec<Point>,
}

impl TriggerSet {
    /// Creates an empty trigger set covering the given area.
    pub fn new(area: &AreaConfig, radius: f64) -> Self {
        Self {
            x_range: area.x_range,
            y_range: area.y_range,
            radius,
            triggers: Vec::new(),
        }
    }

    pub fn with_triggers(mut self, triggers: Vec<Point>) -> Self {
        self.triggers = triggers;
        self
    }

    /// Checks the radius; individual trigger points are vetted during a pass.
    pub fn validate(&self) -> PositionResult<()> {
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(PositionError::InvalidTriggerSet(format!(
                "radius must be a positive finite number, got {}",
                self.radius
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_id_round_trips_through_display() {
        let id = ClientId::new();
        let parsed: ClientId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<ClientId>().is_err());
    }

    #[test]
    fn test_range_serializes_as_array() {
        let range = Range::new(-1.0, 2.0);
        assert_eq!(serde_json::to_value(range).unwrap(), json!([-1.0, 2.0]));

        let parsed: Range = serde_json::from_value(json!([0.0, 4.0])).unwrap();
        assert_eq!(parsed, Range::new(0.0, 4.0));
    }

    #[test]
    fn test_degenerate_range_span() {
        assert!(matches!(
            Range::new(3.0, 3.0).span(),
            Err(PositionError::DegenerateRange { .. })
        ));
        assert_eq!(Range::new(-1.0, 1.0).span().unwrap(), 2.0);
    }

    #[test]
    fn test_area_config_wire_format() {
        let area = AreaConfig {
            x_range: Range::new(-1.0, 2.0),
            y_range: Range::new(-3.0, 0.5),
            background_image: Some("test.png".to_string()),
        };

        assert_eq!(
            serde_json::to_value(&area).unwrap(),
            json!({
                "xRange": [-1.0, 2.0],
                "yRange": [-3.0, 0.5],
                "backgroundImage": "test.png",
            })
        );
    }

    #[test]
    fn test_empty_record() {
        let record = PositionRecord::default();
        assert!(!record.is_set());
        assert!(record.position().is_none());
        assert!(record.normalized().is_none());
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({ "x": null, "y": null, "normX": null, "normY": null, "label": null })
        );
    }

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_eq!(a.distance_to(&b), 5.0);
        assert!(!Point::new(f64::NAN, 0.0).is_finite());
    }

    #[test]
    fn test_trigger_set_radius_validation() {
        let area = AreaConfig::default();
        assert!(TriggerSet::new(&area, 0.25).validate().is_ok());
        assert!(TriggerSet::new(&area, 0.0).validate().is_err());
        assert!(TriggerSet::new(&area, -1.0).validate().is_err());
        assert!(TriggerSet::new(&area, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn test_trigger_set_defaults_to_no_triggers() {
        let parsed: TriggerSet = serde_json::from_value(json!({
            "xRange": [0.0, 1.0],
            "yRange": [0.0, 1.0],
            "radius": 0.1,
        }))
        .unwrap();
        assert!(parsed.triggers.is_empty());
    }
}
