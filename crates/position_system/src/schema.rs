//! # Option Validation
//!
//! Validates raw area options before the area is published. Options arrive as
//! loosely typed JSON (from a config file, an admin call or a test), so shape
//! checks happen here once and everything downstream works with [`AreaConfig`].
//!
//! Defaults are merged first: a key that is absent takes its default, a key
//! that is present must be well formed even when it is `null`.

use crate::error::{PositionError, PositionResult};
use crate::types::{AreaConfig, Range};
use serde_json::Value;

pub const X_RANGE_KEY: &str = "xRange";
pub const Y_RANGE_KEY: &str = "yRange";
pub const BACKGROUND_IMAGE_KEY: &str = "backgroundImage";

/// `true` when `value` is an array of exactly two elements.
pub fn is_valid_range(value: &Value) -> bool {
    matches!(value, Value::Array(bounds) if bounds.len() == 2)
}

/// `true` when `value` is `null` or a string.
pub fn is_valid_image_ref(value: &Value) -> bool {
    value.is_null() || value.is_string()
}

/// Validates and converts one range option.
///
/// Beyond the shape check, both bounds must be finite numbers with
/// `min < max`; a degenerate range would otherwise divide by zero on every
/// position update.
pub fn parse_range(name: &str, value: &Value) -> PositionResult<Range> {
    if !is_valid_range(value) {
        return Err(PositionError::InvalidConfig(format!(
            "\"{name}\" should be an array of length 2"
        )));
    }

    let bound = |index: usize| {
        value[index]
            .as_f64()
            .filter(|bound| bound.is_finite())
            .ok_or_else(|| {
                PositionError::InvalidConfig(format!("\"{name}\" bounds should be finite numbers"))
            })
    };

    let range = Range::new(bound(0)?, bound(1)?);
    check_range(name, range)?;
    Ok(range)
}

fn check_range(name: &str, range: Range) -> PositionResult<()> {
    if !range.min.is_finite() || !range.max.is_finite() {
        return Err(PositionError::InvalidConfig(format!(
            "\"{name}\" bounds should be finite numbers"
        )));
    }
    if range.min >= range.max {
        return Err(PositionError::InvalidConfig(format!(
            "\"{name}\" should satisfy min < max, got [{}, {}]",
            range.min, range.max
        )));
    }
    Ok(())
}

/// Validates raw options and merges them over the defaults.
///
/// `null` options mean "all defaults". Unknown keys are ignored.
pub fn validate_area_options(options: &Value) -> PositionResult<AreaConfig> {
    let options = match options {
        Value::Null => return Ok(AreaConfig::default()),
        Value::Object(options) => options,
        _ => {
            return Err(PositionError::InvalidConfig(
                "options should be an object".to_string(),
            ))
        }
    };

    let defaults = AreaConfig::default();

    let x_range = match options.get(X_RANGE_KEY) {
        Some(value) => parse_range(X_RANGE_KEY, value)?,
        None => defaults.x_range,
    };

    let y_range = match options.get(Y_RANGE_KEY) {
        Some(value) => parse_range(Y_RANGE_KEY, value)?,
        None => defaults.y_range,
    };

    let background_image = match options.get(BACKGROUND_IMAGE_KEY) {
        Some(value) if !is_valid_image_ref(value) => {
            return Err(PositionError::InvalidConfig(format!(
                "\"{BACKGROUND_IMAGE_KEY}\" should be null or a string"
            )))
        }
        Some(value) => value.as_str().map(str::to_string),
        None => defaults.background_image,
    };

    Ok(AreaConfig {
        x_range,
        y_range,
        background_image,
    })
}

/// Applies the same range checks to an already typed config.
pub fn validate_area(area: &AreaConfig) -> PositionResult<()> {
    check_range(X_RANGE_KEY, area.x_range)?;
    check_range(Y_RANGE_KEY, area.y_range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_invalid(options: Value) {
        match validate_area_options(&options) {
            Err(PositionError::InvalidConfig(_)) => {}
            other => panic!("expected InvalidConfig for {options}, got {other:?}"),
        }
    }

    #[test]
    fn test_shape_predicates() {
        assert!(is_valid_range(&json!([0, 1])));
        assert!(!is_valid_range(&json!([0, 1, 2])));
        assert!(!is_valid_range(&json!(null)));
        assert!(!is_valid_range(&json!("0,1")));

        assert!(is_valid_image_ref(&json!(null)));
        assert!(is_valid_image_ref(&json!("map.png")));
        assert!(!is_valid_image_ref(&json!(true)));
        assert!(!is_valid_image_ref(&json!(42)));
    }

    #[test]
    fn test_empty_options_use_defaults() {
        assert_eq!(validate_area_options(&json!({})).unwrap(), AreaConfig::default());
        assert_eq!(validate_area_options(&Value::Null).unwrap(), AreaConfig::default());
    }

    #[test]
    fn test_options_are_kept_verbatim() {
        let area = validate_area_options(&json!({
            "xRange": [-1, 2],
            "yRange": [-3, 0.5],
            "backgroundImage": "test.png",
        }))
        .unwrap();

        assert_eq!(area.x_range, Range::new(-1.0, 2.0));
        assert_eq!(area.y_range, Range::new(-3.0, 0.5));
        assert_eq!(area.background_image.as_deref(), Some("test.png"));
    }

    #[test]
    fn test_malformed_ranges_are_rejected() {
        assert_invalid(json!({ "xRange": null }));
        assert_invalid(json!({ "xRange": [0, 1, 2] }));
        assert_invalid(json!({ "yRange": null }));
        assert_invalid(json!({ "yRange": [0, 1, 2] }));
        assert_invalid(json!({ "yRange": ["a", "b"] }));
    }

    #[test]
    fn test_degenerate_and_inverted_ranges_are_rejected() {
        assert_invalid(json!({ "xRange": [1, 1] }));
        assert_invalid(json!({ "yRange": [2, -2] }));
    }

    #[test]
    fn test_background_image_must_be_null_or_string() {
        assert_invalid(json!({ "backgroundImage": true }));
        assert_invalid(json!({ "backgroundImage": { "path": "map.png" } }));
        let area = validate_area_options(&json!({ "backgroundImage": null })).unwrap();
        assert!(area.background_image.is_none());
    }

    #[test]
    fn test_non_object_options_are_rejected() {
        assert_invalid(json!([0, 1]));
        assert_invalid(json!("xRange"));
    }

    #[test]
    fn test_typed_area_validation() {
        assert!(validate_area(&AreaConfig::default()).is_ok());
        let mut area = AreaConfig::default();
        area.x_range = Range::new(0.0, 0.0);
        assert!(matches!(validate_area(&area), Err(PositionError::InvalidConfig(_))));
    }
}
