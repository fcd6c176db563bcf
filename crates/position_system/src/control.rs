//! # External Control Messages
//!
//! Translates address/argument messages from an external controller into
//! [`TriggerCommand`]s:
//!
//! | address     | args                  | effect                          |
//! |-------------|-----------------------|---------------------------------|
//! | `/trigger`  | `[x, y]`              | single trigger replaces the set |
//! | `/triggers` | `[x0, y0, x1, y1, …]` | replaces every trigger          |
//! | `/radius`   | `[r]`                 | replaces the radius             |
//! | `/clear`    | `[]`                  | removes every trigger           |
//!
//! Arguments are either plain numbers or typed `{ "type": "f", "value": n }`
//! objects as produced by OSC bridges.

use crate::error::{PositionError, PositionResult};
use crate::proximity::TriggerCommand;
use crate::types::Point;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TRIGGER_ADDRESS: &str = "/trigger";
pub const TRIGGERS_ADDRESS: &str = "/triggers";
pub const RADIUS_ADDRESS: &str = "/radius";
pub const CLEAR_ADDRESS: &str = "/clear";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub address: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl ControlMessage {
    pub fn new(address: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    /// Parses one JSON-encoded message.
    pub fn parse(line: &str) -> PositionResult<Self> {
        Ok(serde_json::from_str(line)?)
    }

    pub fn into_command(self) -> PositionResult<TriggerCommand> {
        match self.address.as_str() {
            TRIGGER_ADDRESS => {
                let values = self.numeric_args()?;
                match values.as_slice() {
                    [x, y] => Ok(TriggerCommand::SetTriggers(vec![Point::new(*x, *y)])),
                    _ => Err(self.invalid("expected exactly two coordinates")),
                }
            }
            TRIGGERS_ADDRESS => {
                let values = self.numeric_args()?;
                if values.len() % 2 != 0 {
                    return Err(self.invalid("expected coordinate pairs"));
                }
                let triggers = values
                    .chunks_exact(2)
                    .map(|pair| Point::new(pair[0], pair[1]))
                    .collect();
                Ok(TriggerCommand::SetTriggers(triggers))
            }
            RADIUS_ADDRESS => {
                let values = self.numeric_args()?;
                match values.as_slice() {
                    [radius] => Ok(TriggerCommand::SetRadius(*radius)),
                    _ => Err(self.invalid("expected a single radius")),
                }
            }
            CLEAR_ADDRESS => Ok(TriggerCommand::Clear),
            other => Err(PositionError::UnknownControlAddress(other.to_string())),
        }
    }

    fn numeric_args(&self) -> PositionResult<Vec<f64>> {
        self.args
            .iter()
            .map(|arg| {
                numeric_value(arg)
                    .ok_or_else(|| self.invalid(&format!("non-numeric argument {arg}")))
            })
            .collect()
    }

    fn invalid(&self, reason: &str) -> PositionError {
        PositionError::InvalidControlMessage(format!("{}: {}", self.address, reason))
    }
}

/// Reads a plain number or the `value` field of a typed argument.
fn numeric_value(arg: &Value) -> Option<f64> {
    match arg {
        Value::Number(number) => number.as_f64(),
        Value::Object(fields) => fields.get("value").and_then(Value::as_f64),
        _ => None,
    }
}
