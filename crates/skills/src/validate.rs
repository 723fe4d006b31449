//! Input parameter validation: required-ness, type checks, and default
//! application, in declaration order.

use serde_json::{Map, Value};

use ha_domain::{Error, Result};

use crate::types::SkillDefinition;

/// Validate `params` against the skill's declared parameters.
///
/// Returns the validated object with defaults filled in. Unknown keys are
/// passed through untouched (forward compatibility for dynamic skills).
pub fn validate_params(definition: &SkillDefinition, params: &Value) -> Result<Value> {
    let empty = Map::new();
    let supplied: &Map<String, Value> = match params {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => {
            return Err(Error::InvalidParams(
                "skill parameters must be a JSON object".into(),
            ))
        }
    };

    let mut validated = supplied.clone();

    for param in &definition.parameters {
        match supplied.get(&param.name) {
            Some(value) => {
                if !param.param_type.matches(value) {
                    return Err(Error::InvalidParams(format!(
                        "parameter '{}' must be of type {}",
                        param.name,
                        param.param_type.as_str()
                    )));
                }
            }
            None => {
                if let Some(default) = &param.default {
                    validated.insert(param.name.clone(), default.clone());
                } else if param.required {
                    return Err(Error::InvalidParams(format!(
                        "missing required parameter: {}",
                        param.name
                    )));
                }
            }
        }
    }

    Ok(Value::Object(validated))
}
