//! Shared conversions between validated JSON and typed domain values

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Number, Value};

use crate::{errors::HandlerError, mcp::schema::ValidatedArgs};

/// Largest magnitude at which every integral f64 is exactly representable.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

pub fn parse_args<T: DeserializeOwned>(args: ValidatedArgs) -> Result<T, HandlerError> {
    serde_json::from_value(Value::Object(args))
        .map_err(|err| HandlerError::new(format!("invalid arguments: {err}")))
}

pub fn structured<T: Serialize>(value: &T) -> Result<Map<String, Value>, HandlerError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(HandlerError::new("structured content must be a JSON object")),
        Err(err) => Err(HandlerError::new(format!(
            "failed to serialize structured content: {err}"
        ))),
    }
}

pub fn pretty_json<T: Serialize>(value: &T) -> Result<String, HandlerError> {
    serde_json::to_string_pretty(value)
        .map_err(|err| HandlerError::new(format!("failed to serialize content: {err}")))
}

/// Integral values become JSON integers so `5.0` renders as `5`.
pub fn number_value(value: f64) -> Option<Value> {
    if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER {
        return Some(Value::from(value as i64));
    }

    Number::from_f64(value).map(Value::Number)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::{json, Map, Value};

    use super::{number_value, parse_args, structured};

    #[derive(Debug, Deserialize)]
    struct Pair {
        a: f64,
        b: f64,
    }

    #[test]
    fn integral_numbers_render_without_fraction() {
        assert_eq!(number_value(5.0), Some(json!(5)));
        assert_eq!(number_value(-3.0), Some(json!(-3)));
        assert_eq!(number_value(2.5), Some(json!(2.5)));
        assert_eq!(number_value(f64::INFINITY), None);
        assert_eq!(number_value(f64::NAN), None);
    }

    #[test]
    fn parses_integer_arguments_as_floats() {
        let args: Map<String, Value> = json!({ "a": 2, "b": 0.5 })
            .as_object()
            .cloned()
            .expect("object");

        let pair: Pair = parse_args(args).expect("valid pair");
        assert_eq!(pair.a, 2.0);
        assert_eq!(pair.b, 0.5);
    }

    #[test]
    fn structured_content_must_be_an_object() {
        assert!(structured(&json!({ "ok": true })).is_ok());
        assert!(structured(&json!([1, 2])).is_err());
    }
}
