//! Internal helpers for model validation and conversion.
//!
//! These utilities are **not** part of the public API.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{EngineError, ResultEngine};

/// Parse a UUID from storage and return a labeled error on failure.
pub(crate) fn parse_uuid(value: &str, label: &str) -> ResultEngine<Uuid> {
    Uuid::parse_str(value).map_err(|_| EngineError::InvalidId(format!("invalid {label} id")))
}

/// Snapshot of a provider document, as stored in the `api_data` columns.
pub(crate) fn snapshot<T: Serialize>(document: &T) -> ResultEngine<Value> {
    Ok(serde_json::to_value(document)?)
}

pub(crate) fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_uuid_labels_the_error() {
        assert_eq!(
            parse_uuid("nope", "account"),
            Err(EngineError::InvalidId("invalid account id".to_string()))
        );
    }

    #[test]
    fn blank_text_is_none() {
        assert_eq!(normalize_optional_text(Some("  ")), None);
        assert_eq!(
            normalize_optional_text(Some(" Savings ")),
            Some("Savings".to_string())
        );
        assert_eq!(normalize_optional_text(None), None);
    }
}
