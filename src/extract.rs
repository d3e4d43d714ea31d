//! Typed extraction of server-supplied error messages.
//!
//! Error response bodies come in a couple of known shapes. Each shape is a
//! concrete deserialization target tried in order; the first match wins.

use serde::Deserialize;

#[derive(Deserialize)]
struct WrappedError {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct FlatError {
    message: String,
}

/// Pulls a human-readable message out of an error response body, if any of
/// the known payload shapes match.
pub(crate) fn error_message(body: &str) -> Option<String> {
    let extractors: [fn(&str) -> Option<String>; 2] = [wrapped_message, flat_message];
    extractors.iter().find_map(|extract| extract(body))
}

fn wrapped_message(body: &str) -> Option<String> {
    serde_json::from_str::<WrappedError>(body)
        .ok()
        .map(|payload| payload.error.message)
}

fn flat_message(body: &str) -> Option<String> {
    serde_json::from_str::<FlatError>(body)
        .ok()
        .map(|payload| payload.message)
}

#[cfg(test)]
mod tests {
    use super::error_message;

    #[test]
    fn extracts_wrapped_error_message() {
        let body = r#"{"error":{"message":"email already registered"}}"#;
        assert_eq!(
            error_message(body),
            Some("email already registered".to_owned())
        );
    }

    #[test]
    fn extracts_flat_message() {
        let body = r#"{"message":"course id is malformed"}"#;
        assert_eq!(error_message(body), Some("course id is malformed".to_owned()));
    }

    #[test]
    fn wrapped_shape_wins_over_flat() {
        let body = r#"{"error":{"message":"inner"},"message":"outer"}"#;
        assert_eq!(error_message(body), Some("inner".to_owned()));
    }

    #[test]
    fn unknown_shapes_yield_none() {
        assert_eq!(error_message(r#"{"detail":"nope"}"#), None);
        assert_eq!(error_message("not json at all"), None);
        assert_eq!(error_message(""), None);
    }
}
