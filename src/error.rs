use serde_json::Value;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Non-success status from the identity provider, after any 429 retries.
    #[error("HTTP {status}: {}", error_summary(.body))]
    Http { status: u16, body: Value },
    #[error("lookup returned no results: {0}")]
    Lookup(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("no push factor enrolled for user {0}")]
    NoPushFactor(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// Identity provider error bodies carry `errorSummary`; fall back to the raw body.
fn error_summary(body: &Value) -> String {
    body.get("errorSummary")
        .and_then(Value::as_str)
        .map_or_else(|| body.to_string(), ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn http_error_displays_error_summary() {
        let err = Error::Http {
            status: 404,
            body: json!({"errorCode": "E0000007", "errorSummary": "Not found: Resource not found: jdoe (User)"}),
        };
        assert_eq!(
            err.to_string(),
            "HTTP 404: Not found: Resource not found: jdoe (User)"
        );
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn http_error_falls_back_to_raw_body() {
        let err = Error::Http {
            status: 502,
            body: Value::String("bad gateway".to_string()),
        };
        assert_eq!(err.to_string(), "HTTP 502: \"bad gateway\"");
    }

    #[test]
    fn non_http_errors_have_no_status() {
        assert_eq!(Error::Lookup("x".to_string()).status(), None);
    }
}
