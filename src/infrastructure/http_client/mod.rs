//! HTTP clients for the remote function classifier.
//!
//! The classifier turns a natural-language prompt plus the function catalog
//! into a single `{name, arguments}` call. Credentials are resolved through
//! [`credentials::CredentialSources`].

pub mod credentials;
mod gorilla;

pub use credentials::{ClassifierConfig, CredentialSources, KeySource};
pub use gorilla::{GorillaClassifier, DEFAULT_ENDPOINT};

use serde::Deserialize;

/// Error body returned by JSON APIs.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Renders a ureq failure as a short, loggable message.
pub fn describe_http_error(error: ureq::Error) -> String {
    match error {
        ureq::Error::Status(code, response) => match response.into_json::<ErrorResponse>() {
            Ok(ErrorResponse {
                error: Some(detail), ..
            })
            | Ok(ErrorResponse {
                message: Some(detail),
                ..
            }) => format!("HTTP {code}: {detail}"),
            _ => format!("HTTP {code}"),
        },
        ureq::Error::Transport(transport) => format!("transport error: {transport}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_described() {
        let err = ureq::get("http://127.0.0.1:9/unreachable")
            .timeout(std::time::Duration::from_millis(200))
            .call()
            .unwrap_err();
        assert!(describe_http_error(err).starts_with("transport error"));
    }
}
