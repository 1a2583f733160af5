use parking_lot::RwLock;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::{
    application::{
        dtos::FunctionCallRequest,
        services::{FunctionClassifier, FunctionDefinition},
    },
    domain::DomainError,
};

use super::{
    credentials::{ClassifierConfig, CredentialSources},
    describe_http_error,
};

/// Default OpenFunctions endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.gorilla.cs.berkeley.edu/openfunctions/v2";

/// Function classifier backed by the Gorilla OpenFunctions HTTP API.
///
/// A rejected key (HTTP 401) triggers one credential refresh and one retry.
pub struct GorillaClassifier {
    agent: ureq::Agent,
    config: RwLock<ClassifierConfig>,
    sources: CredentialSources,
}

impl GorillaClassifier {
    pub fn new(config: ClassifierConfig, sources: CredentialSources) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self {
            agent,
            config: RwLock::new(config),
            sources,
        }
    }

    pub fn config(&self) -> ClassifierConfig {
        self.config.read().clone()
    }

    fn post(&self, config: &ClassifierConfig, payload: &Value) -> Result<Value, ureq::Error> {
        let mut request = self.agent.post(&config.endpoint).timeout(config.timeout);
        if let Some(key) = &config.api_key {
            request = request
                .set("Authorization", &format!("Bearer {key}"))
                .set("X-API-Key", key);
        }
        let response = request.send_json(payload.clone())?;
        response.into_json::<Value>().map_err(ureq::Error::from)
    }

    fn into_call(response: Value) -> Result<FunctionCallRequest, DomainError> {
        FunctionCallRequest::from_response(&response).ok_or_else(|| {
            DomainError::other(format!("classifier answered without a function call: {response}"))
        })
    }
}

impl FunctionClassifier for GorillaClassifier {
    fn classify(
        &self,
        prompt: &str,
        functions: &[FunctionDefinition],
    ) -> Result<FunctionCallRequest, DomainError> {
        let payload = json!({ "prompt": prompt, "functions": functions });
        let config = self.config();
        debug!(target: "carenav::classifier", endpoint = %config.endpoint, "classifying prompt");

        match self.post(&config, &payload) {
            Ok(response) => Self::into_call(response),
            Err(ureq::Error::Status(401, _)) => {
                warn!(target: "carenav::classifier", "API key rejected, refreshing credentials");
                let refreshed = config.refreshed(&self.sources, None).ok_or_else(|| {
                    DomainError::other("classifier rejected the API key and no other key is available")
                })?;
                *self.config.write() = refreshed.clone();
                info!(target: "carenav::classifier", "retrying with refreshed API key");

                match self.post(&refreshed, &payload) {
                    Ok(response) => Self::into_call(response),
                    Err(err) => Err(DomainError::other(format!(
                        "classifier failed after credential refresh: {}",
                        describe_http_error(err)
                    ))),
                }
            }
            Err(err) => Err(DomainError::other(format!(
                "classifier request failed: {}",
                describe_http_error(err)
            ))),
        }
    }
}
