//! REST client for the Kindred HTTP API.
//!
//! Every call sends the local user's bearer token. Successful responses are
//! unwrapped from the server's `{ "data": ... }` envelope.

use async_trait::async_trait;
use kindred_core::candidate::CandidateProfile;
use kindred_core::processor::{InvalidateRequest, RecordRequest, SwipeAck};
use kindred_core::types::{DbId, MatchId};
use serde::Deserialize;

use crate::ports::{CandidateSource, ProfileDirectory, SwipeLedger};

/// HTTP client for one Kindred server and one authenticated user.
#[derive(Clone)]
pub struct KindredApi {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

/// Errors from the REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("Kindred API error ({status}): {body}")]
    Status {
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ApiError {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Request(_) => true,
            ApiError::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Response of `POST /matches/{id}/redeliver`.
#[derive(Debug, Deserialize)]
pub struct RedeliverResponse {
    pub delivered_to: usize,
}

impl KindredApi {
    /// * `api_url` - Base HTTP URL, e.g. `http://localhost:3000`.
    pub fn new(api_url: String, token: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, token)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: reqwest::Client, api_url: String, token: String) -> Self {
        Self {
            client,
            api_url,
            token,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Ask the server to push a match to this user's connections again with
    /// `force` set.
    pub async fn redeliver_match(&self, match_id: MatchId) -> Result<RedeliverResponse, ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/matches/{match_id}/redeliver")))
            .bearer_auth(&self.token)
            .send()
            .await?;

        Self::parse_data(response).await
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.api_url)
    }

    /// Return the response unchanged on a success status, or an
    /// [`ApiError::Status`] carrying the body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_data<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<Envelope<T>>().await?.data)
    }
}

/// Comma-separated id list for the `exclude` query parameter.
fn exclude_param(exclude: &[DbId]) -> String {
    exclude
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl CandidateSource for KindredApi {
    async fn fetch_candidates(
        &self,
        exclude: &[DbId],
        limit: usize,
    ) -> Result<Vec<CandidateProfile>, ApiError> {
        let mut request = self
            .client
            .get(self.url("/candidates"))
            .bearer_auth(&self.token)
            .query(&[("limit", limit.to_string())]);
        if !exclude.is_empty() {
            request = request.query(&[("exclude", exclude_param(exclude))]);
        }

        Self::parse_data(request.send().await?).await
    }
}

#[async_trait]
impl SwipeLedger for KindredApi {
    async fn record_swipe(&self, request: &RecordRequest) -> Result<SwipeAck, ApiError> {
        let response = self
            .client
            .post(self.url("/swipes"))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;

        Self::parse_data(response).await
    }

    async fn invalidate_swipe(&self, request: &InvalidateRequest) -> Result<(), ApiError> {
        let body = serde_json::json!({
            "target_user_id": request.target_user_id,
            "action": request.action,
        });

        let response = self
            .client
            .post(self.url(&format!("/swipes/{}/invalidate", request.swipe_key)))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileDirectory for KindredApi {
    async fn fetch_profile(&self, user_id: DbId) -> Result<CandidateProfile, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/profiles/{user_id}")))
            .bearer_auth(&self.token)
            .send()
            .await?;

        Self::parse_data(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclude_param_joins_with_commas() {
        assert_eq!(exclude_param(&[3, 1, 2]), "3,1,2");
        assert_eq!(exclude_param(&[]), "");
    }

    #[test]
    fn url_includes_api_prefix() {
        let api = KindredApi::new("http://localhost:3000".into(), "t".into());
        assert_eq!(api.url("/swipes"), "http://localhost:3000/api/v1/swipes");
    }

    #[test]
    fn server_errors_are_transient() {
        let unavailable = ApiError::Status {
            status: 503,
            body: String::new(),
        };
        let bad_request = ApiError::Status {
            status: 400,
            body: String::new(),
        };
        assert!(unavailable.is_transient());
        assert!(!bad_request.is_transient());
    }

    #[test]
    fn envelope_unwraps_swipe_ack() {
        let raw = r#"{"data":{"id":7,"match":null}}"#;
        let ack: Envelope<SwipeAck> = serde_json::from_str(raw).unwrap();
        assert_eq!(ack.data.id, 7);
        assert!(ack.data.matched.is_none());
    }
}
