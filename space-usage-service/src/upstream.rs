// Space Usage Service - Upstream HTTP collaborators
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! reqwest implementations of the upstream collaborators.
//!
//! Error bodies of the form `{"error": {"message": ..}}` are decoded here,
//! once, into [`UpstreamError::Response`]. Failures without a response
//! become [`UpstreamError::Transport`].

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use space_usage::{
    Recording, RecordingsClient, RecordingsQuery, Space, SpaceCatalogClient, SpaceUsageReportingClient,
    SpaceUsageSummary, UpstreamError,
};
use std::time::Duration;
use tracing::debug;

const SPACES_PATH: &str = "spaces";
const RECORDINGS_PATH: &str = "recordings";
const GRAPHQL_PATH: &str = "graphql";

const CREATE_SPACE_USAGE_MUTATION: &str = "mutation CreateSpaceUsage($input: CreateSpaceUsageInput!) { \
     CreateSpaceUsage(input: $input) { id } }";

/// HTTP client construction errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpSetupError {
    #[error("invalid base url {url}: {source}")]
    BaseUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// `{data: T}` response envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Serialize)]
struct GraphqlRequest<'a, V> {
    query: &'a str,
    variables: V,
}

#[derive(Serialize)]
struct CreateSpaceUsageVariables<'a> {
    input: &'a SpaceUsageSummary,
}

/// Build the shared reqwest client.
pub fn build_client(timeout: Duration) -> Result<Client, HttpSetupError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Parse a base URL so relative paths append to it.
fn parse_base(raw: &str) -> Result<Url, HttpSetupError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&normalized).map_err(|source| HttpSetupError::BaseUrl {
        url: raw.to_string(),
        source,
    })
}

fn join(base: &Url, path: &str) -> Result<Url, UpstreamError> {
    base.join(path).map_err(UpstreamError::transport)
}

/// Message carried by an error body, empty when there is none.
pub fn decode_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|parsed| parsed.error.message)
        .unwrap_or_default()
}

async fn error_from_response(response: Response) -> UpstreamError {
    let status = response.status().as_u16();
    match response.text().await {
        Ok(body) => UpstreamError::response(status, decode_error_message(&body)),
        Err(err) => UpstreamError::transport(err),
    }
}

async fn read_data<T: DeserializeOwned>(response: Response) -> Result<T, UpstreamError> {
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }
    let envelope: Envelope<T> = response.json().await.map_err(UpstreamError::transport)?;
    Ok(envelope.data)
}

/// Space usage API: catalog of spaces and summary persistence.
#[derive(Debug, Clone)]
pub struct SpaceUsageApi {
    client: Client,
    base_url: Url,
}

impl SpaceUsageApi {
    pub fn new(client: Client, base_url: &str) -> Result<Self, HttpSetupError> {
        Ok(Self {
            client,
            base_url: parse_base(base_url)?,
        })
    }
}

#[async_trait]
impl SpaceCatalogClient for SpaceUsageApi {
    async fn get_spaces(&self) -> Result<Vec<Space>, UpstreamError> {
        let url = join(&self.base_url, SPACES_PATH)?;
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(UpstreamError::transport)?;
        read_data(response).await
    }
}

#[async_trait]
impl SpaceUsageReportingClient for SpaceUsageApi {
    async fn save_space_usage(&self, summary: &SpaceUsageSummary) -> Result<(), UpstreamError> {
        let url = join(&self.base_url, GRAPHQL_PATH)?;
        let request = GraphqlRequest {
            query: CREATE_SPACE_USAGE_MUTATION,
            variables: CreateSpaceUsageVariables { input: summary },
        };
        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(UpstreamError::transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(response).await);
        }
        let body: GraphqlResponse = response.json().await.map_err(UpstreamError::transport)?;
        match body.errors.into_iter().next() {
            Some(error) => Err(UpstreamError::response(status.as_u16(), error.message)),
            None => Ok(()),
        }
    }
}

/// Recording API: raw detections per space.
#[derive(Debug, Clone)]
pub struct RecordingApi {
    client: Client,
    base_url: Url,
}

impl RecordingApi {
    pub fn new(client: Client, base_url: &str) -> Result<Self, HttpSetupError> {
        Ok(Self {
            client,
            base_url: parse_base(base_url)?,
        })
    }
}

#[async_trait]
impl RecordingsClient for RecordingApi {
    async fn get_recordings(&self, query: &RecordingsQuery) -> Result<Vec<Recording>, UpstreamError> {
        let url = join(&self.base_url, RECORDINGS_PATH)?;
        debug!("GET {} for space {}", url, query.space_id);
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(UpstreamError::transport)?;
        read_data(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use space_usage::SpaceId;

    #[test]
    fn test_decode_error_message() {
        assert_eq!(
            decode_error_message(r#"{"error":{"message":"Unauthorized"}}"#),
            "Unauthorized"
        );
        assert_eq!(decode_error_message(r#"{"error":{}}"#), "");
        assert_eq!(decode_error_message("<html>Bad Gateway</html>"), "");
    }

    #[test]
    fn test_base_url_keeps_prefix() {
        let base = parse_base("https://api.example.com/v1").unwrap();
        assert_eq!(
            join(&base, RECORDINGS_PATH).unwrap().as_str(),
            "https://api.example.com/v1/recordings"
        );

        let base = parse_base("http://localhost:3000/").unwrap();
        assert_eq!(join(&base, SPACES_PATH).unwrap().as_str(), "http://localhost:3000/spaces");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            parse_base("not a url"),
            Err(HttpSetupError::BaseUrl { .. })
        ));
    }

    #[test]
    fn test_spaces_envelope() {
        let parsed: Envelope<Vec<Space>> =
            serde_json::from_str(r#"{"data":[{"_id":"1A","name":"Library"},{"_id":"2A"}]}"#)
                .unwrap();
        assert_eq!(parsed.data, vec![Space::new("1A"), Space::new("2A")]);
    }

    #[test]
    fn test_graphql_request_body() {
        let start = Utc.timestamp_millis_opt(976_406_400_000).unwrap();
        let summary = SpaceUsageSummary {
            space_id: SpaceId::from("1A"),
            usage_period_start_time: start,
            usage_period_end_time: start + chrono::Duration::minutes(15),
            number_of_people_recorded: 2,
        };
        let request = GraphqlRequest {
            query: CREATE_SPACE_USAGE_MUTATION,
            variables: CreateSpaceUsageVariables { input: &summary },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json["variables"]["input"],
            serde_json::json!({
                "spaceId": "1A",
                "usagePeriodStartTime": 976_406_400_000i64,
                "usagePeriodEndTime": 976_407_300_000i64,
                "numberOfPeopleRecorded": 2
            })
        );
        assert!(json["query"].as_str().unwrap().contains("CreateSpaceUsage"));
    }

    #[test]
    fn test_graphql_errors() {
        let body: GraphqlResponse =
            serde_json::from_str(r#"{"errors":[{"message":"Space not found"}]}"#).unwrap();
        assert_eq!(body.errors[0].message, "Space not found");

        let body: GraphqlResponse = serde_json::from_str(r#"{"data":{}}"#).unwrap();
        assert!(body.errors.is_empty());
    }
}
