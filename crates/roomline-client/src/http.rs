//! HTTP directory service.
//!
//! Implements [`Directory`] against the chat server's REST API:
//!
//! | Operation       | Request                   | Success body             |
//! |-----------------|---------------------------|--------------------------|
//! | `list_rooms`    | `GET /rooms`              | `["general", ...]`       |
//! | `list_users`    | `GET /users`              | `["alice", ...]`         |
//! | `create_room`   | `POST /rooms {"name"}`    | `{"name": "general"}`    |
//! | `fetch_history` | `GET /messages/{room}`    | `[{username, text, timestamp, room}]` |
//!
//! The server answers a duplicate room name with `400`. History timestamps
//! may omit the offset, in which case they are read as UTC.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::StatusCode;
use roomline_app::{Directory, DirectoryError};
use roomline_core::{Credential, Message, Origin, Room, RoomId, Timestamp};
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::debug;

/// URL type accepted by [`HttpDirectoryConfig`].
pub use reqwest::Url;

/// HTTP directory configuration.
#[derive(Debug, Clone)]
pub struct HttpDirectoryConfig {
    /// API root, e.g. `http://localhost:5000/`
    pub base_url: Url,
    /// Per-request timeout
    pub timeout: Duration,
}

impl HttpDirectoryConfig {
    /// Config for `base_url` with the default timeout.
    pub fn new(base_url: Url) -> Self {
        Self { base_url, timeout: Duration::from_secs(10) }
    }
}

/// Errors from the HTTP layer, before mapping onto [`DirectoryError`].
#[derive(Debug, Error)]
pub enum HttpDirectoryError {
    /// Request could not be built or sent, or the body did not decode
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status
        status: StatusCode,
        /// Response body, for diagnostics
        body: String,
    },

    /// Base URL cannot take path segments
    #[error("invalid base url: {0}")]
    InvalidUrl(String),
}

impl From<HttpDirectoryError> for DirectoryError {
    fn from(err: HttpDirectoryError) -> Self {
        match err {
            HttpDirectoryError::Request(e) if e.is_decode() => Self::Decode(e.to_string()),
            HttpDirectoryError::Request(e) => Self::Transport(e.to_string()),
            HttpDirectoryError::Status { status, .. }
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN =>
            {
                Self::Unauthorized
            },
            HttpDirectoryError::Status { status, body } if status == StatusCode::NOT_FOUND => {
                Self::NotFound(body)
            },
            HttpDirectoryError::Status { status, body } => {
                Self::Transport(format!("{status}: {body}"))
            },
            HttpDirectoryError::InvalidUrl(url) => Self::Transport(url),
        }
    }
}

#[derive(Serialize)]
struct CreateRoomRequest<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct CreateRoomResponse {
    name: String,
}

#[derive(Deserialize)]
struct HistoryEntry {
    username: String,
    text: String,
    #[serde(deserialize_with = "timestamp")]
    timestamp: Timestamp,
}

/// Accept RFC 3339 or an offset-less ISO 8601 timestamp (read as UTC).
fn timestamp<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// Directory backed by the server's REST API.
#[derive(Debug, Clone)]
pub struct HttpDirectory {
    client: reqwest::Client,
    config: HttpDirectoryConfig,
    credential: Credential,
}

impl HttpDirectory {
    /// Create a directory client authenticating with `credential`.
    ///
    /// # Errors
    ///
    /// - `HttpDirectoryError::Request` if the HTTP client cannot be built
    pub fn new(config: HttpDirectoryConfig, credential: Credential) -> Result<Self, HttpDirectoryError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config, credential })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, HttpDirectoryError> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| HttpDirectoryError::InvalidUrl(self.config.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, HttpDirectoryError> {
        let url = self.url(segments)?;
        debug!(%url, "directory request");
        let response =
            self.client.get(url).bearer_auth(self.credential.expose()).send().await?;
        Ok(checked(response).await?.json().await?)
    }
}

async fn checked(response: reqwest::Response) -> Result<reqwest::Response, HttpDirectoryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(HttpDirectoryError::Status { status, body })
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn list_rooms(&self) -> Result<Vec<RoomId>, DirectoryError> {
        let names: Vec<String> = self.get(&["rooms"]).await?;
        Ok(names.into_iter().map(RoomId::from_remote).collect())
    }

    async fn list_users(&self) -> Result<Vec<String>, DirectoryError> {
        Ok(self.get(&["users"]).await?)
    }

    async fn create_room(&self, name: &RoomId) -> Result<Room, DirectoryError> {
        let url = self.url(&["rooms"])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(self.credential.expose())
            .json(&CreateRoomRequest { name: name.as_str() })
            .send()
            .await
            .map_err(HttpDirectoryError::from)?;

        if response.status() == StatusCode::BAD_REQUEST {
            return Err(DirectoryError::Duplicate(name.to_string()));
        }
        let created: CreateRoomResponse = checked(response)
            .await?
            .json()
            .await
            .map_err(HttpDirectoryError::from)?;
        Ok(Room::classify(RoomId::from_remote(created.name)))
    }

    async fn fetch_history(&self, room: &RoomId) -> Result<Vec<Message>, DirectoryError> {
        let entries: Vec<HistoryEntry> = self.get(&["messages", room.as_str()]).await?;
        Ok(entries
            .into_iter()
            .map(|entry| Message {
                sender: entry.username,
                text: entry.text,
                room: room.clone(),
                sent_at: entry.timestamp,
                origin: Origin::Snapshot,
            })
            .collect())
    }
}
