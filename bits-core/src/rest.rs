//! Hosted backend client.
//!
//! Talks to the three hosted surfaces the app relies on:
//! - **REST** (`/rest/v1`) for the `bits`, `children` and `milestones` tables
//! - **Storage** (`/storage/v1`) for photo objects
//! - **Functions** (`/functions/v1`) for voice-note transcription
//!
//! Authorization is the project API key plus, when signed in, the user's
//! access token. Row ownership is enforced server-side.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::SecondsFormat;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::BackendConfig;
use crate::error::{BitsError, UNIQUE_VIOLATION};
use crate::filter::{end_of_day, escape_like, start_of_day, BitFilter, Clause};
use crate::models::{
    Bit, BitChanges, BitInsert, Child, ChildChanges, ChildInsert, Milestone, PhotoUpload,
};
use crate::store::{
    photo_object_path, BitStore, ChildStore, Identity, MilestoneStore, Page, PhotoStore,
    Transcriber,
};

/// Columns requested for bit listings, with the owning child embedded.
pub const BIT_SELECT: &str = "*,children(id,name,color,photo_url)";

/// Server-side ordering. Agrees with [`crate::store::timeline_order`] for rows
/// that carry a `bit_date`. Rows without one sort after every dated row rather
/// than by their `created_at` day, since the table exposes no effective-date
/// column to order on.
pub const BIT_ORDER: &str = "bit_date.desc.nullslast,created_at.desc,id.desc";

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: String,
    pub api_key: String,
    /// Signed-in user's access token. Requests fall back to the API key.
    pub access_token: Option<String>,
    pub photo_bucket: String,
    pub transcribe_function: String,
    pub timeout: Duration,
}

impl RestConfig {
    pub fn from_backend(backend: &BackendConfig, access_token: Option<String>) -> Self {
        Self {
            base_url: backend.url.trim_end_matches('/').to_string(),
            api_key: backend.resolved_api_key(),
            access_token: access_token.filter(|t| !t.is_empty()),
            photo_bucket: backend.photo_bucket.clone(),
            transcribe_function: backend.transcribe_function.clone(),
            timeout: Duration::from_secs(backend.timeout_seconds),
        }
    }
}

// ============================================================================
// Wire structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct MilestoneInsert<'a> {
    user_id: Uuid,
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: Uuid,
}

#[derive(Debug, Serialize)]
struct TranscribeRequest {
    audio: String,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: Option<String>,
    error: Option<String>,
}

/// Error bodies differ per surface: REST sends `code`/`message`, storage
/// sends `statusCode`/`error`/`message`, auth sends `msg`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<serde_json::Value>,
    message: Option<String>,
    error: Option<String>,
    msg: Option<String>,
}

impl ErrorBody {
    fn code(&self) -> Option<String> {
        match &self.code {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    fn message(self) -> Option<String> {
        self.message.or(self.msg).or(self.error)
    }
}

// ============================================================================
// RestBackend
// ============================================================================

#[derive(Debug, Clone)]
pub struct RestBackend {
    client: Client,
    config: RestConfig,
}

impl RestBackend {
    pub fn new(config: RestConfig) -> Result<Self, BitsError> {
        if config.api_key.is_empty() {
            return Err(BitsError::MissingApiKey);
        }

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self { client, config })
    }

    /// Create a client against a custom base URL (for testing / self-hosting)
    pub fn with_base_url(mut config: RestConfig, base_url: String) -> Result<Self, BitsError> {
        config.base_url = base_url.trim_end_matches('/').to_string();
        Self::new(config)
    }

    /// Whether requests carry a user access token.
    pub fn is_signed_in(&self) -> bool {
        self.config.access_token.is_some()
    }

    /// Public URL of a stored photo object.
    pub fn public_photo_url(&self, object_path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.config.base_url, self.config.photo_bucket, object_path
        )
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.base_url, table)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let token = self
            .config
            .access_token
            .as_deref()
            .unwrap_or(&self.config.api_key);
        self.client
            .request(method, url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BitsError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_body = response.text().await.unwrap_or_default();
        let err = map_error(status, &error_body);
        tracing::error!(status = status.as_u16(), error = %err, "Backend request failed");
        Err(err)
    }
}

fn map_error(status: StatusCode, body: &str) -> BitsError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.code();
    let message = parsed.message().unwrap_or_else(|| body.to_string());

    if code.as_deref() == Some(UNIQUE_VIOLATION) {
        return BitsError::AlreadyExists(message);
    }
    if status == StatusCode::UNAUTHORIZED {
        return BitsError::NotAuthenticated;
    }
    BitsError::Api {
        code: status.as_u16(),
        message,
    }
}

/// Render a filter as REST query pairs. Clauses are conjunctive, so their
/// order in the query string does not matter.
pub fn filter_params(filter: &BitFilter) -> Vec<(&'static str, String)> {
    filter
        .clauses()
        .into_iter()
        .map(|clause| match clause {
            Clause::TextContains(q) => ("text", format!("ilike.*{}*", escape_like(&q))),
            Clause::ChildIs(id) => ("child_id", format!("eq.{}", id)),
            Clause::CreatedOnOrAfter(date) => (
                "created_at",
                format!(
                    "gte.{}",
                    start_of_day(date).to_rfc3339_opts(SecondsFormat::Secs, true)
                ),
            ),
            Clause::CreatedOnOrBefore(date) => (
                "created_at",
                format!(
                    "lt.{}",
                    end_of_day(date).to_rfc3339_opts(SecondsFormat::Secs, true)
                ),
            ),
            Clause::HasPhoto(true) => ("photo_url", "not.is.null".to_string()),
            Clause::HasPhoto(false) => ("photo_url", "is.null".to_string()),
        })
        .collect()
}

/// Total from a `Content-Range` header such as `0-19/45` or `*/0`.
fn parse_total(content_range: &str) -> Option<u64> {
    content_range
        .rsplit_once('/')
        .and_then(|(_, total)| total.parse().ok())
}

fn first_row<T>(rows: Vec<T>, what: &str) -> Result<T, BitsError> {
    rows.into_iter().next().ok_or_else(|| BitsError::Api {
        code: 200,
        message: format!("empty response creating {}", what),
    })
}

// ============================================================================
// Store impls
// ============================================================================

#[async_trait]
impl BitStore for RestBackend {
    async fn list_bits(
        &self,
        filter: &BitFilter,
        page: usize,
        page_size: usize,
    ) -> Result<Page, BitsError> {
        let url = self.table_url("bits");
        let offset = page * page_size;
        let mut query: Vec<(&str, String)> = vec![
            ("select", BIT_SELECT.to_string()),
            ("order", BIT_ORDER.to_string()),
            ("offset", offset.to_string()),
            ("limit", page_size.to_string()),
        ];
        query.extend(filter_params(filter));

        let response = self
            .send(
                self.request(Method::GET, &url)
                    .query(&query)
                    .header("Prefer", "count=exact"),
            )
            .await?;

        let total = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_total);
        let rows: Vec<Bit> = response.json().await?;

        tracing::debug!(page, rows = rows.len(), total = ?total, "Listed bits");
        Ok(Page { rows, total })
    }

    async fn create_bit(&self, insert: &BitInsert) -> Result<Bit, BitsError> {
        let url = self.table_url("bits");
        let response = self
            .send(
                self.request(Method::POST, &url)
                    .query(&[("select", BIT_SELECT)])
                    .header("Prefer", "return=representation")
                    .json(insert),
            )
            .await?;
        let rows: Vec<Bit> = response.json().await?;
        first_row(rows, "bit")
    }

    async fn update_bit(&self, id: Uuid, changes: &BitChanges) -> Result<(), BitsError> {
        let url = self.table_url("bits");
        self.send(
            self.request(Method::PATCH, &url)
                .query(&[("id", format!("eq.{}", id))])
                .json(changes),
        )
        .await?;
        Ok(())
    }

    async fn delete_bit(&self, id: Uuid) -> Result<(), BitsError> {
        let url = self.table_url("bits");
        self.send(
            self.request(Method::DELETE, &url)
                .query(&[("id", format!("eq.{}", id))]),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ChildStore for RestBackend {
    async fn list_children(&self) -> Result<Vec<Child>, BitsError> {
        let url = self.table_url("children");
        let response = self
            .send(
                self.request(Method::GET, &url)
                    .query(&[("select", "*"), ("order", "created_at.asc")]),
            )
            .await?;
        Ok(response.json().await?)
    }

    async fn create_child(&self, insert: &ChildInsert) -> Result<Child, BitsError> {
        let url = self.table_url("children");
        let response = self
            .send(
                self.request(Method::POST, &url)
                    .header("Prefer", "return=representation")
                    .json(insert),
            )
            .await?;
        let rows: Vec<Child> = response.json().await?;
        first_row(rows, "child")
    }

    async fn update_child(&self, id: Uuid, changes: &ChildChanges) -> Result<(), BitsError> {
        let url = self.table_url("children");
        self.send(
            self.request(Method::PATCH, &url)
                .query(&[("id", format!("eq.{}", id))])
                .json(changes),
        )
        .await?;
        Ok(())
    }

    async fn delete_child(&self, id: Uuid) -> Result<(), BitsError> {
        let url = self.table_url("children");
        self.send(
            self.request(Method::DELETE, &url)
                .query(&[("id", format!("eq.{}", id))]),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MilestoneStore for RestBackend {
    async fn list_milestones(&self) -> Result<Vec<Milestone>, BitsError> {
        let url = self.table_url("milestones");
        let response = self
            .send(
                self.request(Method::GET, &url)
                    .query(&[("select", "*"), ("order", "name.asc")]),
            )
            .await?;
        Ok(response.json().await?)
    }

    async fn create_milestone(&self, user_id: Uuid, name: &str) -> Result<Milestone, BitsError> {
        let url = self.table_url("milestones");
        let response = self
            .send(
                self.request(Method::POST, &url)
                    .header("Prefer", "return=representation")
                    .json(&MilestoneInsert { user_id, name }),
            )
            .await?;
        let rows: Vec<Milestone> = response.json().await?;
        first_row(rows, "milestone")
    }
}

#[async_trait]
impl PhotoStore for RestBackend {
    async fn upload_photo(&self, owner: Uuid, photo: &PhotoUpload) -> Result<String, BitsError> {
        let object_path = photo_object_path(owner, photo);
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.config.base_url, self.config.photo_bucket, object_path
        );

        self.send(
            self.request(Method::POST, &url)
                .header("content-type", &photo.content_type)
                .header("cache-control", "3600")
                .header("x-upsert", "false")
                .body(photo.bytes.clone()),
        )
        .await?;

        tracing::debug!(path = %object_path, bytes = photo.bytes.len(), "Photo uploaded");
        Ok(self.public_photo_url(&object_path))
    }
}

#[async_trait]
impl Identity for RestBackend {
    async fn current_user_id(&self) -> Result<Option<Uuid>, BitsError> {
        if !self.is_signed_in() {
            return Ok(None);
        }
        let url = format!("{}/auth/v1/user", self.config.base_url);
        match self.send(self.request(Method::GET, &url)).await {
            Ok(response) => {
                let user: AuthUser = response.json().await?;
                Ok(Some(user.id))
            }
            Err(BitsError::NotAuthenticated) => Ok(None),
            Err(BitsError::Api { code: 403, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Transcriber for RestBackend {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, BitsError> {
        if audio.is_empty() {
            return Err(BitsError::validation("Recording is empty"));
        }
        let url = format!(
            "{}/functions/v1/{}",
            self.config.base_url, self.config.transcribe_function
        );
        let request = TranscribeRequest {
            audio: STANDARD.encode(audio),
        };

        let response = self
            .send(self.request(Method::POST, &url).json(&request))
            .await
            .map_err(|e| match e {
                BitsError::Api { message, .. } => BitsError::Transcription(message),
                other => other,
            })?;
        let body: TranscribeResponse = response.json().await?;

        if let Some(error) = body.error {
            return Err(BitsError::Transcription(error));
        }
        match body.text.map(|t| t.trim().to_string()) {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(BitsError::Transcription("no speech detected".to_string())),
        }
    }
}
