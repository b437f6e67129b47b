//! REST collaborator: chat records, sharing and image uploads.

use std::path::Path;

use anyhow::{Context, anyhow};
use buildchat_session::{SessionConfig, SessionId};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("API server is unavailable")]
    Unavailable,

    #[error("request failed ({status}): {message}")]
    Rejected { status: StatusCode, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Unavailable
        } else {
            Self::Other(err.into())
        }
    }
}

/// A chat as the server describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_share_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub id: i64,
}

/// Share state returned by the share/unshare endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShareState {
    pub id: i64,
    pub is_public: bool,
    #[serde(default)]
    pub public_share_id: Option<String>,
}

impl ChatRecord {
    pub fn session_id(&self) -> SessionId {
        SessionId::from(self.id)
    }

    /// A copy of this record carrying the reported share state.
    pub fn with_share(&self, share: ShareState) -> Self {
        Self {
            is_public: share.is_public,
            public_share_id: share.public_share_id,
            ..self.clone()
        }
    }

    /// Public link for a shared chat.
    pub fn share_url(&self, web_url: &Url) -> Option<Url> {
        if !self.is_public {
            return None;
        }
        let share_id = self.public_share_id.as_deref()?;
        web_url.join(&format!("/public/chat/{share_id}")).ok()
    }
}

/// Body of `POST /api/chats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateChatRequest {
    pub name: String,
    pub stack_pack_id: Option<i64>,
    pub project_id: Option<i64>,
    pub team_id: Option<i64>,
    pub seed_prompt: String,
    pub is_public: bool,
}

impl CreateChatRequest {
    /// A private chat named after, and seeded with, its first prompt.
    pub fn from_prompt(prompt: &str) -> Self {
        Self {
            name: prompt.to_string(),
            stack_pack_id: None,
            project_id: None,
            team_id: None,
            seed_prompt: prompt.to_string(),
            is_public: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadTarget {
    upload_url: String,
    url: String,
}

pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: config.api_url.clone(),
            token: config.token.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        let prefix = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{prefix}{path}"));
        url
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let resp = request.send().await.map_err(ApiError::from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Rejected {
                status,
                message: error_message(status, &body),
            });
        }
        resp.json().await.map_err(ApiError::from_reqwest)
    }

    pub async fn create_chat(&self, request: &CreateChatRequest) -> Result<ChatRecord, ApiError> {
        info!(name = %request.name, "creating chat");
        self.send(self.http.post(self.endpoint("/api/chats")).json(request))
            .await
    }

    pub async fn get_chat(&self, id: i64) -> Result<ChatRecord, ApiError> {
        self.send(self.http.get(self.endpoint(&format!("/api/chats/{id}"))))
            .await
    }

    /// Share a private chat or unshare a public one. Returns the updated
    /// record; `chat` itself is left as it was.
    pub async fn toggle_share(&self, chat: &ChatRecord) -> Result<ChatRecord, ApiError> {
        let action = if chat.is_public { "unshare" } else { "share" };
        let path = format!("/api/chats/{}/{action}", chat.id);
        let share: ShareState = self.send(self.http.post(self.endpoint(&path))).await?;
        if share.id != chat.id {
            return Err(anyhow!("share response names chat {} instead of {}", share.id, chat.id).into());
        }
        Ok(chat.with_share(share))
    }

    /// Upload a local image through a presigned URL; returns its public URL.
    pub async fn upload_image(&self, path: &Path) -> Result<String, ApiError> {
        let content_type = image_content_type(path)?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image: {}", path.display()))?;

        let target: UploadTarget = self
            .send(
                self.http
                    .post(self.endpoint("/api/uploads/image-upload-url"))
                    .json(&serde_json::json!({ "content_type": content_type })),
            )
            .await?;
        debug!(bytes = bytes.len(), %content_type, "uploading image");

        let resp = self
            .http
            .put(&target.upload_url)
            .header(reqwest::header::CONTENT_TYPE, &content_type)
            .body(bytes)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        if !resp.status().is_success() {
            return Err(ApiError::Rejected {
                status: resp.status(),
                message: "image upload was refused".to_string(),
            });
        }
        Ok(target.url)
    }
}

/// Content type for an image path; anything that is not an image is refused.
pub fn image_content_type(path: &Path) -> Result<String, ApiError> {
    let mime = mime_guess::from_path(path)
        .first()
        .filter(|m| m.type_() == mime_guess::mime::IMAGE)
        .ok_or_else(|| anyhow!("not an image file: {}", path.display()))?;
    Ok(mime.essence_str().to_string())
}

/// Human-readable error from a failed response: the body's `detail`, else
/// the raw body, else the status reason.
fn error_message(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").cloned());
    match detail {
        Some(serde_json::Value::String(s)) => s,
        Some(v) if !v.is_null() => v.to_string(),
        _ if !body.trim().is_empty() => body.trim().to_string(),
        _ => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    }
}
