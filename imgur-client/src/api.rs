use crate::auth::{ImgurOAuth2Config, TokenManager};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reposter_core::{
    Comment, CoreError, Credits, GalleryApiError, GalleryItem, GalleryQuery, ImageRef, ItemKind,
};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const IMGUR_API_BASE: &str = "https://api.imgur.com/3";

const HEADER_USER_REMAINING: &str = "x-ratelimit-userremaining";
const HEADER_CLIENT_REMAINING: &str = "x-ratelimit-clientremaining";
const HEADER_USER_RESET: &str = "x-ratelimit-userreset";

/// Payload of a successful API call plus the credit counters it reported.
#[derive(Debug, Clone)]
pub struct ApiReply<T> {
    pub data: T,
    pub credits: Option<Credits>,
}

impl<T> ApiReply<T> {
    pub fn new(data: T, credits: Option<Credits>) -> Self {
        Self { data, credits }
    }
}

/// Raw result of fetching an image URL. A non-success status is not an error.
#[derive(Debug, Clone)]
pub struct Download {
    pub status: u16,
    pub bytes: Vec<u8>,
}

impl Download {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The slice of the gallery API the crawler depends on.
#[async_trait]
pub trait GalleryApi: Send + Sync {
    async fn list_gallery(
        &self,
        query: &GalleryQuery,
    ) -> Result<ApiReply<Vec<GalleryItem>>, CoreError>;

    async fn list_album_images(&self, album_id: &str)
        -> Result<ApiReply<Vec<ImageRef>>, CoreError>;

    async fn list_comments(&self, post_id: &str) -> Result<ApiReply<Vec<Comment>>, CoreError>;

    async fn post_comment(&self, post_id: &str, text: &str) -> Result<ApiReply<()>, CoreError>;

    async fn get_credits(&self) -> Result<Credits, CoreError>;

    async fn download(&self, url: &str) -> Result<Download, CoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImgurEnvelope<T> {
    pub data: T,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub status: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryItemData {
    pub id: String,
    pub title: Option<String>,
    #[serde(default)]
    pub is_album: bool,
    pub images_count: Option<u32>,
    pub link: String,
    #[serde(rename = "type")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub animated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageData {
    pub id: String,
    pub link: String,
    #[serde(rename = "type")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub animated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentData {
    pub id: u64,
    pub comment: String,
    pub author: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreditsData {
    pub user_remaining: i64,
    pub client_remaining: i64,
    pub user_reset: Option<i64>,
}

impl From<GalleryItemData> for GalleryItem {
    fn from(data: GalleryItemData) -> Self {
        let kind = if data.is_album {
            ItemKind::Album {
                images_count: data.images_count.unwrap_or(0),
            }
        } else if data.animated {
            ItemKind::Unknown {
                kind: "animated".to_string(),
            }
        } else {
            match data.mime_type {
                Some(mime) if mime.starts_with("image/") => ItemKind::SingleImage(ImageRef {
                    id: data.id.clone(),
                    link: data.link,
                }),
                Some(mime) => ItemKind::Unknown { kind: mime },
                None => ItemKind::Unknown {
                    kind: "unknown".to_string(),
                },
            }
        };

        Self {
            id: data.id,
            title: data.title.unwrap_or_default(),
            kind,
        }
    }
}

impl From<ImageData> for ImageRef {
    fn from(data: ImageData) -> Self {
        Self {
            id: data.id,
            link: data.link,
        }
    }
}

impl From<CommentData> for Comment {
    fn from(data: CommentData) -> Self {
        Self {
            id: data.id,
            text: data.comment,
            author: data.author,
        }
    }
}

impl From<CreditsData> for Credits {
    fn from(data: CreditsData) -> Self {
        Self {
            user_remaining: clamp_credits(data.user_remaining),
            client_remaining: clamp_credits(data.client_remaining),
            user_reset: data
                .user_reset
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        }
    }
}

fn clamp_credits(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}

/// Credit counters Imgur attaches to every authenticated response.
pub fn credits_from_headers(headers: &HeaderMap) -> Option<Credits> {
    let read = |name: &str| -> Option<i64> {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<i64>().ok())
    };

    let user_remaining = read(HEADER_USER_REMAINING)?;
    let client_remaining = read(HEADER_CLIENT_REMAINING)?;
    Some(Credits {
        user_remaining: clamp_credits(user_remaining),
        client_remaining: clamp_credits(client_remaining),
        user_reset: read(HEADER_USER_RESET).and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
    })
}

/// Maps a non-success status onto the gallery error taxonomy.
pub fn classify_status(status: StatusCode, endpoint: &str, body: &str) -> GalleryApiError {
    match status.as_u16() {
        429 => GalleryApiError::RateLimitExceeded,
        401 | 403 => GalleryApiError::AuthenticationFailed {
            reason: format!("{} returned {}", endpoint, status),
        },
        404 => GalleryApiError::NotFound {
            resource: endpoint.to_string(),
        },
        410 => GalleryApiError::Gone {
            resource: endpoint.to_string(),
        },
        code if status.is_server_error() => GalleryApiError::ServerError { status_code: code },
        code => GalleryApiError::ClientError {
            status_code: code,
            message: body.chars().take(200).collect(),
        },
    }
}

fn map_transport_error(endpoint: &str, e: reqwest::Error) -> CoreError {
    error!("Network error for {}: {}", endpoint, e);
    if e.is_timeout() {
        CoreError::GalleryApi(GalleryApiError::RequestTimeout)
    } else {
        CoreError::Network(e)
    }
}

#[derive(Debug)]
pub struct ImgurApiClient {
    http_client: Client,
    tokens: TokenManager,
    base_url: String,
}

impl ImgurApiClient {
    pub fn new(
        config: &ImgurOAuth2Config,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            tokens: TokenManager::new(config)?,
            base_url: IMGUR_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        form: Option<&[(&str, &str)]>,
    ) -> Result<Response, CoreError> {
        let url = format!("{}/{}", self.base_url, endpoint);

        // A 401 usually means the cached access token was revoked; refresh once.
        for attempt in 0..2 {
            let access_token = self.tokens.access_token().await?;
            let mut request_builder = self
                .http_client
                .request(method.clone(), &url)
                .bearer_auth(access_token);
            if let Some(fields) = form {
                request_builder = request_builder.form(fields);
            }

            debug!("Making Imgur API request: {} {}", method, endpoint);
            let response = request_builder
                .send()
                .await
                .map_err(|e| map_transport_error(endpoint, e))?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            if status == StatusCode::UNAUTHORIZED && attempt == 0 {
                warn!("Access token rejected for {}, refreshing", endpoint);
                self.tokens.invalidate().await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            let api_error = classify_status(status, endpoint, &body);
            debug!("Request failed with status {} for {}", status, endpoint);
            return Err(CoreError::GalleryApi(api_error));
        }

        Err(CoreError::GalleryApi(GalleryApiError::AuthenticationFailed {
            reason: format!("{} rejected a freshly refreshed token", endpoint),
        }))
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        form: Option<&[(&str, &str)]>,
    ) -> Result<ApiReply<T>, CoreError> {
        let response = self.make_request(method, endpoint, form).await?;
        let credits = credits_from_headers(response.headers());

        let envelope: ImgurEnvelope<T> = response.json().await.map_err(|e| {
            error!("Failed to parse response for {}: {}", endpoint, e);
            CoreError::GalleryApi(GalleryApiError::InvalidResponse {
                details: format!("Failed to parse {}", endpoint),
            })
        })?;

        Ok(ApiReply::new(envelope.data, credits))
    }
}

#[async_trait]
impl GalleryApi for ImgurApiClient {
    async fn list_gallery(
        &self,
        query: &GalleryQuery,
    ) -> Result<ApiReply<Vec<GalleryItem>>, CoreError> {
        let endpoint = format!(
            "gallery/{}/{}/{}/{}",
            query.section.as_str(),
            query.sort.as_str(),
            query.window.as_str(),
            query.page
        );
        let reply: ApiReply<Vec<GalleryItemData>> =
            self.fetch_json(Method::GET, &endpoint, None).await?;

        info!(
            "Retrieved {} items from {} page {}",
            reply.data.len(),
            query.section,
            query.page
        );
        Ok(ApiReply::new(
            reply.data.into_iter().map(GalleryItem::from).collect(),
            reply.credits,
        ))
    }

    async fn list_album_images(
        &self,
        album_id: &str,
    ) -> Result<ApiReply<Vec<ImageRef>>, CoreError> {
        let endpoint = format!("album/{}/images", album_id);
        let reply: ApiReply<Vec<ImageData>> =
            self.fetch_json(Method::GET, &endpoint, None).await?;

        Ok(ApiReply::new(
            reply.data.into_iter().map(ImageRef::from).collect(),
            reply.credits,
        ))
    }

    async fn list_comments(&self, post_id: &str) -> Result<ApiReply<Vec<Comment>>, CoreError> {
        let endpoint = format!("gallery/{}/comments/best", post_id);
        let reply: ApiReply<Vec<CommentData>> =
            self.fetch_json(Method::GET, &endpoint, None).await?;

        Ok(ApiReply::new(
            reply.data.into_iter().map(Comment::from).collect(),
            reply.credits,
        ))
    }

    async fn post_comment(&self, post_id: &str, text: &str) -> Result<ApiReply<()>, CoreError> {
        let endpoint = format!("gallery/{}/comment", post_id);
        let reply: ApiReply<serde_json::Value> = self
            .fetch_json(Method::POST, &endpoint, Some(&[("comment", text)]))
            .await?;

        Ok(ApiReply::new((), reply.credits))
    }

    async fn get_credits(&self) -> Result<Credits, CoreError> {
        let reply: ApiReply<CreditsData> = self.fetch_json(Method::GET, "credits", None).await?;
        Ok(reply.data.into())
    }

    async fn download(&self, url: &str) -> Result<Download, CoreError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| map_transport_error(url, e))?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_transport_error(url, e))?;

        Ok(Download {
            status,
            bytes: bytes.to_vec(),
        })
    }
}
