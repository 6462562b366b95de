use oauth2::basic::{BasicClient, BasicErrorResponse};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthType, AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, RefreshToken,
    RequestTokenError, TokenResponse, TokenUrl,
};
use reposter_core::{CoreError, GalleryApiError};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const IMGUR_AUTH_URL: &str = "https://api.imgur.com/oauth2/authorize";
const IMGUR_TOKEN_URL: &str = "https://api.imgur.com/oauth2/token";

// Refresh a little before the upstream expiry
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct ImgurOAuth2Config {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub auth_url: String,
    pub token_url: String,
}

impl ImgurOAuth2Config {
    pub fn new(client_id: String, client_secret: String, refresh_token: String) -> Self {
        Self {
            client_id,
            client_secret,
            refresh_token,
            auth_url: IMGUR_AUTH_URL.to_string(),
            token_url: IMGUR_TOKEN_URL.to_string(),
        }
    }
}

/// Failure to get any usable answer out of the token endpoint.
#[derive(Error, Debug)]
pub enum TokenEndpointError {
    #[error("token endpoint returned {0}")]
    Status(u16),

    #[error(transparent)]
    Transport(#[from] oauth2::reqwest::Error<reqwest::Error>),
}

type RefreshError = RequestTokenError<TokenEndpointError, BasicErrorResponse>;

/// Keeps the status of throttled or failing token responses, which the
/// oauth2 crate would otherwise only report as an unparseable body.
async fn send_token_request(request: HttpRequest) -> Result<HttpResponse, TokenEndpointError> {
    let response = async_http_client(request).await?;
    let status = response.status_code;
    if status.is_server_error() || status.as_u16() == 429 {
        return Err(TokenEndpointError::Status(status.as_u16()));
    }
    Ok(response)
}

/// Throttling and upstream outages cool down like any other API call;
/// only an answer that rejects the credentials is an authentication failure.
fn classify_refresh_error(error: RefreshError) -> GalleryApiError {
    match error {
        RequestTokenError::Request(TokenEndpointError::Status(429)) => {
            GalleryApiError::RateLimitExceeded
        }
        RequestTokenError::Request(TokenEndpointError::Status(status_code)) => {
            GalleryApiError::ServerError { status_code }
        }
        RequestTokenError::Request(TokenEndpointError::Transport(e)) => {
            warn!("Token endpoint unreachable: {}", e);
            // No response at all; treated like an unavailable endpoint
            GalleryApiError::ServerError { status_code: 503 }
        }
        other => GalleryApiError::AuthenticationFailed {
            reason: other.to_string(),
        },
    }
}

#[derive(Debug, Clone)]
pub struct ImgurToken {
    pub access_token: String,
    pub expires_at: SystemTime,
}

impl ImgurToken {
    pub fn is_fresh(&self, now: SystemTime) -> bool {
        now + EXPIRY_MARGIN < self.expires_at
    }
}

#[derive(Debug)]
struct TokenState {
    refresh_token: RefreshToken,
    current: Option<ImgurToken>,
}

/// Trades the long-lived refresh token for short-lived access tokens.
#[derive(Debug)]
pub struct TokenManager {
    oauth_client: BasicClient,
    state: Mutex<TokenState>,
}

impl TokenManager {
    pub fn new(config: &ImgurOAuth2Config) -> Result<Self, CoreError> {
        let auth_url = AuthUrl::new(config.auth_url.clone()).map_err(|e| CoreError::InvalidInput {
            message: format!("invalid auth url: {}", e),
        })?;
        let token_url =
            TokenUrl::new(config.token_url.clone()).map_err(|e| CoreError::InvalidInput {
                message: format!("invalid token url: {}", e),
            })?;

        let oauth_client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::RequestBody);

        Ok(Self {
            oauth_client,
            state: Mutex::new(TokenState {
                refresh_token: RefreshToken::new(config.refresh_token.clone()),
                current: None,
            }),
        })
    }

    pub async fn access_token(&self) -> Result<String, CoreError> {
        let mut state = self.state.lock().await;
        if let Some(token) = &state.current {
            if token.is_fresh(SystemTime::now()) {
                return Ok(token.access_token.clone());
            }
        }

        info!("Refreshing Imgur access token");
        let response = self
            .oauth_client
            .exchange_refresh_token(&state.refresh_token)
            .request_async(send_token_request)
            .await
            .map_err(classify_refresh_error)?;

        let lifetime = response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let token = ImgurToken {
            access_token: response.access_token().secret().clone(),
            expires_at: SystemTime::now() + lifetime,
        };
        if let Some(rotated) = response.refresh_token() {
            debug!("Imgur rotated the refresh token");
            state.refresh_token = rotated.clone();
        }

        let access_token = token.access_token.clone();
        state.current = Some(token);
        Ok(access_token)
    }

    /// Forget the cached access token, e.g. after the API answered 401.
    pub async fn invalidate(&self) {
        self.state.lock().await.current = None;
    }

    pub async fn has_token(&self) -> bool {
        self.state.lock().await.current.is_some()
    }
}
