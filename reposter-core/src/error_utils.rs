use crate::error::*;
use std::fmt::Display;
use tracing::{error, warn};

/// Stable codes and log helpers shared by every error type in the crawler.
pub trait ErrorExt: Display {
    fn error_code(&self) -> &'static str;

    /// Upstream hiccups the rate-limited client waits out instead of surfacing.
    fn is_transient(&self) -> bool {
        false
    }

    fn log_error(&self) -> &Self
    where
        Self: Sized,
    {
        error!(code = self.error_code(), "{}", self);
        self
    }

    fn log_warn(&self) -> &Self
    where
        Self: Sized,
    {
        warn!(code = self.error_code(), "{}", self);
        self
    }
}

impl ErrorExt for CoreError {
    fn error_code(&self) -> &'static str {
        match self {
            CoreError::GalleryApi(inner) => inner.error_code(),
            CoreError::Fingerprint(inner) => inner.error_code(),
            CoreError::Store(_) => "STORE",
            CoreError::Config(_) => "CONFIG",
            CoreError::Io(_) => "IO",
            CoreError::Serialization(_) => "SERIALIZATION",
            CoreError::Network(_) => "NETWORK",
            CoreError::InvalidInput { .. } => "INVALID_INPUT",
            CoreError::Internal { .. } => "INTERNAL",
            CoreError::Cancelled => "CANCELLED",
        }
    }

    fn is_transient(&self) -> bool {
        matches!(self, CoreError::GalleryApi(inner) if inner.is_transient())
    }
}

impl ErrorExt for GalleryApiError {
    fn error_code(&self) -> &'static str {
        match self {
            GalleryApiError::AuthenticationFailed { .. } => "GALLERY_AUTH_FAILED",
            GalleryApiError::RateLimitExceeded => "GALLERY_RATE_LIMIT",
            GalleryApiError::ServerError { .. } => "GALLERY_SERVER_ERROR",
            GalleryApiError::NotFound { .. } => "GALLERY_NOT_FOUND",
            GalleryApiError::Gone { .. } => "GALLERY_GONE",
            GalleryApiError::ClientError { .. } => "GALLERY_CLIENT_ERROR",
            GalleryApiError::RequestTimeout => "GALLERY_TIMEOUT",
            GalleryApiError::InvalidResponse { .. } => "GALLERY_INVALID_RESPONSE",
        }
    }

    fn is_transient(&self) -> bool {
        match self {
            GalleryApiError::RateLimitExceeded => true,
            GalleryApiError::ServerError { status_code } => *status_code >= 500,
            _ => false,
        }
    }
}

impl ErrorExt for FingerprintError {
    fn error_code(&self) -> &'static str {
        match self {
            FingerprintError::Decode { .. } => "FINGERPRINT_DECODE",
            FingerprintError::EmptyAlbum { .. } => "FINGERPRINT_EMPTY_ALBUM",
            FingerprintError::UnknownItemKind { .. } => "FINGERPRINT_UNKNOWN_KIND",
        }
    }
}
