//! Recovery policy for errors raised while crawling.
//!
//! Transient upstream trouble is waited out by the rate-limited client.
//! Trouble tied to one post poisons that post. Anything else stops the
//! section.

use crate::{CoreError, ErrorExt, FingerprintError, GalleryApiError};

/// Recovery strategy for handling errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Sleep until credits are replenished, then retry the same call
    Cooldown,
    /// Mark the post as unprocessable and continue with the next item
    PoisonPost,
    /// Stop the affected section and surface the error
    Propagate,
}

pub struct ErrorRecovery;

impl ErrorRecovery {
    /// Determine the appropriate recovery strategy for a given error
    pub fn determine_strategy(error: &CoreError) -> RecoveryStrategy {
        if error.is_transient() {
            return RecoveryStrategy::Cooldown;
        }

        match error {
            CoreError::GalleryApi(api_error) => match api_error {
                // Deleted, unreachable or stuck galleries
                GalleryApiError::NotFound { .. }
                | GalleryApiError::Gone { .. }
                | GalleryApiError::ClientError { .. }
                | GalleryApiError::InvalidResponse { .. }
                | GalleryApiError::RequestTimeout => RecoveryStrategy::PoisonPost,
                // Credentials need a human
                GalleryApiError::AuthenticationFailed { .. } => RecoveryStrategy::Propagate,
                GalleryApiError::RateLimitExceeded => RecoveryStrategy::Cooldown,
                // Only statuses below 500 get here
                GalleryApiError::ServerError { .. } => RecoveryStrategy::Propagate,
            },

            CoreError::Fingerprint(fingerprint_error) => match fingerprint_error {
                FingerprintError::Decode { .. }
                | FingerprintError::EmptyAlbum { .. }
                | FingerprintError::UnknownItemKind { .. } => RecoveryStrategy::PoisonPost,
            },

            // Transport failures while fetching one post's album, comments or images
            CoreError::Network(_) => RecoveryStrategy::PoisonPost,

            CoreError::Store(_)
            | CoreError::Config(_)
            | CoreError::Io(_)
            | CoreError::Serialization(_)
            | CoreError::InvalidInput { .. }
            | CoreError::Internal { .. }
            | CoreError::Cancelled => RecoveryStrategy::Propagate,
        }
    }

    pub fn is_post_recoverable(error: &CoreError) -> bool {
        Self::determine_strategy(error) == RecoveryStrategy::PoisonPost
    }
}
