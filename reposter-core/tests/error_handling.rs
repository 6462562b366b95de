use reposter_core::{
    ConfigError, CoreError, ErrorExt, ErrorRecovery, FingerprintError, GalleryApiError,
    RecoveryStrategy, StoreError,
};

#[test]
fn test_error_codes() {
    let api_error = CoreError::GalleryApi(GalleryApiError::RateLimitExceeded);
    assert_eq!(api_error.error_code(), "GALLERY_RATE_LIMIT");

    let store_error = CoreError::Store(StoreError::MigrationFailed {
        reason: "duplicate column".to_string(),
    });
    assert_eq!(store_error.error_code(), "STORE");

    let fingerprint_error = CoreError::Fingerprint(FingerprintError::Decode {
        reason: "bad magic".to_string(),
    });
    assert_eq!(fingerprint_error.error_code(), "FINGERPRINT_DECODE");

    let config_error = CoreError::Config(ConfigError::MissingField {
        field: "client_id".to_string(),
    });
    assert_eq!(config_error.error_code(), "CONFIG");

    assert_eq!(CoreError::Cancelled.error_code(), "CANCELLED");
}

#[test]
fn test_transient_errors() {
    let transient = CoreError::GalleryApi(GalleryApiError::ServerError { status_code: 502 });
    assert!(transient.is_transient());

    let permanent = CoreError::GalleryApi(GalleryApiError::Gone {
        resource: "gallery/abc".to_string(),
    });
    assert!(!permanent.is_transient());

    let config_error = CoreError::Config(ConfigError::MissingField {
        field: "client_id".to_string(),
    });
    assert!(!config_error.is_transient());
}

#[test]
fn test_every_taxonomy_kind_has_a_strategy() {
    let cases = vec![
        (
            CoreError::Fingerprint(FingerprintError::Decode {
                reason: "truncated".to_string(),
            }),
            RecoveryStrategy::PoisonPost,
        ),
        (
            CoreError::Fingerprint(FingerprintError::EmptyAlbum {
                post_id: "a1".to_string(),
            }),
            RecoveryStrategy::PoisonPost,
        ),
        (
            CoreError::GalleryApi(GalleryApiError::ClientError {
                status_code: 400,
                message: "bad request".to_string(),
            }),
            RecoveryStrategy::PoisonPost,
        ),
        (
            CoreError::GalleryApi(GalleryApiError::RateLimitExceeded),
            RecoveryStrategy::Cooldown,
        ),
        (
            CoreError::Internal {
                message: "unexpected".to_string(),
            },
            RecoveryStrategy::Propagate,
        ),
    ];

    for (error, expected) in cases {
        assert_eq!(
            ErrorRecovery::determine_strategy(&error),
            expected,
            "strategy for {}",
            error
        );
    }
}

#[test]
fn test_logging_helpers_return_self() {
    let error = CoreError::GalleryApi(GalleryApiError::RequestTimeout);

    // Only checks the helpers are chainable and do not panic
    assert_eq!(error.log_warn().error_code(), "GALLERY_TIMEOUT");
    assert_eq!(error.log_error().error_code(), "GALLERY_TIMEOUT");
}
