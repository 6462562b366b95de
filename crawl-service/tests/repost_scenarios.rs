use crawl_service::{
    CrawlOrchestrator, CrawlService, FeedScanner, PoisonReason, PostOutcome,
};
use database::{DedupStore, MemoryStore, PostStatus, StoredReply};
use fingerprint_engine::{PerceptualHasher, PostFingerprinter};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imgur_client::mock::{MockCall, MockGalleryApi};
use imgur_client::{RateLimitConfig, RateLimitedClient};
use reposter_core::{
    Comment, CoreError, Fingerprint, GalleryApiError, GalleryItem, ImageRef, ItemKind, Section,
    POISON,
};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("crawl_service=debug,imgur_client=debug")
        .with_test_writer()
        .try_init();
}

fn png(seed: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(40, 30, |x, y| {
        let v = ((x * seed + y * 11) % 256) as u8;
        Rgb([v, 255 - v, v / 2])
    });
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

fn fingerprint_of(bytes: &[u8]) -> Fingerprint {
    let hash = PerceptualHasher::new().hash(bytes).unwrap();
    Fingerprint::from_hashes(&[hash]).unwrap()
}

fn image(id: &str) -> ImageRef {
    ImageRef {
        id: id.to_string(),
        link: format!("https://i.imgur.com/{}.png", id),
    }
}

fn album(id: &str, images_count: u32) -> GalleryItem {
    GalleryItem {
        id: id.to_string(),
        title: format!("album {}", id),
        kind: ItemKind::Album { images_count },
    }
}

fn single(id: &str) -> GalleryItem {
    GalleryItem {
        id: id.to_string(),
        title: format!("image {}", id),
        kind: ItemKind::SingleImage(image(id)),
    }
}

fn comment(text: &str) -> Comment {
    Comment {
        id: 1,
        text: text.to_string(),
        author: None,
    }
}

fn orchestrator(
    section: Section,
    api: &MockGalleryApi,
    store: &Arc<MemoryStore>,
) -> CrawlOrchestrator<MockGalleryApi> {
    let client = RateLimitedClient::new(
        api.clone(),
        RateLimitConfig {
            credit_floor: 10,
            cooldown: Duration::from_millis(1),
        },
        CancellationToken::new(),
    );
    let store: Arc<dyn DedupStore> = store.clone();
    CrawlOrchestrator::new(section, client, store, PostFingerprinter::default())
}

#[tokio::test]
async fn test_hot_comment_is_replayed_on_user_repost() {
    let api = MockGalleryApi::new();
    let store = Arc::new(MemoryStore::new());
    let cat = png(3);

    api.add_album("A", vec![image("a1")]);
    api.add_download("https://i.imgur.com/a1s.png", cat.clone());
    api.add_comments("A", vec![comment("nice!"), comment("meh")]);
    api.add_album("B", vec![image("b1")]);
    api.add_download("https://i.imgur.com/b1s.png", cat.clone());

    let mut hot = orchestrator(Section::Hot, &api, &store);
    let outcome = hot.process_item(album("A", 1)).await.unwrap();
    assert_eq!(outcome, PostOutcome::Recorded { reply_stored: true });

    let fingerprint = fingerprint_of(&cat);
    assert_eq!(
        store.reply_for(&fingerprint).await.unwrap(),
        Some(StoredReply::Reply("nice!".to_string()))
    );
    assert_eq!(
        store.post_status("A").await.unwrap(),
        Some(PostStatus::Fingerprinted(fingerprint.clone()))
    );

    let mut user = orchestrator(Section::User, &api, &store);
    let outcome = user.process_item(album("B", 1)).await.unwrap();
    assert_eq!(
        outcome,
        PostOutcome::RepostCommented {
            reply: "nice!".to_string()
        }
    );
    assert_eq!(
        api.posted_comments(),
        vec![("B".to_string(), "nice!".to_string())]
    );
    assert_eq!(
        store.post_status("B").await.unwrap(),
        Some(PostStatus::Fingerprinted(fingerprint))
    );
    assert_eq!(user.stats().reposts, 1);
}

#[tokio::test]
async fn test_second_pass_makes_no_calls() {
    let api = MockGalleryApi::new();
    let store = Arc::new(MemoryStore::new());
    api.add_download("https://i.imgur.com/x1s.png", png(7));

    let mut user = orchestrator(Section::User, &api, &store);
    assert_eq!(
        user.process_item(single("x1")).await.unwrap(),
        PostOutcome::Unique
    );
    let calls_after_first = api.calls().len();
    let entries_after_first = store.len().await;

    assert_eq!(
        user.process_item(single("x1")).await.unwrap(),
        PostOutcome::AlreadySeen
    );
    assert_eq!(api.calls().len(), calls_after_first);
    assert_eq!(store.len().await, entries_after_first);

    // Poisoned posts are skipped the same way
    user.process_item(album("empty", 0)).await.unwrap();
    let calls = api.calls().len();
    assert_eq!(
        user.process_item(album("empty", 0)).await.unwrap(),
        PostOutcome::AlreadySeen
    );
    assert_eq!(api.calls().len(), calls);
}

#[tokio::test]
async fn test_reply_is_write_once() {
    let api = MockGalleryApi::new();
    let store = Arc::new(MemoryStore::new());
    let meme = png(5);

    api.add_download("https://i.imgur.com/h1s.png", meme.clone());
    api.add_download("https://i.imgur.com/h2s.png", meme.clone());
    api.add_comments("h1", vec![comment("first")]);
    api.add_comments("h2", vec![comment("second")]);

    let mut hot = orchestrator(Section::Hot, &api, &store);
    assert_eq!(
        hot.process_item(single("h1")).await.unwrap(),
        PostOutcome::Recorded { reply_stored: true }
    );
    assert_eq!(
        hot.process_item(single("h2")).await.unwrap(),
        PostOutcome::Recorded {
            reply_stored: false
        }
    );

    assert_eq!(
        store.reply_for(&fingerprint_of(&meme)).await.unwrap(),
        Some(StoredReply::Reply("first".to_string()))
    );
}

#[tokio::test]
async fn test_empty_album_is_poisoned_without_downloads() {
    let api = MockGalleryApi::new();
    let store = Arc::new(MemoryStore::new());

    let mut hot = orchestrator(Section::Hot, &api, &store);
    let outcome = hot.process_item(album("void", 0)).await.unwrap();

    assert_eq!(
        outcome,
        PostOutcome::Poisoned {
            reason: PoisonReason::EmptyAlbum
        }
    );
    assert_eq!(store.get("void").await.unwrap().as_deref(), Some(POISON));
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_blacklisted_fingerprint_poisons_without_comment() {
    let api = MockGalleryApi::new();
    let store = Arc::new(MemoryStore::new());
    let bad = png(9);
    store
        .blacklist_fingerprint(&fingerprint_of(&bad))
        .await
        .unwrap();

    api.add_download("https://i.imgur.com/u1s.png", bad.clone());
    api.add_download("https://i.imgur.com/u2s.png", bad.clone());

    let mut user = orchestrator(Section::User, &api, &store);
    for id in ["u1", "u2"] {
        assert_eq!(
            user.process_item(single(id)).await.unwrap(),
            PostOutcome::Poisoned {
                reason: PoisonReason::BlacklistedFingerprint
            }
        );
        assert_eq!(
            store.post_status(id).await.unwrap(),
            Some(PostStatus::Poisoned)
        );
    }
    assert!(api.posted_comments().is_empty());
}

#[tokio::test]
async fn test_missing_thumbnail_still_fingerprints() {
    let api = MockGalleryApi::new();
    let store = Arc::new(MemoryStore::new());
    let full = png(4);
    api.add_download_status("https://i.imgur.com/t1s.png", 404, Vec::new());
    api.add_download("https://i.imgur.com/t1.png", full.clone());

    let mut user = orchestrator(Section::User, &api, &store);
    assert_eq!(
        user.process_item(single("t1")).await.unwrap(),
        PostOutcome::Unique
    );
    assert_eq!(
        store.post_status("t1").await.unwrap(),
        Some(PostStatus::Fingerprinted(fingerprint_of(&full)))
    );
}

#[tokio::test]
async fn test_unknown_kind_is_poisoned() {
    let api = MockGalleryApi::new();
    let store = Arc::new(MemoryStore::new());
    let item = GalleryItem {
        id: "gif".to_string(),
        title: "animated".to_string(),
        kind: ItemKind::Unknown {
            kind: "animated".to_string(),
        },
    };

    let mut user = orchestrator(Section::User, &api, &store);
    assert_eq!(
        user.process_item(item).await.unwrap(),
        PostOutcome::Poisoned {
            reason: PoisonReason::UnknownItemKind("animated".to_string())
        }
    );
    assert_eq!(
        store.post_status("gif").await.unwrap(),
        Some(PostStatus::Poisoned)
    );
}

#[tokio::test]
async fn test_hot_post_without_usable_comments_is_poisoned() {
    let api = MockGalleryApi::new();
    let store = Arc::new(MemoryStore::new());
    api.add_download("https://i.imgur.com/q1s.png", png(2));
    api.add_download("https://i.imgur.com/q2s.png", png(6));
    api.fail_next(
        "comments",
        GalleryApiError::NotFound {
            resource: "gallery/q2/comments/best".to_string(),
        },
    );

    let mut hot = orchestrator(Section::Hot, &api, &store);
    // q2's scripted failure is consumed by the first comment fetch
    assert!(matches!(
        hot.process_item(single("q2")).await.unwrap(),
        PostOutcome::Poisoned {
            reason: PoisonReason::Api(_)
        }
    ));
    assert_eq!(
        hot.process_item(single("q1")).await.unwrap(),
        PostOutcome::Poisoned {
            reason: PoisonReason::NoComments
        }
    );
    assert_eq!(hot.stats().poisoned, 2);
}

#[tokio::test]
async fn test_deleted_album_is_poisoned() {
    let api = MockGalleryApi::new();
    let store = Arc::new(MemoryStore::new());

    // Not scripted, so listing its images answers 404
    let mut hot = orchestrator(Section::Hot, &api, &store);
    assert!(matches!(
        hot.process_item(album("deleted", 3)).await.unwrap(),
        PostOutcome::Poisoned {
            reason: PoisonReason::Api(_)
        }
    ));
    assert_eq!(
        store.post_status("deleted").await.unwrap(),
        Some(PostStatus::Poisoned)
    );
}

#[tokio::test]
async fn test_failed_comment_keeps_post_recorded() {
    let api = MockGalleryApi::new();
    let store = Arc::new(MemoryStore::new());
    let meme = png(8);
    store
        .record_reply_once(&fingerprint_of(&meme), "old joke")
        .await
        .unwrap();
    api.add_download("https://i.imgur.com/r1s.png", meme.clone());
    api.fail_next(
        "post_comment",
        GalleryApiError::ClientError {
            status_code: 400,
            message: "comment too long".to_string(),
        },
    );

    let mut user = orchestrator(Section::User, &api, &store);
    assert_eq!(
        user.process_item(single("r1")).await.unwrap(),
        PostOutcome::RepostCommentFailed {
            reply: "old joke".to_string()
        }
    );
    assert_eq!(
        store.post_status("r1").await.unwrap(),
        Some(PostStatus::Fingerprinted(fingerprint_of(&meme)))
    );

    // Never retried on a later pass
    assert_eq!(
        user.process_item(single("r1")).await.unwrap(),
        PostOutcome::AlreadySeen
    );
    assert_eq!(
        api.count_calls(|call| matches!(call, MockCall::PostComment(..))),
        1
    );
}

#[tokio::test]
async fn test_timed_out_image_is_skipped() {
    let api = MockGalleryApi::new();
    let store = Arc::new(MemoryStore::new());
    let second = png(10);
    api.add_album("T", vec![image("t1"), image("t2")]);
    api.add_download("https://i.imgur.com/t2s.png", second.clone());
    // Consumed by t1's thumbnail
    api.fail_next("download", GalleryApiError::RequestTimeout);

    let mut user = orchestrator(Section::User, &api, &store);
    assert_eq!(
        user.process_item(album("T", 2)).await.unwrap(),
        PostOutcome::Unique
    );
    assert_eq!(
        store.post_status("T").await.unwrap(),
        Some(PostStatus::Fingerprinted(fingerprint_of(&second)))
    );
}

#[tokio::test]
async fn test_timeouts_poison_only_that_post() {
    let api = MockGalleryApi::new();
    let store = Arc::new(MemoryStore::new());
    api.add_download("https://i.imgur.com/s1s.png", png(13));
    api.add_comments("s1", vec![comment("later")]);
    api.fail_next("comments", GalleryApiError::RequestTimeout);
    api.fail_next("album_images", GalleryApiError::RequestTimeout);

    let mut hot = orchestrator(Section::Hot, &api, &store);
    assert!(matches!(
        hot.process_item(single("s1")).await.unwrap(),
        PostOutcome::Poisoned {
            reason: PoisonReason::Api(_)
        }
    ));
    assert!(matches!(
        hot.process_item(album("s2", 4)).await.unwrap(),
        PostOutcome::Poisoned {
            reason: PoisonReason::Api(_)
        }
    ));
    for id in ["s1", "s2"] {
        assert_eq!(
            store.post_status(id).await.unwrap(),
            Some(PostStatus::Poisoned)
        );
    }

    // The section keeps going with the next post
    api.add_download("https://i.imgur.com/s3s.png", png(14));
    api.add_comments("s3", vec![comment("first!")]);
    assert_eq!(
        hot.process_item(single("s3")).await.unwrap(),
        PostOutcome::Recorded { reply_stored: true }
    );
}

#[tokio::test]
async fn test_empty_stored_reply_is_not_posted() {
    let api = MockGalleryApi::new();
    let store = Arc::new(MemoryStore::new());
    let meme = png(15);
    store
        .record_reply_once(&fingerprint_of(&meme), "")
        .await
        .unwrap();
    api.add_download("https://i.imgur.com/e1s.png", meme.clone());

    let mut user = orchestrator(Section::User, &api, &store);
    assert_eq!(
        user.process_item(single("e1")).await.unwrap(),
        PostOutcome::Unique
    );
    assert!(api.posted_comments().is_empty());
    assert_eq!(
        store.post_status("e1").await.unwrap(),
        Some(PostStatus::Fingerprinted(fingerprint_of(&meme)))
    );
}

#[tokio::test]
async fn test_auth_failure_stops_the_section() {
    let api = MockGalleryApi::new();
    let store = Arc::new(MemoryStore::new());
    api.fail_next(
        "credits",
        GalleryApiError::AuthenticationFailed {
            reason: "refresh token revoked".to_string(),
        },
    );

    let mut user = orchestrator(Section::User, &api, &store);
    let result = user.process_item(single("z1")).await;
    assert!(matches!(
        result,
        Err(CoreError::GalleryApi(GalleryApiError::AuthenticationFailed { .. }))
    ));
    // Nothing written, so the post is retried on the next run
    assert_eq!(store.post_status("z1").await.unwrap(), None);
}

#[tokio::test]
async fn test_service_crawls_until_stopped() {
    init_tracing();
    let api = MockGalleryApi::new();
    let store = Arc::new(MemoryStore::new());
    api.add_page(Section::Hot, 0, vec![single("p1"), album("p2", 0)]);
    api.add_download("https://i.imgur.com/p1s.png", png(12));
    api.add_comments("p1", vec![comment("top")]);

    let shutdown = CancellationToken::new();
    let mut service = CrawlService::new(shutdown.clone());
    let client = RateLimitedClient::new(
        api.clone(),
        RateLimitConfig {
            credit_floor: 10,
            cooldown: Duration::from_millis(1),
        },
        shutdown.clone(),
    );
    let dyn_store: Arc<dyn DedupStore> = store.clone();
    let orchestrator =
        CrawlOrchestrator::new(Section::Hot, client, dyn_store, PostFingerprinter::default());
    let scanner = FeedScanner::new(Section::Hot, 1, Duration::from_millis(5), shutdown.clone());
    service.spawn_section(orchestrator, scanner);

    for _ in 0..100 {
        if store.len().await >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    service.stop();
    service.wait().await.unwrap();

    assert_eq!(
        store.post_status("p2").await.unwrap(),
        Some(PostStatus::Poisoned)
    );
    assert!(matches!(
        store.post_status("p1").await.unwrap(),
        Some(PostStatus::Fingerprinted(_))
    ));
    assert_eq!(
        store.reply_for(&fingerprint_of(&png(12))).await.unwrap(),
        Some(StoredReply::Reply("top".to_string()))
    );
}
