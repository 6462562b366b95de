use crate::post::Post;
use crate::scanner::{FeedScanner, ScanEvent};
use database::{DedupStore, StoredReply};
use fingerprint_engine::PostFingerprinter;
use imgur_client::{GalleryApi, RateLimitedClient};
use reposter_core::{
    CoreError, ErrorExt, ErrorRecovery, Fingerprint, FingerprintError, GalleryItem,
    RecoveryStrategy, Section,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoisonReason {
    EmptyAlbum,
    UnknownItemKind(String),
    NoFingerprint,
    BlacklistedFingerprint,
    NoComments,
    Api(String),
}

impl fmt::Display for PoisonReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoisonReason::EmptyAlbum => write!(f, "empty album"),
            PoisonReason::UnknownItemKind(kind) => write!(f, "unknown item kind '{}'", kind),
            PoisonReason::NoFingerprint => write!(f, "no image could be hashed"),
            PoisonReason::BlacklistedFingerprint => write!(f, "blacklisted fingerprint"),
            PoisonReason::NoComments => write!(f, "no comments"),
            PoisonReason::Api(message) => write!(f, "{}", message),
        }
    }
}

impl PoisonReason {
    fn from_error(error: &CoreError) -> Self {
        match error {
            CoreError::Fingerprint(FingerprintError::EmptyAlbum { .. }) => PoisonReason::EmptyAlbum,
            CoreError::Fingerprint(FingerprintError::UnknownItemKind { kind, .. }) => {
                PoisonReason::UnknownItemKind(kind.clone())
            }
            CoreError::Fingerprint(FingerprintError::Decode { .. }) => PoisonReason::NoFingerprint,
            other => PoisonReason::Api(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// The post id was already in the store; nothing was fetched.
    AlreadySeen,
    Poisoned { reason: PoisonReason },
    /// Hot post saved. `reply_stored` is false when the fingerprint already had a reply.
    Recorded { reply_stored: bool },
    /// User post with a fingerprint nobody replied to yet.
    Unique,
    RepostCommented { reply: String },
    RepostCommentFailed { reply: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub already_seen: u64,
    pub poisoned: u64,
    pub recorded: u64,
    pub unique: u64,
    pub reposts: u64,
    pub comment_failures: u64,
}

impl CycleStats {
    pub fn record(&mut self, outcome: &PostOutcome) {
        match outcome {
            PostOutcome::AlreadySeen => self.already_seen += 1,
            PostOutcome::Poisoned { .. } => self.poisoned += 1,
            PostOutcome::Recorded { .. } => self.recorded += 1,
            PostOutcome::Unique => self.unique += 1,
            PostOutcome::RepostCommented { .. } => self.reposts += 1,
            PostOutcome::RepostCommentFailed { .. } => self.comment_failures += 1,
        }
    }

    /// Posts that ended up with a fingerprint this cycle.
    pub fn new_posts(&self) -> u64 {
        self.recorded + self.unique + self.reposts + self.comment_failures
    }
}

/// Runs posts of one section through fingerprinting and the dedup store.
///
/// Hot posts teach the store which reply belongs to a fingerprint; user
/// posts that match a known fingerprint get that reply posted. Any failure
/// tied to a single post poisons that post and the crawl carries on.
pub struct CrawlOrchestrator<A> {
    section: Section,
    client: RateLimitedClient<A>,
    store: Arc<dyn DedupStore>,
    fingerprinter: PostFingerprinter,
    stats: CycleStats,
}

impl<A: GalleryApi> CrawlOrchestrator<A> {
    pub fn new(
        section: Section,
        client: RateLimitedClient<A>,
        store: Arc<dyn DedupStore>,
        fingerprinter: PostFingerprinter,
    ) -> Self {
        Self {
            section,
            client,
            store,
            fingerprinter,
            stats: CycleStats::default(),
        }
    }

    pub fn section(&self) -> Section {
        self.section
    }

    pub fn client(&self) -> &RateLimitedClient<A> {
        &self.client
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Pulls from the scanner until shutdown or a non-recoverable error.
    pub async fn run(&mut self, scanner: &mut FeedScanner) -> Result<(), CoreError> {
        info!("Starting {} crawl", self.section);
        loop {
            let event = match scanner.next_event(&mut self.client).await {
                Ok(Some(event)) => event,
                Ok(None) | Err(CoreError::Cancelled) => break,
                Err(error) => {
                    error.log_error();
                    return Err(error);
                }
            };

            match event {
                ScanEvent::Item(item) => match self.process_item(item).await {
                    Ok(_) => {}
                    Err(CoreError::Cancelled) => break,
                    Err(error) => {
                        error.log_error();
                        return Err(error);
                    }
                },
                ScanEvent::CycleComplete { cycle, pages } => self.report_cycle(cycle, pages).await,
            }
        }

        info!("Stopped {} crawl", self.section);
        Ok(())
    }

    #[instrument(skip(self, item), fields(section = %self.section, post_id = %item.id))]
    pub async fn process_item(&mut self, item: GalleryItem) -> Result<PostOutcome, CoreError> {
        let outcome = self.evaluate(item).await?;
        self.stats.record(&outcome);
        Ok(outcome)
    }

    async fn evaluate(&mut self, item: GalleryItem) -> Result<PostOutcome, CoreError> {
        if let Some(status) = self.store.post_status(&item.id).await? {
            debug!("Skipping {}, already processed ({:?})", item.id, status);
            return Ok(PostOutcome::AlreadySeen);
        }

        let mut post = Post::new(&item);
        let report = match self.fingerprinter.fingerprint(&item, &mut self.client).await {
            Ok(report) => report,
            Err(error) => return self.absorb(&post, error).await,
        };
        post.failures = report.failures;

        let fingerprint = match report.fingerprint {
            Some(fingerprint) => fingerprint,
            None => {
                warn!(
                    "No image of post {} could be hashed ({} failures)",
                    post.id,
                    post.failures.len()
                );
                return self.poison(&post, PoisonReason::NoFingerprint).await;
            }
        };
        post.fingerprint = Some(fingerprint.clone());

        let reply = self.store.reply_for(&fingerprint).await?;
        if reply == Some(StoredReply::Blacklisted) {
            debug!(
                "Found post with blacklisted fingerprint. ID: {}  Fingerprint: {}",
                post.id, fingerprint
            );
            return self.poison(&post, PoisonReason::BlacklistedFingerprint).await;
        }

        match self.section {
            Section::Hot => self.save_top_comment(post, fingerprint).await,
            Section::User => self.reply_if_repost(post, fingerprint, reply).await,
        }
    }

    async fn save_top_comment(
        &mut self,
        mut post: Post,
        fingerprint: Fingerprint,
    ) -> Result<PostOutcome, CoreError> {
        let comments = match self.client.list_comments(&post.id).await {
            Ok(comments) => comments,
            Err(error) => return self.absorb(&post, error).await,
        };

        let top_comment = match comments.into_iter().next() {
            Some(comment) => comment.text,
            None => {
                warn!("Post {} has no comments to remember", post.id);
                return self.poison(&post, PoisonReason::NoComments).await;
            }
        };
        post.top_comment = Some(top_comment.clone());

        debug!("Saving comment {:?} to {}", top_comment, fingerprint);
        let reply_stored = self
            .store
            .record_reply_once(&fingerprint, &top_comment)
            .await?;
        self.store.record_post(&post.id, &fingerprint).await?;

        info!("Recorded {} ({})", post, post.id);
        Ok(PostOutcome::Recorded { reply_stored })
    }

    async fn reply_if_repost(
        &mut self,
        post: Post,
        fingerprint: Fingerprint,
        reply: Option<StoredReply>,
    ) -> Result<PostOutcome, CoreError> {
        // Written before commenting so a crash never leads to a second comment
        self.store.record_post(&post.id, &fingerprint).await?;

        let reply = match reply {
            Some(StoredReply::Reply(reply)) if !reply.is_empty() => reply,
            _ => return Ok(PostOutcome::Unique),
        };

        info!("We found a repost! Posting {:?} to {}", reply, post.id);
        match self.client.post_comment(&post.id, &reply).await {
            Ok(()) => Ok(PostOutcome::RepostCommented { reply }),
            Err(error @ (CoreError::GalleryApi(_) | CoreError::Network(_))) => {
                error!("Could not comment {:?} on {}: {}", reply, post.id, error);
                Ok(PostOutcome::RepostCommentFailed { reply })
            }
            Err(error) => Err(error),
        }
    }

    async fn absorb(&self, post: &Post, error: CoreError) -> Result<PostOutcome, CoreError> {
        if ErrorRecovery::determine_strategy(&error) != RecoveryStrategy::PoisonPost {
            return Err(error);
        }

        match &error {
            CoreError::Fingerprint(FingerprintError::UnknownItemKind { .. }) => {
                error!("Received unknown gallery item {}: {}", post.id, error)
            }
            _ => warn!("Giving up on post {}: {}", post.id, error),
        }
        self.poison(post, PoisonReason::from_error(&error)).await
    }

    async fn poison(&self, post: &Post, reason: PoisonReason) -> Result<PostOutcome, CoreError> {
        self.store.poison_post(&post.id).await?;
        debug!("Marked {} unprocessable: {}", post.id, reason);
        Ok(PostOutcome::Poisoned { reason })
    }

    async fn report_cycle(&mut self, cycle: u64, pages: u32) {
        let stats = std::mem::take(&mut self.stats);
        match self.section {
            Section::Hot => info!("Saved {} new posts to the store", stats.new_posts()),
            Section::User => {
                if stats.new_posts() == 0 {
                    info!("No new posts found in user sub");
                }
                info!(
                    "Scanned {} pages of user sub, found {} new posts, {} reposts",
                    pages,
                    stats.new_posts(),
                    stats.reposts
                );
            }
        }
        debug!(
            "{} cycle {}: {} already seen, {} poisoned, {} comment failures",
            self.section, cycle, stats.already_seen, stats.poisoned, stats.comment_failures
        );

        if let Some(credits) = self.client.credits() {
            debug!(
                "User credits remaining: {}\tApp credits remaining: {}",
                credits.user_remaining, credits.client_remaining
            );
        }
        let usage = self.client.usage().await;
        debug!(
            "{} requests, {} transient failures, {} cooldowns so far",
            usage.total_calls(),
            usage.transient_failures(),
            usage.cooldowns
        );
        match usage.to_json() {
            Ok(json) => debug!("{} client usage: {}", self.section, json),
            Err(error) => {
                error.log_warn();
            }
        }
    }
}
