use crate::api::{ApiReply, Download, GalleryApi};
use crate::metrics::{CallOutcome, MetricsCollector, UsageSnapshot};
use reposter_core::{
    Comment, CoreError, Credits, ErrorExt, ErrorRecovery, GalleryItem, GalleryQuery, ImageRef,
    RecoveryStrategy,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Calls are only issued while both credit counters stay above this.
    pub credit_floor: u32,
    /// How long to wait before asking the API for fresh credit counters.
    pub cooldown: Duration,
}

impl RateLimitConfig {
    pub fn imgur() -> Self {
        Self {
            credit_floor: 10,
            cooldown: Duration::from_secs(10 * 60),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::imgur()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub credits: Option<Credits>,
    pub credit_floor: u32,
    pub cooldown_pending: bool,
}

impl RateLimitStatus {
    pub fn can_proceed(&self) -> bool {
        !self.cooldown_pending
            && self
                .credits
                .map_or(false, |credits| credits.above_floor(self.credit_floor))
    }
}

/// Budget-aware wrapper around a [`GalleryApi`].
///
/// Every call first checks the last known credit counters against the floor
/// and sleeps through a cooldown when they are exhausted. Rate-limit and
/// overload responses are absorbed the same way, so callers only ever see
/// a result or a non-transient error. There is no retry cap: credits are
/// replenished upstream on a schedule, and only cancellation ends the wait.
///
/// Methods take `&mut self`; one client serves one caller.
#[derive(Debug)]
pub struct RateLimitedClient<A> {
    api: A,
    config: RateLimitConfig,
    credits: Option<Credits>,
    cooldown_pending: bool,
    metrics: Arc<MetricsCollector>,
    shutdown: CancellationToken,
}

impl<A: GalleryApi> RateLimitedClient<A> {
    pub fn new(api: A, config: RateLimitConfig, shutdown: CancellationToken) -> Self {
        Self {
            api,
            config,
            credits: None,
            cooldown_pending: false,
            metrics: Arc::new(MetricsCollector::new()),
            shutdown,
        }
    }

    pub fn credits(&self) -> Option<Credits> {
        self.credits
    }

    pub fn status(&self) -> RateLimitStatus {
        RateLimitStatus {
            credits: self.credits,
            credit_floor: self.config.credit_floor,
            cooldown_pending: self.cooldown_pending,
        }
    }

    pub async fn usage(&self) -> UsageSnapshot {
        self.metrics.snapshot().await
    }

    pub async fn list_gallery(
        &mut self,
        query: &GalleryQuery,
    ) -> Result<Vec<GalleryItem>, CoreError> {
        loop {
            self.acquire_budget().await?;
            let started = Instant::now();
            let outcome = self.api.list_gallery(query).await;
            if let Some(items) = self.settle("gallery", started, outcome).await? {
                return Ok(items);
            }
        }
    }

    pub async fn list_album_images(&mut self, album_id: &str) -> Result<Vec<ImageRef>, CoreError> {
        loop {
            self.acquire_budget().await?;
            let started = Instant::now();
            let outcome = self.api.list_album_images(album_id).await;
            if let Some(images) = self.settle("album_images", started, outcome).await? {
                return Ok(images);
            }
        }
    }

    pub async fn list_comments(&mut self, post_id: &str) -> Result<Vec<Comment>, CoreError> {
        loop {
            self.acquire_budget().await?;
            let started = Instant::now();
            let outcome = self.api.list_comments(post_id).await;
            if let Some(comments) = self.settle("comments", started, outcome).await? {
                return Ok(comments);
            }
        }
    }

    pub async fn post_comment(&mut self, post_id: &str, text: &str) -> Result<(), CoreError> {
        loop {
            self.acquire_budget().await?;
            let started = Instant::now();
            let outcome = self.api.post_comment(post_id, text).await;
            if self.settle("post_comment", started, outcome).await?.is_some() {
                return Ok(());
            }
        }
    }

    /// Image downloads spend no API credits but still wait out a cooldown.
    pub async fn download(&mut self, url: &str) -> Result<Download, CoreError> {
        loop {
            self.acquire_budget().await?;
            let started = Instant::now();
            let outcome = self
                .api
                .download(url)
                .await
                .map(|download| ApiReply::new(download, None));
            if let Some(download) = self.settle("download", started, outcome).await? {
                return Ok(download);
            }
        }
    }

    /// Asks the credits endpoint directly. Never gated by the budget check.
    pub async fn refresh_credits(&mut self) -> Result<Option<Credits>, CoreError> {
        match self.api.get_credits().await {
            Ok(credits) => {
                debug!(
                    "User credits remaining: {}\tApp credits remaining: {}",
                    credits.user_remaining, credits.client_remaining
                );
                self.metrics.record_credits(&credits).await;
                self.credits = Some(credits);
                Ok(Some(credits))
            }
            Err(error) if error.is_transient() => {
                warn!("Could not read credits, cooling down: {}", error);
                self.cooldown_pending = true;
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    async fn acquire_budget(&mut self) -> Result<(), CoreError> {
        loop {
            if self.shutdown.is_cancelled() {
                return Err(CoreError::Cancelled);
            }

            if !self.cooldown_pending {
                match self.credits {
                    Some(credits) if credits.above_floor(self.config.credit_floor) => {
                        return Ok(());
                    }
                    Some(credits) => {
                        info!(
                            "Credits below floor of {} (user: {}, app: {})",
                            self.config.credit_floor,
                            credits.user_remaining,
                            credits.client_remaining
                        );
                        self.cooldown_pending = true;
                    }
                    None => {
                        // Nothing known yet; ask without sleeping first
                        self.refresh_credits().await?;
                        continue;
                    }
                }
            }

            self.cool_down().await?;
        }
    }

    async fn cool_down(&mut self) -> Result<(), CoreError> {
        let cooldown = self.config.cooldown;
        info!("Sleeping for {:?} before re-checking credits", cooldown);
        self.metrics.record_cooldown(cooldown).await;

        tokio::select! {
            _ = self.shutdown.cancelled() => return Err(CoreError::Cancelled),
            _ = sleep(cooldown) => {}
        }

        info!("Checking credits");
        self.cooldown_pending = false;
        self.refresh_credits().await?;
        Ok(())
    }

    async fn settle<T>(
        &mut self,
        endpoint: &str,
        started: Instant,
        outcome: Result<ApiReply<T>, CoreError>,
    ) -> Result<Option<T>, CoreError> {
        let response_time = started.elapsed();
        match outcome {
            Ok(reply) => {
                if let Some(credits) = reply.credits {
                    self.metrics.record_credits(&credits).await;
                    self.credits = Some(credits);
                }
                self.metrics
                    .record_call(endpoint, response_time, CallOutcome::Succeeded)
                    .await;
                Ok(Some(reply.data))
            }
            Err(error)
                if ErrorRecovery::determine_strategy(&error) == RecoveryStrategy::Cooldown =>
            {
                match self.credits {
                    Some(credits) => warn!(
                        "Transient failure on {}: {}\tUser credits remaining: {}\tApp credits remaining: {}",
                        endpoint, error, credits.user_remaining, credits.client_remaining
                    ),
                    None => warn!("Transient failure on {}: {}", endpoint, error),
                }
                self.metrics
                    .record_call(endpoint, response_time, CallOutcome::Transient)
                    .await;
                self.cooldown_pending = true;
                Ok(None)
            }
            Err(error) => {
                debug!("Non-transient failure on {}: {}", endpoint, error);
                self.metrics
                    .record_call(endpoint, response_time, CallOutcome::Failed)
                    .await;
                Err(error)
            }
        }
    }
}
