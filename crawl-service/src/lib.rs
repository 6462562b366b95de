pub mod orchestrator;
pub mod post;
pub mod scanner;

pub use orchestrator::{CrawlOrchestrator, CycleStats, PoisonReason, PostOutcome};
pub use post::Post;
pub use scanner::{FeedScanner, ScanEvent};

use imgur_client::GalleryApi;
use reposter_core::{CoreError, Section};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Supervises one crawl task per gallery section.
///
/// All sections share one cancellation token; stopping the service lets
/// each task finish the item it is on and return.
#[derive(Debug, Default)]
pub struct CrawlService {
    shutdown: CancellationToken,
    tasks: Vec<(Section, JoinHandle<Result<(), CoreError>>)>,
}

impl CrawlService {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            tasks: Vec::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn spawn_section<A>(
        &mut self,
        mut orchestrator: CrawlOrchestrator<A>,
        mut scanner: FeedScanner,
    ) where
        A: GalleryApi + 'static,
    {
        let section = orchestrator.section();
        info!("Spawning {} section crawler", section);
        let handle = tokio::spawn(async move { orchestrator.run(&mut scanner).await });
        self.tasks.push((section, handle));
    }

    pub fn stop(&self) {
        info!("Stopping crawl service");
        self.shutdown.cancel();
    }

    /// Waits for every section and returns the first failure, if any.
    pub async fn wait(self) -> Result<(), CoreError> {
        let mut first_error = None;
        for (section, handle) in self.tasks {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_error) => Err(CoreError::Internal {
                    message: format!("{} crawler task failed: {}", section, join_error),
                }),
            };

            match result {
                Ok(()) => info!("{} section finished", section),
                Err(error) => {
                    error!("{} section stopped: {}", section, error);
                    first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
