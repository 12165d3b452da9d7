//! Bulk backfill of comic metadata and images.
//!
//! Walks every comic number up to the newest one and fetches whatever is not
//! cached yet. Present entries are only checked, never refetched, so a
//! second run with nothing new makes no network requests.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{CacheError, ComicCache, Stat, ViewRefresher};

/// Consecutive network failures after which a run gives up.
const MAX_CONSECUTIVE_OFFLINE: usize = 10;

/// Outcome of one backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Entries fetched during this run.
    pub fetched: usize,
    /// Entries already present, or permanently missing.
    pub skipped: usize,
    /// Entries that could not be fetched.
    pub failed: usize,
    /// Whether the run stopped early on request.
    pub cancelled: bool,
    /// Present entries at the end of the run. Counted during the walk when
    /// it completes, recounted from disk when it stops early.
    pub stat: Stat,
}

#[derive(Clone, Copy)]
enum Kind {
    Metadata,
    Images,
}

impl Kind {
    fn name(self) -> &'static str {
        match self {
            Kind::Metadata => "metadata",
            Kind::Images => "images",
        }
    }
}

/// Background downloader for everything not cached yet.
pub struct Backfill {
    cache: Arc<ComicCache>,
    refresher: Arc<dyn ViewRefresher>,
    cancel: Option<watch::Receiver<bool>>,
}

impl Backfill {
    pub fn new(cache: Arc<ComicCache>, refresher: Arc<dyn ViewRefresher>) -> Self {
        Self {
            cache,
            refresher,
            cancel: None,
        }
    }

    /// Stop between comics once `cancel` turns `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Fetch metadata for every comic not yet cached.
    pub async fn metadata(&self) -> BackfillReport {
        self.run(Kind::Metadata).await
    }

    /// Download the image of every comic not yet downloaded.
    pub async fn images(&self) -> BackfillReport {
        self.run(Kind::Images).await
    }

    async fn run(&self, kind: Kind) -> BackfillReport {
        let newest = self.cache.newest_comic_info().await;
        if let Some(e) = &newest.error {
            warn!(error = %e, kind = kind.name(), "newest comic unknown, backfilling what is cached");
        }
        let bound = newest.comic.number;
        let every = self.cache.config().backfill_progress_every.max(1);

        info!(kind = kind.name(), newest = bound, "backfill started");

        let mut report = BackfillReport::default();
        let mut attempted = 0usize;
        let mut offline_streak = 0usize;
        let mut stopped_early = false;

        for number in 1..=bound {
            if self.is_cancelled() {
                info!(kind = kind.name(), number, "backfill cancelled");
                report.cancelled = true;
                stopped_early = true;
                break;
            }

            if self.cache.config().is_missing(number) {
                report.skipped += 1;
                continue;
            }

            if self.is_present(kind, number) {
                report.skipped += 1;
                report.stat.record(number);
                continue;
            }

            match self.fetch(kind, number).await {
                Ok(()) => {
                    report.fetched += 1;
                    report.stat.record(number);
                    offline_streak = 0;
                }
                Err(e) => {
                    debug!(number, kind = kind.name(), error = %e, "backfill fetch failed");
                    report.failed += 1;
                    if e.is_offline() {
                        offline_streak += 1;
                    }
                }
            }

            attempted += 1;
            if attempted % every == 0 {
                self.refresh(kind);
            }

            if offline_streak >= MAX_CONSECUTIVE_OFFLINE {
                warn!(kind = kind.name(), number, "comic service unreachable, stopping backfill");
                stopped_early = true;
                break;
            }
        }

        // The walk only counted the numbers it reached
        let exact = !stopped_early
            || match self.stat(kind) {
                Ok(stat) => {
                    report.stat = stat;
                    true
                }
                Err(e) => {
                    warn!(kind = kind.name(), error = %e, "failed to recount after backfill");
                    false
                }
            };
        if exact {
            self.refresh_with(kind, report.stat);
        } else {
            self.refresh(kind);
        }

        info!(
            kind = kind.name(),
            fetched = report.fetched,
            skipped = report.skipped,
            failed = report.failed,
            cancelled = report.cancelled,
            "backfill finished"
        );

        report
    }

    fn is_present(&self, kind: Kind, number: i64) -> bool {
        match kind {
            Kind::Metadata => self.cache.has_comic_info(number),
            Kind::Images => self.cache.has_comic_image(number),
        }
    }

    async fn fetch(&self, kind: Kind, number: i64) -> Result<(), CacheError> {
        match kind {
            Kind::Metadata => match self.cache.comic_info(number).await.error {
                None => Ok(()),
                // Stored even though indexing failed
                Some(CacheError::Index { .. }) => Ok(()),
                Some(e) => Err(e),
            },
            Kind::Images => self.cache.download_comic_image(number).await,
        }
    }

    fn stat(&self, kind: Kind) -> Result<Stat, CacheError> {
        match kind {
            Kind::Metadata => self.cache.stat_metadata(),
            Kind::Images => self.cache.stat_images(),
        }
    }

    fn refresh_with(&self, kind: Kind, stat: Stat) {
        match kind {
            Kind::Metadata => self.refresher.refresh_metadata_with(stat),
            Kind::Images => self.refresher.refresh_images_with(stat),
        }
    }

    fn refresh(&self, kind: Kind) {
        match kind {
            Kind::Metadata => self.refresher.refresh_metadata(),
            Kind::Images => self.refresher.refresh_images(),
        }
    }
}
