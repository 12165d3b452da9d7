//! Subcommand handlers.

use std::sync::Arc;

use comic_cache::{Backfill, CacheConfig, ComicCache, Lookup, Stat, ViewRefresher};
use comic_client::{ClientConfig, ComicClient};
use miette::Result;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{Commands, Settings};

/// Logs backfill progress in place of a window that would redraw.
struct ProgressLog {
    cache: Arc<ComicCache>,
}

impl ViewRefresher for ProgressLog {
    fn refresh_metadata(&self) {
        match self.cache.stat_metadata() {
            Ok(stat) => info!(cached = stat.cached, latest = stat.latest, "metadata progress"),
            Err(e) => warn!(error = %e, "failed to count cached metadata"),
        }
    }

    fn refresh_metadata_with(&self, stat: Stat) {
        info!(cached = stat.cached, latest = stat.latest, "metadata backfill done");
    }

    fn refresh_images(&self) {
        match self.cache.stat_images() {
            Ok(stat) => info!(cached = stat.cached, latest = stat.latest, "image progress"),
            Err(e) => warn!(error = %e, "failed to count cached images"),
        }
    }

    fn refresh_images_with(&self, stat: Stat) {
        info!(cached = stat.cached, latest = stat.latest, "image backfill done");
    }
}

fn open(settings: Settings, progress_every: Option<usize>) -> Result<Arc<ComicCache>> {
    let client = ComicClient::new(ClientConfig {
        base_url: settings.service_url,
        request_timeout_secs: settings.request_timeout,
        max_retries: settings.max_retries,
        ..ClientConfig::default()
    })
    .map_err(|e| miette::miette!("failed to create comic client: {}", e))?;

    let mut config = match settings.cache_dir {
        Some(dir) => CacheConfig::new(dir),
        None => CacheConfig::default(),
    };
    config.missing_comics = settings.missing_comics;
    if let Some(every) = progress_every {
        config.backfill_progress_every = every;
    }

    ComicCache::builder(config, Arc::new(client))
        .open()
        .map_err(|e| miette::miette!("failed to open comic cache: {}", e))
}

/// Run one subcommand against a freshly opened cache, then close it.
pub async fn run(settings: Settings, command: Commands) -> Result<()> {
    let progress_every = match &command {
        Commands::Backfill { progress_every, .. } => Some(*progress_every),
        _ => None,
    };
    let cache = open(settings, progress_every)?;

    let result = dispatch(&cache, command).await;

    // Close even on failure so the version file is written
    cache
        .close()
        .await
        .map_err(|e| miette::miette!("failed to close comic cache: {}", e))?;

    result
}

async fn dispatch(cache: &Arc<ComicCache>, command: Commands) -> Result<()> {
    match command {
        Commands::Info { number } => {
            print_lookup(cache.comic_info(number).await);
        }
        Commands::Newest { refresh } => {
            let lookup = if refresh {
                cache.newest_comic_info_force_refresh().await
            } else {
                cache.newest_comic_info().await
            };
            print_lookup(lookup);
        }
        Commands::Download { number } => {
            cache
                .download_comic_image(number)
                .await
                .map_err(|e| miette::miette!("failed to download comic {}: {}", number, e))?;
            println!("{}", cache.comic_image_path(number).display());
        }
        Commands::Path { number } => {
            let path = cache.comic_image_path(number);
            if !cache.has_comic_image(number) {
                warn!(number, "image not downloaded yet");
            }
            println!("{}", path.display());
        }
        Commands::Stat => {
            let metadata = cache
                .stat_metadata()
                .map_err(|e| miette::miette!("failed to count cached metadata: {}", e))?;
            let images = cache
                .stat_images()
                .map_err(|e| miette::miette!("failed to count cached images: {}", e))?;
            println!("cache:    {}", cache.config().cache_dir.display());
            println!("metadata: {} cached, latest #{}", metadata.cached, metadata.latest);
            println!("images:   {} cached, latest #{}", images.cached, images.latest);
        }
        Commands::Backfill { images, .. } => backfill(cache, images).await?,
    }

    Ok(())
}

async fn backfill(cache: &Arc<ComicCache>, images: bool) -> Result<()> {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping backfill");
            let _ = cancel_tx.send(true);
        }
    });

    let refresher = Arc::new(ProgressLog {
        cache: Arc::clone(cache),
    });
    let backfill = Backfill::new(Arc::clone(cache), refresher).with_cancel(cancel_rx);
    let report = if images {
        backfill.images().await
    } else {
        backfill.metadata().await
    };
    ctrl_c.abort();

    println!(
        "fetched {}, skipped {}, failed {}{}",
        report.fetched,
        report.skipped,
        report.failed,
        if report.cancelled { " (cancelled)" } else { "" }
    );
    println!(
        "{} cached, latest #{}",
        report.stat.cached, report.stat.latest
    );
    Ok(())
}

fn print_lookup(lookup: Lookup) {
    let comic = &lookup.comic;
    println!("#{} {}", comic.number, comic.safe_title);
    let date = comic.formatted_date();
    if !date.is_empty() {
        println!("date:  {}", date);
    }
    if comic.has_image() {
        println!("image: {}", comic.image_url);
    }
    if !comic.alt.is_empty() {
        println!("alt:   {}", comic.alt);
    }
    if let Some(e) = &lookup.error {
        if lookup.is_offline() {
            println!("(offline: {})", e);
        } else {
            println!("(error: {})", e);
        }
    }
}
