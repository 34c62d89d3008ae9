use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{prelude::*, stream};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, error, info, warn};

use crate::cache;
use crate::error::{Error, Result};
use crate::provider::{self, Provider};
use crate::region::Zone;
use crate::tile::Tile;
use crate::transform;

/// Default number of concurrent tile downloads. The work is almost
/// entirely network-bound, so the pool is sized well past the core count.
pub const DEFAULT_FETCH_RATE: usize = 128;

const ZERO_DURATION: Duration = Duration::from_secs(0);

/// Validated tile acquisition configuration.
///
/// Construction (see [`crate::Settings::fetch_config`]) performs
/// all configuration-level checks, so a value of this type implies a
/// known provider, a resolved credential and well-formed regions.
#[derive(Debug)]
pub struct FetchConfig {
    /// Zones to acquire, processed in order.
    pub zones: Vec<Zone>,

    pub provider: Provider,

    /// Map style, substituted into the provider URL template.
    pub style: String,

    /// Credential for the provider; empty if the template carries none.
    pub api_key: String,

    /// Replaces the provider's URL template when set. Tests point this
    /// at a local endpoint instead of a real service.
    pub url_template: Option<String>,

    /// Zoom level at or above which tiles are palette-reduced before
    /// saving. `None` disables reduction.
    pub reduce_from: Option<u8>,

    /// Root of the on-disk tile cache.
    pub output_dir: PathBuf,

    /// Maximum number of parallel downloads.
    pub fetch_rate: usize,

    /// Timeout for fetching a single tile; zero disables the timeout.
    pub timeout: Duration,

    /// Skip the network entirely and only report what would be fetched.
    pub dry_run: bool,
}

/// Aggregate outcome of an acquisition run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Summary {
    /// Tiles downloaded and written this run.
    pub fetched: u64,
    /// Tiles already present and valid in the cache.
    pub skipped: u64,
    /// Tiles that failed to download or decode. Never aborts the run;
    /// the next run's cache probe retries them naturally.
    pub failed: u64,
    /// Tiles a dry run would have fetched.
    pub planned: u64,
}

impl Summary {
    pub fn total(&self) -> u64 {
        self.fetched + self.skipped + self.failed + self.planned
    }
}

enum Outcome {
    Fetched,
    Skipped,
    Failed,
    Planned,
}

/// Acquires every tile of every configured zone into the on-disk cache.
///
/// Zones and zoom levels are processed as strictly sequential batches;
/// within a batch, tiles fan out to a bounded worker pool. Per-tile
/// failures are logged and counted, never propagated — an error return
/// means a configuration- or filesystem-level problem detected before
/// any tile work started.
pub async fn acquire(cfg: &FetchConfig) -> Result<Summary> {
    tokio::fs::create_dir_all(&cfg.output_dir)
        .await
        .map_err(|e| Error::OutputDir(cfg.output_dir.clone(), e))?;

    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("tilestash/", env!("CARGO_PKG_VERSION")));
    if cfg.timeout > ZERO_DURATION {
        builder = builder.timeout(cfg.timeout);
    }
    let client = builder.build()?;

    let fetched = AtomicU64::new(0);
    let skipped = AtomicU64::new(0);
    let failed = AtomicU64::new(0);
    let planned = AtomicU64::new(0);

    for zone in &cfg.zones {
        info!(
            "obtaining zone [{}] (zoom {} to {}), {} region(s)",
            zone.name,
            zone.zoom_out,
            zone.zoom_in,
            zone.regions.len()
        );

        for zoom in zone.zoom_levels() {
            let batch: Vec<Tile> = zone
                .regions
                .iter()
                .flat_map(|region| region.tiles(zoom))
                .collect();
            if batch.is_empty() {
                continue;
            }

            let pb = ProgressBar::new(batch.len() as u64);
            pb.set_style(
                ProgressStyle::with_template(
                    "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} ETA: {eta} {msg}",
                )
                .expect("valid progress template")
                .progress_chars("##-"),
            );
            pb.set_message(format!("{} z{}", zone.name, zoom));

            let client = &client;
            let pb = &pb;
            let (fetched, skipped, failed, planned) = (&fetched, &skipped, &failed, &planned);

            stream::iter(batch)
                .for_each_concurrent(cfg.fetch_rate, |tile| async move {
                    let counter = match obtain_tile(client, cfg, tile).await {
                        Outcome::Fetched => fetched,
                        Outcome::Skipped => skipped,
                        Outcome::Failed => failed,
                        Outcome::Planned => planned,
                    };
                    counter.fetch_add(1, Ordering::Relaxed);
                    pb.inc(1);
                })
                .await;

            pb.finish_and_clear();
            debug!("finished batch {} z{}", zone.name, zoom);
        }

        info!("finished zone [{}]", zone.name);
    }

    Ok(Summary {
        fetched: fetched.into_inner(),
        skipped: skipped.into_inner(),
        failed: failed.into_inner(),
        planned: planned.into_inner(),
    })
}

/// Higher zoom means exponentially more tiles, hence the stronger
/// incentive to shrink each one at and above the threshold.
fn should_reduce(reduce_from: Option<u8>, zoom: u8) -> bool {
    reduce_from.is_some_and(|threshold| zoom >= threshold)
}

/// Worker body for a single tile: probe the cache, fetch, transform if
/// the zoom meets the reduce threshold, and persist as PNG.
async fn obtain_tile(client: &reqwest::Client, cfg: &FetchConfig, tile: Tile) -> Outcome {
    let path = cache::tile_path(&cfg.output_dir, cfg.provider, &cfg.style, &tile);

    if cache::is_cached_and_valid(&path) {
        debug!("tile {tile} already cached, skipping");
        return Outcome::Skipped;
    }

    let template = cfg
        .url_template
        .as_deref()
        .unwrap_or_else(|| cfg.provider.url_template());
    let url = match provider::format_url(template, &cfg.style, &cfg.api_key, &tile) {
        Ok(url) => url,
        Err(err) => {
            error!("failed building URL for tile {tile}: {err}");
            return Outcome::Failed;
        }
    };
    let redacted = provider::redact(&url, &cfg.api_key);

    let reducing = should_reduce(cfg.reduce_from, tile.zoom);

    if cfg.dry_run {
        info!("dry run: would fetch {redacted} (reduce: {reducing})");
        return Outcome::Planned;
    }

    if let Some(dir) = path.parent() {
        if let Err(err) = tokio::fs::create_dir_all(dir).await {
            error!("failed creating directory for tile {tile}: {err}");
            return Outcome::Failed;
        }
    }

    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(err) => {
            warn!("failed fetching tile {tile}: {err}");
            return Outcome::Failed;
        }
    };

    let status = response.status();
    if !status.is_success() {
        warn!("failed to download tile {tile}: {status}");
        return Outcome::Failed;
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();

    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("failed reading body for tile {tile}: {err}");
            return Outcome::Failed;
        }
    };

    if !content_type.starts_with("image/") {
        error!("response for tile {tile} is not an image ({content_type:?}), attempting decode anyway");
    }

    let result = if reducing {
        debug!("reducing tile {redacted} -> {}", path.display());
        transform::load(&bytes)
            .map(|img| transform::reduce(&img))
            .and_then(|img| transform::save_png(&img, &path))
    } else if content_type != "image/png" {
        debug!("saving tile as PNG instead ({content_type}) {redacted} -> {}", path.display());
        transform::load(&bytes).and_then(|img| transform::save_png(&img, &path))
    } else {
        debug!("saving unaltered tile {redacted} -> {}", path.display());
        tokio::fs::write(&path, &bytes).await.map_err(Error::from)
    };

    match result {
        Ok(()) => Outcome::Fetched,
        Err(err) => {
            warn!("failed to save tile {tile}: {err}");
            Outcome::Failed
        }
    }
}
