//! Fetch map raster tiles for configured geographic zones, cache them on
//! disk, optionally palette-reduce them, and ingest the result into a
//! SQLite tile store for offline use.
//!
//! **Use with absolute caution.** Bulk-downloading tiles can hog down a
//! tile provider easily and burn through your API quota. Tiles that are
//! already cached are never fetched again; use `--dry-run` to check what
//! a configuration would download.
//!
//! # CLI Example
//!
//! ```bash
//! THUNDERFOREST_API_KEY=... tilestash fetch \
//!   --config etc/config.yaml \
//!   --output ~/maps \
//!   --rate 64
//! ```
//!
//! # Library Example
//! ```no_run
//! use tilestash::{acquire, FetchConfig, Provider, Region, Zone};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = FetchConfig {
//!     zones: vec![Zone {
//!         name: "aachen".to_owned(),
//!         regions: vec!["50.7492,6.031,50.811,6.1649".parse::<Region>().unwrap()],
//!         zoom_out: 1,
//!         zoom_in: 11,
//!     }],
//!     provider: Provider::Cnig,
//!     style: "atlas".to_owned(),
//!     api_key: String::new(),
//!     url_template: None,
//!     reduce_from: Some(12),
//!     output_dir: "./tiles".into(),
//!     fetch_rate: 64,
//!     timeout: Duration::from_secs(10),
//!     dry_run: false,
//! };
//!
//! let summary = acquire(&config).await.expect("failed fetching tiles");
//! println!("fetched {}, skipped {}", summary.fetched, summary.skipped);
//! # }
//! ```

mod cache;
mod config;
mod error;
mod fetch;
mod provider;
mod region;
mod store;
mod sync;
mod tile;
mod transform;

pub use cache::tile_path;
pub use config::{expand_home, Settings, SyncSettings};
pub use error::{Error, Result};
pub use fetch::{acquire, FetchConfig, Summary, DEFAULT_FETCH_RATE};
pub use provider::{redact, Provider, REDACTED};
pub use region::{Region, Zone};
pub use store::{Generation, IngestReport, TileStore};
pub use sync::{FolderSync, SyncReport};
pub use tile::{tile_x, tile_y, Tile};
pub use transform::{load, reduce, save_png};
