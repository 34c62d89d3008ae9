use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::provider::Provider;
use crate::tile::Tile;

/// On-disk location of a cached tile:
/// `<root>/<provider>/<style>/<zoom>/<x>/<y>.png`.
pub fn tile_path(root: &Path, provider: Provider, style: &str, tile: &Tile) -> PathBuf {
    let mut path = root.join(provider.name());
    path.push(style);
    path.push(tile.zoom.to_string());
    path.push(tile.x.to_string());
    path.push(format!("{}.png", tile.y));
    path
}

/// Checks whether a previously cached tile exists and decodes cleanly.
///
/// A file that exists but cannot be decoded is a leftover from an
/// interrupted run; it is deleted so the caller re-fetches it.
pub fn is_cached_and_valid(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }

    match image::open(path) {
        Ok(_) => true,
        Err(err) => {
            warn!("removing corrupt cached tile {}: {err}", path.display());
            if let Err(err) = fs::remove_file(path) {
                debug!("could not remove {}: {err}", path.display());
            }
            false
        }
    }
}
