use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::fetch::FetchConfig;
use crate::provider::Provider;
use crate::region::{Region, Zone};
use crate::store::Generation;

const DEFAULT_PROVIDER: &str = "thunderforest";
const DEFAULT_STYLE: &str = "atlas";
const DEFAULT_REDUCE: u8 = 12;
const DEFAULT_ZOOM_IN: u8 = 8;
const DEFAULT_ZOOM_OUT: u8 = 1;

/// Deepest zoom level accepted from configuration. No provider serves
/// anything beyond it, and the tile index math requires zoom < 32.
const MAX_ZOOM: u8 = 22;

/// The YAML configuration file: zones to acquire, the map source, and
/// optionally the tile store used for ingestion.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub zones: BTreeMap<String, ZoneSection>,
    #[serde(default)]
    pub map: MapSection,
    pub database: Option<DatabaseSection>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ZoneSection {
    /// Comma-separated `minLat,minLon,maxLat,maxLon` strings.
    pub regions: Vec<String>,
    #[serde(default)]
    pub zoom: ZoomSection,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct ZoomSection {
    /// Innermost zoom bound, exclusive.
    #[serde(rename = "in", default = "default_zoom_in")]
    pub zoom_in: u8,
    /// Outermost zoom bound, inclusive.
    #[serde(rename = "out", default = "default_zoom_out")]
    pub zoom_out: u8,
}

impl Default for ZoomSection {
    fn default() -> Self {
        Self {
            zoom_in: DEFAULT_ZOOM_IN,
            zoom_out: DEFAULT_ZOOM_OUT,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct MapSection {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_style")]
    pub style: String,
    /// Zoom threshold at or above which tiles are palette-reduced.
    /// Values outside 1..=16 disable reduction.
    #[serde(default = "default_reduce")]
    pub reduce: u8,
}

impl Default for MapSection {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_owned(),
            style: DEFAULT_STYLE.to_owned(),
            reduce: DEFAULT_REDUCE,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseSection {
    /// SQLite store file. One file per style for generation B.
    pub filename: PathBuf,
    /// Root of the downloaded tile tree to ingest.
    pub flat_files: PathBuf,
    #[serde(default = "default_generation")]
    pub generation: Generation,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| Error::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            serde_yaml_ng::from_str(&text).map_err(|source| Error::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("loaded {} zone(s) from {}", settings.zones.len(), path.display());
        Ok(settings)
    }

    /// Validates the settings into a ready-to-run [`FetchConfig`].
    ///
    /// All configuration-level failures surface here, before any network
    /// activity: unknown provider, missing credential (resolved from the
    /// environment) and malformed region strings.
    pub fn fetch_config(
        &self,
        output_dir: PathBuf,
        fetch_rate: usize,
        timeout: Duration,
        dry_run: bool,
    ) -> Result<FetchConfig> {
        let provider = Provider::from_str(&self.map.provider)?;
        let api_key = provider.resolve_key()?;

        let mut zones = Vec::with_capacity(self.zones.len());
        for (name, section) in &self.zones {
            // The inner bound is exclusive, so zoom_in may sit one past
            // the deepest level actually fetched.
            if section.zoom.zoom_in > MAX_ZOOM + 1 || section.zoom.zoom_out > MAX_ZOOM {
                return Err(Error::InvalidConfig(format!(
                    "zone '{name}': zoom bounds {}..{} go beyond level {MAX_ZOOM}",
                    section.zoom.zoom_out, section.zoom.zoom_in
                )));
            }

            let regions = section
                .regions
                .iter()
                .map(|s| s.parse::<Region>())
                .collect::<Result<Vec<Region>>>()?;

            zones.push(Zone {
                name: name.clone(),
                regions,
                zoom_out: section.zoom.zoom_out,
                zoom_in: section.zoom.zoom_in,
            });
        }

        Ok(FetchConfig {
            zones,
            provider,
            style: self.map.style.clone(),
            api_key,
            url_template: None,
            reduce_from: reduce_threshold(self.map.reduce),
            output_dir,
            fetch_rate,
            timeout,
            dry_run,
        })
    }
}

/// Mirroring jobs, from their own YAML file.
#[derive(Clone, Debug, Deserialize)]
pub struct SyncSettings {
    pub sync: Vec<SyncUnit>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SyncUnit {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl SyncSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| Error::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml_ng::from_str(&text).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Expands a leading `~/` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

fn reduce_threshold(reduce: u8) -> Option<u8> {
    (1..=16).contains(&reduce).then_some(reduce)
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_owned()
}

fn default_style() -> String {
    DEFAULT_STYLE.to_owned()
}

fn default_reduce() -> u8 {
    DEFAULT_REDUCE
}

fn default_zoom_in() -> u8 {
    DEFAULT_ZOOM_IN
}

fn default_zoom_out() -> u8 {
    DEFAULT_ZOOM_OUT
}

fn default_generation() -> Generation {
    Generation::B
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = "
zones:
  iberia:
    regions:
      - \"40.0,-10.0,44.0,0.0\"
      - \"36.0,-9.5,40.0,-6.0\"
    zoom:
      out: 2
      in: 9
map:
  provider: cnig.es
  style: atlas
  reduce: 10
database:
  filename: /tmp/tiles.db
  flat_files: /tmp/maps
  generation: a
";

    fn parse(yaml: &str) -> Settings {
        serde_yaml_ng::from_str(yaml).unwrap()
    }

    #[test]
    fn parses_a_full_config() {
        let settings = parse(CONFIG);

        let iberia = &settings.zones["iberia"];
        assert_eq!(iberia.regions.len(), 2);
        assert_eq!(iberia.zoom.zoom_out, 2);
        assert_eq!(iberia.zoom.zoom_in, 9);
        assert_eq!(settings.map.provider, "cnig.es");

        let database = settings.database.unwrap();
        assert_eq!(database.generation, Generation::A);
    }

    #[test]
    fn missing_sections_get_defaults() {
        let settings = parse("zones:\n  home:\n    regions: [\"1.0,2.0,3.0,4.0\"]\n");

        assert_eq!(settings.map.provider, DEFAULT_PROVIDER);
        assert_eq!(settings.map.style, DEFAULT_STYLE);
        assert_eq!(settings.map.reduce, DEFAULT_REDUCE);
        let zoom = settings.zones["home"].zoom;
        assert_eq!((zoom.zoom_out, zoom.zoom_in), (DEFAULT_ZOOM_OUT, DEFAULT_ZOOM_IN));
        assert!(settings.database.is_none());
    }

    #[test]
    fn builds_a_fetch_config() {
        let settings = parse(CONFIG);
        let cfg = settings
            .fetch_config(PathBuf::from("/tmp/out"), 16, Duration::from_secs(5), true)
            .unwrap();

        assert_eq!(cfg.provider, Provider::Cnig);
        assert_eq!(cfg.api_key, "");
        assert_eq!(cfg.reduce_from, Some(10));
        assert_eq!(cfg.zones.len(), 1);
        assert_eq!(cfg.zones[0].regions.len(), 2);
        assert_eq!(cfg.zones[0].zoom_levels().len(), 7);
    }

    #[test]
    fn unknown_provider_fails_before_any_work() {
        let settings = parse("map:\n  provider: nope\n");
        let err = settings
            .fetch_config(PathBuf::from("/tmp/out"), 1, Duration::ZERO, true)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownProvider(_)));
    }

    #[test]
    fn malformed_region_fails_before_any_work() {
        let settings = parse("zones:\n  bad:\n    regions: [\"1.0,2.0\"]\nmap:\n  provider: cnig.es\n");
        let err = settings
            .fetch_config(PathBuf::from("/tmp/out"), 1, Duration::ZERO, true)
            .unwrap_err();
        assert!(matches!(err, Error::MalformedRegion(_)));
    }

    #[test]
    fn excessive_zoom_bounds_are_rejected() {
        // Zoom 32 and up would overflow the tile index; well before
        // that, no provider serves anything.
        for zoom in ["{out: 39, in: 40}", "{out: 64, in: 65}", "{out: 1, in: 30}"] {
            let settings = parse(&format!(
                "zones:\n  deep:\n    regions: [\"1.0,2.0,3.0,4.0\"]\n    zoom: {zoom}\nmap:\n  provider: cnig.es\n"
            ));
            let err = settings
                .fetch_config(PathBuf::from("/tmp/out"), 1, Duration::ZERO, true)
                .unwrap_err();
            assert!(matches!(err, Error::InvalidConfig(_)), "accepted {zoom}");
        }

        // The bound is exclusive, so an inner bound of 23 still only
        // reaches level 22.
        let settings = parse(
            "zones:\n  deep:\n    regions: [\"1.0,2.0,3.0,4.0\"]\n    zoom: {out: 1, in: 23}\nmap:\n  provider: cnig.es\n",
        );
        assert!(settings
            .fetch_config(PathBuf::from("/tmp/out"), 1, Duration::ZERO, true)
            .is_ok());
    }

    #[test]
    fn out_of_range_reduce_disables_reduction() {
        assert_eq!(reduce_threshold(0), None);
        assert_eq!(reduce_threshold(17), None);
        assert_eq!(reduce_threshold(1), Some(1));
        assert_eq!(reduce_threshold(16), Some(16));
    }
}
