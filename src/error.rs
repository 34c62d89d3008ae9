use std::path::PathBuf;

/// Errors produced by tile acquisition, caching and storage.
///
/// Configuration problems are fatal and surface before any network
/// activity. Per-tile fetch and decode failures are logged and counted
/// inside the orchestrator and never reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown tile provider '{0}'")]
    UnknownProvider(String),

    #[error("no API key found; set {0} or the generic API_KEY variable")]
    MissingApiKey(String),

    #[error("malformed region '{0}', expected 'minLat,minLon,maxLat,maxLon'")]
    MalformedRegion(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read configuration file {path:?}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path:?}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("output directory {0:?} is unusable")]
    OutputDir(PathBuf, #[source] std::io::Error),

    #[error("failed formatting tile URL")]
    UrlFormat(#[from] strfmt::FmtError),

    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    #[error("tile image could not be decoded")]
    Decode(#[from] image::ImageError),

    #[error("tile store error")]
    Store(#[from] rusqlite::Error),

    #[error("settings are not supported by a generation A store")]
    SettingsUnsupported,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
