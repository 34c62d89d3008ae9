use std::env;
use std::fmt;
use std::str::FromStr;

use maplit::hashmap;
use strfmt::strfmt;

use crate::error::{Error, Result};
use crate::tile::Tile;

/// Placeholder substituted for the credential in logged URLs.
pub const REDACTED: &str = "[REDACTED]";

/// Environment variable consulted when the provider-specific one is unset.
pub const GENERIC_KEY_ENV: &str = "API_KEY";

/// A remote tile-serving endpoint with a fixed URL layout.
///
/// Each template carries substitution points for `{style}`, `{zoom}`,
/// `{x}`, `{y}` and `{key}`; some providers omit the style or the
/// credential, and the government ArcGIS services order y before x.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Provider {
    Thunderforest,
    Geoapify,
    /// Spanish IGN base map (tms-ign-base.idee.es). No style, no key.
    Cnig,
    Usgs,
    Esri,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::Thunderforest,
        Provider::Geoapify,
        Provider::Cnig,
        Provider::Usgs,
        Provider::Esri,
    ];

    /// The identifier used in configuration files and the cache layout.
    pub fn name(self) -> &'static str {
        match self {
            Provider::Thunderforest => "thunderforest",
            Provider::Geoapify => "geoapify",
            Provider::Cnig => "cnig.es",
            Provider::Usgs => "USGS",
            Provider::Esri => "ESRI",
        }
    }

    pub fn url_template(self) -> &'static str {
        match self {
            Provider::Thunderforest => {
                "https://tile.thunderforest.com/{style}/{zoom}/{x}/{y}.png?apikey={key}"
            }
            Provider::Geoapify => {
                "https://maps.geoapify.com/v1/tile/{style}/{zoom}/{x}/{y}.png?apiKey={key}"
            }
            Provider::Cnig => "https://tms-ign-base.idee.es/1.0.0/IGNBaseTodo/{zoom}/{x}/{y}.jpeg",
            Provider::Usgs => {
                "https://basemap.nationalmap.gov/arcgis/rest/services/{style}/MapServer/tile/{zoom}/{y}/{x}"
            }
            Provider::Esri => {
                "https://services.arcgisonline.com/ArcGIS/rest/services/{style}/MapServer/tile/{zoom}/{x}/{y}"
            }
        }
    }

    /// Whether the URL template references a credential at all.
    pub fn requires_key(self) -> bool {
        self.url_template().contains("{key}")
    }

    /// The provider-specific credential variable, e.g. `THUNDERFOREST_API_KEY`.
    pub fn api_key_env(self) -> String {
        let mut var: String = self
            .name()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        var.push_str("_API_KEY");
        var
    }

    /// Resolves the credential from the environment.
    ///
    /// Checks the provider-specific variable first, then the generic
    /// `API_KEY` fallback. Providers whose template carries no credential
    /// resolve to an empty key without consulting the environment.
    pub fn resolve_key(self) -> Result<String> {
        if !self.requires_key() {
            return Ok(String::new());
        }

        let var = self.api_key_env();
        env::var(&var)
            .or_else(|_| env::var(GENERIC_KEY_ENV))
            .map_err(|_| Error::MissingApiKey(var))
    }

    /// Builds the fetch URL for a tile.
    pub fn tile_url(self, style: &str, key: &str, tile: &Tile) -> Result<String> {
        format_url(self.url_template(), style, key, tile)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownProvider(s.to_owned()))
    }
}

/// Substitutes a tile's coordinates, style and credential into a URL
/// template carrying `{style}`, `{zoom}`, `{x}`, `{y}` and `{key}`
/// placeholders (each optional).
pub(crate) fn format_url(template: &str, style: &str, key: &str, tile: &Tile) -> Result<String> {
    let vars = hashmap! {
        "style".to_owned() => style.to_owned(),
        "zoom".to_owned() => tile.zoom.to_string(),
        "x".to_owned() => tile.x.to_string(),
        "y".to_owned() => tile.y.to_string(),
        "key".to_owned() => key.to_owned(),
    };

    Ok(strfmt(template, &vars)?)
}

/// Replaces the credential in a URL with a fixed placeholder for logging.
pub fn redact(url: &str, key: &str) -> String {
    if key.is_empty() {
        return url.to_owned();
    }
    url.replace(key, REDACTED)
}
