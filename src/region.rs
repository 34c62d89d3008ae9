use std::fmt::Debug;
use std::ops::Range;
use std::str::FromStr;

use crate::error::Error;
use crate::tile::{self, Tile};

/// A geographic box given by two latitude/longitude pairs in degrees.
///
/// The corner order does not matter; tile enumeration normalizes it.
/// Latitudes of ±90° are rejected since the Web-Mercator projection is
/// undefined there.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Region {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl Region {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Creates an iterator over every tile the region touches at `zoom`.
    ///
    /// Both corners are projected and the full rectangle between them is
    /// enumerated, so the result is the same regardless of which corner
    /// was passed as "min". A corner that lands exactly on a tile
    /// boundary only touches the neighbouring tile with zero area and
    /// does not widen the range.
    pub fn tiles(&self, zoom: u8) -> impl Iterator<Item = Tile> + Debug {
        let (x_lo, x_hi) = index_range(
            tile::lon_to_x(self.min_lon, zoom),
            tile::lon_to_x(self.max_lon, zoom),
            zoom,
        );
        let (y_lo, y_hi) = index_range(
            tile::lat_to_y(self.min_lat, zoom),
            tile::lat_to_y(self.max_lat, zoom),
            zoom,
        );

        (x_lo..=x_hi)
            .flat_map(move |x| (y_lo..=y_hi).map(move |y| Tile::new(x, y, zoom)))
    }
}

impl FromStr for Region {
    type Err = Error;

    /// Parses the `"minLat,minLon,maxLat,maxLon"` configuration form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || Error::MalformedRegion(s.to_owned());

        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()
            .map_err(|_| malformed())?;

        let [min_lat, min_lon, max_lat, max_lon]: [f64; 4] =
            parts.try_into().map_err(|_| malformed())?;

        for lat in [min_lat, max_lat] {
            if !lat.is_finite() || lat.abs() >= 90.0 {
                return Err(malformed());
            }
        }
        for lon in [min_lon, max_lon] {
            if !lon.is_finite() || lon.abs() > 180.0 {
                return Err(malformed());
            }
        }

        Ok(Self::new(min_lat, min_lon, max_lat, max_lon))
    }
}

/// A named group of regions acquired together over a zoom range.
#[derive(Clone, Debug, PartialEq)]
pub struct Zone {
    pub name: String,
    pub regions: Vec<Region>,
    /// Outermost (least detailed) zoom level, inclusive.
    pub zoom_out: u8,
    /// Innermost (most detailed) zoom level, exclusive.
    pub zoom_in: u8,
}

impl Zone {
    /// The half-open zoom range `[out, in)` this zone covers.
    pub fn zoom_levels(&self) -> Range<u8> {
        self.zoom_out..self.zoom_in
    }
}

fn index_range(a: f64, b: f64, zoom: u8) -> (u32, u32) {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };

    let lo_idx = lo.floor();
    let mut hi_idx = hi.floor();
    if hi.fract() == 0.0 && hi_idx > lo_idx {
        hi_idx -= 1.0;
    }

    (
        tile::clamp_index(lo_idx, zoom),
        tile::clamp_index(hi_idx, zoom),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn parses_region_string() {
        let region: Region = "40.0,-10.0,44.0,0.0".parse().unwrap();
        assert_eq!(region, Region::new(40.0, -10.0, 44.0, 0.0));
    }

    #[test]
    fn rejects_malformed_regions() {
        for s in ["", "1,2,3", "a,b,c,d", "95.0,0.0,40.0,10.0", "1,2,3,4,5"] {
            assert!(s.parse::<Region>().is_err(), "accepted {s:?}");
        }
    }

    #[test]
    fn iberia_fits_the_north_west_quadrant() {
        let region: Region = "40.0,-10.0,44.0,0.0".parse().unwrap();
        let tiles: Vec<Tile> = region.tiles(1).collect();
        assert_eq!(tiles, vec![Tile::new(0, 0, 1)]);
    }

    #[test]
    fn enumeration_is_corner_order_invariant() {
        let a = Region::new(50.811, 6.031, 50.7492, 6.1649);
        let b = Region::new(50.7492, 6.1649, 50.811, 6.031);

        for zoom in [3, 9, 14] {
            let ta: HashSet<Tile> = a.tiles(zoom).collect();
            let tb: HashSet<Tile> = b.tiles(zoom).collect();
            assert_eq!(ta, tb, "differs at z{zoom}");
            assert!(!ta.is_empty());
        }
    }

    #[test]
    fn enumeration_is_restartable() {
        let region = Region::new(50.7492, 6.031, 50.811, 6.1649);
        let first: Vec<Tile> = region.tiles(12).collect();
        let second: Vec<Tile> = region.tiles(12).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn covers_the_full_rectangle() {
        let region = Region::new(50.7492, 6.031, 50.811, 6.1649);
        let tiles: HashSet<Tile> = region.tiles(14).collect();

        let nw = Tile::from_lat_lon(50.811, 6.031, 14);
        let se = Tile::from_lat_lon(50.7492, 6.1649, 14);
        for x in nw.x..=se.x {
            for y in nw.y..=se.y {
                assert!(tiles.contains(&Tile::new(x, y, 14)));
            }
        }
        assert_eq!(
            tiles.len() as u64,
            u64::from(se.x - nw.x + 1) * u64::from(se.y - nw.y + 1)
        );
    }

    #[test]
    fn zone_zoom_range_excludes_the_inner_bound() {
        let zone = Zone {
            name: "test".to_owned(),
            regions: vec![],
            zoom_out: 1,
            zoom_in: 8,
        };
        let levels: Vec<u8> = zone.zoom_levels().collect();
        assert_eq!(levels, vec![1, 2, 3, 4, 5, 6, 7]);
    }
}
