use std::f64::consts::PI;

/// A Web-Mercator slippy-map tile index.
/// ref: https://wiki.openstreetmap.org/wiki/Slippy_map_tilenames
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub zoom: u8,
}

impl Tile {
    pub fn new(x: u32, y: u32, zoom: u8) -> Self {
        debug_assert!(zoom < 32);
        debug_assert!((x as u64) < 1u64 << zoom);
        debug_assert!((y as u64) < 1u64 << zoom);

        Self { x, y, zoom }
    }

    /// The tile containing the given coordinates (in degrees) at `zoom`.
    ///
    /// Latitudes of exactly ±90° hit the singularity of the projection
    /// and are undefined; callers must avoid them.
    pub fn from_lat_lon(lat: f64, lon: f64, zoom: u8) -> Self {
        Self {
            x: tile_x(lon, zoom),
            y: tile_y(lat, zoom),
            zoom,
        }
    }
}

impl std::fmt::Display for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Tile column containing the given longitude (degrees).
pub fn tile_x(lon: f64, zoom: u8) -> u32 {
    clamp_index(lon_to_x(lon, zoom), zoom)
}

/// Tile row containing the given latitude (degrees).
pub fn tile_y(lat: f64, zoom: u8) -> u32 {
    clamp_index(lat_to_y(lat, zoom), zoom)
}

/// Fractional column coordinate, in `[0, 2^zoom]` for longitudes in [-180, 180].
pub(crate) fn lon_to_x(lon: f64, zoom: u8) -> f64 {
    let n = (1u64 << zoom) as f64;
    (lon + 180.0) / 360.0 * n
}

/// Fractional row coordinate. Unbounded towards the poles.
pub(crate) fn lat_to_y(lat: f64, zoom: u8) -> f64 {
    let n = (1u64 << zoom) as f64;
    let lat_rad = lat.to_radians();

    (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n
}

pub(crate) fn clamp_index(value: f64, zoom: u8) -> u32 {
    let max = (1u64 << zoom) - 1;
    (value.floor().max(0.0) as u64).min(max) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_index() {
        let tile = Tile::from_lat_lon(50.7929, 6.0402, 18);
        assert_eq!((tile.x, tile.y), (135470, 87999));
    }

    #[test]
    fn indices_stay_in_grid() {
        for &zoom in &[0u8, 1, 4, 11, 18] {
            let n = 1u64 << zoom;
            for &lat in &[-89.9, -85.0511, -45.0, 0.0, 45.0, 85.0511, 89.9] {
                for &lon in &[-180.0, -90.0, 0.0, 90.0, 180.0] {
                    let tile = Tile::from_lat_lon(lat, lon, zoom);
                    assert!((tile.x as u64) < n, "x out of range at z{zoom}");
                    assert!((tile.y as u64) < n, "y out of range at z{zoom}");
                }
            }
        }
    }

    #[test]
    fn zoom_zero_is_a_single_tile() {
        let tile = Tile::from_lat_lon(40.0, -10.0, 0);
        assert_eq!(tile, Tile::new(0, 0, 0));
    }
}
