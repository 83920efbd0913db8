//! Coordinate helpers: cache keys, great-circle distance and bounding boxes.

use envwatch_types::{Coordinates, ProviderKind};

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Slack added to box edges so points on the circle survive rounding.
const EDGE_EPSILON_DEG: f64 = 1e-9;

/// Decimal places coordinates are rounded to in cache keys (about 11 m).
pub const CACHE_KEY_PRECISION: i32 = 4;

/// Round a coordinate component to [`CACHE_KEY_PRECISION`] places.
#[must_use]
pub fn round_coordinate(value: f64) -> f64 {
    let factor = 10f64.powi(CACHE_KEY_PRECISION);
    let rounded = (value * factor).round() / factor;
    // Avoid "-0.0000" and "0.0000" producing different keys
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Deterministic cache key for a provider lookup.
///
/// Extra parameters are sorted by name so their order never matters.
///
/// ```
/// use envwatch_core::geo::cache_key;
/// use envwatch_types::{Coordinates, ProviderKind};
///
/// let at = Coordinates::new(47.606_21, -122.332_08)?;
/// assert_eq!(cache_key(ProviderKind::AirQuality, at, &[]), "air_quality:47.6062:-122.3321");
/// assert_eq!(
///     cache_key(ProviderKind::Wildfire, at, &[("radius_km", "50".into())]),
///     "wildfire:47.6062:-122.3321:radius_km=50",
/// );
/// # Ok::<(), envwatch_types::ParseError>(())
/// ```
#[must_use]
pub fn cache_key(kind: ProviderKind, at: Coordinates, params: &[(&str, String)]) -> String {
    let mut key = format!(
        "{}:{:.4}:{:.4}",
        kind,
        round_coordinate(at.latitude),
        round_coordinate(at.longitude)
    );

    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    for (name, value) in sorted {
        key.push_str(&format!(":{}={}", name, value));
    }
    key
}

/// Great-circle distance between two points (haversine).
#[must_use]
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Latitude/longitude box.
///
/// When `west > east` the box crosses the antimeridian and covers
/// `west..=180` plus `-180..=east`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    /// Box enclosing every point within `radius_km` of `center`.
    ///
    /// Only useful for candidate pruning. Corners lie farther than the
    /// radius, so callers still filter with [`haversine_km`].
    #[must_use]
    pub fn around(center: Coordinates, radius_km: f64) -> Self {
        let angular = radius_km.max(0.0) / EARTH_RADIUS_KM;
        let lat_delta = angular.to_degrees() + EDGE_EPSILON_DEG;
        let south = center.latitude - lat_delta;
        let north = center.latitude + lat_delta;

        // A circle reaching a pole spans every longitude
        if north >= 90.0 || south <= -90.0 || angular >= std::f64::consts::FRAC_PI_2 {
            return Self {
                south: south.max(-90.0),
                north: north.min(90.0),
                west: -180.0,
                east: 180.0,
            };
        }

        // Widest longitude offset of the circle, reached off the centre parallel
        let ratio = angular.sin() / center.latitude.to_radians().cos();
        let lon_delta = ratio.min(1.0).asin().to_degrees() + EDGE_EPSILON_DEG;
        if lon_delta >= 180.0 {
            return Self {
                south,
                north,
                west: -180.0,
                east: 180.0,
            };
        }

        Self {
            south,
            north,
            west: wrap_longitude(center.longitude - lon_delta),
            east: wrap_longitude(center.longitude + lon_delta),
        }
    }

    /// Whether the box wraps across the antimeridian.
    #[must_use]
    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }

    /// The box as one or two boxes that never cross the antimeridian, for
    /// upstreams that only accept `west <= east`.
    #[must_use]
    pub fn parts(&self) -> Vec<BoundingBox> {
        if self.crosses_antimeridian() {
            vec![
                BoundingBox { east: 180.0, ..*self },
                BoundingBox { west: -180.0, ..*self },
            ]
        } else {
            vec![*self]
        }
    }

    /// Whether the point lies inside the box (inclusive).
    #[must_use]
    pub fn contains(&self, at: Coordinates) -> bool {
        if !(self.south..=self.north).contains(&at.latitude) {
            return false;
        }
        if self.crosses_antimeridian() {
            at.longitude >= self.west || at.longitude <= self.east
        } else {
            (self.west..=self.east).contains(&at.longitude)
        }
    }
}

/// Bring a longitude back into `-180..=180`.
fn wrap_longitude(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else if lon < -180.0 {
        lon + 360.0
    } else {
        lon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(lat: f64, lon: f64) -> Coordinates {
        Coordinates::new(lat, lon).unwrap()
    }

    #[test]
    fn test_nearby_points_share_cache_key() {
        let a = cache_key(ProviderKind::Weather, at(40.01501, -105.27049), &[]);
        let b = cache_key(ProviderKind::Weather, at(40.01499, -105.27051), &[]);
        assert_eq!(a, b);

        let c = cache_key(ProviderKind::Weather, at(40.0152, -105.2705), &[]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_cache_key_differs_by_kind_and_params() {
        let here = at(10.0, 20.0);
        assert_ne!(
            cache_key(ProviderKind::Weather, here, &[]),
            cache_key(ProviderKind::Pollen, here, &[])
        );
        assert_ne!(
            cache_key(ProviderKind::Weather, here, &[("days", "1".into())]),
            cache_key(ProviderKind::Weather, here, &[("days", "3".into())])
        );
    }

    #[test]
    fn test_cache_key_param_order_is_irrelevant() {
        let here = at(10.0, 20.0);
        let a = cache_key(
            ProviderKind::Wildfire,
            here,
            &[("radius_km", "50".into()), ("days", "1".into())],
        );
        let b = cache_key(
            ProviderKind::Wildfire,
            here,
            &[("days", "1".into()), ("radius_km", "50".into())],
        );
        assert_eq!(a, b);
        assert!(a.ends_with(":days=1:radius_km=50"));
    }

    #[test]
    fn test_negative_zero_normalized() {
        let key = cache_key(ProviderKind::Radon, at(-0.00001, 0.00001), &[]);
        assert_eq!(key, "radon:0.0000:0.0000");
    }

    #[test]
    fn test_haversine_known_distance() {
        // Seattle to Portland, roughly 234 km
        let seattle = at(47.6062, -122.3321);
        let portland = at(45.5152, -122.6784);
        let d = haversine_km(seattle, portland);
        assert!((d - 234.0).abs() < 1.0, "got {d}");
        assert!((haversine_km(portland, seattle) - d).abs() < 1e-9);
        assert_eq!(haversine_km(seattle, seattle), 0.0);
    }

    /// Point `distance_km` from `center` along `bearing_deg` (destination formula).
    fn offset(center: Coordinates, distance_km: f64, bearing_deg: f64) -> Coordinates {
        let d = distance_km / EARTH_RADIUS_KM;
        let b = bearing_deg.to_radians();
        let lat1 = center.latitude.to_radians();
        let lon1 = center.longitude.to_radians();
        let lat2 = (lat1.sin() * d.cos() + lat1.cos() * d.sin() * b.cos()).asin();
        let lon2 = lon1 + (b.sin() * d.sin() * lat1.cos()).atan2(d.cos() - lat1.sin() * lat2.sin());
        at(lat2.to_degrees(), wrap_longitude(lon2.to_degrees()))
    }

    #[test]
    fn test_bounding_box_encloses_radius() {
        let center = at(60.0, 10.0);
        let bbox = BoundingBox::around(center, 50.0);

        for bearing in [0.0, 45.0, 90.0, 135.0, 180.0, 225.0, 270.0, 315.0] {
            let p = offset(center, 49.99, bearing);
            assert!(bbox.contains(p), "bearing {bearing}: {p:?} outside {bbox:?}");
        }

        // Longitude span widens at high latitude
        assert!((bbox.east - bbox.west) > (bbox.north - bbox.south));
    }

    #[test]
    fn test_points_just_inside_radius_north_and_south() {
        let center = at(34.05, -118.25);
        let bbox = BoundingBox::around(center, 50.0);

        for bearing in [0.0, 180.0] {
            let p = offset(center, 0.999 * 50.0, bearing);
            assert!(haversine_km(center, p) < 50.0);
            assert!(bbox.contains(p), "bearing {bearing}: {p:?} outside {bbox:?}");
        }

        // Same latitude offset as a 49.971 km hop due north
        assert!(bbox.contains(at(34.4994, -118.25)));
        assert!(!bbox.contains(at(34.51, -118.25)));
    }

    #[test]
    fn test_bounding_box_wraps_antimeridian() {
        let center = at(-17.0, 179.9);
        let bbox = BoundingBox::around(center, 50.0);
        assert!(bbox.crosses_antimeridian());

        assert!(bbox.contains(offset(center, 40.0, 90.0)));
        assert!(bbox.contains(offset(center, 40.0, 270.0)));
        assert!(bbox.contains(at(-17.0, -179.9)));
        assert!(!bbox.contains(at(-17.0, 0.0)));

        let parts = bbox.parts();
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.west <= p.east));
        assert_eq!(parts[0].east, 180.0);
        assert_eq!(parts[1].west, -180.0);
    }

    #[test]
    fn test_bounding_box_clamped_at_pole() {
        let bbox = BoundingBox::around(at(89.9, 0.0), 100.0);
        assert_eq!(bbox.north, 90.0);
        assert_eq!((bbox.west, bbox.east), (-180.0, 180.0));
        assert!(bbox.contains(at(89.5, 179.0)));
    }
}
