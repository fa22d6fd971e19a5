//! Distance strategies used for edge lengths and costs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::expr::EdgeDistances;
use crate::graph::{Coord, Crs};

/// Mean Earth radius in metres, used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// How an edge's base distance is measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceStrategy {
    #[default]
    Euclidean,
    Manhattan,
    Geodesic,
    /// Costs come from a user expression; structure uses euclidean geometry.
    Advanced,
}

impl DistanceStrategy {
    /// Measure the distance between two coordinates under this strategy.
    ///
    /// Geodesic requires a geographic CRS. Advanced falls back to euclidean
    /// here because its real cost is an expression evaluated per edge.
    pub fn measure(&self, from: &Coord, to: &Coord, crs: &Crs) -> Result<f64> {
        let value = match self {
            Self::Euclidean | Self::Advanced => from.euclidean_to(to),
            Self::Manhattan => from.manhattan_to(to),
            Self::Geodesic => {
                if !crs.geographic {
                    return Err(Error::InvalidCrs {
                        authid: crs.authid.clone(),
                    });
                }
                haversine(from, to)
            }
        };
        check_domain(value)
    }
}

impl fmt::Display for DistanceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Euclidean => "euclidean",
            Self::Manhattan => "manhattan",
            Self::Geodesic => "geodesic",
            Self::Advanced => "advanced",
        };
        f.write_str(name)
    }
}

impl FromStr for DistanceStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "euclidean" => Ok(Self::Euclidean),
            "manhattan" => Ok(Self::Manhattan),
            "geodesic" => Ok(Self::Geodesic),
            "advanced" => Ok(Self::Advanced),
            other => Err(Error::Build(format!("unknown distance strategy '{other}'"))),
        }
    }
}

fn check_domain(value: f64) -> Result<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::Domain { value });
    }
    Ok(value)
}

/// Great-circle distance in metres between two lon/lat coordinates.
pub fn haversine(from: &Coord, to: &Coord) -> f64 {
    let lat1 = from.y.to_radians();
    let lat2 = to.y.to_radians();
    let dlat = (to.y - from.y).to_radians();
    let dlon = (to.x - from.x).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// All metric distances for one edge, resolved against the active strategy.
pub(crate) fn edge_distances(
    from: &Coord,
    to: &Coord,
    crs: &Crs,
    active: DistanceStrategy,
) -> Result<EdgeDistances> {
    let geodesic = if crs.geographic {
        Some(check_domain(haversine(from, to))?)
    } else {
        None
    };
    Ok(EdgeDistances {
        euclidean: check_domain(from.euclidean_to(to))?,
        manhattan: check_domain(from.manhattan_to(to))?,
        geodesic,
        active: active.measure(from, to, crs)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euclidean_and_manhattan() {
        let a = Coord { x: 0.0, y: 0.0 };
        let b = Coord { x: 3.0, y: 4.0 };
        let crs = Crs::projected("EPSG:25832");
        assert_eq!(
            DistanceStrategy::Euclidean.measure(&a, &b, &crs).unwrap(),
            5.0
        );
        assert_eq!(
            DistanceStrategy::Manhattan.measure(&a, &b, &crs).unwrap(),
            7.0
        );
    }

    #[test]
    fn geodesic_requires_geographic_crs() {
        let a = Coord { x: 0.0, y: 0.0 };
        let b = Coord { x: 1.0, y: 1.0 };
        let err = DistanceStrategy::Geodesic
            .measure(&a, &b, &Crs::projected("EPSG:3857"))
            .expect_err("projected crs");
        assert!(matches!(err, Error::InvalidCrs { .. }));
    }

    #[test]
    fn haversine_quarter_meridian() {
        // equator to the north pole along a meridian
        let equator = Coord { x: 0.0, y: 0.0 };
        let pole = Coord { x: 0.0, y: 90.0 };
        let d = haversine(&equator, &pole);
        let expected = EARTH_RADIUS_M * std::f64::consts::FRAC_PI_2;
        assert!((d - expected).abs() < 1.0);
    }

    #[test]
    fn haversine_is_symmetric() {
        let a = Coord { x: 13.4, y: 52.5 };
        let b = Coord { x: 2.35, y: 48.85 };
        assert!((haversine(&a, &b) - haversine(&b, &a)).abs() < 1e-9);
        // Berlin to Paris is roughly 878 km
        assert!((haversine(&a, &b) - 878_000.0).abs() < 10_000.0);
    }

    #[test]
    fn strategy_round_trips_through_str() {
        for s in ["euclidean", "manhattan", "geodesic", "advanced"] {
            let parsed: DistanceStrategy = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        assert!("chebyshev".parse::<DistanceStrategy>().is_err());
    }
}
