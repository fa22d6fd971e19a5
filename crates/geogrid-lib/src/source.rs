//! Input data for graph building: point and line records, random point
//! generation and raster sampling along edges.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::Coord;

pub type RasterId = usize;

/// Axis-aligned bounding box in the source CRS.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        if !(min_x <= max_x && min_y <= max_y)
            || !min_x.is_finite()
            || !min_y.is_finite()
            || !max_x.is_finite()
            || !max_y.is_finite()
        {
            return Err(Error::Build(format!(
                "invalid extent [{min_x}, {min_y}, {max_x}, {max_y}]"
            )));
        }
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    pub fn contains(&self, coord: &Coord) -> bool {
        coord.x >= self.min_x && coord.x <= self.max_x && coord.y >= self.min_y && coord.y <= self.max_y
    }
}

/// A single input point with its numeric attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub coord: Coord,
    #[serde(default)]
    pub attributes: HashMap<String, f64>,
}

impl PointRecord {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            coord: Coord { x, y },
            attributes: HashMap::new(),
        }
    }
}

/// A polyline whose vertices become nodes and whose segments become edges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineRecord {
    pub points: Vec<Coord>,
    #[serde(default)]
    pub attributes: HashMap<String, f64>,
}

/// Where the builder takes its nodes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeSource {
    Points(Vec<PointRecord>),
    /// Uniformly random points inside `extent`. A fixed seed makes the
    /// generated set reproducible.
    Random {
        count: usize,
        extent: Extent,
        seed: Option<u64>,
    },
    Lines(Vec<LineRecord>),
}

impl NodeSource {
    /// Materialize the point records this source produces.
    ///
    /// For `Lines` this flattens every vertex; the builder re-reads the line
    /// structure separately to seed the segment edges.
    pub(crate) fn records(&self) -> Vec<PointRecord> {
        match self {
            Self::Points(records) => records.clone(),
            Self::Random {
                count,
                extent,
                seed,
            } => random_points(*count, extent, *seed),
            Self::Lines(lines) => lines
                .iter()
                .flat_map(|line| {
                    line.points.iter().map(|coord| PointRecord {
                        coord: *coord,
                        attributes: line.attributes.clone(),
                    })
                })
                .collect(),
        }
    }
}

fn random_points(count: usize, extent: &Extent, seed: Option<u64>) -> Vec<PointRecord> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    (0..count)
        .map(|_| {
            let x = if extent.min_x == extent.max_x {
                extent.min_x
            } else {
                rng.random_range(extent.min_x..=extent.max_x)
            };
            let y = if extent.min_y == extent.max_y {
                extent.min_y
            } else {
                rng.random_range(extent.min_y..=extent.max_y)
            };
            PointRecord::at(x, y)
        })
        .collect()
}

/// How raw raster samples are transformed before aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMode {
    /// Use samples as read from the raster.
    Raw,
    /// Linearly remap the observed sample range onto `[min, max]`.
    Scale { min: f64, max: f64 },
    /// Clamp each sample into `[min, max]`.
    CutOff { min: f64, max: f64 },
}

impl SamplingMode {
    pub(crate) fn apply(&self, values: Vec<f64>) -> Vec<f64> {
        match self {
            Self::Raw => values,
            Self::Scale { min, max } => {
                let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                if !lo.is_finite() || hi == lo {
                    return values.iter().map(|_| *min).collect();
                }
                values
                    .iter()
                    .map(|v| min + (v - lo) / (hi - lo) * (max - min))
                    .collect()
            }
            Self::CutOff { min, max } => values.iter().map(|v| v.clamp(*min, *max)).collect(),
        }
    }
}

/// A raster layer referenced by an advanced cost expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterInput {
    pub raster: RasterId,
    pub mode: SamplingMode,
}

/// Source of raster samples taken along an edge.
pub trait RasterSampler {
    /// Sample the raster along the straight segment between two coordinates.
    /// Returns at least one value, ordered from `from` to `to`.
    fn sample_line(&self, raster: RasterId, from: &Coord, to: &Coord) -> Result<Vec<f64>>;
}

/// In-memory row-major grid raster, mainly for tests and demos.
#[derive(Debug, Clone, Default)]
pub struct GridSampler {
    grids: HashMap<RasterId, Grid>,
}

#[derive(Debug, Clone)]
struct Grid {
    origin: Coord,
    cell: f64,
    rows: Vec<Vec<f64>>,
}

impl GridSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a grid with its lower-left origin and square cell size.
    pub fn insert(&mut self, raster: RasterId, origin: Coord, cell: f64, rows: Vec<Vec<f64>>) {
        self.grids.insert(raster, Grid { origin, cell, rows });
    }
}

impl RasterSampler for GridSampler {
    fn sample_line(&self, raster: RasterId, from: &Coord, to: &Coord) -> Result<Vec<f64>> {
        let grid = self.grids.get(&raster).ok_or(Error::NoRasterData { raster })?;

        let length = from.euclidean_to(to);
        let steps = ((length / grid.cell).ceil() as usize).max(1);
        let mut values = Vec::with_capacity(steps + 1);
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let x = from.x + (to.x - from.x) * t;
            let y = from.y + (to.y - from.y) * t;
            let col = ((x - grid.origin.x) / grid.cell).floor();
            let row = ((y - grid.origin.y) / grid.cell).floor();
            if col < 0.0 || row < 0.0 {
                continue;
            }
            let (col, row) = (col as usize, row as usize);
            if let Some(value) = grid.rows.get(row).and_then(|r| r.get(col)) {
                values.push(*value);
            }
        }

        if values.is_empty() {
            return Err(Error::NoRasterData { raster });
        }
        Ok(values)
    }
}
