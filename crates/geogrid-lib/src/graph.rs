use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Index of a node within its graph.
pub type NodeId = usize;

/// A 2D coordinate in the units of the graph's CRS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Straight-line planar distance to another coordinate.
    pub fn euclidean_to(&self, other: &Coord) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Sum of absolute coordinate differences.
    pub fn manhattan_to(&self, other: &Coord) -> f64 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// Minimal coordinate-reference-system descriptor.
///
/// The geodesic metric interprets coordinates as longitude/latitude in
/// degrees and therefore requires `geographic` to be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crs {
    pub authid: String,
    pub geographic: bool,
}

impl Crs {
    /// WGS 84 longitude/latitude, the default for random layouts.
    pub fn wgs84() -> Self {
        Self {
            authid: "EPSG:4326".to_string(),
            geographic: true,
        }
    }

    /// A projected (planar) CRS identified by `authid`.
    pub fn projected(authid: impl Into<String>) -> Self {
        Self {
            authid: authid.into(),
            geographic: false,
        }
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::wgs84()
    }
}

/// Node of a graph: a coordinate plus an optional numeric attribute map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub coord: Coord,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, f64>,
}

/// Weighted edge between two nodes.
///
/// An undirected edge (`directed = false`) is stored once and traversed in
/// both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub cost: f64,
    pub directed: bool,
}

/// Weighted graph built from geospatial or random node layouts.
///
/// Nodes are stored in insertion order and addressed by index. The graph is
/// a plain value: cloning it yields an independent copy, which is how the
/// job orchestrator takes ownership on submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    pub crs: Crs,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl Graph {
    pub fn new(crs: Crs) -> Self {
        Self {
            crs,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Append a node and return its id.
    pub fn add_node(&mut self, coord: Coord, attributes: HashMap<String, f64>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            id,
            coord,
            attributes,
        });
        id
    }

    /// Append an edge. Endpoints must reference existing nodes.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, cost: f64, directed: bool) -> Result<()> {
        if from >= self.nodes.len() || to >= self.nodes.len() {
            return Err(Error::Build(format!(
                "edge ({from}, {to}) references a missing node"
            )));
        }
        self.edges.push(Edge {
            from,
            to,
            cost,
            directed,
        });
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Outgoing neighbours of `id`, honouring undirected edges both ways.
    pub fn neighbours(&self, id: NodeId) -> Vec<(NodeId, f64)> {
        let mut out = Vec::new();
        for edge in &self.edges {
            if edge.from == id {
                out.push((edge.to, edge.cost));
            } else if !edge.directed && edge.to == id {
                out.push((edge.from, edge.cost));
            }
        }
        out
    }

    /// Whether any edge connects `a` and `b`, in either direction.
    pub fn has_edge_between(&self, a: NodeId, b: NodeId) -> bool {
        self.edges
            .iter()
            .any(|e| (e.from == a && e.to == b) || (e.from == b && e.to == a))
    }

    /// Number of edges leaving `id` (undirected edges count both ways).
    pub fn out_degree(&self, id: NodeId) -> usize {
        self.edges
            .iter()
            .filter(|e| e.from == id || (!e.directed && e.to == id))
            .count()
    }
}

/// NaN-safe distance ordering: NaN sorts last.
pub(crate) fn compare_distance(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Greater)
}
