//! Graph construction: connection strategies, clustering and cost
//! assignment, gated by a bounded pool of build slots.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kiddo::float::kdtree::KdTree;
use kiddo::SquaredEuclidean;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::distance::{edge_distances, DistanceStrategy};
use crate::error::{Error, Result};
use crate::expr::{parse, EvalContext, Expr, RasterContext};
use crate::graph::{compare_distance, Coord, Crs, Graph, NodeId};
use crate::source::{NodeSource, PointRecord, RasterInput, RasterSampler};

/// KD-tree bucket size (kiddo default).
const BUCKET_SIZE: usize = 32;

/// Builds that may run at the same time.
pub const DEFAULT_TASK_LIMIT: usize = 3;

const KMEANS_ROUNDS: usize = 32;

/// How nodes get connected into edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionStrategy {
    /// No generated edges. Line sources keep their segment edges.
    None,
    /// Every node connects to its `neighbor_count` nearest neighbours.
    #[default]
    NearestNeighbor,
    /// Every pair of nodes is connected.
    Complete,
    /// K-means clusters, complete within each cluster, bridged between.
    ClusterComplete,
    /// K-means clusters, nearest-neighbour within each cluster, bridged.
    ClusterNn,
}

impl fmt::Display for ConnectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::NearestNeighbor => "nearest-neighbor",
            Self::Complete => "complete",
            Self::ClusterComplete => "cluster-complete",
            Self::ClusterNn => "cluster-nn",
        };
        f.write_str(name)
    }
}

impl FromStr for ConnectionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "nearest-neighbor" => Ok(Self::NearestNeighbor),
            "complete" => Ok(Self::Complete),
            "cluster-complete" => Ok(Self::ClusterComplete),
            "cluster-nn" => Ok(Self::ClusterNn),
            other => Err(Error::Build(format!(
                "unknown connection strategy '{other}'"
            ))),
        }
    }
}

/// Options controlling one graph build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub connection: ConnectionStrategy,
    pub distance: DistanceStrategy,
    pub crs: Crs,
    pub directed: bool,
    /// Neighbours per node for the nearest-neighbour strategies.
    pub neighbor_count: usize,
    /// Allow edges back to nodes that were already processed, which can
    /// produce parallel edges between a pair of nodes.
    pub allow_double_edges: bool,
    /// Chain the nodes into a single visiting order instead of fanning out.
    pub tour: bool,
    /// Clusters for the cluster strategies.
    pub cluster_count: usize,
    /// Expression for the advanced distance strategy.
    pub cost_expression: Option<String>,
    /// Rasters the cost expression may sample.
    pub rasters: Vec<RasterInput>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            connection: ConnectionStrategy::default(),
            distance: DistanceStrategy::default(),
            crs: Crs::default(),
            directed: false,
            neighbor_count: 2,
            allow_double_edges: false,
            tour: false,
            cluster_count: 5,
            cost_expression: None,
            rasters: Vec::new(),
        }
    }
}

/// Bounded pool of concurrent build slots.
///
/// A slot is taken with [`TaskSlots::acquire`] and released when the returned
/// permit drops.
#[derive(Debug)]
pub struct TaskSlots {
    limit: usize,
    active: AtomicUsize,
}

impl TaskSlots {
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            limit,
            active: AtomicUsize::new(0),
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Take a slot, failing without changing the count when the pool is full.
    pub fn acquire(self: &Arc<Self>) -> Result<TaskPermit> {
        let mut current = self.active.load(Ordering::SeqCst);
        loop {
            if current >= self.limit {
                return Err(Error::TaskLimitExceeded { limit: self.limit });
            }
            match self.active.compare_exchange(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    return Ok(TaskPermit {
                        slots: Arc::clone(self),
                    })
                }
                Err(observed) => current = observed,
            }
        }
    }
}

/// RAII slot handle. Dropping it frees the slot.
#[derive(Debug)]
pub struct TaskPermit {
    slots: Arc<TaskSlots>,
}

impl Drop for TaskPermit {
    fn drop(&mut self) {
        self.slots.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Builds weighted graphs from node sources.
pub struct GraphBuilder {
    slots: Arc<TaskSlots>,
    sampler: Option<Box<dyn RasterSampler + Send + Sync>>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::with_slots(TaskSlots::new(DEFAULT_TASK_LIMIT))
    }

    /// Share a slot pool between several builders.
    pub fn with_slots(slots: Arc<TaskSlots>) -> Self {
        Self {
            slots,
            sampler: None,
        }
    }

    pub fn with_sampler(mut self, sampler: Box<dyn RasterSampler + Send + Sync>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn slots(&self) -> &Arc<TaskSlots> {
        &self.slots
    }

    /// Build a graph from `source` under `options`.
    pub fn build(&self, source: &NodeSource, options: &BuildOptions) -> Result<Graph> {
        let _permit = self.slots.acquire()?;

        let mut graph = Graph::new(options.crs.clone());
        let mut pairs: Vec<(NodeId, NodeId)> = Vec::new();

        match source {
            NodeSource::Lines(lines) => {
                // shared endpoints collapse into a single node
                let mut by_coord: HashMap<(u64, u64), NodeId> = HashMap::new();
                for line in lines {
                    let mut previous: Option<NodeId> = None;
                    for coord in &line.points {
                        let key = (coord.x.to_bits(), coord.y.to_bits());
                        let id = *by_coord
                            .entry(key)
                            .or_insert_with(|| graph.add_node(*coord, line.attributes.clone()));
                        if let Some(prev) = previous {
                            if prev != id {
                                pairs.push((prev, id));
                            }
                        }
                        previous = Some(id);
                    }
                }
            }
            _ => {
                for record in source.records() {
                    graph.add_node(record.coord, record.attributes);
                }
            }
        }

        // an empty source is a caller mistake unless points were asked for
        if graph.node_count() == 0 && !matches!(source, NodeSource::Random { .. }) {
            return Err(Error::Build(
                "node source is empty and random generation was not requested".to_string(),
            ));
        }

        let records: Vec<PointRecord> = graph
            .nodes()
            .iter()
            .map(|node| PointRecord {
                coord: node.coord,
                attributes: node.attributes.clone(),
            })
            .collect();
        let indices: Vec<NodeId> = (0..records.len()).collect();

        match options.connection {
            ConnectionStrategy::None => {}
            ConnectionStrategy::Complete => {
                pairs.extend(complete_pairs(&records, &indices, options));
            }
            ConnectionStrategy::NearestNeighbor => {
                pairs.extend(self.nearest_neighbor_pairs(&records, &indices, options)?);
            }
            ConnectionStrategy::ClusterComplete | ConnectionStrategy::ClusterNn => {
                pairs.extend(self.cluster_pairs(&records, options)?);
            }
        }

        debug!(
            nodes = graph.node_count(),
            candidate_edges = pairs.len(),
            strategy = %options.connection,
            "connected nodes"
        );

        let evaluator = CostEvaluator::new(options, self.sampler.as_deref())?;
        for (from, to) in pairs {
            let cost = evaluator.cost(&records[from], &records[to], options)?;
            graph.add_edge(from, to, cost, options.directed)?;
        }

        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            strategy = %options.connection,
            distance = %options.distance,
            "built graph"
        );
        Ok(graph)
    }

    /// Connect each node to its nearest neighbours, restricted to `indices`.
    fn nearest_neighbor_pairs(
        &self,
        records: &[PointRecord],
        indices: &[NodeId],
        options: &BuildOptions,
    ) -> Result<Vec<(NodeId, NodeId)>> {
        if indices.len() < 2 {
            return Ok(Vec::new());
        }

        let ranking = NeighborRanking::build(records, indices, options)?;

        if options.tour {
            return Ok(ranking.tour(indices));
        }

        let k = options.neighbor_count.max(1);
        let mut pairs = Vec::new();
        let mut processed: HashSet<NodeId> = HashSet::new();
        let mut seen: HashSet<(NodeId, NodeId)> = HashSet::new();

        for &i in indices {
            let ranked = ranking.ranked(i);
            let mut picked = 0usize;
            for &j in &ranked {
                if picked == k {
                    break;
                }
                if !options.allow_double_edges {
                    if processed.contains(&j) {
                        continue;
                    }
                    let key = normalize(i, j, options.directed);
                    if !seen.insert(key) {
                        continue;
                    }
                }
                pairs.push((i, j));
                picked += 1;
            }
            // every node keeps at least one outgoing edge; a pair that is
            // already connected stays a single edge, the existing undirected
            // edge covers this node
            if picked == 0 {
                let fallback = ranked.iter().copied().find(|&j| {
                    options.allow_double_edges || seen.insert(normalize(i, j, options.directed))
                });
                if let Some(j) = fallback {
                    pairs.push((i, j));
                }
            }
            processed.insert(i);
        }

        Ok(pairs)
    }

    /// Cluster the nodes, connect within each cluster, then bridge the
    /// clusters through their closest node pairs.
    fn cluster_pairs(
        &self,
        records: &[PointRecord],
        options: &BuildOptions,
    ) -> Result<Vec<(NodeId, NodeId)>> {
        let n = records.len();
        if n < 2 {
            return Ok(Vec::new());
        }
        let k = options.cluster_count.max(1).min(n);
        let assignment = kmeans(records, k);

        let mut clusters: Vec<Vec<NodeId>> = vec![Vec::new(); k];
        for (idx, cluster) in assignment.iter().enumerate() {
            clusters[*cluster].push(idx);
        }

        let mut pairs = Vec::new();
        for members in &clusters {
            match options.connection {
                ConnectionStrategy::ClusterComplete => {
                    pairs.extend(complete_pairs(records, members, options));
                }
                ConnectionStrategy::ClusterNn => {
                    pairs.extend(self.nearest_neighbor_pairs(records, members, options)?);
                }
                _ => unreachable!("cluster strategies only"),
            }
        }

        // bridge consecutive non-empty clusters via their closest pair
        let occupied: Vec<&Vec<NodeId>> = clusters.iter().filter(|c| !c.is_empty()).collect();
        for window in occupied.windows(2) {
            if let Some(bridge) = closest_pair(records, window[0], window[1], options)? {
                pairs.push(bridge);
            }
        }

        Ok(pairs)
    }
}

fn normalize(a: NodeId, b: NodeId, directed: bool) -> (NodeId, NodeId) {
    if directed || a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// All-pairs edges. With double edges disallowed, pairs of coincident nodes
/// produce only one geometric edge per distinct coordinate pair.
fn complete_pairs(
    records: &[PointRecord],
    indices: &[NodeId],
    options: &BuildOptions,
) -> Vec<(NodeId, NodeId)> {
    let coord_key = |id: NodeId| {
        let coord = records[id].coord;
        (coord.x.to_bits(), coord.y.to_bits())
    };
    let mut seen_coords: HashSet<((u64, u64), (u64, u64))> = HashSet::new();
    let mut emit = |pairs: &mut Vec<(NodeId, NodeId)>, i: NodeId, j: NodeId| {
        if !options.allow_double_edges {
            let (a, b) = (coord_key(i), coord_key(j));
            let key = if options.directed || a <= b {
                (a, b)
            } else {
                (b, a)
            };
            if !seen_coords.insert(key) {
                return;
            }
        }
        pairs.push((i, j));
    };

    let mut pairs = Vec::new();
    for (pos, &i) in indices.iter().enumerate() {
        for &j in &indices[pos + 1..] {
            emit(&mut pairs, i, j);
            if options.directed {
                emit(&mut pairs, j, i);
            }
        }
    }
    pairs
}

/// Per-node neighbour orderings under the active distance strategy.
///
/// Euclidean orderings come from a KD-tree; the other metrics rank by a
/// linear scan so the ordering always matches the strategy.
struct NeighborRanking {
    ranked: HashMap<NodeId, Vec<NodeId>>,
}

impl NeighborRanking {
    fn build(records: &[PointRecord], indices: &[NodeId], options: &BuildOptions) -> Result<Self> {
        let mut ranked = HashMap::with_capacity(indices.len());

        match options.distance {
            DistanceStrategy::Euclidean | DistanceStrategy::Advanced => {
                let mut tree: KdTree<f64, usize, 2, BUCKET_SIZE, u32> = KdTree::new();
                for &i in indices {
                    let coord = records[i].coord;
                    tree.add(&[coord.x, coord.y], i);
                }
                for &i in indices {
                    let coord = records[i].coord;
                    let neighbors = tree
                        .nearest_n::<SquaredEuclidean>(&[coord.x, coord.y], indices.len());
                    let mut order: Vec<(NodeId, f64)> = neighbors
                        .into_iter()
                        .filter(|n| n.item != i)
                        .map(|n| (n.item, n.distance))
                        .collect();
                    // equal distances break towards the lowest node id
                    order.sort_by(|a, b| compare_distance(a.1, b.1).then_with(|| a.0.cmp(&b.0)));
                    ranked.insert(i, order.into_iter().map(|(j, _)| j).collect());
                }
            }
            strategy => {
                for &i in indices {
                    let from = &records[i].coord;
                    let mut order: Vec<(NodeId, f64)> = Vec::with_capacity(indices.len() - 1);
                    for &j in indices {
                        if j == i {
                            continue;
                        }
                        let d = strategy.measure(from, &records[j].coord, &options.crs)?;
                        order.push((j, d));
                    }
                    order.sort_by(|a, b| compare_distance(a.1, b.1).then_with(|| a.0.cmp(&b.0)));
                    ranked.insert(i, order.into_iter().map(|(j, _)| j).collect());
                }
            }
        }

        Ok(Self { ranked })
    }

    fn ranked(&self, node: NodeId) -> Vec<NodeId> {
        self.ranked.get(&node).cloned().unwrap_or_default()
    }

    /// Chain the nodes into one visiting order, always hopping to the
    /// nearest node not yet visited.
    fn tour(&self, indices: &[NodeId]) -> Vec<(NodeId, NodeId)> {
        let mut visited: HashSet<NodeId> = HashSet::with_capacity(indices.len());
        let mut pairs = Vec::with_capacity(indices.len().saturating_sub(1));
        let mut current = indices[0];
        visited.insert(current);

        while visited.len() < indices.len() {
            let next = self
                .ranked(current)
                .into_iter()
                .find(|j| !visited.contains(j));
            match next {
                Some(j) => {
                    pairs.push((current, j));
                    visited.insert(j);
                    current = j;
                }
                None => break,
            }
        }
        pairs
    }
}

/// Lloyd's algorithm with deterministic seeding: initial centroids are taken
/// at a fixed stride through the input order.
fn kmeans(records: &[PointRecord], k: usize) -> Vec<usize> {
    let n = records.len();
    let stride = n.div_ceil(k);
    let mut centroids: Vec<Coord> = (0..k)
        .map(|c| records[(c * stride).min(n - 1)].coord)
        .collect();
    let mut assignment = vec![0usize; n];

    for _ in 0..KMEANS_ROUNDS {
        let mut changed = false;
        for (idx, record) in records.iter().enumerate() {
            let mut best = assignment[idx];
            let mut best_d = f64::INFINITY;
            for (c, centroid) in centroids.iter().enumerate() {
                let d = record.coord.euclidean_to(centroid);
                if d < best_d {
                    best_d = d;
                    best = c;
                }
            }
            if best != assignment[idx] {
                assignment[idx] = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![(0.0f64, 0.0f64, 0usize); k];
        for (idx, record) in records.iter().enumerate() {
            let entry = &mut sums[assignment[idx]];
            entry.0 += record.coord.x;
            entry.1 += record.coord.y;
            entry.2 += 1;
        }
        for (c, (sx, sy, count)) in sums.into_iter().enumerate() {
            if count > 0 {
                centroids[c] = Coord {
                    x: sx / count as f64,
                    y: sy / count as f64,
                };
            }
        }
    }

    assignment
}

fn closest_pair(
    records: &[PointRecord],
    left: &[NodeId],
    right: &[NodeId],
    options: &BuildOptions,
) -> Result<Option<(NodeId, NodeId)>> {
    let mut best: Option<(NodeId, NodeId, f64)> = None;
    for &i in left {
        for &j in right {
            let d = options
                .distance
                .measure(&records[i].coord, &records[j].coord, &options.crs)?;
            if best.map_or(true, |(_, _, bd)| compare_distance(d, bd).is_lt()) {
                best = Some((i, j, d));
            }
        }
    }
    Ok(best.map(|(i, j, _)| (i, j)))
}

/// Computes the cost of one edge under the build's distance strategy.
struct CostEvaluator<'a> {
    expression: Option<Expr>,
    sampler: Option<&'a (dyn RasterSampler + Send + Sync)>,
}

impl<'a> CostEvaluator<'a> {
    fn new(
        options: &BuildOptions,
        sampler: Option<&'a (dyn RasterSampler + Send + Sync)>,
    ) -> Result<Self> {
        let expression = if options.distance == DistanceStrategy::Advanced {
            let text = options.cost_expression.as_deref().ok_or_else(|| {
                Error::Build("advanced distance strategy requires a cost expression".to_string())
            })?;
            Some(parse(text).map_err(advanced_failure)?)
        } else {
            None
        };
        Ok(Self {
            expression,
            sampler,
        })
    }

    fn cost(&self, from: &PointRecord, to: &PointRecord, options: &BuildOptions) -> Result<f64> {
        let expression = match &self.expression {
            None => {
                return options
                    .distance
                    .measure(&from.coord, &to.coord, &options.crs)
            }
            Some(expression) => expression,
        };

        let distances = edge_distances(&from.coord, &to.coord, &options.crs, options.distance)
            .map_err(advanced_failure)?;

        // expressions see the target node's attributes plus the endpoints
        let mut fields = to.attributes.clone();
        fields.insert("from_x".to_string(), from.coord.x);
        fields.insert("from_y".to_string(), from.coord.y);
        fields.insert("to_x".to_string(), to.coord.x);
        fields.insert("to_y".to_string(), to.coord.y);

        let rasters = if expression.uses_rasters() {
            Some(self.sample_rasters(&from.coord, &to.coord, options)?)
        } else {
            None
        };

        let ctx = EvalContext {
            distances,
            fields: &fields,
            rasters: rasters.as_ref(),
        };
        expression.evaluate(&ctx).map_err(advanced_failure)
    }

    fn sample_rasters(
        &self,
        from: &Coord,
        to: &Coord,
        options: &BuildOptions,
    ) -> Result<RasterContext> {
        let sampler = self.sampler.ok_or_else(|| {
            Error::Build("Advanced cost function can not be set! (no raster sampler)".to_string())
        })?;
        let mut context = RasterContext::new();
        for input in &options.rasters {
            let values = sampler
                .sample_line(input.raster, from, to)
                .map_err(advanced_failure)?;
            context.insert(input.raster, input.mode.apply(values));
        }
        Ok(context)
    }
}

fn advanced_failure(err: Error) -> Error {
    Error::Build(format!("Advanced cost function can not be set! ({err})"))
}
