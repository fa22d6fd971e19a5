//! Geogrid library entry points.
//!
//! This crate builds weighted graphs from geospatial point, line and random
//! sources, evaluates typed cost expressions over edges, and orchestrates
//! analysis jobs against a remote endpoint. Higher-level consumers (the CLI)
//! should only depend on the types exported here instead of reimplementing
//! behavior.

pub mod builder;
pub mod config;
pub mod distance;
pub mod error;
pub mod expr;
pub mod graph;
pub mod jobs;
pub mod remote;
pub mod source;

pub use builder::{BuildOptions, ConnectionStrategy, GraphBuilder, TaskPermit, TaskSlots};
pub use config::EndpointConfig;
pub use distance::{haversine, DistanceStrategy, EARTH_RADIUS_M};
pub use error::{Error, Result};
pub use expr::{parse, EdgeDistances, EvalContext, Expr, RasterContext, RasterStat};
pub use graph::{Coord, Crs, Edge, Graph, Node, NodeId};
pub use jobs::{
    AnalysisKind, AnalysisRequest, GraphInput, Job, JobId, JobOrchestrator, JobStatus, Layer,
    LayerKind,
};
pub use remote::{AnalysisEndpoint, HttpEndpoint, RemoteJobId, RemoteState, RemoteStatus};
pub use source::{
    Extent, GridSampler, LineRecord, NodeSource, PointRecord, RasterId, RasterInput,
    RasterSampler, SamplingMode,
};
