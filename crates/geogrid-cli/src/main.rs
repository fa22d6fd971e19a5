use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use geogrid_lib::{
    haversine, AnalysisEndpoint, AnalysisKind, AnalysisRequest, BuildOptions, ConnectionStrategy,
    Coord, Crs, DistanceStrategy, EdgeDistances, EndpointConfig, Extent, Graph, GraphBuilder,
    HttpEndpoint, NodeSource,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Geospatial graph building and analysis jobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a graph from randomly generated points and print a summary.
    Build {
        /// Number of random points.
        #[arg(long, default_value_t = 100)]
        count: usize,
        /// Seed for reproducible point generation.
        #[arg(long)]
        seed: Option<u64>,
        /// Extent as min-x,min-y,max-x,max-y.
        #[arg(long, default_value = "0,0,1000,1000", value_parser = parse_extent)]
        extent: Extent,
        /// Connection strategy (none, nearest-neighbor, complete, cluster-complete, cluster-nn).
        #[arg(long, default_value = "nearest-neighbor")]
        connection: ConnectionStrategy,
        /// Distance strategy (euclidean, manhattan, geodesic, advanced).
        #[arg(long, default_value = "euclidean")]
        distance: DistanceStrategy,
        /// CRS authority id; EPSG:4326 enables the geodesic metric.
        #[arg(long, default_value = "EPSG:4326")]
        crs: String,
        /// Neighbours per node for the nearest-neighbour strategies.
        #[arg(long, default_value_t = 2)]
        neighbors: usize,
        /// Clusters for the cluster strategies.
        #[arg(long, default_value_t = 5)]
        clusters: usize,
        /// Build a directed graph.
        #[arg(long)]
        directed: bool,
        /// Cost expression for the advanced distance strategy.
        #[arg(long)]
        expression: Option<String>,
        /// Print the full graph as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },
    /// Parse and evaluate a cost expression.
    Eval {
        /// The expression, for example "if(euclidean > 100, euclidean * 2, euclidean)".
        expression: String,
        /// Field values as NAME=VALUE, repeatable.
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, f64)>,
        /// Edge start as x,y; enables the metric keywords.
        #[arg(long, value_parser = parse_coord)]
        from: Option<Coord>,
        /// Edge end as x,y.
        #[arg(long, value_parser = parse_coord)]
        to: Option<Coord>,
        /// Treat coordinates as lon/lat so geodesic is defined.
        #[arg(long)]
        geographic: bool,
    },
    /// Manage analysis jobs on the configured remote endpoint.
    #[command(subcommand)]
    Jobs(JobsCommand),
}

#[derive(Subcommand, Debug)]
enum JobsCommand {
    /// Build a random graph and submit it for analysis.
    Submit {
        /// Analysis to run (shortest-path, minimum-spanning-tree).
        #[arg(long, default_value = "minimum-spanning-tree")]
        analysis: String,
        /// Start node for shortest-path.
        #[arg(long, default_value_t = 0)]
        start: usize,
        /// End node for shortest-path.
        #[arg(long)]
        end: Option<usize>,
        /// Number of random points for the submitted graph.
        #[arg(long, default_value_t = 100)]
        count: usize,
        /// Seed for reproducible point generation.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Poll the status of a remote job.
    Status { job: String },
    /// Fetch the result document of a finished job.
    Result { job: String },
    /// Abort a remote job.
    Discard { job: String },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Build {
            count,
            seed,
            extent,
            connection,
            distance,
            crs,
            neighbors,
            clusters,
            directed,
            expression,
            json,
        } => handle_build(
            count, seed, extent, connection, distance, &crs, neighbors, clusters, directed,
            expression, json,
        ),
        Command::Eval {
            expression,
            fields,
            from,
            to,
            geographic,
        } => handle_eval(&expression, fields, from, to, geographic),
        Command::Jobs(command) => handle_jobs(command),
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_build(
    count: usize,
    seed: Option<u64>,
    extent: Extent,
    connection: ConnectionStrategy,
    distance: DistanceStrategy,
    crs: &str,
    neighbors: usize,
    clusters: usize,
    directed: bool,
    expression: Option<String>,
    json: bool,
) -> Result<()> {
    let source = NodeSource::Random {
        count,
        extent,
        seed,
    };
    let options = BuildOptions {
        connection,
        distance,
        crs: crs_from_authid(crs),
        directed,
        neighbor_count: neighbors,
        cluster_count: clusters,
        cost_expression: expression,
        ..BuildOptions::default()
    };

    let graph = GraphBuilder::new()
        .build(&source, &options)
        .context("failed to build graph")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&graph)?);
    } else {
        println!(
            "Built graph: {} nodes, {} edges ({connection}, {distance}, {})",
            graph.node_count(),
            graph.edge_count(),
            graph.crs.authid
        );
        let total: f64 = graph.edges().iter().map(|e| e.cost).sum();
        println!("Total edge cost: {total:.3}");
    }
    Ok(())
}

fn handle_eval(
    expression: &str,
    fields: Vec<(String, f64)>,
    from: Option<Coord>,
    to: Option<Coord>,
    geographic: bool,
) -> Result<()> {
    let parsed = geogrid_lib::parse(expression).context("failed to parse expression")?;

    let distances = match (from, to) {
        (Some(from), Some(to)) => EdgeDistances {
            euclidean: from.euclidean_to(&to),
            manhattan: from.manhattan_to(&to),
            geodesic: geographic.then(|| haversine(&from, &to)),
            active: from.euclidean_to(&to),
        },
        _ => EdgeDistances {
            euclidean: 0.0,
            manhattan: 0.0,
            geodesic: None,
            active: 0.0,
        },
    };

    let fields: HashMap<String, f64> = fields.into_iter().collect();
    let ctx = geogrid_lib::EvalContext {
        distances,
        fields: &fields,
        rasters: None,
    };
    let value = parsed.evaluate(&ctx).context("failed to evaluate expression")?;
    println!("{value}");
    Ok(())
}

fn handle_jobs(command: JobsCommand) -> Result<()> {
    let endpoint = HttpEndpoint::new(EndpointConfig::from_env())
        .context("analysis endpoint is not configured; set GEOGRID_HOST and GEOGRID_PORT")?;

    match command {
        JobsCommand::Submit {
            analysis,
            start,
            end,
            count,
            seed,
        } => {
            let kind = match analysis.as_str() {
                "minimum-spanning-tree" => AnalysisKind::MinimumSpanningTree,
                "shortest-path" => {
                    let end = end.context("--end is required for shortest-path")?;
                    AnalysisKind::ShortestPath { start, end }
                }
                other => bail!("unknown analysis '{other}'"),
            };
            let graph = build_submission_graph(count, seed)?;
            let request = AnalysisRequest::new(analysis, kind);
            let remote_id = endpoint
                .submit(&request, &graph)
                .context("failed to submit job")?;
            println!("Submitted job {remote_id}");
        }
        JobsCommand::Status { job } => {
            let status = endpoint.status(&job).context("failed to poll job")?;
            let progress = status
                .progress
                .map(|p| format!(" ({p}%)"))
                .unwrap_or_default();
            match status.message {
                Some(message) => println!("{:?}{progress}: {message}", status.state),
                None => println!("{:?}{progress}", status.state),
            }
        }
        JobsCommand::Result { job } => {
            let result = endpoint.result(&job).context("failed to fetch result")?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        JobsCommand::Discard { job } => {
            endpoint.abort(&job).context("failed to abort job")?;
            println!("Aborted job {job}");
        }
    }
    Ok(())
}

fn build_submission_graph(count: usize, seed: Option<u64>) -> Result<Graph> {
    let source = NodeSource::Random {
        count,
        extent: Extent::new(0.0, 0.0, 1000.0, 1000.0).expect("static extent"),
        seed,
    };
    let options = BuildOptions {
        connection: ConnectionStrategy::NearestNeighbor,
        crs: Crs::projected("EPSG:25832"),
        ..BuildOptions::default()
    };
    GraphBuilder::new()
        .build(&source, &options)
        .context("failed to build submission graph")
}

fn crs_from_authid(authid: &str) -> Crs {
    if authid == "EPSG:4326" {
        Crs::wgs84()
    } else {
        Crs::projected(authid)
    }
}

fn parse_extent(raw: &str) -> Result<Extent, String> {
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 4 {
        return Err("extent must be min-x,min-y,max-x,max-y".to_string());
    }
    let mut values = [0.0f64; 4];
    for (slot, part) in values.iter_mut().zip(&parts) {
        *slot = part
            .trim()
            .parse()
            .map_err(|_| format!("invalid number '{part}' in extent"))?;
    }
    Extent::new(values[0], values[1], values[2], values[3]).map_err(|err| err.to_string())
}

fn parse_coord(raw: &str) -> Result<Coord, String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| "coordinate must be x,y".to_string())?;
    let x = x.trim().parse().map_err(|_| format!("invalid x '{x}'"))?;
    let y = y.trim().parse().map_err(|_| format!("invalid y '{y}'"))?;
    Ok(Coord::new(x, y))
}

fn parse_field(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| "field must be NAME=VALUE".to_string())?;
    let value = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid field value '{value}'"))?;
    Ok((name.trim().to_string(), value))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
