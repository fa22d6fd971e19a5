//! Typed cost-expression engine.
//!
//! An expression is parsed once into an [`Expr`] tree and then evaluated per
//! edge against an [`EvalContext`]. The surface covers numeric literals,
//! per-node `field:NAME` lookups, `raster[N]:stat` aggregates sampled along
//! the edge, the built-in metric keywords, an `if(cond, then, else)`
//! conditional and the math functions listed in [`functions`].

mod eval;
pub mod functions;
mod lexer;
mod parser;

pub use eval::{EdgeDistances, EvalContext, RasterContext};
pub use parser::parse;

/// Aggregate statistic applied to raster samples along an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RasterStat {
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Variance,
    StdDev,
    GradientSum,
    GradientMin,
    GradientMax,
    Ascent,
    Descent,
    TotalClimb,
}

impl RasterStat {
    /// Parse the statistic name as it appears after `raster[N]:`.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sum" => Self::Sum,
            "mean" => Self::Mean,
            "median" => Self::Median,
            "min" => Self::Min,
            "max" => Self::Max,
            "variance" => Self::Variance,
            "standDev" => Self::StdDev,
            "gradientSum" => Self::GradientSum,
            "gradientMin" => Self::GradientMin,
            "gradientMax" => Self::GradientMax,
            "ascent" => Self::Ascent,
            "descent" => Self::Descent,
            "totalClimb" => Self::TotalClimb,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Min => "min",
            Self::Max => "max",
            Self::Variance => "variance",
            Self::StdDev => "standDev",
            Self::GradientSum => "gradientSum",
            Self::GradientMin => "gradientMin",
            Self::GradientMax => "gradientMax",
            Self::Ascent => "ascent",
            Self::Descent => "descent",
            Self::TotalClimb => "totalClimb",
        }
    }
}

/// Built-in distance keyword inside an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Euclidean,
    Manhattan,
    Geodesic,
    /// `distance`, resolving to the builder's active distance strategy.
    Active,
}

impl MetricKind {
    pub(crate) fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "euclidean" => Self::Euclidean,
            "manhattan" => Self::Manhattan,
            "geodesic" => Self::Geodesic,
            "distance" => Self::Active,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Gt,
    Eq,
    Ne,
    And,
    Or,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(f64),
    /// `field:NAME`, a numeric attribute of the edge's target node.
    Field(String),
    /// `raster[N]:stat`, an aggregate over samples along the edge.
    Raster { raster: usize, stat: RasterStat },
    Metric(MetricKind),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// True if any subexpression references a raster aggregate.
    pub fn uses_rasters(&self) -> bool {
        match self {
            Expr::Raster { .. } => true,
            Expr::Literal(_) | Expr::Field(_) | Expr::Metric(_) => false,
            Expr::Unary { operand, .. } => operand.uses_rasters(),
            Expr::Binary { left, right, .. } => left.uses_rasters() || right.uses_rasters(),
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => cond.uses_rasters() || then.uses_rasters() || otherwise.uses_rasters(),
            Expr::Call { args, .. } => args.iter().any(Expr::uses_rasters),
        }
    }
}
