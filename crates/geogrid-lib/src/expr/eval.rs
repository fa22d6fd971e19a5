//! Per-edge evaluation of a parsed cost expression.

use std::collections::HashMap;

use crate::error::{Error, Result};

use super::functions::{self, raster_aggregate};
use super::{BinaryOp, Expr, MetricKind, UnaryOp};

/// Precomputed distances for the edge being evaluated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeDistances {
    pub euclidean: f64,
    pub manhattan: f64,
    /// Absent when the graph's CRS is projected.
    pub geodesic: Option<f64>,
    /// Distance under the builder's active strategy, resolved by `distance`.
    pub active: f64,
}

/// Raster samples taken along the edge, keyed by raster index.
#[derive(Debug, Clone, Default)]
pub struct RasterContext {
    samples: HashMap<usize, Vec<f64>>,
}

impl RasterContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, raster: usize, values: Vec<f64>) {
        self.samples.insert(raster, values);
    }

    fn get(&self, raster: usize) -> Result<&[f64]> {
        self.samples
            .get(&raster)
            .map(Vec::as_slice)
            .ok_or(Error::NoRasterData { raster })
    }
}

/// Everything an expression may reference while costing one edge.
pub struct EvalContext<'a> {
    pub distances: EdgeDistances,
    /// Numeric attributes of the edge's target node.
    pub fields: &'a HashMap<String, f64>,
    pub rasters: Option<&'a RasterContext>,
}

fn eval_err(message: impl Into<String>) -> Error {
    Error::Evaluation(message.into())
}

fn truthy(value: f64) -> bool {
    value != 0.0
}

fn bool_num(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

impl Expr {
    /// Evaluate the expression for one edge.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<f64> {
        match self {
            Expr::Literal(value) => Ok(*value),
            Expr::Field(name) => ctx
                .fields
                .get(name)
                .copied()
                .ok_or_else(|| eval_err(format!("unknown field '{name}'"))),
            Expr::Raster { raster, stat } => {
                let rasters = ctx
                    .rasters
                    .ok_or(Error::NoRasterData { raster: *raster })?;
                raster_aggregate(*stat, rasters.get(*raster)?)
            }
            Expr::Metric(kind) => match kind {
                MetricKind::Euclidean => Ok(ctx.distances.euclidean),
                MetricKind::Manhattan => Ok(ctx.distances.manhattan),
                MetricKind::Geodesic => ctx.distances.geodesic.ok_or_else(|| {
                    eval_err("geodesic distance is only defined for geographic coordinates")
                }),
                MetricKind::Active => Ok(ctx.distances.active),
            },
            Expr::Unary { op, operand } => {
                let value = operand.evaluate(ctx)?;
                Ok(match op {
                    UnaryOp::Neg => -value,
                    UnaryOp::Not => bool_num(!truthy(value)),
                })
            }
            Expr::Binary { op, left, right } => {
                // short-circuit logical operators before evaluating the rhs
                match op {
                    BinaryOp::And => {
                        if !truthy(left.evaluate(ctx)?) {
                            return Ok(0.0);
                        }
                        return Ok(bool_num(truthy(right.evaluate(ctx)?)));
                    }
                    BinaryOp::Or => {
                        if truthy(left.evaluate(ctx)?) {
                            return Ok(1.0);
                        }
                        return Ok(bool_num(truthy(right.evaluate(ctx)?)));
                    }
                    _ => {}
                }

                let lhs = left.evaluate(ctx)?;
                let rhs = right.evaluate(ctx)?;
                match op {
                    BinaryOp::Add => Ok(lhs + rhs),
                    BinaryOp::Sub => Ok(lhs - rhs),
                    BinaryOp::Mul => Ok(lhs * rhs),
                    BinaryOp::Div => {
                        if rhs == 0.0 {
                            return Err(eval_err("division by zero"));
                        }
                        Ok(lhs / rhs)
                    }
                    BinaryOp::Pow => {
                        let value = lhs.powf(rhs);
                        if !value.is_finite() {
                            return Err(eval_err(format!("{lhs} ^ {rhs} is not finite")));
                        }
                        Ok(value)
                    }
                    BinaryOp::Lt => Ok(bool_num(lhs < rhs)),
                    BinaryOp::Gt => Ok(bool_num(lhs > rhs)),
                    BinaryOp::Eq => Ok(bool_num(lhs == rhs)),
                    BinaryOp::Ne => Ok(bool_num(lhs != rhs)),
                    BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
                }
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                if truthy(cond.evaluate(ctx)?) {
                    then.evaluate(ctx)
                } else {
                    otherwise.evaluate(ctx)
                }
            }
            Expr::Call { name, args } => {
                let def = functions::lookup(name)
                    .ok_or_else(|| eval_err(format!("unknown function '{name}'")))?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.evaluate(ctx)?);
                }
                (def.apply)(&values)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use super::*;

    fn ctx_with_fields(fields: &HashMap<String, f64>) -> EvalContext<'_> {
        EvalContext {
            distances: EdgeDistances {
                euclidean: 5.0,
                manhattan: 7.0,
                geodesic: Some(11.0),
                active: 5.0,
            },
            fields,
            rasters: None,
        }
    }

    fn eval_with_length(text: &str, length: f64) -> Result<f64> {
        let mut fields = HashMap::new();
        fields.insert("length".to_string(), length);
        parse(text)?.evaluate(&ctx_with_fields(&fields))
    }

    #[test]
    fn conditional_picks_branches() {
        let expr = "if(field:length > 100, field:length * 2, field:length)";
        assert_eq!(eval_with_length(expr, 50.0).unwrap(), 50.0);
        assert_eq!(eval_with_length(expr, 150.0).unwrap(), 300.0);
    }

    #[test]
    fn division_by_zero_fails() {
        let err = eval_with_length("1 / 0", 0.0).expect_err("div by zero");
        assert!(matches!(err, Error::Evaluation(_)));
    }

    #[test]
    fn metric_keywords_resolve() {
        let fields = HashMap::new();
        let ctx = ctx_with_fields(&fields);
        assert_eq!(parse("euclidean").unwrap().evaluate(&ctx).unwrap(), 5.0);
        assert_eq!(parse("manhattan").unwrap().evaluate(&ctx).unwrap(), 7.0);
        assert_eq!(parse("geodesic").unwrap().evaluate(&ctx).unwrap(), 11.0);
        assert_eq!(parse("distance").unwrap().evaluate(&ctx).unwrap(), 5.0);
    }

    #[test]
    fn geodesic_unavailable_for_projected_coords() {
        let fields = HashMap::new();
        let mut ctx = ctx_with_fields(&fields);
        ctx.distances.geodesic = None;
        let err = parse("geodesic").unwrap().evaluate(&ctx).expect_err("no geodesic");
        assert!(matches!(err, Error::Evaluation(_)));
    }

    #[test]
    fn raster_aggregate_from_context() {
        let fields = HashMap::new();
        let mut rasters = RasterContext::new();
        rasters.insert(0, vec![1.0, 2.0, 3.0]);
        let mut ctx = ctx_with_fields(&fields);
        ctx.rasters = Some(&rasters);
        assert_eq!(parse("raster[0]:mean").unwrap().evaluate(&ctx).unwrap(), 2.0);
    }

    #[test]
    fn missing_raster_is_reported() {
        let fields = HashMap::new();
        let ctx = ctx_with_fields(&fields);
        let err = parse("raster[3]:sum").unwrap().evaluate(&ctx).expect_err("no raster");
        assert!(matches!(err, Error::NoRasterData { raster: 3 }));
    }

    #[test]
    fn unknown_field_fails() {
        let err = eval_with_length("field:speed", 1.0).expect_err("no field");
        assert!(format!("{err}").contains("speed"));
    }

    #[test]
    fn logic_short_circuits() {
        // rhs would divide by zero, but the lhs decides the result first
        assert_eq!(eval_with_length("0 and 1 / 0", 0.0).unwrap(), 0.0);
        assert_eq!(eval_with_length("1 or 1 / 0", 0.0).unwrap(), 1.0);
        assert_eq!(eval_with_length("not 0", 0.0).unwrap(), 1.0);
    }

    #[test]
    fn pow_operator() {
        assert_eq!(eval_with_length("2 ^ 10", 0.0).unwrap(), 1024.0);
    }
}
