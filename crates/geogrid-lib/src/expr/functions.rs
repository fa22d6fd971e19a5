//! Registry of named functions callable from cost expressions, plus the
//! raster aggregate statistics.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use rand::Rng;

use crate::error::{Error, Result};

use super::RasterStat;

/// Registry grouping, mirroring the cost-function dialog's catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionGroup {
    Math,
    Random,
}

/// A registered pure function over numeric arguments.
pub struct FunctionDef {
    pub name: &'static str,
    pub arity: usize,
    pub group: FunctionGroup,
    pub apply: fn(&[f64]) -> Result<f64>,
}

fn eval_err(message: impl Into<String>) -> Error {
    Error::Evaluation(message.into())
}

fn check_finite(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(eval_err(format!("{name} produced a non-finite result")))
    }
}

fn factorial(args: &[f64]) -> Result<f64> {
    let x = args[0];
    if x < 0.0 || x.fract() != 0.0 {
        return Err(eval_err(format!(
            "factorial requires a non-negative integer, got {x}"
        )));
    }
    if x > 170.0 {
        return Err(eval_err(format!("factorial({x}) overflows")));
    }
    let mut acc = 1.0f64;
    let mut k = 2.0f64;
    while k <= x {
        acc *= k;
        k += 1.0;
    }
    Ok(acc)
}

fn gcd(args: &[f64]) -> Result<f64> {
    if args[0].fract() != 0.0 || args[1].fract() != 0.0 {
        return Err(eval_err("gcd requires integer arguments"));
    }
    let mut a = (args[0].abs()) as u64;
    let mut b = (args[1].abs()) as u64;
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    Ok(a as f64)
}

fn random(args: &[f64]) -> Result<f64> {
    let (lo, hi) = (args[0], args[1]);
    if !lo.is_finite() || !hi.is_finite() || lo > hi {
        return Err(eval_err(format!("random bounds [{lo}, {hi}] are invalid")));
    }
    if lo == hi {
        return Ok(lo);
    }
    Ok(rand::rng().random_range(lo..hi))
}

macro_rules! math_fn {
    ($name:literal, 1, $body:expr) => {
        FunctionDef {
            name: $name,
            arity: 1,
            group: FunctionGroup::Math,
            apply: $body,
        }
    };
    ($name:literal, 2, $body:expr) => {
        FunctionDef {
            name: $name,
            arity: 2,
            group: FunctionGroup::Math,
            apply: $body,
        }
    };
}

static REGISTRY: Lazy<HashMap<&'static str, FunctionDef>> = Lazy::new(|| {
    let defs = vec![
        math_fn!("abs", 1, |a| Ok(a[0].abs())),
        math_fn!("acos", 1, |a| {
            if a[0].abs() > 1.0 {
                return Err(eval_err(format!("acos argument {} out of [-1, 1]", a[0])));
            }
            Ok(a[0].acos())
        }),
        math_fn!("asin", 1, |a| {
            if a[0].abs() > 1.0 {
                return Err(eval_err(format!("asin argument {} out of [-1, 1]", a[0])));
            }
            Ok(a[0].asin())
        }),
        math_fn!("atan", 1, |a| Ok(a[0].atan())),
        math_fn!("atan2", 2, |a| Ok(a[0].atan2(a[1]))),
        math_fn!("ceil", 1, |a| Ok(a[0].ceil())),
        math_fn!("cos", 1, |a| Ok(a[0].cos())),
        math_fn!("cosh", 1, |a| check_finite("cosh", a[0].cosh())),
        math_fn!("exp", 1, |a| check_finite("exp", a[0].exp())),
        math_fn!("floor", 1, |a| Ok(a[0].floor())),
        math_fn!("hypot", 2, |a| Ok(a[0].hypot(a[1]))),
        math_fn!("ln", 1, |a| {
            if a[0] <= 0.0 {
                return Err(eval_err(format!("ln requires a positive argument, got {}", a[0])));
            }
            Ok(a[0].ln())
        }),
        math_fn!("log10", 1, |a| {
            if a[0] <= 0.0 {
                return Err(eval_err(format!(
                    "log10 requires a positive argument, got {}",
                    a[0]
                )));
            }
            Ok(a[0].log10())
        }),
        math_fn!("log2", 1, |a| {
            if a[0] <= 0.0 {
                return Err(eval_err(format!(
                    "log2 requires a positive argument, got {}",
                    a[0]
                )));
            }
            Ok(a[0].log2())
        }),
        math_fn!("max", 2, |a| Ok(a[0].max(a[1]))),
        math_fn!("min", 2, |a| Ok(a[0].min(a[1]))),
        math_fn!("pow", 2, |a| {
            let value = a[0].powf(a[1]);
            if value.is_nan() {
                return Err(eval_err(format!("pow({}, {}) is undefined", a[0], a[1])));
            }
            check_finite("pow", value)
        }),
        math_fn!("round", 1, |a| Ok(a[0].round())),
        math_fn!("sin", 1, |a| Ok(a[0].sin())),
        math_fn!("sinh", 1, |a| check_finite("sinh", a[0].sinh())),
        math_fn!("sqrt", 1, |a| {
            if a[0] < 0.0 {
                return Err(eval_err(format!(
                    "sqrt requires a non-negative argument, got {}",
                    a[0]
                )));
            }
            Ok(a[0].sqrt())
        }),
        math_fn!("tan", 1, |a| Ok(a[0].tan())),
        math_fn!("tanh", 1, |a| Ok(a[0].tanh())),
        math_fn!("trunc", 1, |a| Ok(a[0].trunc())),
        FunctionDef {
            name: "factorial",
            arity: 1,
            group: FunctionGroup::Math,
            apply: factorial,
        },
        FunctionDef {
            name: "gcd",
            arity: 2,
            group: FunctionGroup::Math,
            apply: gcd,
        },
        FunctionDef {
            name: "random",
            arity: 2,
            group: FunctionGroup::Random,
            apply: random,
        },
    ];

    defs.into_iter().map(|def| (def.name, def)).collect()
});

/// Look up a registered function by name.
pub fn lookup(name: &str) -> Option<&'static FunctionDef> {
    REGISTRY.get(name)
}

/// Sorted names of all registered functions.
pub fn function_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = REGISTRY.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Compute the aggregate `stat` over raster samples taken along an edge.
///
/// Gradient statistics use central differences in the interior and one-sided
/// differences at the endpoints.
pub fn raster_aggregate(stat: RasterStat, values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(eval_err(format!(
            "raster statistic {} has no samples",
            stat.name()
        )));
    }

    let n = values.len();
    match stat {
        RasterStat::Sum => Ok(values.iter().sum()),
        RasterStat::Mean => Ok(values.iter().sum::<f64>() / n as f64),
        RasterStat::Median => {
            let mut sorted = values.to_vec();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            if n % 2 == 1 {
                Ok(sorted[n / 2])
            } else {
                Ok((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
            }
        }
        RasterStat::Min => Ok(values.iter().copied().fold(f64::INFINITY, f64::min)),
        RasterStat::Max => Ok(values.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        RasterStat::Variance => {
            if n < 2 {
                return Err(eval_err("variance requires at least two samples"));
            }
            let mean = values.iter().sum::<f64>() / n as f64;
            let sum_sq: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
            Ok(sum_sq / (n - 1) as f64)
        }
        RasterStat::StdDev => raster_aggregate(RasterStat::Variance, values).map(f64::sqrt),
        RasterStat::GradientSum => Ok(gradient(values).into_iter().sum()),
        RasterStat::GradientMin => {
            Ok(gradient(values).into_iter().fold(f64::INFINITY, f64::min))
        }
        RasterStat::GradientMax => Ok(gradient(values)
            .into_iter()
            .fold(f64::NEG_INFINITY, f64::max)),
        RasterStat::Ascent => Ok(values
            .windows(2)
            .filter(|w| w[1] > w[0])
            .map(|w| w[1] - w[0])
            .sum()),
        RasterStat::Descent => Ok(values
            .windows(2)
            .filter(|w| w[0] > w[1])
            .map(|w| w[0] - w[1])
            .sum()),
        RasterStat::TotalClimb => Ok(values.windows(2).map(|w| (w[1] - w[0]).abs()).sum()),
    }
}

fn gradient(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 1 {
        return vec![0.0];
    }
    let mut out = Vec::with_capacity(n);
    out.push(values[1] - values[0]);
    for i in 1..n - 1 {
        out.push((values[i + 1] - values[i - 1]) / 2.0);
    }
    out.push(values[n - 1] - values[n - 2]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agg(stat: RasterStat, values: &[f64]) -> f64 {
        raster_aggregate(stat, values).unwrap()
    }

    #[test]
    fn basic_aggregates() {
        let values = [1.0, 3.0, 2.0, 5.0];
        assert_eq!(agg(RasterStat::Sum, &values), 11.0);
        assert_eq!(agg(RasterStat::Mean, &values), 2.75);
        assert_eq!(agg(RasterStat::Median, &values), 2.5);
        assert_eq!(agg(RasterStat::Min, &values), 1.0);
        assert_eq!(agg(RasterStat::Max, &values), 5.0);
    }

    #[test]
    fn climb_aggregates() {
        let values = [1.0, 3.0, 2.0, 5.0];
        assert_eq!(agg(RasterStat::Ascent, &values), 5.0);
        assert_eq!(agg(RasterStat::Descent, &values), 1.0);
        assert_eq!(agg(RasterStat::TotalClimb, &values), 6.0);
    }

    #[test]
    fn gradient_aggregates() {
        let values = [1.0, 3.0, 2.0, 5.0];
        // gradient = [2.0, 0.5, 1.0, 3.0]
        assert_eq!(agg(RasterStat::GradientSum, &values), 6.5);
        assert_eq!(agg(RasterStat::GradientMin, &values), 0.5);
        assert_eq!(agg(RasterStat::GradientMax, &values), 3.0);
    }

    #[test]
    fn variance_and_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let variance = agg(RasterStat::Variance, &values);
        assert!((variance - 4.571428571428571).abs() < 1e-12);
        assert!((agg(RasterStat::StdDev, &values) - variance.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn empty_samples_are_rejected() {
        let err = raster_aggregate(RasterStat::Mean, &[]).expect_err("no samples");
        assert!(matches!(err, Error::Evaluation(_)));
    }

    #[test]
    fn factorial_domain() {
        assert_eq!((lookup("factorial").unwrap().apply)(&[5.0]).unwrap(), 120.0);
        assert!((lookup("factorial").unwrap().apply)(&[-1.0]).is_err());
        assert!((lookup("factorial").unwrap().apply)(&[2.5]).is_err());
    }

    #[test]
    fn gcd_of_integers() {
        assert_eq!((lookup("gcd").unwrap().apply)(&[12.0, 18.0]).unwrap(), 6.0);
        assert!((lookup("gcd").unwrap().apply)(&[1.5, 2.0]).is_err());
    }

    #[test]
    fn random_stays_in_bounds() {
        for _ in 0..32 {
            let v = (lookup("random").unwrap().apply)(&[2.0, 3.0]).unwrap();
            assert!((2.0..3.0).contains(&v));
        }
        assert_eq!((lookup("random").unwrap().apply)(&[4.0, 4.0]).unwrap(), 4.0);
        assert!((lookup("random").unwrap().apply)(&[5.0, 4.0]).is_err());
    }

    #[test]
    fn sqrt_rejects_negative() {
        assert!((lookup("sqrt").unwrap().apply)(&[-1.0]).is_err());
    }
}
