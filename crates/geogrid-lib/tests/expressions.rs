//! Parsing and evaluation of cost expressions through the public API.

use std::collections::HashMap;

use geogrid_lib::{parse, EdgeDistances, Error, EvalContext, RasterContext};

fn context(fields: &HashMap<String, f64>) -> EvalContext<'_> {
    EvalContext {
        distances: EdgeDistances {
            euclidean: 100.0,
            manhattan: 140.0,
            geodesic: Some(100_500.0),
            active: 100.0,
        },
        fields,
        rasters: None,
    }
}

fn eval(text: &str) -> Result<f64, Error> {
    let fields = HashMap::new();
    parse(text)?.evaluate(&context(&fields))
}

#[test]
fn arithmetic_precedence() {
    assert_eq!(eval("1 + 2 * 3 - 4 / 2").unwrap(), 5.0);
    assert_eq!(eval("(1 + 2) * 3").unwrap(), 9.0);
    assert_eq!(eval("2 ^ 3 ^ 2").unwrap(), 512.0);
    assert_eq!(eval("-3 + 5").unwrap(), 2.0);
}

#[test]
fn comparisons_yield_booleans() {
    assert_eq!(eval("3 > 2").unwrap(), 1.0);
    assert_eq!(eval("3 < 2").unwrap(), 0.0);
    assert_eq!(eval("2 = 2").unwrap(), 1.0);
    assert_eq!(eval("2 != 2").unwrap(), 0.0);
    assert_eq!(eval("1 > 0 and 2 > 1").unwrap(), 1.0);
    assert_eq!(eval("0 > 1 or 2 > 1").unwrap(), 1.0);
    assert_eq!(eval("not (1 > 0)").unwrap(), 0.0);
}

#[test]
fn conditional_on_field_length() {
    let mut fields = HashMap::new();
    let expr = parse("if(field:length > 100, field:length * 2, field:length)").unwrap();

    fields.insert("length".to_string(), 50.0);
    assert_eq!(expr.evaluate(&context(&fields)).unwrap(), 50.0);

    fields.insert("length".to_string(), 150.0);
    assert_eq!(expr.evaluate(&context(&fields)).unwrap(), 300.0);
}

#[test]
fn metric_keywords() {
    assert_eq!(eval("euclidean").unwrap(), 100.0);
    assert_eq!(eval("manhattan").unwrap(), 140.0);
    assert_eq!(eval("geodesic").unwrap(), 100_500.0);
    assert_eq!(eval("distance").unwrap(), 100.0);
    assert_eq!(eval("euclidean + manhattan / 2").unwrap(), 170.0);
}

#[test]
fn math_functions() {
    assert_eq!(eval("sqrt(16)").unwrap(), 4.0);
    assert_eq!(eval("min(3, max(1, 2))").unwrap(), 2.0);
    assert_eq!(eval("abs(0 - 7)").unwrap(), 7.0);
    assert_eq!(eval("pow(2, 10)").unwrap(), 1024.0);
    assert_eq!(eval("floor(2.7) + ceil(2.1)").unwrap(), 5.0);
    assert_eq!(eval("factorial(5)").unwrap(), 120.0);
    assert_eq!(eval("gcd(12, 18)").unwrap(), 6.0);
}

#[test]
fn evaluation_is_deterministic_without_random() {
    let fields = HashMap::new();
    let expr = parse("sqrt(euclidean) * 3 + if(manhattan > 100, 1, 0)").unwrap();
    let first = expr.evaluate(&context(&fields)).unwrap();
    for _ in 0..5 {
        assert_eq!(expr.evaluate(&context(&fields)).unwrap(), first);
    }
}

#[test]
fn random_is_bounded_but_not_fixed() {
    for _ in 0..32 {
        let v = eval("random(10, 20)").unwrap();
        assert!((10.0..20.0).contains(&v));
    }
}

#[test]
fn syntax_errors_carry_offsets() {
    for bad in ["1 +", "if(1, 2)", "foo(1)", "raster[0]:bogus", "1 ? 2"] {
        match parse(bad) {
            Err(Error::Syntax { .. }) => {}
            other => panic!("expected syntax error for {bad:?}, got {other:?}"),
        }
    }
}

#[test]
fn evaluation_errors() {
    assert!(matches!(eval("1 / 0"), Err(Error::Evaluation(_))));
    assert!(matches!(eval("ln(0)"), Err(Error::Evaluation(_))));
    assert!(matches!(eval("asin(2)"), Err(Error::Evaluation(_))));
    assert!(matches!(eval("field:missing"), Err(Error::Evaluation(_))));
}

#[test]
fn raster_statistics_over_sampled_values() {
    let fields = HashMap::new();
    let mut rasters = RasterContext::new();
    rasters.insert(1, vec![10.0, 12.0, 11.0, 15.0]);
    let mut ctx = context(&fields);
    ctx.rasters = Some(&rasters);

    assert_eq!(parse("raster[1]:sum").unwrap().evaluate(&ctx).unwrap(), 48.0);
    assert_eq!(parse("raster[1]:max").unwrap().evaluate(&ctx).unwrap(), 15.0);
    assert_eq!(
        parse("raster[1]:ascent").unwrap().evaluate(&ctx).unwrap(),
        6.0
    );
    assert_eq!(
        parse("raster[1]:totalClimb").unwrap().evaluate(&ctx).unwrap(),
        7.0
    );
}

#[test]
fn missing_raster_data_is_reported() {
    let err = eval("raster[4]:mean").expect_err("no raster context");
    assert!(matches!(err, Error::NoRasterData { raster: 4 }));
}
