use approx::assert_relative_eq;
use is_close::is_close;
use scghg_core::adjustment::adjustment_factor;
use scghg_core::combine::{Combiner, ReductionMode};
use scghg_core::config::{Config, Deflator, DiscountRatePair, SectorConfig};
use scghg_core::engine::{
    DiscountingType, EngineProvenance, Recipe, RecipeDiscount, ValuationEngine, ValuationOutput,
    ValuationRequest, ValuationScope,
};
use scghg_core::labeled::{Coord, Label, LabeledArray, GAS_DIM, REGION_DIM, RUN_DIM, YEAR_DIM};
use scghg_core::provenance::{MetaValue, RunContext};
use scghg_core::sweep::{
    Sweep, SweepRequest, DISCOUNT_RATE_DIM, MENU_OPTION_DIM, PULSE_YEAR_DIM, SECTOR_DIM,
};
use scghg_core::{EngineError, ScghgError};
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};

const RUNS: i64 = 4;
const COMBINED: &str = "CAMEL_m1_c0.20";

/// Deterministic engine: damages grow with run, year and gas index, domestic
/// damages are half the global ones.
#[derive(Default)]
struct StubEngine {
    calls: Cell<usize>,
    fail_sector: Option<String>,
}

impl ValuationEngine for StubEngine {
    fn compute(&self, request: &ValuationRequest) -> Result<ValuationOutput, EngineError> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        if self.fail_sector.as_deref() == Some(request.sector.as_str()) {
            return Err(EngineError::MissingDamageFunction(PathBuf::from(&request.sector)));
        }

        let runs: Vec<i64> = (1..=RUNS).collect();
        let years: Vec<i64> = (request.pulse_year..request.pulse_year + 3).collect();
        let scale = match request.scope {
            ValuationScope::Global => 1.0,
            ValuationScope::Domestic => 0.5,
        };

        let mut damages = Vec::new();
        let mut factors = Vec::new();
        let mut consumption = Vec::new();
        for run in &runs {
            for t in 0..years.len() {
                for g in 0..request.gases.len() {
                    damages.push(scale * *run as f64 * (t + 1) as f64 * (g + 1) as f64);
                }
                factors.push(0.97f64.powi(t as i32));
                consumption.push(1000.0 * *run as f64 * (1.0 + 0.02 * t as f64));
            }
        }

        let mut provenance = EngineProvenance::for_request(request);
        provenance.base_period = Some("2001-2010".to_string());
        provenance
            .extra
            .insert("commit".to_string(), format!("c{}", call).into());

        Ok(ValuationOutput {
            marginal_damages: LabeledArray::from_vec(
                "marginal_damages",
                vec![
                    Coord::new(RUN_DIM, runs.clone()),
                    Coord::new(YEAR_DIM, years.clone()),
                    Coord::new(GAS_DIM, request.gases.clone()),
                    Coord::new(REGION_DIM, ["world"]),
                ],
                damages,
            )
            .unwrap()
            .with_scalar_coord("simulation", call as i64),
            discount_factors: LabeledArray::from_vec(
                "discount_factors",
                vec![Coord::new(RUN_DIM, runs.clone()), Coord::new(YEAR_DIM, years.clone())],
                factors,
            )
            .unwrap(),
            global_consumption_no_pulse: LabeledArray::from_vec(
                "global_consumption_no_pulse",
                vec![Coord::new(RUN_DIM, runs), Coord::new(YEAR_DIM, years)],
                consumption,
            )
            .unwrap(),
            provenance,
        })
    }
}

fn config(root: &Path) -> Config {
    let mut config = Config::new(root.join("out"));
    for sector in [COMBINED, "coastal_v0.20"] {
        config.sectors.insert(
            sector.to_string(),
            SectorConfig {
                formula: "damages ~ -1 + anomaly + np.power(anomaly, 2)".to_string(),
            },
        );
    }
    config
}

fn context() -> RunContext {
    RunContext {
        author: "analyst".to_string(),
        machine: "node-1".to_string(),
        commit: None,
        created: "2024-01-01 00:00:00".to_string(),
        units: "Real 2020 USD per metric ton".to_string(),
    }
}

/// World population of 10 in every run and year.
fn population() -> LabeledArray {
    let years: Vec<i64> = (2020..=2032).collect();
    let n = RUNS as usize * years.len();
    LabeledArray::from_vec(
        "population",
        vec![Coord::new(RUN_DIM, 1..=RUNS), Coord::new(YEAR_DIM, years)],
        vec![10.0; n],
    )
    .unwrap()
}

fn request(pairs: Vec<DiscountRatePair>, pulse_years: Vec<i64>) -> SweepRequest {
    SweepRequest {
        sectors: vec![COMBINED.to_string()],
        scope: ValuationScope::Global,
        discount_rates: pairs,
        recipe_discounts: RecipeDiscount::default_combos(),
        pulse_years,
        full_distribution: false,
        consumption_path: false,
    }
}

fn count_files(dir: &Path, extension: &str) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some(extension))
        .count()
}

fn cell_value(array: &LabeledArray, discount: &str, pulse_year: i64) -> f64 {
    array
        .select(&[
            (DISCOUNT_RATE_DIM, Label::from(discount)),
            (MENU_OPTION_DIM, Label::from("risk_aversion")),
            (SECTOR_DIM, Label::from("combined")),
            (PULSE_YEAR_DIM, Label::from(pulse_year)),
            (REGION_DIM, Label::from("world")),
        ])
        .unwrap()
        .scalar_value()
        .unwrap()
}

#[test]
fn eta_changes_adjustment_but_not_discounted_sums() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let engine = StubEngine::default();

    let pairs = vec![DiscountRatePair::new(1.0, 0.0), DiscountRatePair::new(2.0, 0.0)];
    let mut sums = Vec::new();
    let mut adjustments = Vec::new();
    for pair in &pairs {
        let req = ValuationRequest::global(
            &config,
            COMBINED,
            RecipeDiscount::default_combos()[0],
            pair,
            2020,
        )
        .unwrap();
        let out = engine.compute(&req).unwrap();
        adjustments.push(
            adjustment_factor(&out.global_consumption_no_pulse, &population(), pair.eta, 2020)
                .unwrap(),
        );
        sums.push(
            Combiner::new(&engine, &Deflator::default())
                .combine(
                    &out.marginal_damages,
                    &out.discount_factors,
                    None,
                    ReductionMode::ConstantDiscount,
                    &req,
                    false,
                )
                .unwrap(),
        );
    }
    assert_ne!(adjustments[0], adjustments[1]);
    assert_eq!(sums[0].data(), sums[1].data());

    let sweep = Sweep::new(&config, &engine, context()).with_population(population());
    let outputs = sweep.run(&request(pairs, vec![2020])).unwrap();
    let co2 = outputs.groups[0].gas("CO2").unwrap();
    let low = cell_value(&co2, "1.0_0.0", 2020);
    let high = cell_value(&co2, "2.0_0.0", 2020);
    assert!(!is_close!(low, high));

    // per-capita consumption is 100 * run in the pulse year
    let k: f64 = (0..3).map(|t| (t + 1) as f64 * 0.97f64.powi(t)).sum();
    let weights: Vec<f64> = (1..=RUNS).map(|r| (100.0 * r as f64).powf(-2.0)).collect();
    let mean_weight = weights.iter().sum::<f64>() / RUNS as f64;
    let expected = (1..=RUNS)
        .zip(&weights)
        .map(|(r, w)| w / mean_weight * r as f64 * k)
        .sum::<f64>()
        / RUNS as f64
        * Deflator::default().factor();
    assert_relative_eq!(high, expected, max_relative = 1e-10);
}

#[test]
fn writes_one_file_per_gas_and_pulse_year() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let engine = StubEngine::default();
    let pair = DiscountRatePair::new(1.421158116, 0.00461878399);
    let mut req = request(vec![pair], vec![2020, 2030]);
    req.full_distribution = true;

    let outputs = Sweep::new(&config, &engine, context())
        .with_population(population())
        .run(&req)
        .unwrap();
    assert_eq!(outputs.groups.len(), 2);
    assert_eq!(engine.calls.get(), 2);

    let scope_dir = config.output_root.join("global_scghgs");
    let gases = config.gases.len();
    assert_eq!(count_files(&scope_dir, "csv"), 2 * gases);
    assert!(scope_dir.join("sc-CO2-dscim-combined-2020.csv").is_file());
    assert!(scope_dir.join("sc-N2O-dscim-combined-2030.csv").is_file());

    let mut full_csv = 0;
    let mut full_attrs = 0;
    for symbol in ["CO2", "CH4", "N2O"] {
        let gas_dir = scope_dir.join("full_distributions").join(symbol);
        full_csv += count_files(&gas_dir, "csv");
        full_attrs += count_files(&gas_dir, "txt");
        assert!(gas_dir
            .join(format!("sc-{}-dscim-combined-2020-n{}.csv", symbol, RUNS))
            .is_file());
    }
    assert_eq!(full_csv, 2 * gases);
    assert_eq!(full_attrs, 2 * gases);

    let csv = fs::read_to_string(scope_dir.join("sc-CH4-dscim-combined-2030.csv")).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("discount_rate,menu_option,pulse_year,region,scghg")
    );
    assert!(lines
        .next()
        .unwrap()
        .starts_with("1.421158116_0.00461878399,risk_aversion,2030,world,"));
}

#[test]
fn empty_discount_rates_fail_before_any_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let engine = StubEngine::default();

    let err = Sweep::new(&config, &engine, context())
        .with_population(population())
        .run(&request(vec![], vec![2020]))
        .unwrap_err();
    assert!(matches!(err, ScghgError::Configuration(_)));
    assert_eq!(engine.calls.get(), 0);
    assert!(!config.output_root.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn provenance_widens_only_differing_keys() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let engine = StubEngine::default();
    let pairs = vec![
        DiscountRatePair::new(1.0, 0.0),
        DiscountRatePair::new(1.5, 0.0),
        DiscountRatePair::new(2.0, 0.0),
    ];

    let outputs = Sweep::new(&config, &engine, context())
        .with_population(population())
        .run(&request(pairs, vec![2020]))
        .unwrap();
    let provenance = &outputs.groups[0].provenance;
    assert_eq!(
        provenance.get("commit"),
        Some(&MetaValue::List(vec!["c1".into(), "c2".into(), "c3".into()]))
    );
    assert_eq!(
        provenance.get("Units"),
        Some(&MetaValue::from("Real 2020 USD per metric ton"))
    );
    assert_eq!(
        provenance.get("combined_base_period"),
        Some(&MetaValue::from("2001-2010"))
    );
    assert_eq!(
        provenance.get("gases"),
        Some(&MetaValue::from(vec!["CO2", "CH4", "N2O"]))
    );
    assert_eq!(outputs.provenance, *provenance);

    let attrs = fs::read_to_string(
        config
            .output_root
            .join("global_scghgs/sc-dscim-combined-2020-attributes.txt"),
    )
    .unwrap();
    assert!(attrs.contains("commit: [c1, c2, c3]\n"));
}

#[test]
fn tagged_cells_are_individually_addressable() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let engine = StubEngine::default();
    let mut req = request(
        vec![DiscountRatePair::new(1.0, 0.0), DiscountRatePair::new(2.0, 0.0)],
        vec![2020],
    );
    req.sectors.push("coastal_v0.20".to_string());

    let outputs = Sweep::new(&config, &engine, context())
        .with_population(population())
        .run(&req)
        .unwrap();
    let collapsed = &outputs.groups[0].collapsed;
    assert_eq!(
        &collapsed.dims()[..4],
        &[DISCOUNT_RATE_DIM, MENU_OPTION_DIM, SECTOR_DIM, PULSE_YEAR_DIM]
    );
    assert!(collapsed.scalar_coord("simulation").is_none());
    assert!(collapsed.values().all(f64::is_finite));
    for discount in ["1.0_0.0", "2.0_0.0"] {
        for sector in ["combined", "coastal"] {
            let slice = collapsed
                .select(&[
                    (DISCOUNT_RATE_DIM, Label::from(discount)),
                    (SECTOR_DIM, Label::from(sector)),
                ])
                .unwrap();
            assert_eq!(slice.len(), config.gases.len());
        }
    }
}

#[test]
fn domestic_uses_domestic_damages_and_global_discounting() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let constant = RecipeDiscount::new(Recipe::AddingUp, DiscountingType::Constant);

    let mut global_req = request(vec![DiscountRatePair::new(2.0, 0.0)], vec![2020]);
    global_req.recipe_discounts = vec![constant];
    let mut domestic_req = global_req.clone();
    domestic_req.scope = ValuationScope::Domestic;

    let engine = StubEngine::default();
    let global = Sweep::new(&config, &engine, context()).run(&global_req).unwrap();
    assert_eq!(engine.calls.get(), 1);

    let engine = StubEngine::default();
    let domestic = Sweep::new(&config, &engine, context()).run(&domestic_req).unwrap();
    assert_eq!(engine.calls.get(), 2);
    assert!(config
        .output_root
        .join("domestic_scghgs/sc-CO2-dscim-combined-2020.csv")
        .is_file());

    let g = &global.groups[0].collapsed;
    let d = &domestic.groups[0].collapsed;
    for (gv, dv) in g.values().zip(d.values()) {
        assert_relative_eq!(dv, 0.5 * gv, max_relative = 1e-12);
    }
    assert_eq!(
        domestic.provenance.get("sector"),
        Some(&MetaValue::from("CAMEL_m1_c0.20_USA"))
    );
}

#[test]
fn engine_failures_name_the_cell() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let engine = StubEngine {
        fail_sector: Some("coastal_v0.20".to_string()),
        ..Default::default()
    };
    let mut req = request(vec![DiscountRatePair::new(2.0, 0.0)], vec![2030]);
    req.sectors.push("coastal_v0.20".to_string());

    let err = Sweep::new(&config, &engine, context())
        .with_population(population())
        .run(&req)
        .unwrap_err();
    match &err {
        ScghgError::Cell {
            sector, pulse_year, ..
        } => {
            assert_eq!(sector, "coastal_v0.20");
            assert_eq!(*pulse_year, 2030);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(matches!(
        err.root(),
        ScghgError::Engine(EngineError::MissingDamageFunction(_))
    ));
    assert!(err.to_string().contains("coastal_v0.20"));
}

#[test]
fn consumption_paths_are_written_with_provenance() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let engine = StubEngine::default();
    let mut req = request(vec![DiscountRatePair::labelled(2.0, 0.0, "2.0% Ramsey")], vec![2020]);
    req.consumption_path = true;

    let outputs = Sweep::new(&config, &engine, context())
        .with_population(population())
        .run(&req)
        .unwrap();
    let consumption = outputs.groups[0].consumption.as_ref().unwrap();
    assert_eq!(
        consumption.dims(),
        vec![DISCOUNT_RATE_DIM, MENU_OPTION_DIM, SECTOR_DIM, PULSE_YEAR_DIM, RUN_DIM, YEAR_DIM]
    );

    let path = config.output_root.join(
        "global_scghgs/consumption/global_consumption_no_pulse-risk_aversion-euler_ramsey-2020.nc4",
    );
    let file = netcdf::open(&path).unwrap();
    assert!(file.attribute("menu_option").is_some());
    assert_eq!(file.dimension(RUN_DIM).map(|d| d.len()), Some(RUNS as usize));
    assert_eq!(file.dimension(YEAR_DIM).map(|d| d.len()), Some(3));
    assert!(file.variable("global_consumption_no_pulse").is_some());
    assert!(file.variable(DISCOUNT_RATE_DIM).unwrap().attribute("labels").is_some());
}
