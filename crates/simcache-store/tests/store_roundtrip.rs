use std::sync::Arc;
use std::thread;

use serde_json::json;
use simcache_core::array::{NamedArrays, NdArray};
use simcache_core::errors::SimError;
use simcache_core::params::{ParamValue, Params};
use simcache_fp::{compute, AllowList, CanonicalOptions, CodeVersion, Environment, FingerprintEngine};
use simcache_store::{
    ExportFormat, ListFilter, Metadata, PutOutcome, RunFacets, RunRecord, RunStore,
};
use tempfile::tempdir;

fn record(steps: i64, seed: u64, tags: &[&str]) -> RunRecord {
    let code = CodeVersion::builtin("test-sim");
    let mut params = Params::new();
    params.insert("steps".into(), ParamValue::Int(steps));
    params.insert("dt".into(), ParamValue::Float(0.01));
    let env = Environment::capture(&AllowList::builtin());
    let fp = compute(&code, &params, seed, &env).expect("fingerprint");
    let mut arrays = NamedArrays::new();
    arrays.insert(
        "t".into(),
        NdArray::from_vec((0..steps).map(|i| i as f64 * 0.01).collect()),
    );
    arrays.insert(
        "grid".into(),
        NdArray::new(vec![2, 2], vec![1.0, 2.0, 3.0, seed as f64]).expect("shape"),
    );
    let mut metadata = Metadata::new();
    metadata.insert("units".into(), json!({"t": "s"}));
    RunRecord::new(
        fp,
        RunFacets {
            code_version: code,
            params,
            seed,
            environment: env,
        },
        arrays,
        metadata,
        tags.iter().map(|tag| tag.to_string()),
    )
}

#[test]
fn put_then_get_returns_equal_record() {
    let dir = tempdir().expect("tempdir");
    let store = RunStore::open(dir.path()).expect("open");
    let rec = record(5, 1, &["baseline"]);
    assert!(!store.exists(&rec.fingerprint).expect("exists"));
    assert_eq!(store.put(&rec).expect("put"), PutOutcome::Committed);
    assert!(store.exists(&rec.fingerprint).expect("exists"));
    let loaded = store.get(&rec.fingerprint).expect("get");
    assert_eq!(loaded, rec);

    let doc = store.info(&rec.fingerprint).expect("info");
    assert_eq!(doc.arrays["grid"].shape, vec![2, 2]);
    assert_eq!(doc.tags, vec!["baseline".to_string()]);
    assert_eq!(doc.content_digest, rec.content_digest().expect("digest"));
}

#[test]
fn identical_put_is_a_noop_and_different_content_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let store = RunStore::open(dir.path()).expect("open");
    let rec = record(3, 7, &[]);
    store.put(&rec).expect("first put");

    let mut relabelled = rec.clone();
    relabelled.tags = vec!["later".into()];
    relabelled.created_at = "2099-01-01T00:00:00.000000Z".into();
    assert_eq!(store.put(&relabelled).expect("second put"), PutOutcome::AlreadyPresent);

    let restyled = rec.clone().with_plot_config(Some(json!({"title": "t"})));
    assert_eq!(store.put(&restyled).expect("third put"), PutOutcome::AlreadyPresent);
    assert_eq!(store.get(&rec.fingerprint).expect("get").plot_config, None);

    let mut drifted = rec.clone();
    drifted.arrays.insert("t".into(), NdArray::from_vec(vec![9.0]));
    let err = store.put(&drifted).expect_err("content differs");
    assert!(matches!(err, SimError::DuplicateRun(_)));
    assert_eq!(err.info().context["fingerprint"], rec.fingerprint.to_string());
    assert_eq!(store.get(&rec.fingerprint).expect("get"), rec);
}

#[test]
fn non_finite_params_round_trip_through_the_record() {
    let dir = tempdir().expect("tempdir");
    let store = RunStore::open(dir.path()).expect("open");
    let engine = FingerprintEngine::new(CanonicalOptions {
        allow_non_finite: true,
    });
    let code = CodeVersion::builtin("test-sim");
    let mut params = Params::new();
    params.insert("x".into(), ParamValue::Float(f64::INFINITY));
    params.insert("y".into(), ParamValue::Float(f64::NEG_INFINITY));
    let env = Environment::capture(&AllowList::builtin());
    let fp = engine.compute(&code, &params, 4, &env).expect("fingerprint");
    let mut arrays = NamedArrays::new();
    arrays.insert("v".into(), NdArray::scalar(1.0));
    let rec = RunRecord::new(
        fp,
        RunFacets {
            code_version: code,
            params,
            seed: 4,
            environment: env,
        },
        arrays,
        Metadata::new(),
        Vec::new(),
    );
    store.put(&rec).expect("put");

    let loaded = store.get(&rec.fingerprint).expect("get");
    assert_eq!(loaded, rec);
    assert_eq!(loaded.facets.params["x"], ParamValue::Float(f64::INFINITY));
    let facets = &loaded.facets;
    let recomputed = engine
        .compute(&facets.code_version, &facets.params, facets.seed, &facets.environment)
        .expect("fingerprint");
    assert_eq!(recomputed, rec.fingerprint);
}

#[test]
fn missing_runs_are_reported_as_not_found() {
    let dir = tempdir().expect("tempdir");
    let store = RunStore::open(dir.path()).expect("open");
    let rec = record(2, 0, &[]);
    assert!(matches!(store.get(&rec.fingerprint), Err(SimError::RunNotFound(_))));
    assert!(matches!(store.info(&rec.fingerprint), Err(SimError::RunNotFound(_))));
    assert!(matches!(store.resolve("deadbeefdeadbeef"), Err(SimError::RunNotFound(_))));
    assert!(matches!(store.resolve("not-hex"), Err(SimError::RunNotFound(_))));
}

#[test]
fn list_filters_by_tag_newest_first() {
    let dir = tempdir().expect("tempdir");
    let store = RunStore::open(dir.path()).expect("open");
    let mut old = record(2, 1, &["paper"]);
    old.created_at = "2024-01-01T00:00:00.000000Z".into();
    let mut new = record(2, 2, &["paper", "draft"]);
    new.created_at = "2024-06-01T00:00:00.000000Z".into();
    let mut other = record(2, 3, &["scratch"]);
    other.created_at = "2024-09-01T00:00:00.000000Z".into();
    for rec in [&old, &new, &other] {
        store.put(rec).expect("put");
    }

    let all = store.list(&ListFilter::default()).expect("list");
    let order: Vec<_> = all.iter().map(|s| s.fingerprint.clone()).collect();
    assert_eq!(
        order,
        vec![
            other.fingerprint.clone(),
            new.fingerprint.clone(),
            old.fingerprint.clone()
        ]
    );

    let paper = store.list(&ListFilter::tagged("paper")).expect("list");
    assert_eq!(paper.len(), 2);
    assert_eq!(paper[0].fingerprint, new.fingerprint);
    assert_eq!(paper[0].tags, vec!["draft".to_string(), "paper".to_string()]);

    let latest = store.latest("paper").expect("latest");
    assert_eq!(latest.fingerprint, new.fingerprint);
    assert!(matches!(store.latest("missing"), Err(SimError::RunNotFound(_))));

    let limited = store
        .list(&ListFilter {
            tag: None,
            limit: Some(1),
        })
        .expect("list");
    assert_eq!(limited.len(), 1);
}

#[test]
fn resolve_accepts_unique_prefixes() {
    let dir = tempdir().expect("tempdir");
    let store = RunStore::open(dir.path()).expect("open");
    let rec = record(4, 4, &[]);
    store.put(&rec).expect("put");
    let full = rec.fingerprint.as_str();
    assert_eq!(store.resolve(full).expect("full"), rec.fingerprint);
    assert_eq!(store.resolve(&full[..10]).expect("prefix"), rec.fingerprint);
    assert_eq!(
        store.resolve(&full[..10].to_ascii_uppercase()).expect("upper"),
        rec.fingerprint
    );
    let err = store.resolve(&full[..4]).expect_err("too short");
    assert_eq!(err.info().code, "store.prefix_too_short");
}

#[test]
fn export_writes_each_format() {
    let dir = tempdir().expect("tempdir");
    let store = RunStore::open(dir.path().join("store")).expect("open");
    let rec = record(3, 1, &[]);
    store.put(&rec).expect("put");

    let json_path = dir.path().join("out/run.json");
    assert_eq!(
        store.export(&rec.fingerprint, &json_path, None).expect("json"),
        ExportFormat::Json
    );
    let doc: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&json_path).expect("read")).expect("parse");
    assert_eq!(doc["fingerprint"], rec.fingerprint.as_str());
    assert_eq!(doc["arrays"]["grid"], json!([[1.0, 2.0], [3.0, 1.0]]));

    let csv_path = dir.path().join("run.csv");
    store.export(&rec.fingerprint, &csv_path, None).expect("csv");
    let text = std::fs::read_to_string(&csv_path).expect("read");
    assert!(text.starts_with("array,index,value\n"));
    assert!(text.contains("grid,1.0,3\n"));

    let bin_path = dir.path().join("run.bin");
    store.export(&rec.fingerprint, &bin_path, None).expect("bin");
    let arrays: NamedArrays =
        bincode::deserialize(&std::fs::read(&bin_path).expect("read")).expect("decode");
    assert_eq!(arrays, rec.arrays);

    let explicit = dir.path().join("arrays.out");
    store
        .export(&rec.fingerprint, &explicit, Some(ExportFormat::Csv))
        .expect("explicit format");
    assert!(explicit.exists());
}

#[test]
fn failed_exports_create_no_file() {
    let dir = tempdir().expect("tempdir");
    let store = RunStore::open(dir.path().join("store")).expect("open");
    let rec = record(3, 9, &[]);

    let dest = dir.path().join("out.dat");
    let err = store.export(&rec.fingerprint, &dest, None).expect_err("missing run");
    assert!(matches!(err, SimError::RunNotFound(_)));
    assert!(!dest.exists());

    store.put(&rec).expect("put");
    let err = store.export(&rec.fingerprint, &dest, None).expect_err("bad format");
    assert!(matches!(err, SimError::UnsupportedFormat(_)));
    assert!(!dest.exists());
}

#[test]
fn concurrent_writers_of_one_fingerprint_commit_once() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(RunStore::open(dir.path()).expect("open"));
    let rec = Arc::new(record(50, 11, &["race"]));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let rec = Arc::clone(&rec);
            thread::spawn(move || store.put(&rec).expect("put"))
        })
        .collect();
    let outcomes: Vec<PutOutcome> = handles
        .into_iter()
        .map(|handle| handle.join().expect("join"))
        .collect();
    let committed = outcomes
        .iter()
        .filter(|outcome| **outcome == PutOutcome::Committed)
        .count();
    assert_eq!(committed, 1);
    assert_eq!(store.list(&ListFilter::default()).expect("list").len(), 1);
    assert_eq!(store.get(&rec.fingerprint).expect("get"), *rec);
}

#[test]
fn distinct_fingerprints_commit_in_parallel() {
    let dir = tempdir().expect("tempdir");
    let store = RunStore::open(dir.path()).expect("open");
    thread::scope(|scope| {
        for seed in 0..6 {
            let store = &store;
            scope.spawn(move || {
                let rec = record(10, seed, &["parallel"]);
                assert_eq!(store.put(&rec).expect("put"), PutOutcome::Committed);
            });
        }
    });
    assert_eq!(store.list(&ListFilter::tagged("parallel")).expect("list").len(), 6);
}
