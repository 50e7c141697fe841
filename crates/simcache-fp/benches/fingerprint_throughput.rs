use criterion::{criterion_group, criterion_main, Criterion};
use simcache_core::params::{ParamValue, Params};
use simcache_fp::{AllowList, CodeVersion, Environment, FingerprintEngine};

fn make_params() -> Params {
    let mut params = Params::new();
    params.insert("steps".into(), ParamValue::Int(1000));
    params.insert("dt".into(), ParamValue::Float(0.001));
    params.insert(
        "weights".into(),
        ParamValue::List((0..64).map(|i| ParamValue::Float(i as f64 * 0.125)).collect()),
    );
    params
}

fn bench_fingerprint(c: &mut Criterion) {
    let engine = FingerprintEngine::default();
    let code = CodeVersion::from_source_bytes(b"def run(params, seed): ...");
    let env = Environment::capture(&AllowList::builtin());
    let params = make_params();
    c.bench_function("fingerprint_compute", |b| {
        b.iter(|| {
            let _ = engine.compute(&code, &params, 42, &env).expect("fingerprint");
        });
    });
}

criterion_group!(benches, bench_fingerprint);
criterion_main!(benches);
