use std::collections::BTreeMap;

use proptest::prelude::*;
use simcache_core::params::{ParamValue, Params};
use simcache_core::SimError;
use simcache_fp::{
    compute, AllowList, CanonicalOptions, CodeVersion, Environment, FingerprintEngine,
};

fn env_with(os: &str) -> Environment {
    let mut facts = BTreeMap::new();
    facts.insert("arch".to_string(), "x86_64".to_string());
    facts.insert("os".to_string(), os.to_string());
    facts.insert("simcache".to_string(), "0.1.0".to_string());
    Environment::from_facts(facts, &AllowList::builtin()).unwrap()
}

fn base_params() -> Params {
    let mut params = Params::new();
    params.insert("steps".into(), ParamValue::Int(100));
    params.insert("dt".into(), ParamValue::Float(0.01));
    params.insert("label".into(), ParamValue::Str("baseline".into()));
    params
}

fn code() -> CodeVersion {
    CodeVersion::new("sha256:feedface").unwrap()
}

#[test]
fn compute_is_deterministic() {
    let env = env_with("linux");
    let a = compute(&code(), &base_params(), 7, &env).unwrap();
    let b = compute(&code(), &base_params(), 7, &env).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.as_str().len(), 64);
}

#[test]
fn each_facet_changes_the_fingerprint() {
    let env = env_with("linux");
    let base = compute(&code(), &base_params(), 7, &env).unwrap();

    let mut params = base_params();
    params.insert("steps".into(), ParamValue::Int(200));
    assert_ne!(base, compute(&code(), &params, 7, &env).unwrap(), "params");

    assert_ne!(base, compute(&code(), &base_params(), 8, &env).unwrap(), "seed");

    assert_ne!(
        base,
        compute(&code(), &base_params(), 7, &env_with("macos")).unwrap(),
        "environment"
    );

    let other_code = CodeVersion::new("sha256:deadbeef").unwrap();
    assert_ne!(
        base,
        compute(&other_code, &base_params(), 7, &env).unwrap(),
        "code_version"
    );
}

#[test]
fn int_and_float_params_do_not_collide() {
    let env = env_with("linux");
    let mut int_params = Params::new();
    int_params.insert("n".into(), ParamValue::Int(1));
    let mut float_params = Params::new();
    float_params.insert("n".into(), ParamValue::Float(1.0));
    let mut text_params = Params::new();
    text_params.insert("n".into(), ParamValue::Str("1".into()));
    let a = compute(&code(), &int_params, 0, &env).unwrap();
    let b = compute(&code(), &float_params, 0, &env).unwrap();
    let c = compute(&code(), &text_params, 0, &env).unwrap();
    assert_ne!(a, b);
    assert_ne!(a, c);
    assert_ne!(b, c);
}

#[test]
fn yaml_and_json_inputs_agree() {
    let env = env_with("linux");
    let from_yaml: Params = serde_yaml::from_str("steps: 100\ndt: 0.01\nlabel: baseline\n").unwrap();
    let from_json: Params =
        serde_json::from_str(r#"{"label":"baseline","dt":0.01,"steps":100}"#).unwrap();
    assert_eq!(
        compute(&code(), &from_yaml, 3, &env).unwrap(),
        compute(&code(), &from_json, 3, &env).unwrap()
    );
}

#[test]
fn non_finite_params_need_opt_in() {
    let env = env_with("linux");
    let mut params = base_params();
    params.insert("dt".into(), ParamValue::Float(f64::INFINITY));
    assert!(matches!(
        compute(&code(), &params, 0, &env),
        Err(SimError::UnhashableInput(_))
    ));
    let lenient = FingerprintEngine::new(CanonicalOptions {
        allow_non_finite: true,
    });
    assert!(lenient.compute(&code(), &params, 0, &env).is_ok());
}

fn scalar() -> impl Strategy<Value = ParamValue> {
    prop_oneof![
        any::<i64>().prop_map(ParamValue::Int),
        (-1.0e6f64..1.0e6).prop_map(ParamValue::Float),
        "[a-z]{0,6}".prop_map(ParamValue::Str),
        any::<bool>().prop_map(ParamValue::Bool),
    ]
}

proptest! {
    #[test]
    fn key_order_in_source_documents_is_irrelevant(
        entries in proptest::collection::btree_map("[a-z]{1,5}", scalar(), 1..8),
        seed in any::<u64>(),
    ) {
        let env = env_with("linux");
        let render = |pairs: Vec<(&String, &ParamValue)>| {
            let body: Vec<String> = pairs
                .into_iter()
                .map(|(key, value)| format!("{}:{}", serde_json::Value::from(key.as_str()), value.to_json()))
                .collect();
            format!("{{{}}}", body.join(","))
        };
        let forward_text = render(entries.iter().collect());
        let backward_text = render(entries.iter().rev().collect());
        let forward: Params = serde_json::from_str(&forward_text).unwrap();
        let backward: Params = serde_json::from_str(&backward_text).unwrap();
        prop_assert_eq!(
            compute(&code(), &forward, seed, &env).unwrap(),
            compute(&code(), &backward, seed, &env).unwrap()
        );
    }

    #[test]
    fn recomputation_is_stable(
        entries in proptest::collection::btree_map("[a-z]{1,5}", scalar(), 0..8),
        seed in any::<u64>(),
    ) {
        let env = env_with("linux");
        let params: Params = entries;
        prop_assert_eq!(
            compute(&code(), &params, seed, &env).unwrap(),
            compute(&code(), &params.clone(), seed, &env).unwrap()
        );
    }
}
