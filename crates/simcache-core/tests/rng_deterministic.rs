use rand::RngCore;
use simcache_core::rng::RngHandle;

#[test]
fn rng_emits_reproducible_sequence() {
    let mut rng_a = RngHandle::from_seed(1234);
    let mut rng_b = RngHandle::from_seed(1234);

    let seq_a: Vec<u64> = (0..100).map(|_| rng_a.next_u64()).collect();
    let seq_b: Vec<u64> = (0..100).map(|_| rng_b.next_u64()).collect();

    assert_eq!(seq_a, seq_b);
}

#[test]
fn normal_samples_are_finite_and_seed_dependent() {
    let mut rng_a = RngHandle::from_seed(1);
    let mut rng_b = RngHandle::from_seed(2);
    let a: Vec<f64> = (0..256).map(|_| rng_a.standard_normal()).collect();
    let b: Vec<f64> = (0..256).map(|_| rng_b.standard_normal()).collect();
    assert!(a.iter().all(|v| v.is_finite()));
    assert_ne!(a, b);
    let mean = a.iter().sum::<f64>() / a.len() as f64;
    assert!(mean.abs() < 0.3, "mean {mean} too far from zero");
}
