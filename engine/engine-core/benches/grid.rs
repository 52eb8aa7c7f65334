use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use engine_config::WorldConfig;
use engine_core::{Action, GridEnvironment, ValueStore};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn bench_reset(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_reset");
    for (grid_size, hazards) in [(5, 2), (10, 6), (20, 20)] {
        let config = WorldConfig {
            grid_size,
            max_hazards: hazards,
            ..WorldConfig::default()
        };
        group.bench_function(format!("{grid_size}x{grid_size}_{hazards}"), |b| {
            let mut env = GridEnvironment::new(&config, ChaCha20Rng::seed_from_u64(42)).unwrap();
            b.iter(|| env.reset().unwrap());
        });
    }
    group.finish();
}

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_step");
    let env = GridEnvironment::new(&WorldConfig::default(), ChaCha20Rng::seed_from_u64(7)).unwrap();
    group.bench_function("step_and_available", |b| {
        b.iter(|| {
            let step = env.step(12, Action::Right).unwrap();
            env.available_rewards(step.next_state).unwrap()
        });
    });
    group.finish();
}

fn bench_q_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_store");
    group.bench_function("apply_q_update", |b| {
        b.iter_batched(
            || ValueStore::with_random_q(25, &mut ChaCha20Rng::seed_from_u64(1)),
            |store| {
                for s in 0..24 {
                    store.apply_q_update(s, Action::Right, -0.01, s + 1, 0.1, 0.9).unwrap();
                }
                store
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_reset, bench_step, bench_q_update);
criterion_main!(benches);
