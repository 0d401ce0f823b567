use std::hint::black_box;

use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;
use cx_throttle::exchanges::binance;
use cx_throttle::Throttler;
use cx_throttle::ThrottlerConfig;

fn bench_admission_burst(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
    let config = ThrottlerConfig::builder().refill_rate(1_000.0).max_capacity(1_000_000.0).unlimited_queue().build().unwrap();
    let throttler = Throttler::new(config).unwrap();

    c.bench_function("admit 100 funded entries", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let admissions: Vec<_> = (0..100).map(|_| throttler.throttle(black_box(1.0)).unwrap()).collect();
                for admission in admissions {
                    black_box(admission.await.unwrap());
                }
            })
        })
    });

    c.bench_function("throttle and withdraw", |b| {
        let blocked = Throttler::new(ThrottlerConfig::builder().refill_rate(1e-9).initial_tokens(-1.0).build().unwrap()).unwrap();
        b.iter(|| {
            runtime.block_on(async {
                let admission = blocked.throttle(black_box(1.0)).unwrap();
                drop(admission);
            })
        })
    });
}

fn bench_endpoint_costs(c: &mut Criterion) {
    let costs = binance::spot_costs();

    c.bench_function("endpoint cost lookup", |b| b.iter(|| costs.cost(black_box("GET /api/v3/depth"), black_box(Some(500)))));

    c.bench_function("endpoint cost lookup by method and path", |b| {
        b.iter(|| costs.cost_of(black_box("get"), black_box("/api/v3/exchangeInfo"), None))
    });
}

criterion_group!(benches, bench_admission_burst, bench_endpoint_costs);
criterion_main!(benches);
