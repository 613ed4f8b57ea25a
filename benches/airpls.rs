use criterion::{black_box, Criterion};

use ramansignal::{AirPLS, ConjugateGradient};

fn spectrum(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64 / n as f64;
            let peak = 100.0 * (-0.5 * ((t - 0.4) / 0.005).powi(2)).exp()
                + 60.0 * (-0.5 * ((t - 0.7) / 0.008).powi(2)).exp();
            20.0 + 50.0 * t + peak + 0.5 * (i as f64 * 12.9898).sin()
        })
        .collect()
}

fn banded(estimator: &AirPLS, signal: &[f64]) -> f64 {
    let fit = estimator.fit(signal).unwrap();
    black_box(fit.baseline.into_iter().sum())
}

fn conjugate_gradient(estimator: &AirPLS<ConjugateGradient>, signal: &[f64]) -> f64 {
    let fit = estimator.fit(signal).unwrap();
    black_box(fit.baseline.into_iter().sum())
}

fn baseline(c: &mut Criterion) {
    let signal = spectrum(2000);
    let estimator = AirPLS::default();
    let cg_estimator = AirPLS::default().with_solver(ConjugateGradient::default());

    c.bench_function("airpls_banded_cholesky", |b| {
        b.iter(|| banded(&estimator, &signal))
    });

    c.bench_function("airpls_conjugate_gradient", |b| {
        b.iter(|| conjugate_gradient(&cg_estimator, &signal))
    });
}

criterion::criterion_group!(benches, baseline);
criterion::criterion_main!(benches);
