//! Synthetic Raman-like spectra with a known background.
use std::f64::consts::PI;

/// Peak centers as fractions of the spectrum length
pub const PEAK_CENTERS: [f64; 3] = [0.3, 0.55, 0.8];
const PEAK_HEIGHTS: [f64; 3] = [100.0, 60.0, 80.0];
/// Peak widths, in points per thousand points
const PEAK_WIDTHS: [f64; 3] = [4.0, 6.0, 3.0];

/// The slowly varying background at fractional position `t`
pub fn background(t: f64) -> f64 {
    20.0 + 50.0 * t + 5.0 * (PI * t).sin()
}

/// Build `(x, y, background)` arrays over `n` points spanning 200-2000 cm⁻¹
/// with a small deterministic ripple standing in for noise.
pub fn synthetic_spectrum(n: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let scale = n as f64 / 1000.0;
    let mut x = Vec::with_capacity(n);
    let mut y = Vec::with_capacity(n);
    let mut truth = Vec::with_capacity(n);
    for i in 0..n {
        let t = i as f64 / n as f64;
        let base = background(t);
        let peaks: f64 = PEAK_CENTERS
            .iter()
            .zip(PEAK_HEIGHTS.iter().zip(PEAK_WIDTHS.iter()))
            .map(|(center, (height, width))| {
                let sigma = width * scale;
                let offset = i as f64 - center * n as f64;
                height * (-0.5 * (offset / sigma).powi(2)).exp()
            })
            .sum();
        let ripple = 0.5 * (i as f64 * 12.9898).sin() * (i as f64 * 0.731).cos();
        x.push(200.0 + 1800.0 * t);
        y.push(base + peaks + ripple);
        truth.push(base);
    }
    (x, y, truth)
}
