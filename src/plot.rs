use std::path;

use plotters::prelude::*;

use crate::arrayops;
use crate::correction::CorrectedSpectrum;

pub fn draw_correction_svg<P>(
    spectrum: &CorrectedSpectrum,
    path: P,
) -> Result<(), Box<dyn std::error::Error>>
where
    P: AsRef<path::Path>,
{
    let backend = SVGBackend::new(&path, (800, 600));
    draw_correction_on(spectrum, backend)
}

fn line_style(color: &RGBColor) -> ShapeStyle {
    ShapeStyle {
        color: color.mix(1.0),
        filled: false,
        stroke_width: 1,
    }
}

/// Draw the raw signal in black, the smoothed signal (if any) in magenta, the baseline
/// in green and the corrected signal in red
pub fn draw_correction_on(
    spectrum: &CorrectedSpectrum,
    backend: SVGBackend,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = backend.into_drawing_area();

    let mut series: Vec<(&[f64], RGBColor)> = vec![(spectrum.y.as_slice(), BLACK)];
    if let Some(smoothed) = spectrum.smoothed.as_deref() {
        series.push((smoothed, MAGENTA));
    }
    series.push((spectrum.baseline.as_slice(), GREEN));
    series.push((spectrum.corrected.as_slice(), RED));

    let (xmin, xmax) = arrayops::minmax(&spectrum.x);
    let (ymin, ymax) = series
        .iter()
        .map(|(ys, _)| arrayops::minmax(ys))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (a, b)| {
            (lo.min(a), hi.max(b))
        });
    if !(xmin < xmax) || !(ymin <= ymax) {
        return Err(format!("Cannot plot a spectrum spanning x {xmin}..{xmax}").into());
    }

    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(xmin..xmax, ymin..ymax)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Raman shift (cm⁻¹)")
        .axis_desc_style(("sans-serif", 16).into_font())
        .y_desc("Raman intensity")
        .draw()?;

    for (ys, color) in series {
        let points = spectrum.x.iter().copied().zip(ys.iter().copied());
        chart.draw_series(LineSeries::new(points, line_style(&color)))?;
    }

    root.present()?;
    Ok(())
}
