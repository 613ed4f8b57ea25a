use std::{env, io};

use ramansignal::text::{arrays_from_file, corrected_to_writer};
use ramansignal::{BaselineCorrectorBuilder, SavitskyGolayConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = env::args().nth(1).ok_or("Usage: correct_file <path> [lambda] [--smooth]")?;
    let lambda: f64 = env::args()
        .nth(2)
        .filter(|a| !a.starts_with("--"))
        .unwrap_or_else(|| "100".to_string())
        .parse()?;
    let smooth = env::args().any(|a| a == "--smooth");

    let arrays = arrays_from_file(&path)?;
    let corrector = BaselineCorrectorBuilder::new()
        .lambda(lambda)
        .prefilter(smooth.then(SavitskyGolayConfig::default))
        .build();
    let (spectrum, warning) = corrector.correct_with_warning(&arrays.x_array, &arrays.y_array)?;
    if let Some(warning) = warning {
        eprintln!("{warning}");
    }
    eprintln!("Converged after {} iterations", spectrum.iterations);

    corrected_to_writer(&spectrum, &mut io::stdout().lock())?;
    Ok(())
}
