use std::env;
use std::fs;
use std::process::ExitCode;

use log::{error, info, warn};

use ramansignal::batch::{BatchConfig, BatchProcessor};
use ramansignal::{BaselineCorrector, CorrectionConfig, SavitskyGolayConfig};

const USAGE: &str = "Usage: ramansignal <input-dir> <output-dir> [--smooth] [--lambda X] [--order N] \
[--max-iterations N] [--window N] [--poly-order N] [--config file.json]";

#[derive(Debug, Default)]
struct Arguments {
    input_dir: String,
    output_dir: String,
    config: CorrectionConfig,
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("{flag} requires a value"))?;
    value
        .parse()
        .map_err(|_| format!("Could not parse {value:?} for {flag}"))
}

fn load_config(path: &str) -> Result<CorrectionConfig, String> {
    let content = fs::read_to_string(path).map_err(|e| format!("Could not read {path}: {e}"))?;
    serde_json::from_str(&content).map_err(|e| format!("Could not parse {path}: {e}"))
}

fn parse_arguments(mut args: impl Iterator<Item = String>) -> Result<Arguments, String> {
    let mut positional = Vec::new();
    let mut config = CorrectionConfig::default();
    let mut smooth = false;
    let mut window = None;
    let mut poly_order = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = load_config(&parse_value::<String>(&arg, args.next())?)?,
            "--smooth" => smooth = true,
            "--lambda" => config.lambda = parse_value(&arg, args.next())?,
            "--order" => config.order = parse_value(&arg, args.next())?,
            "--max-iterations" => config.max_iterations = parse_value(&arg, args.next())?,
            "--window" => window = Some(parse_value(&arg, args.next())?),
            "--poly-order" => poly_order = Some(parse_value(&arg, args.next())?),
            "-h" | "--help" => return Err(USAGE.to_string()),
            _ if arg.starts_with("--") => return Err(format!("Unknown option {arg}\n{USAGE}")),
            _ => positional.push(arg),
        }
    }
    if smooth || window.is_some() || poly_order.is_some() {
        let mut prefilter = config.prefilter.unwrap_or_default();
        if let Some(window) = window {
            prefilter.window_length = window;
        }
        if let Some(poly_order) = poly_order {
            prefilter.poly_order = poly_order;
        }
        config.prefilter = Some(prefilter);
    }
    let mut positional = positional.into_iter();
    match (positional.next(), positional.next(), positional.next()) {
        (Some(input_dir), Some(output_dir), None) => Ok(Arguments {
            input_dir,
            output_dir,
            config,
        }),
        _ => Err(USAGE.to_string()),
    }
}

fn main() -> ExitCode {
    pretty_env_logger::init();

    let arguments = match parse_arguments(env::args().skip(1)) {
        Ok(arguments) => arguments,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };
    let config = arguments.config;
    info!(
        "airPLS parameters: lambda={}, order={}, max iterations={}",
        config.lambda, config.order, config.max_iterations
    );
    if let Some(SavitskyGolayConfig {
        window_length,
        poly_order,
    }) = config.prefilter
    {
        info!("Savitzky-Golay parameters: window length={window_length}, polynomial order={poly_order}");
    }

    let mut batch = BatchConfig::new(&arguments.input_dir, &arguments.output_dir);
    batch.create_missing_input = true;
    let processor = BatchProcessor::new(batch, BaselineCorrector::new(config));
    match processor.run() {
        Ok(report) => {
            for file in report.not_converged() {
                warn!(
                    "{:?} reached the iteration cap without converging",
                    file.input
                );
            }
            for (path, err) in report.failures.iter() {
                error!("{path:?}: {err}");
            }
            println!("{} files processed", report.processed_count());
            if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn args(values: &[&str]) -> impl Iterator<Item = String> {
        values
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn test_parse_defaults() {
        let parsed = parse_arguments(args(&["in", "out"])).unwrap();
        assert_eq!(parsed.input_dir, "in");
        assert_eq!(parsed.output_dir, "out");
        assert_eq!(parsed.config, CorrectionConfig::default());
    }

    #[test]
    fn test_parse_options() {
        let parsed = parse_arguments(args(&[
            "in", "--lambda", "1e4", "--order", "2", "out", "--window", "11",
        ]))
        .unwrap();
        assert_eq!(parsed.config.lambda, 1e4);
        assert_eq!(parsed.config.order, 2);
        assert_eq!(
            parsed.config.prefilter,
            Some(SavitskyGolayConfig {
                window_length: 11,
                poly_order: 3
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_arguments(args(&["in"])).is_err());
        assert!(parse_arguments(args(&["in", "out", "--lambda"])).is_err());
        assert!(parse_arguments(args(&["in", "out", "--lambda", "big"])).is_err());
        assert!(parse_arguments(args(&["in", "out", "--frobnicate"])).is_err());
    }

    #[test]
    fn test_config_json() {
        let config: CorrectionConfig =
            serde_json::from_str(r#"{"lambda": 500.0, "prefilter": {"window_length": 15, "poly_order": 2}}"#)
                .unwrap();
        assert_eq!(config.lambda, 500.0);
        assert_eq!(config.order, 1);
        assert_eq!(config.prefilter.unwrap().window_length, 15);
    }
}
