//! Baseline-correct every table in a directory.
//!
//! [`BatchProcessor::run`] validates the input and output directories, corrects each
//! matching file with a [`BaselineCorrector`] and writes `corrected-<name>` tables (and,
//! with the `plotting` feature, `corrected-<stem>.svg` figures) to the output directory.
//! A file that fails is recorded in the [`BatchReport`] and does not stop the batch.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
#[cfg(feature = "parallelism")]
use rayon::prelude::*;
use thiserror::Error;

use crate::correction::{BaselineCorrector, CorrectedSpectrum, CorrectionError};
use crate::text::{self, TextError};

/// Problems with the batch as a whole, detected before any file is processed
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("An IO error occurred: {0}")]
    Io(#[from] io::Error),
    #[error("The input directory {0:?} did not exist and has been created, add data to it and run again")]
    InputDirectoryCreated(PathBuf),
    #[error("The input directory {0:?} does not exist")]
    MissingInput(PathBuf),
    #[error("The input directory {0:?} has no files to process")]
    EmptyInput(PathBuf),
    #[error("The output directory {0:?} is not empty, clear it to avoid overwriting results")]
    OutputNotEmpty(PathBuf),
}

/// Why a single file could not be corrected
#[derive(Debug, Error)]
pub enum FileError {
    #[error("Failed to read table: {0}")]
    Text(#[from] TextError),
    #[error("Failed to correct spectrum: {0}")]
    Correction(#[from] CorrectionError),
    #[error("Failed to write output: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to draw figure: {0}")]
    Plot(String),
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Create the input directory when it is missing. The batch still stops, since
    /// there is nothing in it to process yet.
    pub create_missing_input: bool,
    /// File extensions to process, compared case-insensitively
    pub extensions: Vec<String>,
    /// Draw a figure per file. Only honored with the `plotting` feature.
    pub write_plots: bool,
}

impl BatchConfig {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(input_dir: P, output_dir: Q) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            create_missing_input: false,
            extensions: vec!["csv".to_string(), "txt".to_string()],
            write_plots: cfg!(feature = "plotting"),
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFile {
    pub input: PathBuf,
    pub table: PathBuf,
    pub figure: Option<PathBuf>,
    pub converged: bool,
    pub iterations: usize,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub processed: Vec<ProcessedFile>,
    pub failures: Vec<(PathBuf, FileError)>,
}

impl BatchReport {
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// Files whose baseline estimate stopped at the iteration cap
    pub fn not_converged(&self) -> impl Iterator<Item = &ProcessedFile> {
        self.processed.iter().filter(|f| !f.converged)
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "plotting")] {
        fn draw_figure(spectrum: &CorrectedSpectrum, path: &Path) -> Result<(), FileError> {
            crate::plot::draw_correction_svg(spectrum, path).map_err(|e| FileError::Plot(e.to_string()))
        }
    } else {
        fn draw_figure(_spectrum: &CorrectedSpectrum, path: &Path) -> Result<(), FileError> {
            Err(FileError::Plot(format!("Cannot draw {path:?}, the `plotting` feature is disabled")))
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchProcessor {
    pub config: BatchConfig,
    pub corrector: BaselineCorrector,
}

impl BatchProcessor {
    pub fn new(config: BatchConfig, corrector: BaselineCorrector) -> Self {
        Self { config, corrector }
    }

    /// Check the input and output directories, creating the output directory when it
    /// is missing, and list the files to process in name order.
    pub fn prepare(&self) -> Result<Vec<PathBuf>, BatchError> {
        let input_dir = &self.config.input_dir;
        if !input_dir.is_dir() {
            if self.config.create_missing_input {
                fs::create_dir_all(input_dir)?;
                return Err(BatchError::InputDirectoryCreated(input_dir.clone()));
            }
            return Err(BatchError::MissingInput(input_dir.clone()));
        }

        let mut inputs = Vec::new();
        for entry in fs::read_dir(input_dir)? {
            let path = entry?.path();
            if path.is_file() && self.config.accepts(&path) {
                inputs.push(path);
            }
        }
        if inputs.is_empty() {
            return Err(BatchError::EmptyInput(input_dir.clone()));
        }
        inputs.sort();

        let output_dir = &self.config.output_dir;
        if output_dir.is_dir() {
            if fs::read_dir(output_dir)?.next().is_some() {
                return Err(BatchError::OutputNotEmpty(output_dir.clone()));
            }
        } else {
            debug!("Creating output directory {output_dir:?}");
            fs::create_dir_all(output_dir)?;
        }
        Ok(inputs)
    }

    /// Correct one table, writing its outputs to the output directory
    pub fn process_file(&self, path: &Path) -> Result<ProcessedFile, FileError> {
        let arrays = text::arrays_from_file(path)?;
        let spectrum = self.corrector.correct(&arrays.x_array, &arrays.y_array)?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let table = self.config.output_dir.join(format!("corrected-{name}"));
        text::corrected_to_file(&spectrum, &table)?;

        let figure = if self.config.write_plots {
            let stem = path
                .file_stem()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let figure = self.config.output_dir.join(format!("corrected-{stem}.svg"));
            draw_figure(&spectrum, &figure)?;
            Some(figure)
        } else {
            None
        };

        info!(
            "Corrected {name} in {} iterations{}",
            spectrum.iterations,
            if spectrum.converged { "" } else { " without converging" }
        );
        Ok(ProcessedFile {
            input: path.to_path_buf(),
            table,
            figure,
            converged: spectrum.converged,
            iterations: spectrum.iterations,
        })
    }

    #[cfg(feature = "parallelism")]
    fn process_all(&self, inputs: &[PathBuf]) -> Vec<Result<ProcessedFile, FileError>> {
        inputs.par_iter().map(|path| self.process_file(path)).collect()
    }

    #[cfg(not(feature = "parallelism"))]
    fn process_all(&self, inputs: &[PathBuf]) -> Vec<Result<ProcessedFile, FileError>> {
        inputs.iter().map(|path| self.process_file(path)).collect()
    }

    /// Validate the directories and correct every matching file
    pub fn run(&self) -> Result<BatchReport, BatchError> {
        let inputs = self.prepare()?;
        info!(
            "Processing {} files from {:?}",
            inputs.len(),
            self.config.input_dir
        );
        let mut report = BatchReport::default();
        for (path, result) in inputs.iter().zip(self.process_all(&inputs)) {
            match result {
                Ok(processed) => report.processed.push(processed),
                Err(err) => {
                    warn!("Skipping {path:?}: {err}");
                    report.failures.push((path.clone(), err));
                }
            }
        }
        info!("{} files processed", report.processed_count());
        Ok(report)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::correction::{BaselineCorrectorBuilder, SavitskyGolayConfig};
    use crate::test_data::synthetic_spectrum;
    use std::io::Write;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "ramansignal-batch-{name}-{}",
            std::process::id()
        ));
        if dir.exists() {
            fs::remove_dir_all(&dir).unwrap();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_spectrum(path: &Path, n: usize) -> io::Result<()> {
        let (x, y, _) = synthetic_spectrum(n);
        let mut file = io::BufWriter::new(fs::File::create(path)?);
        writeln!(file, "# shift,intensity")?;
        for (a, b) in x.iter().zip(y.iter()) {
            writeln!(file, "{a},{b}")?;
        }
        Ok(())
    }

    fn config(root: &Path) -> BatchConfig {
        let mut config = BatchConfig::new(root.join("input"), root.join("output"));
        config.write_plots = false;
        config
    }

    #[test_log::test]
    fn test_run() -> Result<(), Box<dyn std::error::Error>> {
        let root = scratch("run");
        let input = root.join("input");
        fs::create_dir_all(&input)?;
        write_spectrum(&input.join("a.csv"), 300)?;
        write_spectrum(&input.join("b.TXT"), 200)?;
        fs::write(input.join("c.txt"), "1,2\n3,oops\n")?;
        fs::write(input.join("notes.md"), "not a table")?;

        let processor = BatchProcessor::new(
            config(&root),
            BaselineCorrectorBuilder::new()
                .prefilter(Some(SavitskyGolayConfig::default()))
                .build(),
        );
        let report = processor.run()?;
        assert_eq!(report.processed_count(), 2);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].0.ends_with("c.txt"));
        assert!(matches!(report.failures[0].1, FileError::Text(_)));
        assert!(!report.is_success());

        let table = root.join("output").join("corrected-a.csv");
        assert_eq!(report.processed[0].table, table);
        let written = fs::read_to_string(&table)?;
        assert!(written.starts_with("# x,raw,smoothed,baseline,corrected\n"));
        assert_eq!(written.lines().count(), 301);
        assert!(root.join("output").join("corrected-b.TXT").exists());

        fs::remove_dir_all(&root)?;
        Ok(())
    }

    #[cfg(feature = "plotting")]
    #[test]
    fn test_run_with_figures() -> Result<(), Box<dyn std::error::Error>> {
        let root = scratch("figures");
        let input = root.join("input");
        fs::create_dir_all(&input)?;
        write_spectrum(&input.join("a.csv"), 300)?;

        let mut config = config(&root);
        config.write_plots = true;
        let report = BatchProcessor::new(config, BaselineCorrector::default()).run()?;
        let figure = root.join("output").join("corrected-a.svg");
        assert_eq!(report.processed[0].figure.as_deref(), Some(figure.as_path()));
        assert!(figure.exists());

        fs::remove_dir_all(&root)?;
        Ok(())
    }

    #[test]
    fn test_missing_input() {
        let root = scratch("missing");
        let processor = BatchProcessor::new(config(&root), BaselineCorrector::default());
        assert!(matches!(
            processor.prepare(),
            Err(BatchError::MissingInput(_))
        ));

        let mut config = config(&root);
        config.create_missing_input = true;
        let processor = BatchProcessor::new(config, BaselineCorrector::default());
        assert!(matches!(
            processor.prepare(),
            Err(BatchError::InputDirectoryCreated(_))
        ));
        assert!(root.join("input").is_dir());
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_empty_input() {
        let root = scratch("empty");
        fs::create_dir_all(root.join("input")).unwrap();
        fs::write(root.join("input").join("readme.md"), "nothing here").unwrap();
        let processor = BatchProcessor::new(config(&root), BaselineCorrector::default());
        assert!(matches!(processor.prepare(), Err(BatchError::EmptyInput(_))));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_output_directory() -> io::Result<()> {
        let root = scratch("output");
        fs::create_dir_all(root.join("input"))?;
        write_spectrum(&root.join("input").join("a.csv"), 50)?;
        let processor = BatchProcessor::new(config(&root), BaselineCorrector::default());

        let inputs = processor.prepare().unwrap();
        assert_eq!(inputs, vec![root.join("input").join("a.csv")]);
        assert!(root.join("output").is_dir());

        fs::write(root.join("output").join("previous.csv"), "1,2")?;
        assert!(matches!(
            processor.prepare(),
            Err(BatchError::OutputNotEmpty(_))
        ));
        fs::remove_dir_all(&root)?;
        Ok(())
    }
}
