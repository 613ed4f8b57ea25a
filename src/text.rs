//! Reading and writing delimited numeric tables.
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path;

use thiserror::Error;

use crate::correction::CorrectedSpectrum;

#[derive(Debug, Error)]
pub enum TextError {
    #[error("An IO error occurred: {0}")]
    Io(#[from] io::Error),
    #[error("Could not parse {token:?} as a number on line {line}")]
    InvalidNumber { line: usize, token: String },
    #[error("Expected at least two columns on line {line}, found {found}")]
    MissingColumn { line: usize, found: usize },
    #[error("No data rows were found")]
    Empty,
}

/// A pair of parallel coordinate arrays read from a table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectrumArrays {
    pub x_array: Vec<f64>,
    pub y_array: Vec<f64>,
}

impl SpectrumArrays {
    pub fn new(x_array: Vec<f64>, y_array: Vec<f64>) -> Self {
        Self { x_array, y_array }
    }

    pub fn len(&self) -> usize {
        self.x_array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x_array.is_empty()
    }
}

fn parse_token(token: &str, line: usize) -> Result<f64, TextError> {
    token.parse::<f64>().map_err(|_| TextError::InvalidNumber {
        line,
        token: token.to_string(),
    })
}

/// Read the first two columns of a comma, tab or whitespace delimited table.
///
/// Anything after a `#` is a comment, and blank lines are skipped. Line numbers in
/// errors start at 1.
pub fn arrays_from_reader<R: BufRead>(reader: R) -> Result<SpectrumArrays, TextError> {
    let mut arrays = SpectrumArrays::default();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = i + 1;
        let content = match line.split_once('#') {
            Some((content, _)) => content,
            None => line.as_str(),
        }
        .trim();
        if content.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = content
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.len() < 2 {
            return Err(TextError::MissingColumn {
                line: line_number,
                found: tokens.len(),
            });
        }
        arrays.x_array.push(parse_token(tokens[0], line_number)?);
        arrays.y_array.push(parse_token(tokens[1], line_number)?);
    }
    if arrays.is_empty() {
        return Err(TextError::Empty);
    }
    Ok(arrays)
}

pub fn arrays_from_file<P: AsRef<path::Path>>(path: P) -> Result<SpectrumArrays, TextError> {
    let file = fs::File::open(path)?;
    arrays_from_reader(io::BufReader::new(file))
}

/// Write `spectrum` as a comma-delimited table with a `#` header naming the columns.
/// The smoothed column is only present when the spectrum was pre-filtered.
pub fn corrected_to_writer<W: Write>(spectrum: &CorrectedSpectrum, writer: &mut W) -> io::Result<()> {
    match &spectrum.smoothed {
        Some(smoothed) => {
            writeln!(writer, "# x,raw,smoothed,baseline,corrected")?;
            for i in 0..spectrum.len() {
                writeln!(
                    writer,
                    "{},{},{},{},{}",
                    spectrum.x[i],
                    spectrum.y[i],
                    smoothed[i],
                    spectrum.baseline[i],
                    spectrum.corrected[i]
                )?;
            }
        }
        None => {
            writeln!(writer, "# x,raw,baseline,corrected")?;
            for i in 0..spectrum.len() {
                writeln!(
                    writer,
                    "{},{},{},{}",
                    spectrum.x[i], spectrum.y[i], spectrum.baseline[i], spectrum.corrected[i]
                )?;
            }
        }
    }
    writer.flush()
}

pub fn corrected_to_file<P: AsRef<path::Path>>(
    spectrum: &CorrectedSpectrum,
    path: P,
) -> io::Result<()> {
    let file = fs::File::create(path)?;
    let mut writer = io::BufWriter::new(file);
    corrected_to_writer(spectrum, &mut writer)
}
