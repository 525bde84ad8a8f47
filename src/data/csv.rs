//! CSV format dataset implementation
//!
//! Supports loading datasets from CSV files where:
//! - All columns are numeric features, except
//! - the last column, which holds the class name in labelled files
//! - First row can be headers (automatically detected)
//! - Blank lines and lines starting with `#` are skipped

use crate::core::{DataPoint, Dataset, QsvmError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Rows read from a CSV file
#[derive(Debug, Clone)]
pub struct CsvDataset {
    points: Vec<DataPoint>,
    dimensions: usize,
}

impl CsvDataset {
    /// Load a labelled dataset from a CSV file
    ///
    /// The last column is the class name.
    /// Headers are automatically detected if present.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Load feature vectors without class names from a CSV file
    pub fn unlabeled_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader_with_options(BufReader::new(file), true, false)
    }

    /// Load a labelled dataset from a reader
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        Self::from_reader_with_options(reader, true, true)
    }

    /// Load a dataset from a reader with explicit header and label options
    pub fn from_reader_with_options<R: BufRead>(
        reader: R,
        auto_detect_header: bool,
        labeled: bool,
    ) -> Result<Self> {
        let mut points = Vec::new();
        let mut dimensions = None;
        let mut first_content_line = true;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if first_content_line {
                first_content_line = false;
                if auto_detect_header && Self::is_header_line(line, labeled) {
                    continue;
                }
            }

            let point = Self::parse_data_line(line, labeled)
                .map_err(|e| QsvmError::ParseError(format!("line {}: {e}", line_no + 1)))?;

            match dimensions {
                None => dimensions = Some(point.dim()),
                Some(expected) if expected != point.dim() => {
                    return Err(QsvmError::ParseError(format!(
                        "line {}: expected {expected} features, found {}",
                        line_no + 1,
                        point.dim()
                    )));
                }
                _ => {}
            }
            points.push(point);
        }

        if points.is_empty() {
            return Err(QsvmError::EmptyDataset);
        }

        Ok(CsvDataset {
            points,
            dimensions: dimensions.unwrap_or(0),
        })
    }

    /// Check if a line appears to be a header
    fn is_header_line(line: &str, labeled: bool) -> bool {
        let fields: Vec<&str> = line.split(',').collect();
        let feature_count = if labeled {
            fields.len().saturating_sub(1)
        } else {
            fields.len()
        };
        if feature_count == 0 {
            return false;
        }

        // Mostly non-numeric feature columns means column names
        let non_numeric_count = fields
            .iter()
            .take(feature_count)
            .filter(|field| field.trim().parse::<f64>().is_err())
            .count();

        non_numeric_count * 2 > feature_count
    }

    /// Parse a CSV data line into a point
    fn parse_data_line(line: &str, labeled: bool) -> std::result::Result<DataPoint, String> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let min_fields = if labeled { 2 } else { 1 };
        if fields.len() < min_fields {
            return Err(format!("too few fields: {line}"));
        }

        let (feature_fields, label) = if labeled {
            let label = fields[fields.len() - 1];
            if label.is_empty() {
                return Err("empty class name".to_string());
            }
            (&fields[..fields.len() - 1], Some(label))
        } else {
            (&fields[..], None)
        };

        let features = feature_fields
            .iter()
            .enumerate()
            .map(|(idx, field)| {
                field
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| format!("invalid feature value at column {}: {field}", idx + 1))
            })
            .collect::<std::result::Result<Vec<f64>, String>>()?;

        Ok(match label {
            Some(label) => DataPoint::labeled(features, label),
            None => DataPoint::new(features),
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dimensions
    }

    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    /// Feature vectors in file order, labels dropped
    pub fn features(&self) -> Vec<Vec<f64>> {
        self.points.iter().map(|p| p.features().to_vec()).collect()
    }

    /// Group rows by class name
    pub fn into_dataset(self) -> Result<Dataset> {
        let mut dataset = Dataset::new();
        for point in self.points {
            let label = point
                .label()
                .ok_or_else(|| {
                    QsvmError::InvalidDataset("rows without class names cannot be grouped".to_string())
                })?
                .to_string();
            dataset.insert(label, point.features().to_vec())?;
        }
        Ok(dataset)
    }
}
