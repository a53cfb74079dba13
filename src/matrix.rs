use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, info};

use crate::error::{BinShareError, Result};
use crate::method::BinId;

/// Symmetric pairwise identity matrix over bins.
///
/// Off-diagonal values live in a packed lower triangle keyed by the
/// unordered pair, so `get(i, j) == get(j, i)` holds by construction.
/// The diagonal is only kept to write the matrix back out.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityMatrix {
    bins: Vec<BinId>,
    lower: Vec<f64>,
    diagonal: Vec<f64>,
}

/// Packed index of the unordered pair `{i, j}`, `i != j`
fn pair_index(i: usize, j: usize) -> usize {
    let (hi, lo) = if i > j { (i, j) } else { (j, i) };
    hi * (hi - 1) / 2 + lo
}

impl IdentityMatrix {
    /// Matrix with every off-diagonal identity set to 0
    pub fn new(bins: Vec<BinId>) -> Self {
        let n = bins.len();
        IdentityMatrix {
            bins,
            lower: vec![0.0; n * n.saturating_sub(1) / 2],
            diagonal: vec![0.0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn bin(&self, idx: usize) -> &BinId {
        &self.bins[idx]
    }

    /// Identity between two distinct bins
    pub fn get(&self, i: usize, j: usize) -> f64 {
        debug_assert!(i != j, "self-identity is never compared");
        self.lower[pair_index(i, j)]
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        debug_assert!(i != j);
        self.lower[pair_index(i, j)] = value;
    }

    pub fn diagonal(&self, i: usize) -> f64 {
        self.diagonal[i]
    }

    /// Partners of `idx` (excluding itself) with identity >= `threshold`
    pub fn partners(&self, idx: usize, threshold: f64) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(move |&col| col != idx && self.get(idx, col) >= threshold)
    }

    /// Write the full square matrix as TSV, bin labels on both axes
    pub fn write_tsv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;

        let mut header = Vec::with_capacity(self.len() + 1);
        header.push(String::new());
        header.extend(self.bins.iter().map(|b| b.label.clone()));
        writer.write_record(&header)?;

        for i in 0..self.len() {
            let mut record = Vec::with_capacity(self.len() + 1);
            record.push(self.bins[i].label.clone());
            for j in 0..self.len() {
                let value = if i == j { self.diagonal(i) } else { self.get(i, j) };
                record.push(value.to_string());
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;

        info!("Identity matrix ({} bins) saved to {:?}", self.len(), path);
        Ok(())
    }

    /// Read a square TSV matrix as written by `write_tsv`
    pub fn read_tsv(path: &Path) -> Result<Self> {
        let source = path.display().to_string();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let mut records = reader.records();
        let header = match records.next() {
            Some(record) => record?,
            None => return Err(BinShareError::malformed(&source, "empty matrix table")),
        };
        let labels: Vec<String> = header.iter().skip(1).map(str::to_string).collect();
        let n = labels.len();

        let mut rows: Vec<Vec<f64>> = Vec::with_capacity(n);
        for (row_idx, record) in records.enumerate() {
            let record = record?;
            let line = row_idx + 2;
            if row_idx >= n {
                return Err(BinShareError::malformed(
                    &source,
                    format!("found more than the {} rows declared by the header", n),
                ));
            }
            if record.len() != n + 1 {
                return Err(BinShareError::malformed(
                    &source,
                    format!("line {}: expected {} columns, found {}", line, n + 1, record.len()),
                ));
            }
            let label = record.get(0).unwrap_or_default();
            if label != labels[row_idx] {
                return Err(BinShareError::malformed(
                    &source,
                    format!("line {}: row label '{}' does not match column label '{}'", line, label, labels[row_idx]),
                ));
            }
            let values = record
                .iter()
                .skip(1)
                .map(|token| parse_value(token, &source, line))
                .collect::<Result<Vec<f64>>>()?;
            rows.push(values);
        }
        if rows.len() != n {
            return Err(BinShareError::malformed(
                &source,
                format!("header declares {} bins but {} rows were found", n, rows.len()),
            ));
        }

        let mut matrix = IdentityMatrix::new(labels.into_iter().map(BinId::new).collect());
        for i in 0..n {
            matrix.diagonal[i] = rows[i][i];
            for j in 0..i {
                if rows[i][j] != rows[j][i] {
                    return Err(BinShareError::malformed(
                        &source,
                        format!(
                            "matrix is not symmetric: {} vs {} is {} one way and {} the other",
                            matrix.bins[i], matrix.bins[j], rows[i][j], rows[j][i]
                        ),
                    ));
                }
                matrix.set(i, j, rows[i][j]);
            }
        }

        info!("Loaded {}x{} identity matrix from {:?}", n, n, path);
        Ok(matrix)
    }
}

fn parse_value(token: &str, source: &str, line: usize) -> Result<f64> {
    token.trim().parse::<f64>().map_err(|_| {
        BinShareError::malformed(source, format!("line {}: '{}' is not a number", line, token))
    })
}

/// Load a lower-triangular (Phylip-style) identity file, as written by `skani triangle`
pub fn read_lower_triangular(path: &Path) -> Result<IdentityMatrix> {
    info!("Loading lower-triangular matrix from {:?}...", path);
    let file = File::open(path)?;
    parse_lower_triangular(BufReader::new(file), &path.display().to_string())
}

pub fn parse_lower_triangular<R: BufRead>(reader: R, source: &str) -> Result<IdentityMatrix> {
    let mut lines = reader.lines();

    let declared = match lines.next() {
        Some(line) => line?,
        None => return Err(BinShareError::malformed(source, "empty file")),
    };
    let n: usize = declared.trim().parse().map_err(|_| {
        BinShareError::malformed(source, format!("line 1: '{}' is not an element count", declared.trim()))
    })?;

    let mut bins = Vec::with_capacity(n);
    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(n);
    for (row_idx, line) in lines.enumerate() {
        let line = line?;
        let line_no = row_idx + 2;
        let mut tokens = line.split_whitespace();
        let Some(raw_label) = tokens.next() else {
            continue;
        };
        if bins.len() == n {
            return Err(BinShareError::malformed(
                source,
                format!("line {}: more rows than the declared {} elements", line_no, n),
            ));
        }

        let label = Path::new(raw_label)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(raw_label);
        let values = tokens.map(|t| parse_value(t, source, line_no)).collect::<Result<Vec<f64>>>()?;
        let i = bins.len();
        if values.len() < i {
            return Err(BinShareError::malformed(
                source,
                format!("line {}: expected {} values for row {}, found {}", line_no, i, i, values.len()),
            ));
        }
        bins.push(BinId::new(label));
        rows.push(values);
    }

    if bins.len() != n {
        return Err(BinShareError::malformed(
            source,
            format!("declared {} elements but found {} rows", n, bins.len()),
        ));
    }

    let mut matrix = IdentityMatrix::new(bins);
    for (i, values) in rows.iter().enumerate() {
        for (j, &value) in values.iter().take(i).enumerate() {
            matrix.set(i, j, value);
        }
        if let Some(&self_identity) = values.get(i) {
            matrix.diagonal[i] = self_identity;
        }
    }

    debug!("Parsed {}x{} lower-triangular matrix", n, n);
    Ok(matrix)
}
