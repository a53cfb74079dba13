use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::info;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::require_file;
use crate::error::Result;

/// One bin of a genomes list: where it came from and the name it was given
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenomesListRow {
    pub path: String,
    pub filename: String,
    pub unambiguous_filename: String,
}

/// Split off the last extension the way `os.path.splitext` does: leading
/// dots never start an extension
fn split_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if name[..pos].chars().any(|c| c != '.') => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    }
}

fn disambiguate(filename: &str, repeat: usize) -> String {
    let (mut stem, mut ext) = split_ext(filename);
    let gz_ext;
    if filename.ends_with(".fa.gz") {
        let (inner_stem, inner_ext) = split_ext(stem);
        gz_ext = format!("{}{}", inner_ext, ext);
        stem = inner_stem;
        ext = &gz_ext;
    }
    if repeat > 0 {
        format!("{}_{}{}", stem, repeat, ext)
    } else {
        format!("{}{}", stem, ext)
    }
}

/// Give every bin a filename unique across `paths`; the k-th repeat of a
/// filename gets `_k` before its extension
pub fn unambiguous_names<S: AsRef<str>>(paths: &[S]) -> Vec<GenomesListRow> {
    let mut rows: Vec<(String, String)> = paths
        .iter()
        .map(|p| {
            let path = p.as_ref();
            let filename = Path::new(path)
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or(path)
                .to_string();
            (path.to_string(), filename)
        })
        .collect();
    rows.sort_by(|a, b| a.1.cmp(&b.1));

    let mut seen: FxHashMap<String, usize> = FxHashMap::default();
    let mut named: Vec<GenomesListRow> = rows
        .into_iter()
        .map(|(path, filename)| {
            let repeat = seen.entry(filename.clone()).or_insert(0);
            let unambiguous_filename = disambiguate(&filename, *repeat);
            *repeat += 1;
            GenomesListRow { path, filename, unambiguous_filename }
        })
        .collect();

    named.sort_by(|a, b| {
        a.filename
            .cmp(&b.filename)
            .then_with(|| a.unambiguous_filename.cmp(&b.unambiguous_filename))
    });
    named
}

/// Bin paths, one per line
pub fn read_bins_list(path: &Path) -> Result<Vec<String>> {
    let reader = BufReader::new(File::open(require_file(path)?)?);
    let mut paths = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if !line.is_empty() {
            paths.push(line.to_string());
        }
    }
    Ok(paths)
}

pub fn read_genomes_list(path: &Path) -> Result<Vec<GenomesListRow>> {
    let mut reader = csv::ReaderBuilder::new().delimiter(b'\t').from_path(require_file(path)?)?;
    let rows = reader.deserialize().collect::<std::result::Result<Vec<GenomesListRow>, _>>()?;
    info!("Read {} genomes from {:?}", rows.len(), path);
    Ok(rows)
}
