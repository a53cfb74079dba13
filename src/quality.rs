use std::path::Path;

use log::{debug, info};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cluster::Clusters;
use crate::config::{require_file, LookupConfig};
use crate::error::{BinShareError, Result};
use crate::method::{AssemblyMethod, BinId};

/// CheckM2 metrics for one bin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityRecord {
    pub completeness: f64,
    pub contamination: f64,
    pub contig_n50: u64,
    pub genome_size: u64,
}

#[derive(Deserialize)]
struct QualityReportRow {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Completeness")]
    completeness: f64,
    #[serde(rename = "Contamination")]
    contamination: f64,
    #[serde(rename = "Contig_N50")]
    contig_n50: u64,
    #[serde(rename = "Genome_Size")]
    genome_size: u64,
}

/// One method's CheckM2 quality report, keyed by bin name
#[derive(Debug)]
pub struct QualityTable {
    source: String,
    records: FxHashMap<String, QualityRecord>,
}

impl QualityTable {
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().delimiter(b'\t').from_path(require_file(path)?)?;
        let mut records = FxHashMap::default();
        for row in reader.deserialize::<QualityReportRow>() {
            let row = row?;
            let record = QualityRecord {
                completeness: row.completeness,
                contamination: row.contamination,
                contig_n50: row.contig_n50,
                genome_size: row.genome_size,
            };
            records.insert(row.name, record);
        }
        debug!("Read {} quality records from {:?}", records.len(), path);
        Ok(QualityTable { source: path.display().to_string(), records })
    }

    pub fn get(&self, name: &str) -> Result<&QualityRecord> {
        self.records.get(name).ok_or_else(|| BinShareError::LookupMiss {
            bin: name.to_string(),
            table: self.source.clone(),
        })
    }
}

/// Quality reports loaded on first use, one per method
pub struct QualityLookup<'a> {
    config: &'a LookupConfig,
    tables: FxHashMap<AssemblyMethod, QualityTable>,
}

impl<'a> QualityLookup<'a> {
    pub fn new(config: &'a LookupConfig) -> Self {
        QualityLookup { config, tables: FxHashMap::default() }
    }

    fn table(&mut self, method: &AssemblyMethod) -> Result<&QualityTable> {
        if !self.tables.contains_key(method) {
            let path = &self.config.tables_for(method)?.quality_report;
            let table = QualityTable::load(path)?;
            self.tables.insert(method.clone(), table);
        }
        Ok(&self.tables[method])
    }

    /// Quality of `bin`; every bin is expected to be in its method's report
    pub fn record(&mut self, bin: &BinId) -> Result<QualityRecord> {
        self.table(&bin.method)?.get(bin.base_name()).copied()
    }
}

/// One clustered bin with its quality
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterBinRow {
    pub cluster: usize,
    pub assembly: AssemblyMethod,
    pub bin: String,
    pub contamination: f64,
    pub completeness: f64,
    pub contig_n50: u64,
    pub genome_size: u64,
}

/// Per-cluster means and the method holding the best value of each metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub cluster: usize,
    pub num_bins: usize,
    pub mean_contamination: f64,
    pub mean_completeness: f64,
    pub mean_contig_n50: f64,
    pub mean_genome_size: f64,
    pub best_contamination: AssemblyMethod,
    pub best_completeness: AssemblyMethod,
    pub best_contig_n50: AssemblyMethod,
}

/// Cluster membership without quality metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterMemberRow {
    pub cluster: usize,
    pub assembly: AssemblyMethod,
    pub bin: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSizeRow {
    pub cluster: usize,
    pub num_bins: usize,
}

pub fn join_clusters(clusters: &Clusters, config: &LookupConfig) -> Result<(Vec<ClusterBinRow>, Vec<ClusterSummary>)> {
    info!("Retrieving CheckM2 metrics for {} clusters", clusters.len());
    let mut lookup = QualityLookup::new(config);
    let mut rows = Vec::new();
    let mut summaries = Vec::with_capacity(clusters.len());

    for (&cluster, bins) in clusters {
        let start = rows.len();
        for bin in bins {
            let quality = lookup.record(bin)?;
            rows.push(ClusterBinRow {
                cluster,
                assembly: bin.method.clone(),
                bin: bin.base_name().to_string(),
                contamination: quality.contamination,
                completeness: quality.completeness,
                contig_n50: quality.contig_n50,
                genome_size: quality.genome_size,
            });
        }
        if let Some(summary) = summarize(cluster, &rows[start..]) {
            summaries.push(summary);
        }
    }

    Ok((rows, summaries))
}

/// Cluster summary over `rows`; ties go to the earliest row
fn summarize(cluster: usize, rows: &[ClusterBinRow]) -> Option<ClusterSummary> {
    let first = rows.first()?;
    let n = rows.len() as f64;
    let mean = |f: fn(&ClusterBinRow) -> f64| rows.iter().map(f).sum::<f64>() / n;

    let mut best_contamination = first;
    let mut best_completeness = first;
    let mut best_contig_n50 = first;
    for row in &rows[1..] {
        if row.contamination < best_contamination.contamination {
            best_contamination = row;
        }
        if row.completeness > best_completeness.completeness {
            best_completeness = row;
        }
        if row.contig_n50 > best_contig_n50.contig_n50 {
            best_contig_n50 = row;
        }
    }

    Some(ClusterSummary {
        cluster,
        num_bins: rows.len(),
        mean_contamination: mean(|r| r.contamination),
        mean_completeness: mean(|r| r.completeness),
        mean_contig_n50: mean(|r| r.contig_n50 as f64),
        mean_genome_size: mean(|r| r.genome_size as f64),
        best_contamination: best_contamination.assembly.clone(),
        best_completeness: best_completeness.assembly.clone(),
        best_contig_n50: best_contig_n50.assembly.clone(),
    })
}

pub fn cluster_members(clusters: &Clusters) -> (Vec<ClusterMemberRow>, Vec<ClusterSizeRow>) {
    let members = clusters
        .iter()
        .flat_map(|(&cluster, bins)| {
            bins.iter().map(move |bin| ClusterMemberRow {
                cluster,
                assembly: bin.method.clone(),
                bin: bin.base_name().to_string(),
            })
        })
        .collect();
    let sizes = clusters
        .iter()
        .map(|(&cluster, bins)| ClusterSizeRow { cluster, num_bins: bins.len() })
        .collect();
    (members, sizes)
}

/// Write serializable rows as a tab-separated table with a header
pub fn write_tsv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("Wrote {} rows to {:?}", rows.len(), path);
    Ok(())
}
