use std::path::{Path, PathBuf};

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::{require_dir, require_file, LookupConfig};
use crate::error::{BinShareError, Result};
use crate::method::{strip_fa, AssemblyMethod, BinId};
use crate::names::{read_genomes_list, GenomesListRow};
use crate::quality::QualityLookup;
use crate::shared::Membership;

/// Classification given to bins GTDB-Tk has no record for
pub const UNCLASSIFIED: &str = "Unclassified";

const BACTERIA_SUMMARY: &str = "gtdbtk.bac120.summary.tsv";
const ARCHAEA_SUMMARY: &str = "gtdbtk.ar53.summary.tsv";

// matches `<method>/<sample>/final` in a refined bin path
static SAMPLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(megahit|metaspades|hybridspades|metaflye)/(.*)/final").expect("valid regex"));

/// Sample directory of a refined bin, e.g. `.../binette/megahit/S1/final_bins/bin.1.fa` -> `S1`
pub fn sample_from_path(path: &str) -> Option<&str> {
    SAMPLE_RE.captures(path).and_then(|caps| caps.get(2)).map(|m| m.as_str())
}

#[derive(Deserialize)]
struct GtdbRow {
    user_genome: String,
    classification: String,
}

/// One bin with its taxonomy and quality
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinReportRow {
    pub assembly: AssemblyMethod,
    pub original_bin_name: String,
    pub renamed_bin: String,
    pub gtdb_classification: String,
    pub completeness: f64,
    pub contamination: f64,
    pub contig_n50: u64,
    pub genome_size: u64,
}

/// GTDB-Tk summaries loaded on first use
#[derive(Default)]
struct TaxonomyLookup {
    summaries: FxHashMap<PathBuf, FxHashMap<String, String>>,
}

impl TaxonomyLookup {
    fn summary(&mut self, path: PathBuf) -> Result<&FxHashMap<String, String>> {
        if !self.summaries.contains_key(&path) {
            let mut reader = csv::ReaderBuilder::new().delimiter(b'\t').from_path(require_file(&path)?)?;
            let mut classifications = FxHashMap::default();
            for row in reader.deserialize::<GtdbRow>() {
                let row = row?;
                classifications.insert(row.user_genome, row.classification);
            }
            debug!("Read {} classifications from {:?}", classifications.len(), path);
            self.summaries.insert(path.clone(), classifications);
        }
        Ok(&self.summaries[&path])
    }

    /// Bacterial classification, else archaeal, else `UNCLASSIFIED`
    fn classify(&mut self, sample_dir: &Path, genome: &str) -> Result<String> {
        for summary in [BACTERIA_SUMMARY, ARCHAEA_SUMMARY] {
            if let Some(classification) = self.summary(sample_dir.join(summary))?.get(genome) {
                return Ok(classification.clone());
            }
        }
        debug!("No GTDB-Tk classification for {}", genome);
        Ok(UNCLASSIFIED.to_string())
    }
}

/// Genomes list of one method, keyed by the renamed file
struct GenomesIndex {
    source: String,
    by_renamed: FxHashMap<String, GenomesListRow>,
}

impl GenomesIndex {
    fn load(path: &Path) -> Result<Self> {
        let by_renamed = read_genomes_list(path)?
            .into_iter()
            .map(|row| (row.unambiguous_filename.clone(), row))
            .collect();
        Ok(GenomesIndex { source: path.display().to_string(), by_renamed })
    }

    fn get(&self, renamed: &str) -> Result<&GenomesListRow> {
        self.by_renamed.get(renamed).ok_or_else(|| BinShareError::LookupMiss {
            bin: renamed.to_string(),
            table: self.source.clone(),
        })
    }
}

/// Taxonomy and quality of every bin in `membership` that belongs to the
/// method it is listed under
pub fn join_membership(membership: &Membership, config: &LookupConfig) -> Result<Vec<BinReportRow>> {
    let mut genomes: FxHashMap<AssemblyMethod, GenomesIndex> = FxHashMap::default();
    for method in membership.methods() {
        let tables = config.tables_for(method)?;
        require_dir(&tables.taxonomy_dir)?;
        genomes.insert(method.clone(), GenomesIndex::load(&tables.genomes_list)?);
    }

    let mut taxonomy = TaxonomyLookup::default();
    let mut quality = QualityLookup::new(config);
    let mut rows = Vec::new();

    for (method, bins) in membership.iter() {
        info!("Retrieving taxonomy and quality of {} bins listed under {}", bins.len(), method);
        let taxonomy_dir = &config.tables_for(method)?.taxonomy_dir;
        let index = &genomes[method];

        for label in bins {
            let bin = BinId::new(label.as_str());
            if &bin.method != method {
                debug!("Skipping {}: recovered from {}, not {}", bin, bin.method, method);
                continue;
            }

            let renamed = bin.renamed_file();
            let entry = index.get(renamed)?;
            let sample = sample_from_path(&entry.path).ok_or_else(|| {
                BinShareError::malformed(&index.source, format!("no sample directory in path '{}'", entry.path))
            })?;
            let original = strip_fa(&entry.filename);
            let classification = taxonomy.classify(&taxonomy_dir.join(sample), original)?;
            let record = quality.record(&bin)?;

            rows.push(BinReportRow {
                assembly: method.clone(),
                original_bin_name: original.to_string(),
                renamed_bin: bin.base_name().to_string(),
                gtdb_classification: classification,
                completeness: record.completeness,
                contamination: record.contamination,
                contig_n50: record.contig_n50,
                genome_size: record.genome_size,
            });
        }
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::tests::write_config;
    use std::collections::{BTreeMap, BTreeSet};
    use tempfile::TempDir;

    const MEGAHIT_GENOMES: &str = "path\tfilename\tunambiguous_filename\n\
        results/07_bins_refinement/binette/megahit/S1/final_bins/bin.7.fa\tbin.7.fa\tbin.1.fa\n\
        results/07_bins_refinement/binette/megahit/S2/final_bins/bin.7.fa\tbin.7.fa\tbin.2.fa\n";

    const METASPADES_GENOMES: &str = "path\tfilename\tunambiguous_filename\n\
        results/07_bins_refinement/binette/metaspades/S1/final_bins/bin.3.fa\tbin.3.fa\tbin.4.fa\n";

    fn setup(dir: &Path) -> LookupConfig {
        let config = write_config(dir);
        let megahit = &config.methods[&AssemblyMethod::Megahit];
        std::fs::write(&megahit.genomes_list, MEGAHIT_GENOMES).unwrap();
        let s1 = megahit.taxonomy_dir.join("S1");
        let s2 = megahit.taxonomy_dir.join("S2");
        std::fs::create_dir_all(&s1).unwrap();
        std::fs::create_dir_all(&s2).unwrap();
        std::fs::write(
            s1.join(BACTERIA_SUMMARY),
            "user_genome\tclassification\tfastani_reference\nbin.7\td__Bacteria;p__Bacillota\tGCF_1\n",
        )
        .unwrap();
        std::fs::write(s1.join(ARCHAEA_SUMMARY), "user_genome\tclassification\n").unwrap();
        std::fs::write(s2.join(BACTERIA_SUMMARY), "user_genome\tclassification\nbin.9\td__Bacteria\n").unwrap();
        std::fs::write(s2.join(ARCHAEA_SUMMARY), "user_genome\tclassification\nbin.7\td__Archaea;p__Halobacteriota\n")
            .unwrap();

        let metaspades = &config.methods[&AssemblyMethod::Metaspades];
        std::fs::write(&metaspades.genomes_list, METASPADES_GENOMES).unwrap();
        let s1 = metaspades.taxonomy_dir.join("S1");
        std::fs::create_dir_all(&s1).unwrap();
        std::fs::write(s1.join(BACTERIA_SUMMARY), "user_genome\tclassification\n").unwrap();
        std::fs::write(s1.join(ARCHAEA_SUMMARY), "user_genome\tclassification\n").unwrap();
        config
    }

    fn membership(entries: &[(AssemblyMethod, &[&str])]) -> Membership {
        let map: BTreeMap<AssemblyMethod, BTreeSet<String>> = entries
            .iter()
            .map(|(m, bins)| (m.clone(), bins.iter().map(|b| b.to_string()).collect()))
            .collect();
        Membership(map)
    }

    #[test]
    fn test_sample_from_path() {
        assert_eq!(sample_from_path("results/07_bins_refinement/binette/metaflye/S7/final_bins/bin.1.fa"), Some("S7"));
        assert_eq!(sample_from_path("bins/bin.1.fa"), None);
    }

    #[test]
    fn test_join_membership() {
        let dir = TempDir::new().unwrap();
        let config = setup(dir.path());
        let input = membership(&[
            (AssemblyMethod::Megahit, &["megahit.bin.1.fa", "megahit.bin.2.fa", "metaspades.bin.4.fa"]),
            (AssemblyMethod::Metaspades, &["metaspades.bin.4.fa"]),
        ]);

        let rows = join_membership(&input, &config).unwrap();
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].assembly, AssemblyMethod::Megahit);
        assert_eq!(rows[0].original_bin_name, "bin.7");
        assert_eq!(rows[0].renamed_bin, "bin.1");
        assert_eq!(rows[0].gtdb_classification, "d__Bacteria;p__Bacillota");
        assert_eq!(rows[0].contig_n50, 15000);

        // Falls back to the archaeal summary
        assert_eq!(rows[1].gtdb_classification, "d__Archaea;p__Halobacteriota");
        assert_eq!(rows[1].completeness, 80.0);

        // metaspades.bin.4 listed under megahit is skipped there
        assert_eq!(rows[2].assembly, AssemblyMethod::Metaspades);
        assert_eq!(rows[2].original_bin_name, "bin.3");
        assert_eq!(rows[2].gtdb_classification, UNCLASSIFIED);
    }

    #[test]
    fn test_join_membership_missing_genomes_entry() {
        let dir = TempDir::new().unwrap();
        let config = setup(dir.path());
        let input = membership(&[(AssemblyMethod::Megahit, &["megahit.bin.5.fa"])]);
        let err = join_membership(&input, &config).unwrap_err();
        assert!(matches!(err, BinShareError::LookupMiss { ref bin, .. } if bin == "bin.5.fa"));
    }

    #[test]
    fn test_join_membership_missing_tables() {
        let dir = TempDir::new().unwrap();
        let config = setup(dir.path());

        let input = membership(&[(AssemblyMethod::Metaflye, &["metaflye.bin.1.fa"])]);
        let err = join_membership(&input, &config).unwrap_err();
        assert!(matches!(err, BinShareError::UnknownMethod { .. }));

        let megahit = &config.methods[&AssemblyMethod::Megahit];
        std::fs::remove_file(megahit.taxonomy_dir.join("S1").join(BACTERIA_SUMMARY)).unwrap();
        let input = membership(&[(AssemblyMethod::Megahit, &["megahit.bin.1.fa"])]);
        let err = join_membership(&input, &config).unwrap_err();
        assert!(matches!(err, BinShareError::MissingExternalResource { .. }));
    }
}
