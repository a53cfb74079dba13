use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{BinShareError, Result};
use crate::method::AssemblyMethod;

/// Locations of the external tables describing one assembly method's bins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodTables {
    /// CheckM2 `quality_report.tsv`
    pub quality_report: PathBuf,
    /// Genomes list mapping renamed bins back to their original files
    pub genomes_list: PathBuf,
    /// GTDB-Tk output directory, one sub-directory per sample
    pub taxonomy_dir: PathBuf,
}

/// Method -> table locations, injected into the joiners
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupConfig {
    pub methods: BTreeMap<AssemblyMethod, MethodTables>,
}

impl LookupConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(require_file(path)?)?;
        let config: LookupConfig = serde_json::from_reader(BufReader::new(file))?;
        debug!("Loaded lookup tables for {} assembly methods from {:?}", config.methods.len(), path);
        Ok(config)
    }

    /// The directory layout the binning pipeline writes under `results_dir`
    /// for bins dereplicated at `ani` percent identity
    pub fn pipeline_layout(results_dir: &Path, ani: u32) -> Self {
        let postprocessing = results_dir.join("08_bins_postprocessing");
        let dereplicated = postprocessing
            .join("dereplicated_genomes_filtered_by_quality")
            .join(ani.to_string());

        let methods = AssemblyMethod::KNOWN
            .iter()
            .map(|method| {
                let name = method.as_str();
                let tables = MethodTables {
                    quality_report: dereplicated.join(name).join("checkm2").join("quality_report.tsv"),
                    genomes_list: postprocessing.join("genomes_list").join(name).join("unduplicated.tsv"),
                    taxonomy_dir: postprocessing.join("gtdb_tk").join(name),
                };
                (method.clone(), tables)
            })
            .collect();

        LookupConfig { methods }
    }

    pub fn tables_for(&self, method: &AssemblyMethod) -> Result<&MethodTables> {
        self.methods.get(method).ok_or_else(|| BinShareError::UnknownMethod {
            method: method.to_string(),
            reason: "no lookup tables are configured for it".to_string(),
        })
    }
}

pub fn require_file(path: &Path) -> Result<&Path> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(BinShareError::MissingExternalResource { path: path.to_path_buf() })
    }
}

pub fn require_dir(path: &Path) -> Result<&Path> {
    if path.is_dir() {
        Ok(path)
    } else {
        Err(BinShareError::MissingExternalResource { path: path.to_path_buf() })
    }
}
