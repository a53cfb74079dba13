use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::matrix::IdentityMatrix;
use crate::method::AssemblyMethod;

/// Bin label -> methods in which an equivalent bin was observed
pub type SharedBins = BTreeMap<String, BTreeSet<AssemblyMethod>>;

/// For every bin, the methods of all bins with identity >= `threshold`,
/// its own method included
pub fn build_shared_bins(matrix: &IdentityMatrix, threshold: f64) -> SharedBins {
    let n = matrix.len();
    info!("Searching for shared bins among {} bins (identity >= {})", n, threshold);

    let per_bin: Vec<(String, BTreeSet<AssemblyMethod>)> = (0..n)
        .into_par_iter()
        .map(|i| {
            let bin = matrix.bin(i);
            let mut shared_with: BTreeSet<AssemblyMethod> = matrix
                .partners(i, threshold)
                .map(|j| {
                    debug!(
                        "Found identity of {}% between {} and {}",
                        matrix.get(i, j),
                        bin,
                        matrix.bin(j)
                    );
                    matrix.bin(j).method.clone()
                })
                .collect();
            shared_with.insert(bin.method.clone());
            (bin.label.clone(), shared_with)
        })
        .collect();

    per_bin.into_iter().collect()
}

/// Method -> bins assigned to it. A bin appears under every method it was
/// found similar to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Membership(pub BTreeMap<AssemblyMethod, BTreeSet<String>>);

impl Membership {
    /// Invert the per-bin shared-with lists
    pub fn from_shared_bins(shared_bins: &SharedBins) -> Self {
        let mut membership: BTreeMap<AssemblyMethod, BTreeSet<String>> = BTreeMap::new();
        for (bin, methods) in shared_bins {
            for method in methods {
                membership.entry(method.clone()).or_default().insert(bin.clone());
            }
        }
        Membership(membership)
    }

    pub fn methods(&self) -> impl Iterator<Item = &AssemblyMethod> {
        self.0.keys()
    }

    pub fn get(&self, method: &AssemblyMethod) -> Option<&BTreeSet<String>> {
        self.0.get(method)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AssemblyMethod, &BTreeSet<String>)> {
        self.0.iter()
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut writer, formatter);
        self.serialize(&mut serializer)?;
        writer.flush()?;
        info!("Bins by assembly method saved to {:?}", path);
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let membership: Membership = serde_json::from_reader(reader)?;
        debug!("Loaded {} assembly methods from {:?}", membership.0.len(), path);
        Ok(membership)
    }
}

pub fn build_method_membership(shared_bins: &SharedBins) -> Membership {
    Membership::from_shared_bins(shared_bins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::BinId;
    use tempfile::TempDir;

    fn matrix(labels: &[&str], values: &[(usize, usize, f64)]) -> IdentityMatrix {
        let mut m = IdentityMatrix::new(labels.iter().map(|l| BinId::new(*l)).collect());
        for &(i, j, v) in values {
            m.set(i, j, v);
        }
        m
    }

    fn names(methods: &BTreeSet<AssemblyMethod>) -> Vec<&str> {
        methods.iter().map(AssemblyMethod::as_str).collect()
    }

    fn sample() -> IdentityMatrix {
        matrix(
            &["megahit.bin.1.fa", "metaspades.bin.4.fa", "metaflye.bin.2.fa", "megahit.bin.7.fa"],
            &[(0, 1, 99.95), (0, 2, 99.5), (1, 2, 99.0), (3, 0, 80.0), (3, 1, 80.0), (3, 2, 99.9)],
        )
    }

    #[test]
    fn test_shared_bins_includes_own_method() {
        let shared = build_shared_bins(&sample(), 99.9);
        assert_eq!(names(&shared["megahit.bin.1.fa"]), vec!["megahit", "metaspades"]);
        assert_eq!(names(&shared["metaspades.bin.4.fa"]), vec!["megahit", "metaspades"]);
        assert_eq!(names(&shared["metaflye.bin.2.fa"]), vec!["megahit", "metaflye"]);
        assert_eq!(names(&shared["megahit.bin.7.fa"]), vec!["megahit", "metaflye"]);
        for (label, methods) in &shared {
            assert!(methods.contains(&AssemblyMethod::from_bin_label(label)));
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let shared = build_shared_bins(&sample(), 99.95);
        assert_eq!(names(&shared["megahit.bin.1.fa"]), vec!["megahit", "metaspades"]);
        assert_eq!(names(&shared["metaflye.bin.2.fa"]), vec!["metaflye"]);
    }

    #[test]
    fn test_raising_threshold_shrinks_lists() {
        let m = sample();
        let thresholds = [0.0, 80.0, 99.0, 99.5, 99.9, 99.95, 100.0];
        for pair in thresholds.windows(2) {
            let low = build_shared_bins(&m, pair[0]);
            let high = build_shared_bins(&m, pair[1]);
            for (bin, methods) in &high {
                assert!(methods.is_subset(&low[bin]), "{} grew between {} and {}", bin, pair[0], pair[1]);
            }
        }
    }

    #[test]
    fn test_membership_inverts_shared_bins() {
        let membership = build_method_membership(&build_shared_bins(&sample(), 99.9));
        let megahit: Vec<&String> = membership.get(&AssemblyMethod::Megahit).unwrap().iter().collect();
        assert_eq!(megahit.len(), 4);
        let metaflye: Vec<&str> =
            membership.get(&AssemblyMethod::Metaflye).unwrap().iter().map(String::as_str).collect();
        assert_eq!(metaflye, vec!["megahit.bin.7.fa", "metaflye.bin.2.fa"]);
    }

    #[test]
    fn test_membership_json_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bins.json");
        let membership = build_method_membership(&build_shared_bins(&sample(), 99.9));
        membership.save_json(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("    \"megahit\": ["));

        let reloaded = Membership::load_json(&path).unwrap();
        assert_eq!(reloaded, membership);
    }

    #[test]
    fn test_membership_json_accepts_unsorted_lists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bins.json");
        std::fs::write(&path, r#"{"metaspades": ["b3", "b2"], "megahit": ["b2", "b1"]}"#).unwrap();
        let membership = Membership::load_json(&path).unwrap();
        let methods: Vec<&str> = membership.methods().map(AssemblyMethod::as_str).collect();
        assert_eq!(methods, vec!["megahit", "metaspades"]);
        let metaspades: Vec<&str> =
            membership.get(&AssemblyMethod::Metaspades).unwrap().iter().map(String::as_str).collect();
        assert_eq!(metaspades, vec!["b2", "b3"]);
    }
}
