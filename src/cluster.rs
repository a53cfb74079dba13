use std::collections::BTreeMap;

use log::{debug, info};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{BinShareError, Result};
use crate::matrix::IdentityMatrix;
use crate::method::BinId;

/// Cluster label (starting at 1) -> member bins
pub type Clusters = BTreeMap<usize, Vec<BinId>>;

/// How bins linked by identity >= threshold are grouped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ClusterStrategy {
    /// Connected components: bins linked through any chain end up together
    #[default]
    Connected,
    /// Single pass over rows without merging clusters formed earlier
    Greedy,
}

/// Union-Find with path compression and union by rank
struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, x: usize, y: usize) {
        let px = self.find(x);
        let py = self.find(y);
        if px != py {
            if self.rank[px] < self.rank[py] {
                self.parent[px] = py;
            } else if self.rank[px] > self.rank[py] {
                self.parent[py] = px;
            } else {
                self.parent[py] = px;
                self.rank[px] += 1;
            }
        }
    }
}

pub fn cluster(matrix: &IdentityMatrix, threshold: f64, strategy: ClusterStrategy) -> Result<Clusters> {
    info!("Clustering {} bins at identity >= {} ({:?})", matrix.len(), threshold, strategy);
    let members = match strategy {
        ClusterStrategy::Connected => connected_clusters(matrix, threshold)?,
        ClusterStrategy::Greedy => greedy_clusters(matrix, threshold)?,
    };
    info!("Found {} clusters", members.len());

    Ok(members
        .into_iter()
        .enumerate()
        .map(|(i, group)| (i + 1, group.into_iter().map(|idx| matrix.bin(idx).clone()).collect()))
        .collect())
}

/// Connected components of the threshold graph. Clusters are numbered in
/// order of their first row, members listed in row order.
fn connected_clusters(matrix: &IdentityMatrix, threshold: f64) -> Result<Vec<Vec<usize>>> {
    let n = matrix.len();
    let mut uf = UnionFind::new(n);

    for i in 0..n {
        for j in (i + 1)..n {
            if matrix.get(i, j) >= threshold {
                uf.union(i, j);
            }
        }
    }

    let mut root_to_cluster: FxHashMap<usize, usize> = FxHashMap::default();
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for i in 0..n {
        let root = uf.find(i);
        let cluster = *root_to_cluster.entry(root).or_insert_with(|| {
            clusters.push(Vec::new());
            clusters.len() - 1
        });
        clusters[cluster].push(i);
    }

    let labeled: usize = clusters.iter().map(Vec::len).sum();
    let distinct: FxHashSet<usize> = clusters.iter().flatten().copied().collect();
    if labeled != n || distinct.len() != n {
        return Err(BinShareError::ClusterConsistencyViolation { labeled, expected: n });
    }

    Ok(clusters)
}

/// Row-at-a-time assignment. A row whose bin was already placed is skipped,
/// and two clusters are never merged, so a bin linking both can end up
/// listed in each of them.
fn greedy_clusters(matrix: &IdentityMatrix, threshold: f64) -> Result<Vec<Vec<usize>>> {
    let n = matrix.len();
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    let mut index: FxHashMap<usize, usize> = FxHashMap::default();
    let mut checked: FxHashSet<usize> = FxHashSet::default();

    for idx in 0..n {
        if checked.contains(&idx) {
            continue;
        }
        for col in matrix.partners(idx, threshold) {
            if let Some(&cluster) = index.get(&col) {
                clusters[cluster].push(idx);
                index.insert(idx, cluster);
                checked.insert(idx);
            } else if let Some(&cluster) = index.get(&idx) {
                clusters[cluster].push(col);
                index.insert(col, cluster);
                checked.insert(col);
            } else {
                clusters.push(vec![idx, col]);
                index.insert(idx, clusters.len() - 1);
                index.insert(col, clusters.len() - 1);
                checked.insert(idx);
                checked.insert(col);
            }
        }

        if !index.contains_key(&idx) {
            clusters.push(vec![idx]);
            index.insert(idx, clusters.len() - 1);
            checked.insert(idx);
        }
    }

    let duplicated = clusters.iter().map(Vec::len).sum::<usize>() - index.len();
    if duplicated > 0 {
        debug!("Greedy clustering listed {} bins in more than one cluster", duplicated);
    }
    if index.len() != n {
        return Err(BinShareError::ClusterConsistencyViolation { labeled: index.len(), expected: n });
    }

    Ok(clusters)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(labels: &[&str], values: &[(usize, usize, f64)]) -> IdentityMatrix {
        let mut m = IdentityMatrix::new(labels.iter().map(|l| BinId::new(*l)).collect());
        for &(i, j, v) in values {
            m.set(i, j, v);
        }
        m
    }

    fn labels(clusters: &Clusters) -> Vec<(usize, Vec<&str>)> {
        clusters
            .iter()
            .map(|(id, bins)| (*id, bins.iter().map(|b| b.label.as_str()).collect()))
            .collect()
    }

    #[test]
    fn test_documented_example_both_strategies() {
        let m = matrix(&["A", "B", "C"], &[(0, 1, 99.95), (0, 2, 50.0), (1, 2, 51.0)]);
        for strategy in [ClusterStrategy::Connected, ClusterStrategy::Greedy] {
            let clusters = cluster(&m, 99.9, strategy).unwrap();
            assert_eq!(labels(&clusters), vec![(1, vec!["A", "B"]), (2, vec!["C"])]);
        }
    }

    #[test]
    fn test_no_links_gives_singletons() {
        let m = matrix(&["A", "B", "C", "D"], &[(0, 1, 99.9), (2, 3, 97.0), (1, 3, 99.99)]);
        for strategy in [ClusterStrategy::Connected, ClusterStrategy::Greedy] {
            let clusters = cluster(&m, 100.0, strategy).unwrap();
            assert_eq!(clusters.len(), 4);
            assert!(clusters.values().all(|members| members.len() == 1));
        }
    }

    #[test]
    fn test_empty_matrix() {
        let m = IdentityMatrix::new(Vec::new());
        assert!(cluster(&m, 97.0, ClusterStrategy::Connected).unwrap().is_empty());
        assert!(cluster(&m, 97.0, ClusterStrategy::Greedy).unwrap().is_empty());
    }

    // A-C and B-D link first, then D-A joins the two groups
    fn bridged() -> IdentityMatrix {
        matrix(&["A", "B", "C", "D"], &[(0, 2, 99.0), (1, 3, 99.0), (0, 3, 99.0)])
    }

    #[test]
    fn test_connected_merges_transitive_links() {
        let clusters = cluster(&bridged(), 98.0, ClusterStrategy::Connected).unwrap();
        assert_eq!(labels(&clusters), vec![(1, vec!["A", "B", "C", "D"])]);
    }

    #[test]
    fn test_connected_is_a_partition() {
        let m = matrix(
            &["a", "b", "c", "d", "e", "f"],
            &[(0, 5, 99.0), (1, 2, 99.0), (3, 4, 10.0), (2, 4, 98.5)],
        );
        let clusters = cluster(&m, 98.0, ClusterStrategy::Connected).unwrap();
        let mut seen: Vec<&str> = clusters.values().flatten().map(|b| b.label.as_str()).collect();
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c", "d", "e", "f"]);
        assert_eq!(labels(&clusters), vec![(1, vec!["a", "f"]), (2, vec!["b", "c", "e"]), (3, vec!["d"])]);
    }

    #[test]
    fn test_greedy_does_not_merge() {
        // Row A opens {A, C} and appends D, then B joins through D.
        let clusters = cluster(&bridged(), 98.0, ClusterStrategy::Greedy).unwrap();
        assert_eq!(labels(&clusters), vec![(1, vec!["A", "C", "D", "B"])]);

        // Here B and C open separate clusters, and A links to both.
        let m = matrix(&["B", "C", "A", "D", "E"], &[(0, 3, 99.0), (1, 4, 99.0), (2, 3, 99.0), (2, 4, 99.0)]);
        let clusters = cluster(&m, 98.0, ClusterStrategy::Greedy).unwrap();
        assert_eq!(labels(&clusters), vec![(1, vec!["B", "D", "A"]), (2, vec!["C", "E", "A"])]);
    }
}
