use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashMap;

use crate::error::{BinShareError, Result};
use crate::method::AssemblyMethod;
use crate::shared::Membership;

/// Bins recovered by one assembly method only. Bins observed under two or
/// more methods are dropped from every list; every method key is kept.
pub fn identify_unique(membership: &Membership) -> Membership {
    let mut occurrences: FxHashMap<&str, usize> = FxHashMap::default();
    for (_, bins) in membership.iter() {
        for bin in bins {
            *occurrences.entry(bin.as_str()).or_insert(0) += 1;
        }
    }

    let unique: BTreeMap<AssemblyMethod, BTreeSet<String>> = membership
        .iter()
        .map(|(method, bins)| {
            let kept = bins
                .iter()
                .filter(|bin| occurrences.get(bin.as_str()).copied() == Some(1))
                .cloned()
                .collect();
            (method.clone(), kept)
        })
        .collect();

    Membership(unique)
}

/// Bins listed under `method`, cross-method duplicates included
pub fn select_by_method(membership: &Membership, method: &AssemblyMethod) -> Result<Membership> {
    let bins = membership.get(method).ok_or_else(|| BinShareError::UnknownMethod {
        method: method.to_string(),
        reason: "no such assembly method in the results".to_string(),
    })?;
    let mut selected = BTreeMap::new();
    selected.insert(method.clone(), bins.clone());
    Ok(Membership(selected))
}
