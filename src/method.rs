use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Assembly pipeline variant that produced a bin
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AssemblyMethod {
    Megahit,
    Metaspades,
    Metaflye,
    Hybridspades,
    /// Any prefix outside the pipeline's assemblers
    Other(String),
}

impl AssemblyMethod {
    pub const KNOWN: [AssemblyMethod; 4] = [
        AssemblyMethod::Hybridspades,
        AssemblyMethod::Megahit,
        AssemblyMethod::Metaflye,
        AssemblyMethod::Metaspades,
    ];

    pub fn from_name(name: &str) -> Self {
        match name {
            "megahit" => AssemblyMethod::Megahit,
            "metaspades" => AssemblyMethod::Metaspades,
            "metaflye" => AssemblyMethod::Metaflye,
            "hybridspades" => AssemblyMethod::Hybridspades,
            other => AssemblyMethod::Other(other.to_string()),
        }
    }

    /// The method owning a bin label, i.e. everything before the first `.`
    pub fn from_bin_label(label: &str) -> Self {
        Self::from_name(label.split('.').next().unwrap_or(label))
    }

    pub fn as_str(&self) -> &str {
        match self {
            AssemblyMethod::Megahit => "megahit",
            AssemblyMethod::Metaspades => "metaspades",
            AssemblyMethod::Metaflye => "metaflye",
            AssemblyMethod::Hybridspades => "hybridspades",
            AssemblyMethod::Other(name) => name,
        }
    }
}

impl fmt::Display for AssemblyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Ord for AssemblyMethod {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for AssemblyMethod {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for AssemblyMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AssemblyMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(AssemblyMethod::from_name(&name))
    }
}

/// A bin label together with the method it came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BinId {
    pub label: String,
    pub method: AssemblyMethod,
}

impl BinId {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let method = AssemblyMethod::from_bin_label(&label);
        BinId { label, method }
    }

    /// Label without the `<method>.` prefix and the `.fa` extension, as
    /// CheckM2 and the genomes lists name the bin
    pub fn base_name(&self) -> &str {
        let prefix_len = self.method.as_str().len();
        let rest = if self.label.len() > prefix_len && self.label.as_bytes()[prefix_len] == b'.' {
            &self.label[prefix_len + 1..]
        } else {
            &self.label
        };
        strip_fa(rest)
    }

    /// Label without the `<method>.` prefix, extension kept
    pub fn renamed_file(&self) -> &str {
        let prefix = self.method.as_str();
        self.label
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(&self.label)
    }
}

impl fmt::Display for BinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

pub fn strip_fa(name: &str) -> &str {
    name.strip_suffix(".fa").unwrap_or(name)
}
