use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::path::PathBuf;

mod cluster;
mod config;
mod error;
mod filter;
mod matrix;
mod method;
mod names;
mod quality;
mod shared;
mod taxonomy;

use crate::cluster::ClusterStrategy;
use crate::config::LookupConfig;
use crate::error::Result;
use crate::matrix::IdentityMatrix;
use crate::method::AssemblyMethod;
use crate::shared::Membership;

#[derive(Parser)]
#[command(name = "binshare")]
#[command(about = "Find bins shared between assembly methods and cluster them by identity.", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    // Threading
    /// Number of threads to use for parallel operations.
    #[arg(short = 't', long = "threads", value_name = "N", global = true)]
    threads: Option<usize>,

    // Logging
    /// Verbosity level (0 = error, 1 = info, 2 = debug).
    #[arg(short = 'v', long = "verbose", value_name = "N", default_value_t = 1, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Compare bins through a pairwise identity matrix and group them by assembly method.
    Compare {
        /// Load the lower-triangular identity matrix (skani triangle output) from this FILE.
        #[arg(long = "matrix", value_name = "FILE")]
        matrix: PathBuf,

        /// Write the full identity matrix as TSV to this FILE.
        #[arg(long = "tsv-output", value_name = "FILE")]
        tsv_output: PathBuf,

        /// Write the bins found under each assembly method as JSON to this FILE.
        #[arg(long = "json-output", value_name = "FILE")]
        json_output: PathBuf,

        /// Minimal identity to consider two bins as the same.
        #[arg(long = "ani-threshold", value_name = "F", default_value_t = 99.9)]
        ani_threshold: f64,
    },

    /// Report taxonomy and quality of unique bins, or of the bins of one assembly method.
    Check {
        /// Load the bins by assembly method from this JSON FILE (written by `compare`).
        #[arg(long = "json-results", value_name = "FILE")]
        json_results: PathBuf,

        /// Write the per-bin report to this FILE.
        #[arg(long = "tsv-output", value_name = "FILE")]
        tsv_output: PathBuf,

        /// Bins recovered by one assembly method only, or the bins of the given method.
        #[arg(long = "assembly", value_enum)]
        assembly: AssemblySelection,

        #[command(flatten)]
        lookup: LookupOptions,
    },

    /// Group bins sharing a minimal identity into clusters.
    Cluster {
        /// Load the identity matrix TSV (written by `compare`) from this FILE.
        #[arg(long = "tsv-results", value_name = "FILE")]
        tsv_results: PathBuf,

        /// Minimal identity to consider two bins as being in the same cluster.
        #[arg(long = "threshold", value_name = "F", default_value_t = 97.0)]
        threshold: f64,

        /// Retrieve the CheckM2 metrics of the clustered bins.
        #[arg(long = "quality")]
        quality: bool,

        /// How linked bins are grouped.
        #[arg(long = "strategy", value_enum, default_value_t = ClusterStrategy::Connected)]
        strategy: ClusterStrategy,

        /// Write the bin-by-bin table to this FILE.
        #[arg(long = "tsv-output-full", value_name = "FILE")]
        tsv_output_full: PathBuf,

        /// Write the per-cluster summary to this FILE.
        #[arg(long = "tsv-output-summary", value_name = "FILE")]
        tsv_output_summary: PathBuf,

        #[command(flatten)]
        lookup: LookupOptions,
    },

    /// Give duplicated bin filenames an unambiguous name and write the genomes list.
    RenameTable {
        /// Read bin paths, one per line, from this FILE.
        #[arg(long = "bins-list", value_name = "FILE")]
        bins_list: PathBuf,

        /// Write the genomes list TSV to this FILE.
        #[arg(long = "output", value_name = "FILE")]
        output: PathBuf,
    },
}

#[derive(clap::Args)]
struct LookupOptions {
    /// Pipeline results directory holding the CheckM2, GTDB-Tk and genomes list tables.
    #[arg(long = "results-dir", value_name = "DIR", default_value = "results")]
    results_dir: PathBuf,

    /// Dereplication identity the quality tables were produced at.
    #[arg(long = "drep-ani", value_name = "N", default_value_t = 97)]
    drep_ani: u32,

    /// Read the per-method table locations from this JSON FILE instead of --results-dir.
    #[arg(long = "lookup-config", value_name = "FILE")]
    lookup_config: Option<PathBuf>,
}

impl LookupOptions {
    fn resolve(&self) -> Result<LookupConfig> {
        match &self.lookup_config {
            Some(path) => LookupConfig::load(path),
            None => Ok(LookupConfig::pipeline_layout(&self.results_dir, self.drep_ani)),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum AssemblySelection {
    Unique,
    Megahit,
    Metaflye,
    Metaspades,
    Hybridspades,
}

impl AssemblySelection {
    fn method(self) -> Option<AssemblyMethod> {
        match self {
            AssemblySelection::Unique => None,
            AssemblySelection::Megahit => Some(AssemblyMethod::Megahit),
            AssemblySelection::Metaflye => Some(AssemblyMethod::Metaflye),
            AssemblySelection::Metaspades => Some(AssemblyMethod::Metaspades),
            AssemblySelection::Hybridspades => Some(AssemblyMethod::Hybridspades),
        }
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Compare { matrix: matrix_path, tsv_output, json_output, ani_threshold } => {
            let identities = matrix::read_lower_triangular(&matrix_path)?;
            if identities.is_empty() {
                warn!("No bins found in {:?}", matrix_path);
            }
            identities.write_tsv(&tsv_output)?;

            let shared_bins = shared::build_shared_bins(&identities, ani_threshold);
            let membership = shared::build_method_membership(&shared_bins);
            for (method, bins) in membership.iter() {
                info!("{}: {} bins", method, bins.len());
            }
            membership.save_json(&json_output)?;
        }
        Command::Check { json_results, tsv_output, assembly, lookup } => {
            let membership = Membership::load_json(&json_results)?;
            let bins = match assembly.method() {
                None => filter::identify_unique(&membership),
                Some(method) => filter::select_by_method(&membership, &method)?,
            };
            let config = lookup.resolve()?;
            let rows = taxonomy::join_membership(&bins, &config)?;
            quality::write_tsv(&tsv_output, &rows)?;
        }
        Command::Cluster {
            tsv_results,
            threshold,
            quality: with_quality,
            strategy,
            tsv_output_full,
            tsv_output_summary,
            lookup,
        } => {
            let identities = IdentityMatrix::read_tsv(&tsv_results)?;
            let clusters = cluster::cluster(&identities, threshold, strategy)?;

            if with_quality {
                let config = lookup.resolve()?;
                let (rows, summary) = quality::join_clusters(&clusters, &config)?;
                quality::write_tsv(&tsv_output_full, &rows)?;
                quality::write_tsv(&tsv_output_summary, &summary)?;
            } else {
                let (rows, summary) = quality::cluster_members(&clusters);
                quality::write_tsv(&tsv_output_full, &rows)?;
                quality::write_tsv(&tsv_output_summary, &summary)?;
            }
        }
        Command::RenameTable { bins_list, output } => {
            let paths = names::read_bins_list(&bins_list)?;
            let rows = names::unambiguous_names(&paths);
            let renamed = rows.iter().filter(|r| r.filename != r.unambiguous_filename).count();
            info!("{} of {} bins renamed", renamed, rows.len());
            quality::write_tsv(&output, &rows)?;
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    // Initialize logger based on verbosity
    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    if let Some(threads) = args.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
            warn!("Could not configure {} threads: {}", threads, e);
        }
    }

    if let Err(e) = run(args.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    info!("Done.");
}
