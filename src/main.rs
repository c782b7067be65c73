use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use kestrel_index::build::IndexBuilder;
use kestrel_index::packed_ref::PackedReference;
use kestrel_index::perfect::{PerfectMatch, PerfectTable};
use kestrel_index::ref_meta::RefMetadata;
use kestrel_index::shm::ShmManager;
use kestrel_index::smem::{ReadSeeding, SmemScratch};
use kestrel_index::{HugepageMode, IndexOpts, KestrelIndex};

#[derive(Parser)]
#[command(name = "kestrel-index")]
#[command(about = "Build and inspect the FM-index of the Kestrel aligner", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build all index components from <PREFIX>.pac (plus .ann/.amb)
    Index {
        /// Index prefix; expects <PREFIX>.pac next to it
        #[arg(value_name = "PREFIX")]
        prefix: PathBuf,

        /// Suffix-array sparsity (power of two)
        #[arg(short = 's', long, value_name = "INT", default_value = "8")]
        sa_sparsity: u32,

        /// Also build the 11/13-bp SMEM acceleration tables
        #[arg(long)]
        accel: bool,

        /// Perfect-match seed length; 0 disables the table
        #[arg(short = 'l', long, value_name = "INT", default_value = "0")]
        perfect_seed_len: i32,

        /// Slot-array overfill factor for the perfect table
        #[arg(long, value_name = "FLOAT", default_value = "1.2")]
        perfect_slack: f64,
    },

    /// Report SMEMs for a raw query sequence against a built index
    Smem {
        #[arg(value_name = "PREFIX")]
        prefix: PathBuf,

        /// Query bases (ACGTN)
        #[arg(value_name = "SEQ")]
        query: String,

        /// Minimum SMEM length for emission
        #[arg(short = 'k', long, value_name = "INT", default_value = "19")]
        min_seed_len: i32,

        /// Minimum BWT interval size
        #[arg(long, value_name = "INT", default_value = "1")]
        min_intv: i64,

        /// Perfect-match seed length of a table to consult first
        #[arg(short = 'l', long, value_name = "INT", default_value = "0")]
        perfect_seed_len: i32,
    },

    /// Probe a query against the perfect-match table alone
    Perfect {
        #[arg(value_name = "PREFIX")]
        prefix: PathBuf,

        /// Query bases (ACGTN)
        #[arg(value_name = "SEQ")]
        query: String,

        /// Seed length of the table to load
        #[arg(short = 'l', long, value_name = "INT")]
        seed_len: i32,

        /// Fractional overlap above which redundant hits collapse
        #[arg(long, value_name = "FLOAT", default_value = "0.95")]
        mask_level_redun: f64,
    },

    /// Publish a built index into the shared-segment set
    Publish {
        #[arg(value_name = "PREFIX")]
        prefix: PathBuf,

        /// Hugepage backing: normal, default, 2mb or 1gb
        #[arg(long, value_name = "MODE", default_value = "normal")]
        hugepages: String,

        /// Fail instead of downgrading when hugepages are unavailable
        #[arg(long)]
        force: bool,

        /// Perfect-match seed length to publish alongside the BWT
        #[arg(short = 'l', long, value_name = "INT", default_value = "0")]
        perfect_seed_len: i32,
    },

    /// Tear down the shared-segment set for an index prefix
    Unpublish {
        #[arg(value_name = "PREFIX")]
        prefix: PathBuf,
    },
}

fn parse_hugepages(s: &str) -> anyhow::Result<HugepageMode> {
    match s {
        "normal" => Ok(HugepageMode::Normal),
        "default" => Ok(HugepageMode::DefaultHuge),
        "2mb" => Ok(HugepageMode::Huge2Mb),
        "1gb" => Ok(HugepageMode::Huge1Gb),
        other => anyhow::bail!("unknown hugepage mode `{other}`"),
    }
}

fn encode_query(seq: &str) -> Vec<u8> {
    seq.bytes()
        .map(|b| match b.to_ascii_uppercase() {
            b'A' => 0,
            b'C' => 1,
            b'G' => 2,
            b'T' => 3,
            _ => 4,
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Index {
            prefix,
            sa_sparsity,
            accel,
            perfect_seed_len,
            perfect_slack,
        } => {
            anyhow::ensure!(
                sa_sparsity.is_power_of_two(),
                "--sa-sparsity must be a power of two"
            );
            let opts = IndexOpts {
                sa_sparsity,
                perfect_seed_len,
                perfect_slack,
                ..IndexOpts::default()
            };
            IndexBuilder::build_files(&prefix, &opts, accel)
                .with_context(|| format!("indexing {}", prefix.display()))?;
        }

        Commands::Smem {
            prefix,
            query,
            min_seed_len,
            min_intv,
            perfect_seed_len,
        } => {
            let opts = IndexOpts {
                min_seed_len,
                min_intv,
                perfect_seed_len,
                ..IndexOpts::default()
            };
            let index = KestrelIndex::load(&prefix, &opts)
                .with_context(|| format!("loading index {}", prefix.display()))?;
            let engine = index.engine(opts);

            let q = encode_query(&query);
            let mut scratch = SmemScratch::new();
            match engine.seed_read(&q, 0, &mut scratch) {
                ReadSeeding::Perfect(hits) => {
                    println!("perfect match: {} locations", hits.len());
                    for h in hits {
                        println!(
                            "  rid {} pos {} strand {}",
                            h.rid,
                            h.pos,
                            if h.is_rev { '-' } else { '+' }
                        );
                    }
                }
                ReadSeeding::Smems(smems) => {
                    println!("{} SMEMs", smems.len());
                    let mut seeds = Vec::new();
                    engine.resolve_seeds(&smems, &mut seeds, &mut scratch);
                    for s in &smems {
                        println!(
                            "  [{}..{}] interval {}",
                            s.query_start, s.query_end, s.interval_size
                        );
                    }
                    for seed in seeds {
                        println!(
                            "  seed q{} len {} -> ref {}",
                            seed.query_pos, seed.len, seed.ref_pos
                        );
                    }
                }
            }
        }

        Commands::Perfect {
            prefix,
            query,
            seed_len,
            mask_level_redun,
        } => {
            let packed = Arc::new(
                PackedReference::load(&prefix)
                    .with_context(|| format!("loading reference {}", prefix.display()))?,
            );
            let meta = RefMetadata::restore(&prefix)?;
            let table = PerfectTable::load(&prefix, seed_len, packed, None)
                .with_context(|| format!("loading perfect table {}", prefix.display()))?;
            println!(
                "table: seed_len {}, {} slots, {} used, {} keys, {} location words",
                table.seed_len,
                table.num_seed_entries,
                table.num_used,
                table.num_keys,
                table.num_loc_entries()
            );

            let q = encode_query(&query);
            let m = table.find_match(&q);
            match m {
                PerfectMatch::Matched {
                    location, is_rev, ..
                } => {
                    println!(
                        "matched: canonical location {} strand {}",
                        location,
                        if is_rev { '-' } else { '+' }
                    );
                    for h in table.collect_hits(&m, &q, 0, &meta, mask_level_redun) {
                        println!(
                            "  {} pos {} strand {}{}",
                            meta.anns[h.rid as usize].name,
                            h.pos,
                            if h.is_rev { '-' } else { '+' },
                            if h.is_alt { " (alt)" } else { "" }
                        );
                    }
                }
                PerfectMatch::SeedOnlyMatched => println!("seed-only match"),
                PerfectMatch::NotMatched => println!("not matched"),
                PerfectMatch::ContainsN => println!("query contains N"),
                PerfectMatch::NoTable => println!("no table"),
            }
        }

        Commands::Publish {
            prefix,
            hugepages,
            force,
            perfect_seed_len,
        } => {
            let mode = parse_hugepages(&hugepages)?;
            let opts = IndexOpts {
                perfect_seed_len,
                hugepage_mode: mode,
                hugepage_force: force,
                ..IndexOpts::default()
            };
            let index = KestrelIndex::load(&prefix, &opts)
                .with_context(|| format!("loading index {}", prefix.display()))?;
            let mut mgr = ShmManager::new(&prefix, mode, force);
            index
                .publish_shared(&mut mgr)
                .with_context(|| format!("publishing {}", prefix.display()))?;
            println!("published shared segments for {}", prefix.display());
        }

        Commands::Unpublish { prefix } => {
            let mut mgr = ShmManager::new(&prefix, HugepageMode::Normal, false);
            mgr.destroy();
            println!("removed shared segments for {}", prefix.display());
        }
    }
    Ok(())
}
