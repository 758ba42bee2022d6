use bzip2::read::BzDecoder;
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::PathBuf;
use std::time::{Duration, Instant};

mod abbrev;
mod parallel;
mod parse;

use abbrev::{get_abbrev_table, init_abbrevs};
use parse::{accumulate, parse_fragment, AggregateIndex, EtymonEntry};

/// Processing strategy for parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// Sequential processing (baseline)
    Sequential,
    /// Two-phase: load all fragments, then parse in parallel
    TwoPhase,
}

#[derive(Parser)]
#[command(name = "cdial-rust")]
#[command(about = "CDIAL etymon scraper backend - extracts per-language reflexes from saved dictionary pages")]
struct Args {
    /// Input page stream: saved dictionary pages, concatenated (.txt/.html or .bz2)
    input: PathBuf,

    /// Output JSON file (etymon number -> reflex records)
    output: PathBuf,

    /// Processing strategy
    #[arg(short, long, value_enum, default_value_t = Strategy::Sequential)]
    strategy: Strategy,

    /// Number of threads for two-phase parsing (0 = auto-detect)
    #[arg(short, long, default_value_t = 4)]
    threads: usize,

    /// Limit number of entries to parse (for testing)
    #[arg(long)]
    limit: Option<usize>,

    /// Path to abbreviation schema YAML (default: embedded table)
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Quiet mode - minimal output
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Default)]
struct Stats {
    fragments_processed: usize,
    entries_parsed: usize,
    reflexes_extracted: usize,
    lemma_only: usize,
    skipped: usize,
    elapsed: Duration,
}

impl Stats {
    fn record(&mut self, entry: &EtymonEntry) {
        self.entries_parsed += 1;
        self.reflexes_extracted += entry.reflexes.len();
        // Entries whose only record is the implicit head record carry no
        // cross-linguistic cognates.
        if entry.reflexes.len() == 1 {
            self.lemma_only += 1;
        }
    }
}

/// Slice a saved page stream into entry fragments at `<number>` markers,
/// re-prefixing each chunk so the number element survives the split. The
/// leading chunk before the first marker is kept; it has no number element
/// and is skipped downstream like any other non-entry.
fn split_fragments(contents: &str) -> Vec<String> {
    contents
        .split("<number>")
        .map(|chunk| format!("<number>{}", chunk))
        .collect()
}

fn read_input(path: &PathBuf) -> std::io::Result<String> {
    let file = File::open(path)?;
    let mut reader: Box<dyn Read> = if path.to_string_lossy().ends_with(".bz2") {
        Box::new(BufReader::with_capacity(256 * 1024, BzDecoder::new(file)))
    } else {
        Box::new(BufReader::with_capacity(256 * 1024, file))
    };

    let mut contents = String::new();
    reader.read_to_string(&mut contents)?;
    Ok(contents)
}

fn main() -> std::io::Result<()> {
    let args = Args::parse();

    // A table that fails to build is a configuration defect, not a
    // per-entry fault: fail fast before touching any input.
    if let Err(e) = init_abbrevs(args.schema.as_ref()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if !args.quiet {
        println!("Parsing: {}", args.input.display());
        println!("Output: {}", args.output.display());
        println!("Codes in table: {}", get_abbrev_table().len());
        if let Some(limit) = args.limit {
            println!("Limit: {} entries", limit);
        }
        println!();
    }

    let start_time = Instant::now();
    let contents = read_input(&args.input)?;
    let fragments = split_fragments(&contents);
    drop(contents);

    let pb = if args.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}").unwrap());
        pb
    };

    let mut stats = Stats::default();
    let mut index = AggregateIndex::new();

    match args.strategy {
        Strategy::Sequential => {
            let table = get_abbrev_table();
            for fragment in &fragments {
                stats.fragments_processed += 1;
                if stats.fragments_processed % 100 == 0 {
                    pb.set_message(format!(
                        "Fragments: {} | Entries: {} | Reflexes: {}",
                        stats.fragments_processed, stats.entries_parsed, stats.reflexes_extracted
                    ));
                }

                match parse_fragment(fragment, table) {
                    Some(entry) => {
                        stats.record(&entry);
                        accumulate(&mut index, entry);
                    }
                    None => stats.skipped += 1,
                }

                if let Some(limit) = args.limit {
                    if stats.entries_parsed >= limit {
                        break;
                    }
                }
            }
        }
        Strategy::TwoPhase => {
            let threads = if args.threads == 0 {
                parallel::detect_threads()
            } else {
                args.threads
            };
            let results = parallel::parse_fragments_parallel(&fragments, threads);
            for result in results {
                stats.fragments_processed += 1;
                match result {
                    Some(entry) => {
                        stats.record(&entry);
                        accumulate(&mut index, entry);
                    }
                    None => stats.skipped += 1,
                }

                if let Some(limit) = args.limit {
                    if stats.entries_parsed >= limit {
                        break;
                    }
                }
            }
        }
    }

    pb.finish_and_clear();

    let output = File::create(&args.output)?;
    let writer = BufWriter::with_capacity(256 * 1024, output);
    serde_json::to_writer_pretty(writer, &index)?;

    stats.elapsed = start_time.elapsed();

    if !args.quiet {
        println!("============================================================");
        println!("Fragments processed: {}", stats.fragments_processed);
        println!("Entries parsed: {}", stats.entries_parsed);
        println!("Reflex records: {}", stats.reflexes_extracted);
        println!("Lemma-only entries: {}", stats.lemma_only);
        println!("Skipped fragments: {}", stats.skipped);
        println!("Etymon numbers: {}", index.len());
        println!(
            "Time: {}m {}s",
            stats.elapsed.as_secs() / 60,
            stats.elapsed.as_secs() % 60
        );
        println!("============================================================");
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests for fragment isolation
// ─────────────────────────────────────────────────────────────────────────────
