//! Parallel fragment processing using std::thread.
//!
//! Fragments are independent, so they can be parsed on worker threads. Each
//! worker owns its result buffer and results are reassembled in fragment
//! order before accumulation, keeping the aggregate index deterministic for
//! a fixed input set.

use crate::abbrev::get_abbrev_table;
use crate::parse::{parse_fragment, EtymonEntry};
use std::thread::{self, JoinHandle};

/// Default worker count when `--threads 0` is given.
pub fn detect_threads() -> usize {
    thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

/// Parse all fragments across `num_threads` workers, returning one slot per
/// input fragment in input order (`None` for non-entries).
pub fn parse_fragments_parallel(
    fragments: &[String],
    num_threads: usize,
) -> Vec<Option<EtymonEntry>> {
    if fragments.is_empty() {
        return vec![];
    }

    let num_threads = num_threads.min(fragments.len()).max(1);
    let chunk_size = (fragments.len() + num_threads - 1) / num_threads;

    let chunks: Vec<Vec<(usize, String)>> = fragments
        .iter()
        .cloned()
        .enumerate()
        .collect::<Vec<_>>()
        .chunks(chunk_size)
        .map(|c| c.to_vec())
        .collect();

    let handles: Vec<JoinHandle<Vec<(usize, Option<EtymonEntry>)>>> = chunks
        .into_iter()
        .map(|chunk| {
            thread::spawn(move || {
                let table = get_abbrev_table();
                chunk
                    .into_iter()
                    .map(|(id, fragment)| (id, parse_fragment(&fragment, table)))
                    .collect()
            })
        })
        .collect();

    let mut results: Vec<(usize, Option<EtymonEntry>)> = Vec::with_capacity(fragments.len());
    for handle in handles {
        if let Ok(chunk_results) = handle.join() {
            results.extend(chunk_results);
        }
    }

    // Reassemble input order at the join point.
    results.sort_by_key(|&(id, _)| id);
    results.into_iter().map(|(_, entry)| entry).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests for parallel parsing
// ─────────────────────────────────────────────────────────────────────────────
