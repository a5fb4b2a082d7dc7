use std;
use std::collections::HashSet;
use std::io::BufRead;

use crate::error::{MostWantedError, Result};

/// Best hit of one query against the nt database.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRecord {
    pub query_id: String,
    pub subject_id: String,
    pub percent_identity: f64,
}

/// A ranked most wanted cluster: (cluster id, subject id, percent identity).
pub type RankedClusterEntry = (String, String, f64);

const QUERY_HEADER: &str = "# Query:";

/// Parse a tabular (-m 9 style) BLAST report into one record per query, in
/// the order queries first appear.
///
/// Only the first data row of each query block is kept. The report already
/// lists hits best-first, so later rows (including exact duplicates of the
/// best hit) are ignored rather than re-ranked.
pub fn parse_best_hits<S: AsRef<str>>(report_lines: &[S]) -> Result<Vec<AlignmentRecord>> {
    let mut best_hits = vec![];
    let mut seen_queries: HashSet<String> = HashSet::new();
    let mut in_query_block = false;
    let mut block_has_hit = false;

    for (i, raw_line) in report_lines.iter().enumerate() {
        let line = raw_line.as_ref().trim_end_matches(&['\n', '\r'][..]);
        let line_number = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with('#') {
            if line.starts_with(QUERY_HEADER) {
                let query = line[QUERY_HEADER.len()..].trim();
                if query.is_empty() {
                    return Err(MostWantedError::malformed(
                        line_number,
                        line,
                        "query header without a query id",
                    ));
                }
                trace!("Starting query block for {}", query);
                in_query_block = true;
                block_has_hit = false;
            }
            continue;
        }
        if !in_query_block {
            return Err(MostWantedError::malformed(
                line_number,
                line,
                "alignment row found before any '# Query:' header",
            ));
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            return Err(MostWantedError::malformed(
                line_number,
                line,
                "expected at least 3 tab-separated fields",
            ));
        }
        let percent_identity: f64 = match fields[2].trim().parse::<f64>() {
            Ok(pid) if pid.is_finite() => pid,
            _ => {
                return Err(MostWantedError::malformed(
                    line_number,
                    line,
                    "percent identity is not a number",
                ))
            }
        };
        if block_has_hit {
            trace!("Skipping non-best hit for {}", fields[0]);
            continue;
        }
        block_has_hit = true;

        if seen_queries.insert(fields[0].to_string()) {
            best_hits.push(AlignmentRecord {
                query_id: fields[0].to_string(),
                subject_id: fields[1].to_string(),
                percent_identity,
            });
        } else {
            debug!("Query {} appeared in more than one block, keeping its first", fields[0]);
        }
    }
    debug!("Found best hits for {} queries", best_hits.len());
    Ok(best_hits)
}

/// Rank the best hits by novelty: drop those more similar than
/// `max_similarity` (a fraction, equal values are kept), sort ascending by
/// percent identity keeping report order for ties, and return at most
/// `top_n`.
pub fn rank_most_wanted(
    best_hits: Vec<AlignmentRecord>,
    top_n: usize,
    max_similarity: f64,
) -> Vec<RankedClusterEntry> {
    let mut kept: Vec<AlignmentRecord> = best_hits
        .into_iter()
        .filter(|hit| {
            let keep = hit.percent_identity / 100.0 <= max_similarity;
            if !keep {
                trace!(
                    "Excluding {} since its best hit is {}% similar",
                    hit.query_id,
                    hit.percent_identity
                );
            }
            keep
        })
        .collect();

    // sort_by is stable, so ties stay in report order
    kept.sort_by(|a, b| {
        a.percent_identity
            .partial_cmp(&b.percent_identity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    kept.truncate(top_n);
    kept.into_iter()
        .map(|hit| (hit.query_id, hit.subject_id, hit.percent_identity))
        .collect()
}

/// Reduce a tabular BLAST report to the `top_n` most novel clusters.
pub fn top_n_blast_results<S: AsRef<str>>(
    report_lines: &[S],
    top_n: usize,
    max_similarity: f64,
) -> Result<Vec<RankedClusterEntry>> {
    let best_hits = parse_best_hits(report_lines)?;
    let ranked = rank_most_wanted(best_hits, top_n, max_similarity);
    info!(
        "Kept {} most wanted clusters with at most {}% similarity to nt",
        ranked.len(),
        max_similarity * 100.0
    );
    Ok(ranked)
}

pub fn read_blast_results_file(path: &str) -> Result<Vec<String>> {
    let file = std::fs::File::open(path).map_err(|e| MostWantedError::io(path, e))?;
    std::io::BufReader::new(file)
        .lines()
        .collect::<std::io::Result<Vec<String>>>()
        .map_err(|e| MostWantedError::io(path, e))
}
