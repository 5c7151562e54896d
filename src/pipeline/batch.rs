//! JSONL batch scoring.
//!
//! Queries → UncertaintyPipeline (one at a time, each fanning out
//! internally) → JSONL reports + summary stats.

use crate::models::{BatchStats, CredenceError, QueryRecord, Result, UncertaintyReport};
use crate::pipeline::UncertaintyPipeline;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// One output line: the report plus the input record's identity.
#[derive(Serialize)]
struct BatchRecord<'a> {
    id: &'a str,
    #[serde(flatten)]
    report: &'a UncertaintyReport,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    metadata: &'a serde_json::Value,
}

/// Output line for a query that produced no answers.
#[derive(Serialize)]
struct BatchFailure<'a> {
    id: &'a str,
    query: &'a str,
    error: String,
}

/// Load query records from a JSONL file.
pub fn load_queries(path: &Path) -> Result<Vec<QueryRecord>> {
    let file = File::open(path).map_err(|e| CredenceError::io("opening queries file", e))?;
    let reader = BufReader::new(file);
    let mut queries = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| CredenceError::io("reading queries file", e))?;
        if line.trim().is_empty() {
            continue;
        }
        let query: QueryRecord = serde_json::from_str(&line)
            .map_err(|e| CredenceError::ParseError(format!("Line {}: {}", line_num + 1, e)))?;
        queries.push(query);
    }

    info!(count = queries.len(), "Loaded queries");
    Ok(queries)
}

/// Score every query in `queries`, writing one JSONL line per query.
pub async fn score_batch(
    pipeline: &UncertaintyPipeline,
    queries: Vec<QueryRecord>,
    output_path: &Path,
) -> Result<BatchStats> {
    let start = Instant::now();
    let total = queries.len();

    info!(total_queries = total, "Starting batch scoring");

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
            .unwrap()
            .progress_chars("##-"),
    );

    let output_file =
        File::create(output_path).map_err(|e| CredenceError::io("creating output file", e))?;
    let mut writer = BufWriter::new(output_file);

    let mut stats = BatchStats {
        total_queries: total,
        ..Default::default()
    };

    for (done, record) in queries.iter().enumerate() {
        match pipeline.run(&record.query, None).await {
            Ok(report) => {
                stats.scored += 1;
                match report.status {
                    crate::models::Verdict::Confident => stats.confident += 1,
                    crate::models::Verdict::Uncertain => stats.uncertain += 1,
                }

                let line = BatchRecord {
                    id: &record.id,
                    report: &report,
                    metadata: &record.metadata,
                };
                let json = serde_json::to_string(&line).map_err(|e| {
                    CredenceError::Internal(format!("Failed to serialize report: {e}"))
                })?;
                writeln!(writer, "{json}")
                    .map_err(|e| CredenceError::io("writing output", e))?;
            }
            Err(e @ CredenceError::NoAnswersGenerated) => {
                warn!(query_id = %record.id, "No answers generated");
                stats.failed += 1;

                let line = BatchFailure {
                    id: &record.id,
                    query: &record.query,
                    error: e.to_string(),
                };
                let json = serde_json::to_string(&line).map_err(|e| {
                    CredenceError::Internal(format!("Failed to serialize failure: {e}"))
                })?;
                writeln!(writer, "{json}")
                    .map_err(|e| CredenceError::io("writing output", e))?;
            }
            Err(e) => return Err(e),
        }

        writer
            .flush()
            .map_err(|e| CredenceError::io("flushing output", e))?;

        pb.set_position((done + 1) as u64);
        pb.set_message(format!(
            "confident: {}, uncertain: {}",
            stats.confident, stats.uncertain
        ));
    }

    pb.finish_with_message(format!(
        "Done! {} confident, {} uncertain, {} failed",
        stats.confident, stats.uncertain, stats.failed
    ));

    stats.runtime_secs = start.elapsed().as_secs_f64();
    stats.finalize();

    info!(
        scored = stats.scored,
        confident = stats.confident,
        uncertain = stats.uncertain,
        failed = stats.failed,
        confident_rate = format!("{:.1}%", stats.confident_rate * 100.0),
        "Batch scoring complete"
    );

    Ok(stats)
}
