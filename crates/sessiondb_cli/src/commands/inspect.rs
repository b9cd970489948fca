//! Inspect command implementation.

use super::{open_existing, CliError};
use sessiondb_core::{SegmentSummary, SessionStore, StoreManifest};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Persisted manifest.
    pub manifest: StoreManifest,
    /// Largest window end ever accepted.
    pub observed_stream_time: u64,
    /// Earliest window end still live.
    pub horizon: u64,
    /// Live segments, oldest first.
    pub segments: Vec<SegmentInfo>,
    /// Total stored sessions.
    pub session_count: usize,
    /// Committed offsets per topic and partition.
    pub position: BTreeMap<String, BTreeMap<u32, u64>>,
}

/// One live segment.
#[derive(Debug, Serialize)]
pub struct SegmentInfo {
    /// Segment id.
    pub id: u64,
    /// First timestamp covered.
    pub lower_bound: u64,
    /// Last timestamp covered.
    pub upper_bound: u64,
    /// Stored sessions.
    pub sessions: usize,
}

impl From<SegmentSummary> for SegmentInfo {
    fn from(summary: SegmentSummary) -> Self {
        Self {
            id: summary.id.as_u64(),
            lower_bound: summary.lower_bound,
            upper_bound: summary.upper_bound,
            sessions: summary.sessions,
        }
    }
}

/// Gathers the inspection result for the store in `path`.
pub fn collect(path: &Path) -> Result<InspectResult, CliError> {
    let opened = open_existing(path)?;
    let store = &opened.store;

    let manifest = StoreManifest::from_config(store.config());
    let segments: Vec<SegmentInfo> = store
        .segment_summaries()?
        .into_iter()
        .map(SegmentInfo::from)
        .collect();
    let session_count = segments.iter().map(|segment| segment.sessions).sum();

    let stored = store.position();
    let position: BTreeMap<String, BTreeMap<u32, u64>> = stored
        .topics()
        .map(|topic| (topic.to_string(), stored.partitions(topic).collect()))
        .collect();

    Ok(InspectResult {
        path: path.display().to_string(),
        manifest,
        observed_stream_time: store.observed_stream_time(),
        horizon: store.horizon(),
        segments,
        session_count,
        position,
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, json: bool) -> Result<(), CliError> {
    let result = collect(path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_text_output(&result);
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    let manifest = &result.manifest;
    println!("Session Store Inspection");
    println!("========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Manifest:");
    println!("  Name:             {}", manifest.name);
    println!("  Format version:   {}", manifest.format_version);
    println!("  Retention:        {} ms", manifest.retention_ms);
    println!("  Segment interval: {} ms", manifest.segment_interval_ms);
    println!(
        "  End-time index:   {}",
        if manifest.time_ordered_index { "yes" } else { "no" }
    );
    println!();
    println!("Time:");
    println!("  Observed stream time: {}", result.observed_stream_time);
    println!("  Retention horizon:    {}", result.horizon);
    println!();
    println!("Segments ({}, {} sessions):", result.segments.len(), result.session_count);
    for segment in &result.segments {
        println!(
            "  [{}] {}..={} {} sessions",
            segment.id, segment.lower_bound, segment.upper_bound, segment.sessions
        );
    }
    println!();
    if result.position.is_empty() {
        println!("Position: (none)");
    } else {
        println!("Position:");
        for (topic, partitions) in &result.position {
            for (partition, offset) in partitions {
                println!("  {topic}/{partition}: {offset}");
            }
        }
    }
}
