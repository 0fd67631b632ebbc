//! Replay a log of authenticated calls against a fund
//!
//! Input is JSON lines, one call per line:
//!
//! ```text
//! {"at": 0, "identity": "alice", "payload": {"type": "deposit", "amount": 1000}}
//! {"at": 12, "identity": "proposer", "payload": {"type": "create_milestone", "amount": 300}}
//! ```
//!
//! Each line is applied in order with the clock set to `at`. Rejected calls
//! are reported and replay continues; a malformed line stops the replay.

use super::config::{default_config_path, TimefundConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use timefund::fund::{
    AuthenticatedCall, CallOutcome, ErrorKind, FundContract, FundState, ManualClock, Timestamp,
};
use tracing::info;

/// One line of the replay input.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayLine {
    pub at: Timestamp,
    #[serde(flatten)]
    pub call: AuthenticatedCall,
}

/// One line of the replay output.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayRecord {
    pub line: usize,
    pub at: Timestamp,
    pub identity: String,
    pub call: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<CallOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub rejected: usize,
}

/// Apply every line of `input` to `contract`, writing one JSON record per line to `out`.
pub fn replay_calls<R: BufRead, W: Write>(
    contract: &mut FundContract<ManualClock>,
    clock: &ManualClock,
    input: R,
    out: &mut W,
) -> Result<ReplaySummary, Box<dyn std::error::Error>> {
    let mut summary = ReplaySummary::default();

    for (index, line) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|e| format!("Failed to read line {}: {}", line_no, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let entry: ReplayLine = serde_json::from_str(trimmed)
            .map_err(|e| format!("Malformed call on line {}: {}", line_no, e))?;

        clock.set(entry.at);
        let mut record = ReplayRecord {
            line: line_no,
            at: entry.at,
            identity: entry.call.identity.to_string(),
            call: entry.call.payload.name(),
            outcome: None,
            error: None,
            reason: None,
        };
        match contract.execute(&entry.call) {
            Ok(outcome) => {
                summary.applied += 1;
                record.outcome = Some(outcome);
            }
            Err(err) => {
                summary.rejected += 1;
                record.error = Some(err.kind());
                record.reason = Some(err.reason().to_string());
            }
        }
        writeln!(out, "{}", serde_json::to_string(&record)?)?;
    }

    Ok(summary)
}

/// Load the fund to replay against: an existing snapshot, or a new fund from config
fn open_fund(
    config: &TimefundConfig,
    resume: Option<&Path>,
    clock: ManualClock,
) -> Result<FundContract<ManualClock>, Box<dyn std::error::Error>> {
    match resume {
        Some(path) => {
            let bytes = fs::read(path)
                .map_err(|e| format!("Failed to read snapshot '{}': {}", path.display(), e))?;
            let state = FundState::from_bytes(&bytes)
                .map_err(|e| format!("Failed to decode snapshot '{}': {}", path.display(), e))?;
            info!(snapshot = %path.display(), "resuming fund from snapshot");
            Ok(FundContract::from_state(state, clock))
        }
        None => Ok(FundContract::new(config.fund.clone(), clock)?),
    }
}

/// Write the fund state as a CBOR snapshot
pub fn write_snapshot(state: &FundState, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = state.to_bytes()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create snapshot directory: {}", e))?;
    }
    fs::write(path, bytes)
        .map_err(|e| format!("Failed to write snapshot '{}': {}", path.display(), e))?;
    Ok(())
}

pub fn execute(
    config: TimefundConfig,
    calls: PathBuf,
    resume: Option<PathBuf>,
    snapshot: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let clock = ManualClock::new(0);
    let mut contract = open_fund(&config, resume.as_deref(), clock.clone())?;

    let file = fs::File::open(&calls)
        .map_err(|e| format!("Failed to open call log '{}': {}", calls.display(), e))?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let summary = replay_calls(&mut contract, &clock, BufReader::new(file), &mut out)?;

    info!(
        applied = summary.applied,
        rejected = summary.rejected,
        pool_balance = contract.pool_balance(),
        "replay finished"
    );

    if let Some(path) = snapshot {
        write_snapshot(contract.state(), &path)?;
        eprintln!("Snapshot written to {}", path.display());
    }

    Ok(())
}

/// Resolve the config path, falling back to the default location
pub fn resolve_config(path: Option<PathBuf>) -> Result<TimefundConfig, Box<dyn std::error::Error>> {
    let path = path.unwrap_or_else(default_config_path);
    TimefundConfig::load(&path)
}
