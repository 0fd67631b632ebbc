//! Fund status from a snapshot
//!
//! Displays:
//! - Pool totals and balance
//! - Milestones with tallies
//! - Emergency declaration state
//! - Depositors with voting power at the chosen time
//! - Recent fund events

use super::config::default_snapshot_path;
use std::fmt::{self, Write as _};
use std::fs;
use std::path::PathBuf;
use timefund::fund::audit::{format_events, query_events, AuditQuery};
use timefund::fund::{FundState, Identity, Timestamp};

/// Render a summary of `state` as seen at `now`
pub fn render_status(
    state: &FundState,
    now: Timestamp,
    query: &AuditQuery,
) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let pool = state.pool();
    let config = state.config();

    writeln!(out, "TimeFund Status (t={})", now)?;
    writeln!(out)?;
    if let Some(fault) = state.fault() {
        writeln!(out, "  HALTED: {}", fault)?;
    }
    if state.is_closed() {
        writeln!(out, "  Fund closed by emergency recovery")?;
    } else if state.is_stalled() {
        writeln!(out, "  Fund stalled: last milestone failed")?;
    }
    writeln!(out, "  Proposer: {}", config.proposer.fingerprint())?;
    writeln!(out, "  Deposited: {}", pool.total_deposited)?;
    writeln!(out, "  Released:  {}", pool.total_released)?;
    writeln!(out, "  Balance:   {}", pool.balance())?;
    writeln!(
        out,
        "  Eligible power: {}",
        state.total_eligible_power(now)
    )?;
    writeln!(out)?;

    writeln!(out, "Milestones")?;
    if state.milestones().is_empty() {
        writeln!(out, "  (none)")?;
    }
    for m in state.milestones() {
        writeln!(
            out,
            "  #{} {} amount={} recipient={} approve={} reject={}",
            m.id,
            m.status,
            m.amount,
            m.recipient.fingerprint(),
            m.approval_stake,
            m.rejection_stake
        )?;
    }
    writeln!(out)?;

    writeln!(out, "Emergency: {}", state.emergency_status(now))?;
    if let Some(declaration) = state.emergency().current() {
        writeln!(
            out,
            "  #{} opened t={} by {} signers={} stake={}",
            declaration.id,
            declaration.created_at,
            declaration.initiator.fingerprint(),
            declaration.signers.len(),
            declaration.signer_stake
        )?;
    }
    writeln!(out)?;

    writeln!(out, "Depositors")?;
    for d in state.depositors() {
        writeln!(
            out,
            "  {} deposited={} power={} recovered={}",
            d.identity.fingerprint(),
            d.cumulative_amount,
            state.voting_power(&d.identity, now),
            d.recovered_amount
        )?;
    }
    writeln!(out)?;

    out.push_str(&format_events(&query_events(state.events(), query)));
    Ok(out)
}

pub fn execute(
    snapshot: Option<PathBuf>,
    at: Option<Timestamp>,
    actor: Option<String>,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = snapshot.unwrap_or_else(default_snapshot_path);
    let bytes = fs::read(&path)
        .map_err(|e| format!("Failed to read snapshot '{}': {}", path.display(), e))?;
    let state = FundState::from_bytes(&bytes)
        .map_err(|e| format!("Failed to decode snapshot '{}': {}", path.display(), e))?;

    let now = at.unwrap_or_else(|| state.last_activity());
    let query = AuditQuery {
        actor: actor.map(Identity::new),
        limit: Some(limit),
        ..AuditQuery::default()
    };

    print!("{}", render_status(&state, now, &query)?);
    Ok(())
}
