//! Usage Command
//!
//! Show persisted usage records and per-provider aggregates.

use serde_json::json;

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, OutputFormat};
use crate::storage::SqliteUsageSink;
use crate::types::Result;

pub fn run(limit: usize, format: OutputFormat) -> Result<()> {
    let ctx = CommandContext::load()?;
    let out = Output::new();
    let path = &ctx.config.storage.database_path;

    if !path.exists() {
        if format.is_json() {
            return out.json(&json!({ "summaries": [], "records": [] }));
        }
        out.info(&format!("No usage recorded yet ({})", path.display()));
        return Ok(());
    }

    let sink = SqliteUsageSink::open(path)?;
    let summaries = sink.provider_summaries()?;
    let records = sink.recent(limit)?;

    if format.is_json() {
        return out.json(&json!({ "summaries": summaries, "records": records }));
    }

    out.header("Usage by provider");
    for s in &summaries {
        println!(
            "  {:<14} {:>5} requests  {:>5.1}% ok  {:>9} tokens  {:>5.1}% avg window  {:>8.0} ms avg",
            s.provider,
            s.requests,
            s.success_rate(),
            s.total_tokens,
            s.avg_utilization_pct,
            s.avg_duration_ms
        );
    }

    out.section(&format!("Recent requests ({})", records.len()));
    for r in &records {
        let line = format!(
            "{} {} {}/{} {} tokens ({:.1}%) {} ms",
            r.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            r.document_type,
            r.provider,
            r.model,
            r.total_tokens,
            r.utilization_pct,
            r.duration_ms
        );
        if r.success {
            out.success(&line);
        } else {
            out.error(&line);
        }
    }
    Ok(())
}
