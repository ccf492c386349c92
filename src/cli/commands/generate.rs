//! Generate Command
//!
//! Generate one or more documents from a context graph. Multiple document
//! types run concurrently through the orchestrator's throttle.
//!
//! Usage:
//!   planwright generate --type project-charter --type risk-register --context graph.json

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::runtime::Runtime;

use crate::ai::{GenerationFailure, GenerationOutput, GenerationRequest, ProviderHealth};
use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, OutputFormat, load_context_graph};
use crate::types::Result;

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub document_types: Vec<String>,
    pub context: PathBuf,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
}

/// Outcome counts for the exit status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateSummary {
    pub succeeded: usize,
    pub failed: usize,
}

type GenerationResult = std::result::Result<GenerationOutput, GenerationFailure>;

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum DocumentReport<'a> {
    Succeeded(&'a GenerationOutput),
    Failed(&'a GenerationFailure),
}

/// JSON report: per-document outcomes plus provider health after the run
#[derive(Serialize)]
struct Report<'a> {
    documents: Vec<DocumentReport<'a>>,
    provider_health: &'a [ProviderHealth],
}

impl<'a> Report<'a> {
    fn new(results: &'a [GenerationResult], provider_health: &'a [ProviderHealth]) -> Self {
        Self {
            documents: results
                .iter()
                .map(|r| match r {
                    Ok(output) => DocumentReport::Succeeded(output),
                    Err(failure) => DocumentReport::Failed(failure),
                })
                .collect(),
            provider_health,
        }
    }
}

pub fn run(options: GenerateOptions) -> Result<GenerateSummary> {
    let ctx = CommandContext::load()?;
    let graph = Arc::new(load_context_graph(&options.context)?);
    let orchestrator = ctx.orchestrator(true)?;

    let model = options.model.clone().or_else(|| ctx.config.llm.model.clone());
    let requests: Vec<GenerationRequest> = options
        .document_types
        .iter()
        .map(|doc| {
            GenerationRequest::new(doc.clone(), Arc::clone(&graph))
                .prefer(options.provider.clone())
                .model(model.clone())
        })
        .collect();

    let rt = Runtime::new()?;
    let results = rt.block_on(orchestrator.generate_many(requests));

    let mut summary = GenerateSummary::default();
    for result in &results {
        match result {
            Ok(output) => {
                summary.succeeded += 1;
                if let Some(dir) = &options.output {
                    write_document(dir, output)?;
                }
            }
            Err(_) => summary.failed += 1,
        }
    }

    let health = orchestrator.health_snapshot();
    if options.format.is_json() {
        Output::new().json(&Report::new(&results, &health))?;
    } else {
        print_text(&results, options.output.as_deref());
        print_health(&health);
    }

    Ok(summary)
}

fn write_document(dir: &Path, output: &GenerationOutput) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.md", file_stem(&output.document_type)));
    std::fs::write(&path, &output.content)?;
    Ok(path)
}

/// Filesystem-safe stem for a document type id
fn file_stem(document_type: &str) -> String {
    let stem: String = document_type
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    if stem.trim_matches('-').is_empty() {
        "document".to_string()
    } else {
        stem
    }
}

fn print_text(results: &[GenerationResult], output_dir: Option<&Path>) {
    let out = Output::new();

    for result in results {
        match result {
            Ok(output) => {
                out.success(&format!(
                    "{} via {}/{} ({} tokens, {} ms)",
                    output.document_type,
                    output.provider,
                    output.model,
                    output.tokens_used,
                    output.latency_ms
                ));
                out.field(
                    "Context",
                    format!(
                        "{} fragments, {:.1}% of {}-token window",
                        output.fragments.len(),
                        output.usage.utilization_pct,
                        output.usage.context_window
                    ),
                );
                for advice in &output.usage.recommendations {
                    out.field("Advice", advice);
                }
                match output_dir {
                    Some(dir) => out.field(
                        "Written",
                        dir.join(format!("{}.md", file_stem(&output.document_type)))
                            .display(),
                    ),
                    None => println!("\n{}\n", output.content),
                }
            }
            Err(failure) => {
                out.error(&format!("{}: {}", failure.document_type, failure));
                out.field("Retryable", failure.retryable);
            }
        }
    }
}

fn print_health(health: &[ProviderHealth]) {
    if health.is_empty() {
        return;
    }
    let out = Output::new();
    out.section("Provider health");
    for h in health {
        out.field(
            &h.provider,
            format!(
                "{} ({:.1}% success over {} calls, {:.0} ms avg)",
                h.classification,
                h.success_rate,
                h.metrics.total_calls,
                h.average_latency_ms
            ),
        );
        out.field("Advice", &h.recommendation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::HealthTracker;
    use crate::types::ErrorKind;

    #[test]
    fn test_json_report_includes_provider_health() {
        let health = HealthTracker::default();
        health.record("openai", false, 120, Some("server_error"));
        health.record("google", true, 80, None);
        let snapshot = health.snapshot();

        let results: Vec<GenerationResult> = vec![Err(GenerationFailure {
            request_id: "req-1".to_string(),
            document_type: "risk-register".to_string(),
            error_kind: ErrorKind::ServerError,
            message: "503".to_string(),
            retryable: true,
            attempted_providers: vec!["openai".to_string()],
        })];

        let json = serde_json::to_value(Report::new(&results, &snapshot)).unwrap();
        assert_eq!(json["documents"][0]["status"], "failed");
        assert_eq!(json["documents"][0]["document_type"], "risk-register");
        assert_eq!(json["provider_health"][0]["provider"], "google");
        assert_eq!(json["provider_health"][0]["classification"], "excellent");
        assert_eq!(json["provider_health"][1]["provider"], "openai");
        assert_eq!(json["provider_health"][1]["classification"], "poor");
        assert_eq!(json["provider_health"][1]["metrics"]["failed_calls"], 1);
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("project-charter"), "project-charter");
        assert_eq!(file_stem("Risk Register"), "risk-register");
        assert_eq!(file_stem("../../etc"), "------etc");
        assert_eq!(file_stem("//"), "document");
    }
}
