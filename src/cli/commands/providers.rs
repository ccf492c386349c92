//! Providers Command
//!
//! List enabled provider backends, whether their credentials are present,
//! and their model windows.

use serde::Serialize;

use crate::ai::provider::{ProviderCategory, ProviderDescriptor};
use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, OutputFormat};
use crate::types::Result;

#[derive(Debug, Serialize)]
struct ProviderRow<'a> {
    id: &'a str,
    name: &'a str,
    category: ProviderCategory,
    priority: u32,
    configured: bool,
    missing: Vec<&'a str>,
    default_model: &'a str,
    models: Vec<(&'a str, u32)>,
}

pub fn run(format: OutputFormat) -> Result<()> {
    let ctx = CommandContext::load()?;
    let mut descriptors = ctx.config.descriptors();
    descriptors.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
    let credentials = ctx.config.credentials(&descriptors);

    let rows: Vec<ProviderRow<'_>> = descriptors
        .iter()
        .map(|d| row(d, credentials.missing_required(d)))
        .collect();

    if format.is_json() {
        return Output::new().json(&rows);
    }

    let out = Output::new();
    out.header("Providers");
    if rows.is_empty() {
        out.warning("All providers are disabled in configuration");
        return Ok(());
    }

    for row in &rows {
        if row.configured {
            out.success(&format!("{} ({})", row.name, row.id));
        } else {
            out.warning(&format!("{} ({}) - not configured", row.name, row.id));
            out.field("Missing", row.missing.join(", "));
        }
        out.field("Category", format!("{:?}", row.category).to_lowercase());
        out.field("Priority", row.priority);
        out.field("Default", row.default_model);
        for (model, window) in &row.models {
            out.field("Model", format!("{} ({} tokens)", model, window));
        }
    }

    if let Some(preferred) = &ctx.config.llm.provider {
        println!();
        out.info(&format!("Preferred provider: {}", preferred));
    }
    Ok(())
}

fn row<'a>(descriptor: &'a ProviderDescriptor, missing: Vec<&'a str>) -> ProviderRow<'a> {
    ProviderRow {
        id: &descriptor.id,
        name: &descriptor.display_name,
        category: descriptor.category,
        priority: descriptor.priority,
        configured: missing.is_empty(),
        missing,
        default_model: &descriptor.default_model,
        models: descriptor
            .models
            .iter()
            .map(|(m, w)| (m.as_str(), *w))
            .collect(),
    }
}
