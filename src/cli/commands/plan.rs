//! Plan Command
//!
//! Dry-run the context budget planner: which fragments would be sent for a
//! document type and how the token budget is spent. No provider is called.

use std::path::PathBuf;

use tracing::warn;

use crate::ai::PromptPlan;
use crate::ai::provider::SelectionPolicy;
use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, OutputFormat, load_context_graph};
use crate::constants::usage::DEFAULT_CONTEXT_WINDOW;
use crate::types::Result;

#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub document_type: String,
    pub context: PathBuf,
    /// Explicit window; otherwise taken from the selected provider/model
    pub window: Option<u32>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub format: OutputFormat,
}

pub fn run(options: PlanOptions) -> Result<()> {
    let ctx = CommandContext::load()?;
    let graph = load_context_graph(&options.context)?;
    let orchestrator = ctx.orchestrator(false)?;

    let (target, window) = match options.window {
        Some(window) => (format!("{}-token window", window), window),
        None => {
            let registry = orchestrator.registry();
            let policy = SelectionPolicy {
                preferred: options.provider.clone(),
            };
            let model = options.model.clone().or_else(|| ctx.config.llm.model.clone());
            let resolved = registry.select_active(&policy).ok().and_then(|id| {
                let explicit = options.provider.as_deref() == Some(id.as_str());
                registry
                    .resolve_model(&id, model.as_deref(), explicit)
                    .map(|(model, window)| (format!("{}/{}", id, model), window))
            });
            resolved.unwrap_or_else(|| {
                warn!("No configured provider; planning against the default window");
                (
                    format!("default {}-token window", DEFAULT_CONTEXT_WINDOW),
                    DEFAULT_CONTEXT_WINDOW,
                )
            })
        }
    };

    let plan = orchestrator.plan(&options.document_type, &graph, window)?;

    if options.format.is_json() {
        return Output::new().json(&plan);
    }
    print_text(&plan, &target);
    Ok(())
}

fn print_text(plan: &PromptPlan, target: &str) {
    let out = Output::new();

    out.header(&format!("Prompt plan: {}", plan.document.title));
    out.field("Target", target);
    out.field("Tier", format!("{:?}", plan.tier).to_lowercase());
    out.field("Window", plan.model_window);
    out.field("Reserved", plan.reserved_response_tokens);
    out.field("Budget", plan.budget);
    if !plan.document.known {
        out.warning(&format!(
            "'{}' is not in the catalog; using a generic outline",
            plan.document.id
        ));
    }

    out.section("Tokens");
    out.field("System", plan.system_tokens);
    out.field("User", plan.user_tokens);
    out.field("Template", plan.template_tokens);
    out.field("Context", plan.context_tokens);
    out.field(
        "Total",
        format!(
            "{} ({:.1}% of budget)",
            plan.token_total,
            if plan.budget == 0 {
                0.0
            } else {
                plan.token_total as f64 / plan.budget as f64 * 100.0
            }
        ),
    );

    out.section("Fragments");
    if plan.fragments.is_empty() {
        out.info("No context fragments selected");
    }
    for fragment in &plan.fragments {
        println!(
            "  {:<32} {:>7} tokens  {:>3} refs  {:?}",
            fragment.name, fragment.tokens, fragment.relationship_count, fragment.tier
        );
    }
    for name in &plan.dropped {
        out.warning(&format!("Dropped to fit budget: {}", name));
    }
}
