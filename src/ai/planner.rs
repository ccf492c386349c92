//! Context Budget Planner
//!
//! Fits a caller-supplied context graph into a model's context window.
//!
//! ## Tiers
//!
//! ```text
//! window < 50k            direct fragments only
//! 50k <= window <= 200k   direct + up to 3 supplementary fragments
//! window > 200k           direct + every remaining fragment that fits
//!                         (reserve fixed at 10k tokens)
//! ```
//!
//! Fragments are ranked by how many other fragments reference them. Direct
//! fragments that do not fit are dropped from the tail of that ranking; the
//! system prompt, user prompt and outline are never dropped.

use std::cmp::Reverse;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use super::prompt::{DocumentCatalog, PromptTemplates, ResolvedDocument};
use super::provider::ChatMessage;
use super::tokenizer::{SharedEstimator, TokenBudget, default_estimator};
use crate::constants::planner as planner_constants;
use crate::types::{ContextFragment, ContextGraph, PlanwrightError, Result};

/// Selection tier determined by window size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanningTier {
    Direct,
    Supplementary,
    Comprehensive,
}

impl PlanningTier {
    pub fn for_window(model_window: u32) -> Self {
        if model_window > planner_constants::LARGE_WINDOW_MAX {
            Self::Comprehensive
        } else if model_window >= planner_constants::LARGE_WINDOW_MIN {
            Self::Supplementary
        } else {
            Self::Direct
        }
    }
}

/// Response reserve actually applied for a window.
///
/// Ultra-large windows always reserve a fixed 10k tokens. Otherwise the
/// caller's value is used, or 10% of the window clamped to [1024, 8192].
pub fn reserve_for_window(model_window: u32, requested: Option<u32>) -> u32 {
    if PlanningTier::for_window(model_window) == PlanningTier::Comprehensive {
        return planner_constants::ULTRA_WINDOW_RESERVE;
    }
    requested.unwrap_or_else(|| {
        (model_window / 100 * planner_constants::DEFAULT_RESERVE_PCT)
            .clamp(planner_constants::MIN_RESERVE, planner_constants::MAX_RESERVE)
    })
}

/// A fragment chosen for the prompt
#[derive(Debug, Clone, Serialize)]
pub struct SelectedFragment {
    pub name: String,
    /// Inbound references from other fragments
    pub relationship_count: usize,
    pub tokens: usize,
    pub tier: PlanningTier,
    #[serde(skip)]
    rendered: String,
}

/// Token-bounded prompt for one request
#[derive(Debug, Clone, Serialize)]
pub struct PromptPlan {
    pub document: ResolvedDocument,
    pub system_prompt: String,
    pub user_prompt: String,
    pub template: String,
    pub fragments: Vec<SelectedFragment>,
    /// Direct fragments removed to stay within budget
    pub dropped: Vec<String>,
    pub tier: PlanningTier,
    pub model_window: u32,
    pub reserved_response_tokens: u32,
    /// Prompt token budget (window minus reserve)
    pub budget: usize,
    pub system_tokens: usize,
    pub user_tokens: usize,
    pub template_tokens: usize,
    pub context_tokens: usize,
    /// Sum of all component estimates; never above `budget`
    pub token_total: usize,
}

impl PromptPlan {
    /// Names of the selected fragments in prompt order
    pub fn fragment_names(&self) -> Vec<&str> {
        self.fragments.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fragments.iter().any(|f| f.name == name)
    }

    /// Rendered context section
    pub fn context_text(&self) -> String {
        self.fragments.iter().map(|f| f.rendered.as_str()).collect()
    }

    /// Full user message: request, outline, then context
    pub fn user_message(&self) -> String {
        let mut message = user_block(&self.user_prompt);
        message.push_str(&template_block(&self.template));
        message.push_str(&self.context_text());
        message
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(self.user_message()),
        ]
    }

    /// Output token ceiling sent to the provider: the reserved buffer,
    /// bounded by what common chat endpoints accept.
    pub fn response_ceiling(&self) -> u32 {
        self.reserved_response_tokens
            .min(planner_constants::MAX_RESERVE)
    }
}

fn user_block(user_prompt: &str) -> String {
    format!("{}\n\n", user_prompt)
}

fn template_block(template: &str) -> String {
    format!("{}\n", template)
}

fn render_fragment(fragment: &ContextFragment) -> String {
    format!("### {}\n\n{}\n\n", fragment.name, fragment.body.trim_end())
}

/// Builds [`PromptPlan`]s for a document type and context graph
#[derive(Clone)]
pub struct ContextBudgetPlanner {
    estimator: SharedEstimator,
}

impl Default for ContextBudgetPlanner {
    fn default() -> Self {
        Self::new(default_estimator())
    }
}

impl ContextBudgetPlanner {
    pub fn new(estimator: SharedEstimator) -> Self {
        Self { estimator }
    }

    pub fn estimator(&self) -> &SharedEstimator {
        &self.estimator
    }

    /// Plan a prompt within `model_window - reserve`.
    ///
    /// Returns [`PlanwrightError::ContextOverflow`] when the prompt text alone
    /// does not fit.
    #[instrument(skip(self, graph), fields(fragments = graph.len()))]
    pub fn plan(
        &self,
        document_type: &str,
        graph: &ContextGraph,
        model_window: u32,
        reserved_response_tokens: u32,
    ) -> Result<PromptPlan> {
        let tier = PlanningTier::for_window(model_window);
        let reserve = if tier == PlanningTier::Comprehensive {
            planner_constants::ULTRA_WINDOW_RESERVE
        } else {
            reserved_response_tokens
        };
        let budget_tokens = model_window.saturating_sub(reserve) as usize;

        let document = DocumentCatalog::resolve(document_type);
        let system_prompt = PromptTemplates::document_system(&document);
        let user_prompt = PromptTemplates::document_request(&document);
        let template = PromptTemplates::document_outline(&document);

        let system_tokens = self.estimator.estimate(&system_prompt);
        let user_tokens = self.estimator.estimate(&user_block(&user_prompt));
        let template_tokens = self.estimator.estimate(&template_block(&template));

        let mut budget = TokenBudget::new(budget_tokens);
        budget.force_add(system_tokens + user_tokens + template_tokens);
        if budget.is_exceeded() {
            warn!(
                required = budget.current(),
                budget = budget_tokens,
                "Prompt text alone exceeds budget"
            );
            return Err(PlanwrightError::ContextOverflow {
                required: budget.current(),
                budget: budget_tokens,
            });
        }

        let ranked = rank_fragments(graph);
        let targets = document.relevance_targets();
        let (direct, rest): (Vec<_>, Vec<_>) = ranked
            .into_iter()
            .partition(|(fragment, _)| fragment.relates_to_any(&targets));

        let mut fragments = Vec::new();
        let mut dropped = Vec::new();

        // Tier 1: keep the longest prefix of the ranking that fits.
        let mut truncated = false;
        for (fragment, count) in direct {
            let rendered = render_fragment(fragment);
            let tokens = self.estimator.estimate(&rendered);
            if !truncated && budget.try_add(tokens) {
                fragments.push(SelectedFragment {
                    name: fragment.name.clone(),
                    relationship_count: count,
                    tokens,
                    tier: PlanningTier::Direct,
                    rendered,
                });
            } else {
                truncated = true;
                dropped.push(fragment.name.clone());
            }
        }

        if !dropped.is_empty() {
            warn!(
                document_type,
                dropped = dropped.len(),
                "Direct context truncated to fit budget"
            );
        }

        let extra_limit = match tier {
            PlanningTier::Direct => 0,
            PlanningTier::Supplementary => planner_constants::SUPPLEMENTARY_FRAGMENTS,
            PlanningTier::Comprehensive => usize::MAX,
        };

        let mut added = 0;
        for (fragment, count) in rest {
            if added >= extra_limit {
                break;
            }
            let rendered = render_fragment(fragment);
            let tokens = self.estimator.estimate(&rendered);
            if budget.try_add(tokens) {
                fragments.push(SelectedFragment {
                    name: fragment.name.clone(),
                    relationship_count: count,
                    tokens,
                    tier,
                    rendered,
                });
                added += 1;
            }
        }

        let context_tokens = fragments.iter().map(|f| f.tokens).sum();

        debug!(
            document_type,
            ?tier,
            selected = fragments.len(),
            tokens = budget.current(),
            budget = budget_tokens,
            "Prompt planned"
        );

        Ok(PromptPlan {
            document,
            system_prompt,
            user_prompt,
            template,
            fragments,
            dropped,
            tier,
            model_window,
            reserved_response_tokens: reserve,
            budget: budget_tokens,
            system_tokens,
            user_tokens,
            template_tokens,
            context_tokens,
            token_total: budget.current(),
        })
    }
}

/// Rank fragments by inbound references, then outbound edges, then name
fn rank_fragments(graph: &ContextGraph) -> Vec<(&ContextFragment, usize)> {
    let inbound = graph.inbound_counts();
    let mut ranked: Vec<_> = graph
        .fragments()
        .iter()
        .map(|f| (f, inbound.get(f.name.as_str()).copied().unwrap_or(0)))
        .collect();

    ranked.sort_by(|(a, a_count), (b, b_count)| {
        Reverse(*a_count)
            .cmp(&Reverse(*b_count))
            .then_with(|| b.relationships.len().cmp(&a.relationships.len()))
            .then_with(|| a.name.cmp(&b.name))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fragment(name: &str, body_len: usize, rels: &[&str]) -> ContextFragment {
        ContextFragment::new(name, "x".repeat(body_len)).with_relationships(rels.iter().copied())
    }

    #[test]
    fn test_tier_for_window() {
        assert_eq!(PlanningTier::for_window(32_768), PlanningTier::Direct);
        assert_eq!(PlanningTier::for_window(50_000), PlanningTier::Supplementary);
        assert_eq!(PlanningTier::for_window(200_000), PlanningTier::Supplementary);
        assert_eq!(PlanningTier::for_window(200_001), PlanningTier::Comprehensive);
    }

    #[test]
    fn test_reserve_for_window() {
        assert_eq!(reserve_for_window(300_000, Some(2_000)), 10_000);
        assert_eq!(reserve_for_window(32_768, Some(2_000)), 2_000);
        assert_eq!(reserve_for_window(32_700, None), 3_270);
        assert_eq!(reserve_for_window(4_096, None), 1_024);
        assert_eq!(reserve_for_window(128_000, None), 8_192);
    }

    #[test]
    fn test_project_charter_scenario() {
        let graph = ContextGraph::new(vec![
            fragment("stakeholder-register", 400, &["project-charter"]),
            fragment("risk-register", 400, &[]),
        ]);
        let plan = ContextBudgetPlanner::default()
            .plan("project-charter", &graph, 32_768, 4_096)
            .unwrap();

        assert!(plan.contains("stakeholder-register"));
        assert!(!plan.contains("risk-register"));
        assert_eq!(plan.tier, PlanningTier::Direct);
        assert!(plan.token_total <= plan.budget);
        assert!(plan.token_total < 32_768);
    }

    #[test]
    fn test_dependency_edges_count_as_direct() {
        let graph = ContextGraph::new(vec![
            fragment("market-analysis", 100, &["business-case"]),
            fragment("unrelated", 100, &["nothing"]),
        ]);
        let plan = ContextBudgetPlanner::default()
            .plan("project-charter", &graph, 16_000, 2_000)
            .unwrap();
        assert_eq!(plan.fragment_names(), vec!["market-analysis"]);
    }

    #[test]
    fn test_direct_fragments_ordered_by_popularity() {
        let graph = ContextGraph::new(vec![
            fragment("a", 10, &["project-charter"]),
            fragment("b", 10, &["project-charter"]),
            fragment("c", 10, &["b"]),
            fragment("d", 10, &["b", "a"]),
        ]);
        let plan = ContextBudgetPlanner::default()
            .plan("project-charter", &graph, 16_000, 2_000)
            .unwrap();
        assert_eq!(plan.fragment_names(), vec!["b", "a"]);
        assert_eq!(plan.fragments[0].relationship_count, 2);
    }

    #[test]
    fn test_supplementary_tier_adds_at_most_three() {
        let mut fragments = vec![fragment("direct", 100, &["project-charter"])];
        for i in 0..6 {
            fragments.push(fragment(&format!("extra-{}", i), 100, &[]));
        }
        let plan = ContextBudgetPlanner::default()
            .plan("project-charter", &ContextGraph::new(fragments), 100_000, 8_000)
            .unwrap();

        assert_eq!(plan.tier, PlanningTier::Supplementary);
        assert_eq!(plan.fragments.len(), 4);
        assert_eq!(plan.fragments[0].tier, PlanningTier::Direct);
        assert!(plan.fragments[1..]
            .iter()
            .all(|f| f.tier == PlanningTier::Supplementary));
    }

    #[test]
    fn test_comprehensive_tier_includes_all_ten() {
        let fragments: Vec<_> = (0..10)
            .map(|i| fragment(&format!("frag-{}", i), 2_000, &[]))
            .collect();
        let plan = ContextBudgetPlanner::default()
            .plan("project-charter", &ContextGraph::new(fragments), 300_000, 4_000)
            .unwrap();

        assert_eq!(plan.tier, PlanningTier::Comprehensive);
        assert_eq!(plan.fragments.len(), 10);
        assert_eq!(plan.reserved_response_tokens, 10_000);
        assert_eq!(plan.budget, 290_000);
    }

    #[test]
    fn test_empty_graph_yields_prompt_only_plan() {
        let plan = ContextBudgetPlanner::default()
            .plan("project-charter", &ContextGraph::default(), 8_192, 1_024)
            .unwrap();
        assert!(plan.fragments.is_empty());
        assert!(!plan.system_prompt.is_empty());
        assert!(!plan.user_prompt.is_empty());
        assert_eq!(plan.context_tokens, 0);
        assert_eq!(
            plan.token_total,
            plan.system_tokens + plan.user_tokens + plan.template_tokens
        );
    }

    #[test]
    fn test_direct_tier_truncates_from_tail() {
        // Each fragment is ~1000 tokens; only two fit in the remaining budget.
        let graph = ContextGraph::new(vec![
            fragment("first", 4_000, &["project-charter"]),
            fragment("second", 4_000, &["project-charter"]),
            fragment("third", 4_000, &["project-charter"]),
            fragment("tiny", 4, &["project-charter"]),
            fragment("background", 4_000, &[]),
        ]);
        let planner = ContextBudgetPlanner::default();
        let base = planner
            .plan("project-charter", &ContextGraph::default(), 40_000, 1_000)
            .unwrap()
            .token_total;
        let window = (base + 2_100 + 1_000) as u32;

        let plan = planner.plan("project-charter", &graph, window, 1_000).unwrap();
        assert!(plan.token_total <= plan.budget);
        assert_eq!(plan.fragments.len(), 2);
        // "tiny" would fit but is behind a dropped fragment in the ranking.
        assert!(!plan.contains("tiny"));
        assert_eq!(plan.dropped.len(), 2);
    }

    #[test]
    fn test_prompt_overflow_is_error() {
        let result = ContextBudgetPlanner::default().plan(
            "project-charter",
            &ContextGraph::default(),
            1_100,
            1_024,
        );
        assert!(matches!(
            result,
            Err(PlanwrightError::ContextOverflow { .. })
        ));
    }

    #[test]
    fn test_user_message_contains_context() {
        let graph = ContextGraph::new(vec![ContextFragment::new(
            "stakeholder-register",
            "Sponsor: CFO",
        )
        .with_relationships(["project-charter"])]);
        let plan = ContextBudgetPlanner::default()
            .plan("project-charter", &graph, 32_768, 4_096)
            .unwrap();

        let messages = plan.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("### stakeholder-register"));
        assert!(messages[1].content.contains("Sponsor: CFO"));
        assert!(messages[1].content.contains("Required Outline"));
    }

    proptest! {
        #[test]
        fn prop_plan_never_exceeds_budget(
            sizes in proptest::collection::vec((0usize..20_000, 0usize..4), 0..25),
            window in 2_000u32..400_000,
            reserve in 0u32..8_000,
        ) {
            let names = ["project-charter", "business-case", "frag-0", "frag-1"];
            let fragments: Vec<_> = sizes
                .iter()
                .enumerate()
                .map(|(i, (len, rel))| {
                    ContextFragment::new(format!("frag-{}", i), "y".repeat(*len))
                        .with_relationships([names[*rel]])
                })
                .collect();
            let graph = ContextGraph::new(fragments);

            match ContextBudgetPlanner::default().plan("project-charter", &graph, window, reserve) {
                Ok(plan) => {
                    prop_assert!(plan.token_total <= plan.budget);
                    let effective = reserve_for_window(window, Some(reserve));
                    prop_assert!(plan.token_total <= window.saturating_sub(effective) as usize);
                }
                Err(PlanwrightError::ContextOverflow { required, budget }) => {
                    prop_assert!(required > budget);
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
        }
    }
}
