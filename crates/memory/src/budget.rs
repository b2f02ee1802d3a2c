//! Token-budget allocation for a single turn's model input.
//!
//! Splits the model's context window into a system-prompt slice, a
//! bootstrap-document slice, a history slice, and a reserved response
//! slice, then reclaims whatever the system prompt and bootstrap didn't
//! actually use back into history once both are rendered.

/// Ratios applied to the context window to derive the base allocation.
/// `response_ratio` is a floor-adjusted target, not a hard cap.
#[derive(Debug, Clone, Copy)]
pub struct BudgetRatios {
    pub system_prompt: f64,
    pub bootstrap: f64,
    pub history: f64,
    pub response: f64,
}

impl Default for BudgetRatios {
    fn default() -> Self {
        Self {
            system_prompt: 0.15,
            bootstrap: 0.10,
            history: 0.45,
            response: 0.20,
        }
    }
}

/// The base allocation for a turn, before the system prompt and bootstrap
/// are actually rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetPlan {
    pub system_prompt: u32,
    pub bootstrap: u32,
    pub history: u32,
    pub response: u32,
    pub reserve: u32,
}

/// Allocate `{systemPrompt, bootstrap, history, response, reserve}` from a
/// context window and a set of ratios, with `min_response_tokens` as a hard
/// floor on the response slice.
///
/// If the floor pushes `response` above its ratio's share, the excess is
/// taken out of `history` — never out of `systemPrompt` or `bootstrap`.
pub fn allocate(context_window: u32, ratios: BudgetRatios, min_response_tokens: u32) -> BudgetPlan {
    let w = context_window as f64;
    let system_prompt = (w * ratios.system_prompt).floor() as u32;
    let bootstrap = (w * ratios.bootstrap).floor() as u32;
    let mut history = (w * ratios.history).floor() as u32;
    let response_base = (w * ratios.response).floor() as u32;
    let response = response_base.max(min_response_tokens);

    let deficit = response.saturating_sub(response_base);
    history = history.saturating_sub(deficit);

    let allocated = system_prompt + bootstrap + history + response;
    let reserve = context_window.saturating_sub(allocated);

    BudgetPlan {
        system_prompt,
        bootstrap,
        history,
        response,
        reserve,
    }
}

/// A warning raised when the actual rendered system prompt or bootstrap
/// exceeds its planned slice. The turn still proceeds with the honest
/// (possibly smaller) history budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverBudget {
    pub system_prompt_over: u32,
    pub bootstrap_over: u32,
}

/// The budget actually available for history once the system prompt and
/// bootstrap documents have been rendered to their real token counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimedBudget {
    pub history: u32,
    pub over_budget: Option<OverBudget>,
}

/// Reclaim unused `systemPrompt`/`bootstrap` slack, plus `reserve`, into
/// `history`. If either actual value exceeds its planned slice, that
/// overage is reported but never subtracted from `history` again — the
/// plan's `history` slice is the floor.
pub fn reclaim(
    plan: &BudgetPlan,
    actual_system_prompt: u32,
    actual_bootstrap: u32,
) -> ReclaimedBudget {
    let system_prompt_slack = plan.system_prompt.saturating_sub(actual_system_prompt);
    let bootstrap_slack = plan.bootstrap.saturating_sub(actual_bootstrap);
    let history = plan.history + system_prompt_slack + bootstrap_slack + plan.reserve;

    let system_prompt_over = actual_system_prompt.saturating_sub(plan.system_prompt);
    let bootstrap_over = actual_bootstrap.saturating_sub(plan.bootstrap);
    let over_budget = if system_prompt_over > 0 || bootstrap_over > 0 {
        Some(OverBudget {
            system_prompt_over,
            bootstrap_over,
        })
    } else {
        None
    };

    ReclaimedBudget {
        history,
        over_budget,
    }
}
