//! Validation for a parsed [`OpenclawConfig`].
//!
//! Kept deliberately simple: this runs both at startup (where a failure
//! becomes exit code 2) and on every hot-reload attempt (where a failure
//! means the previous config stays live).

use crate::{Error, Result, schema::OpenclawConfig};

pub fn validate(config: &OpenclawConfig) -> Result<()> {
    if config.gateway.port == 0 {
        return Err(Error::message("gateway.port must be nonzero"));
    }

    let budget = &config.agents.defaults.context_management.budget;
    let ratio_sum = budget.system_prompt_ratio + budget.bootstrap_ratio + budget.history_ratio + budget.response_ratio;
    if ratio_sum > 1.0 + f64::EPSILON {
        return Err(Error::message(format!(
            "context budget ratios sum to {ratio_sum:.3}, must be \u{2264} 1.0"
        )));
    }
    for (name, ratio) in [
        ("systemPromptRatio", budget.system_prompt_ratio),
        ("bootstrapRatio", budget.bootstrap_ratio),
        ("historyRatio", budget.history_ratio),
        ("responseRatio", budget.response_ratio),
    ] {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(Error::message(format!("agents.defaults.contextManagement.budget.{name} must be in [0, 1]")));
        }
    }

    let summary = &config.agents.defaults.context_management.rolling_summary;
    if summary.enabled && !(0.0..=1.0).contains(&summary.trigger_threshold) {
        return Err(Error::message(
            "agents.defaults.contextManagement.rollingSummary.triggerThreshold must be in [0, 1]",
        ));
    }

    for (name, lane) in &config.lanes {
        if lane.concurrency == 0 {
            return Err(Error::message(format!("lanes.{name}.concurrency must be \u{2265} 1")));
        }
    }

    for agent in &config.agents.list {
        if agent.id.is_empty() {
            return Err(Error::message("agents.list[] entries must have a nonempty id"));
        }
    }

    Ok(())
}
