//! Scenario Planner
//!
//! Builds the execution plan by filtering and ordering scenarios.
//!
//! Filtering options:
//! - Regex pattern matching on scenario ID
//! - Group filtering
//! - Tag inclusion/exclusion
//!
//! Ordering: scenarios are sorted alphabetically by ID for deterministic execution.

use crate::scenarios::ScenarioDef;
use regex::Regex;

/// Execution plan for scenarios
pub struct ExecutionPlan {
    /// Ordered list of scenarios to run
    pub scenarios: Vec<&'static ScenarioDef>,
}

/// Selection criteria, all optional
#[derive(Debug, Clone, Default)]
pub struct PlanFilter<'a> {
    /// Keep scenarios whose id matches
    pub pattern: Option<&'a Regex>,
    /// Keep scenarios in this group
    pub group: Option<&'a str>,
    /// Keep scenarios carrying this tag
    pub tag: Option<&'a str>,
    /// Drop scenarios carrying this tag
    pub skip_tag: Option<&'a str>,
}

impl PlanFilter<'_> {
    /// Whether `scenario` passes every criterion
    pub fn matches(&self, scenario: &ScenarioDef) -> bool {
        if let Some(re) = self.pattern {
            if !re.is_match(scenario.id) {
                return false;
            }
        }
        if let Some(g) = self.group {
            if scenario.group != g {
                return false;
            }
        }
        if let Some(t) = self.tag {
            if !scenario.tags.contains(&t) {
                return false;
            }
        }
        if let Some(st) = self.skip_tag {
            if scenario.tags.contains(&st) {
                return false;
            }
        }
        true
    }
}

/// Build execution plan from the scenario table
pub fn build_plan(
    scenarios: impl IntoIterator<Item = &'static ScenarioDef>,
    filter: &PlanFilter<'_>,
) -> ExecutionPlan {
    let mut selected: Vec<_> = scenarios
        .into_iter()
        .filter(|s| filter.matches(s))
        .collect();

    selected.sort_by_key(|s| s.id);

    ExecutionPlan {
        scenarios: selected,
    }
}
