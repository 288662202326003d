//! Condition evaluation: one check function per DSL predicate, dispatched
//! from a single `evaluate` entry point — the same decomposition this
//! workspace's policy trigger evaluator uses for its condition variants.

use std::collections::{HashMap, HashSet};

use super::ast::Condition;

/// Everything a condition might need to know about a candidate user
/// (`spec.md` §4.3's capability object: `vip_level`, `company`,
/// `starred_repos`, `employee_number`, `departments`).
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub vip_level: i64,
    pub starred_repos: HashSet<String>,
    /// Whether the HR sync collaborator is wired up for this user at all.
    /// When `false`, `belong-to` always falls back to `company`.
    pub employee_sync_enabled: bool,
    pub employee_number: Option<String>,
    pub company: Option<String>,
    /// Every department segment the user belongs to, root to leaf. `None`
    /// if the user has no department assignment.
    pub department_segments: Option<Vec<String>>,
    pub attributes: HashMap<String, String>,
}

fn check_is_vip(ctx: &EvalContext, threshold: i64) -> bool {
    ctx.vip_level >= threshold
}

fn check_github_star(ctx: &EvalContext, repo: &str) -> bool {
    ctx.starred_repos.contains(repo)
}

/// `belong-to` checks the department path when EmployeeSync is enabled and
/// the user has a non-empty employee number; otherwise it falls back to
/// matching the user's company (`spec.md` §4.3). An enabled sync with a
/// non-empty employee number but no department path resolves to `false`,
/// with no fallback — the source is ambiguous (`DESIGN.md`, Open Question 3).
fn check_belong_to(ctx: &EvalContext, names: &[String]) -> bool {
    let employee_number_present = ctx.employee_number.as_ref().is_some_and(|n| !n.is_empty());
    if ctx.employee_sync_enabled && employee_number_present {
        ctx.department_segments
            .as_ref()
            .is_some_and(|segments| segments.iter().any(|s| names.contains(s)))
    } else {
        ctx.company.as_ref().is_some_and(|c| names.contains(c))
    }
}

fn check_attr(ctx: &EvalContext, key: &str, expected: &str) -> bool {
    ctx.attributes.get(key).is_some_and(|value| value == expected)
}

/// Evaluate a condition against a context.
pub fn evaluate(condition: &Condition, ctx: &EvalContext) -> bool {
    match condition {
        Condition::True => true,
        Condition::IsVip(threshold) => check_is_vip(ctx, *threshold),
        Condition::GithubStar(repo) => check_github_star(ctx, repo),
        Condition::BelongTo(names) => check_belong_to(ctx, names),
        Condition::Attr(key, value) => check_attr(ctx, key, value),
        Condition::Not(inner) => !evaluate(inner, ctx),
        Condition::And(conditions) => conditions.iter().all(|c| evaluate(c, ctx)),
        Condition::Or(conditions) => conditions.iter().any(|c| evaluate(c, ctx)),
    }
}
