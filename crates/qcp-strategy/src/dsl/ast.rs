//! Condition DSL abstract syntax (`spec.md` §4.3, "Condition DSL").
//!
//! Surface syntax is a small set of prefix function calls:
//! `true()`, `is-vip(3)`, `github-star("zgsm")`, `belong-to("org1", "org2")`,
//! `attr("plan", "enterprise")`, and the combinators `and(a, b, ...)`,
//! `or(a, b, ...)`, `not(a)`.

/// A parsed condition expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Always satisfied.
    True,
    /// User's VIP level is at least the given threshold.
    IsVip(i64),
    /// User has starred the named GitHub repository.
    GithubStar(String),
    /// User's department path (or, as fallback, their company) matches any
    /// of the given names.
    BelongTo(Vec<String>),
    /// A user attribute equals the given value.
    Attr(String, String),
    Not(Box<Condition>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}
