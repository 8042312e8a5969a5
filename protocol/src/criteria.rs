//! Success criteria evaluation.
//!
//! A metric name resolves against the executor's flat `metrics` map first,
//! then as a dotted path into the result payload (`issues.0.severity`).
//! Anything that cannot be resolved or compared fails that one criterion;
//! evaluation itself never errors.

use serde_json::Value;

use crate::request::{Criterion, Operator, OutcomeRequest};
use crate::response::{CriteriaReport, CriterionResult};
use crate::JsonMap;

/// Stateless evaluator for a request's success criteria.
#[derive(Debug, Clone, Copy, Default)]
pub struct CriteriaEvaluator;

impl CriteriaEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate every criterion in order. Overall success means every
    /// required criterion passed; optional results never affect it.
    pub fn evaluate(&self, request: &OutcomeRequest, result: &Value, metrics: &JsonMap) -> CriteriaReport {
        let check = |c: &Criterion| Self::evaluate_one(c, result, metrics);
        let required: Vec<CriterionResult> =
            request.success_criteria.required.iter().map(check).collect();
        let optional: Vec<CriterionResult> =
            request.success_criteria.optional.iter().map(check).collect();
        let overall_success = required.iter().all(|r| r.passed);

        tracing::debug!(
            request_id = %request.request_id,
            required = required.len(),
            optional = optional.len(),
            overall_success,
            "Criteria evaluated"
        );

        CriteriaReport {
            required,
            optional,
            overall_success,
        }
    }

    /// Evaluate a single criterion.
    pub fn evaluate_one(criterion: &Criterion, result: &Value, metrics: &JsonMap) -> CriterionResult {
        let actual = resolve(&criterion.metric, result, metrics);
        let passed = actual
            .map(|a| compare(criterion.operator, a, &criterion.value))
            .unwrap_or(false);
        CriterionResult {
            metric: criterion.metric.clone(),
            passed,
            actual: actual.cloned(),
        }
    }
}

fn resolve<'a>(metric: &str, result: &'a Value, metrics: &'a JsonMap) -> Option<&'a Value> {
    if let Some(value) = metrics.get(metric) {
        return Some(value);
    }
    if metric.is_empty() {
        return None;
    }
    metric.split('.').try_fold(result, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn compare(op: Operator, actual: &Value, expected: &Value) -> bool {
    match op {
        Operator::Eq => loosely_equal(actual, expected),
        Operator::Ne => !loosely_equal(actual, expected),
        Operator::Gt => numeric(actual, expected, |a, e| a > e),
        Operator::Gte => numeric(actual, expected, |a, e| a >= e),
        Operator::Lt => numeric(actual, expected, |a, e| a < e),
        Operator::Lte => numeric(actual, expected, |a, e| a <= e),
        Operator::Contains => contains(actual, expected),
        Operator::Unsupported => false,
    }
}

/// Numbers compare by value (`3 == 3.0`); everything else structurally.
fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(e)) => a == e,
        _ => actual == expected,
    }
}

fn numeric(actual: &Value, expected: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(e)) => cmp(a, e),
        _ => false,
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::String(haystack) => expected.as_str().is_some_and(|needle| haystack.contains(needle)),
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, expected)),
        Value::Object(map) => expected.as_str().is_some_and(|key| map.contains_key(key)),
        _ => false,
    }
}
