//! Template filter conditions: pure evaluation, fail-closed.
//!
//! Every condition names a fact (`argument`), an [`Operation`] and an
//! optional `reference` value. A missing fact, an uncoercible value or a
//! malformed condition makes the condition evaluate to `false`; nothing is
//! raised across this boundary.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::facts::EntityFacts;

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// The fixed set of filter operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    IsTrue,
    IsFalse,
    IsNull,
    IsNotNull,
    Equals,
    DoesNotEqual,
    StartsWith,
    DoesNotStartWith,
    EndsWith,
    DoesNotEndWith,
    Contains,
    DoesNotContain,
    Matches,
    DoesNotMatch,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    IsBefore,
    IsAfter,
}

/// Display names accepted for each operation.
const OPERATION_NAMES: &[(&str, Operation)] = &[
    ("is true", Operation::IsTrue),
    ("is false", Operation::IsFalse),
    ("is null", Operation::IsNull),
    ("is not null", Operation::IsNotNull),
    ("equals", Operation::Equals),
    ("does not equal", Operation::DoesNotEqual),
    ("starts with", Operation::StartsWith),
    ("does not start with", Operation::DoesNotStartWith),
    ("ends with", Operation::EndsWith),
    ("does not end with", Operation::DoesNotEndWith),
    ("contains", Operation::Contains),
    ("does not contain", Operation::DoesNotContain),
    ("matches", Operation::Matches),
    ("does not match", Operation::DoesNotMatch),
    ("is less than", Operation::LessThan),
    ("is less than or equal", Operation::LessThanOrEqual),
    ("is greater than", Operation::GreaterThan),
    ("is greater than or equal", Operation::GreaterThanOrEqual),
    ("is before", Operation::IsBefore),
    ("is after", Operation::IsAfter),
];

impl Operation {
    /// Parse an operation name. Case and surrounding whitespace are ignored.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        OPERATION_NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, op)| *op)
    }

    pub fn as_str(&self) -> &'static str {
        OPERATION_NAMES
            .iter()
            .find(|(_, op)| op == self)
            .map(|(n, _)| *n)
            .unwrap_or("unknown")
    }

    /// Whether this operation compares against a `reference` value.
    pub fn needs_reference(&self) -> bool {
        !matches!(
            self,
            Self::IsTrue | Self::IsFalse | Self::IsNull | Self::IsNotNull
        )
    }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// A single `argument operation reference` condition as declared on a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub argument: String,
    pub operation: String,
    #[serde(default)]
    pub reference: Option<String>,
}

impl FilterCondition {
    pub fn new(
        argument: impl Into<String>,
        operation: impl Into<String>,
        reference: Option<&str>,
    ) -> Self {
        Self {
            argument: argument.into(),
            operation: operation.into(),
            reference: reference.map(str::to_string),
        }
    }

    /// Check the condition is well-formed, returning the parsed operation.
    pub fn validate(&self) -> Result<Operation, CoreError> {
        if self.argument.trim().is_empty() {
            return Err(self.invalid("argument is empty"));
        }
        let op = Operation::parse(&self.operation)
            .ok_or_else(|| self.invalid(&format!("unknown operation '{}'", self.operation)))?;
        if op.needs_reference() && self.reference.is_none() {
            return Err(self.invalid(&format!("'{}' requires a reference value", op.as_str())));
        }
        Ok(op)
    }

    /// Evaluate against `facts`. Malformed conditions are logged and fail.
    pub fn evaluate(&self, facts: &EntityFacts) -> bool {
        match self.try_evaluate(facts) {
            Ok(matched) => matched,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring invalid filter condition");
                false
            }
        }
    }

    /// Evaluate, surfacing malformed conditions as
    /// [`CoreError::InvalidFilterCondition`]. A missing fact or an
    /// uncoercible comparison is a plain `Ok(false)`.
    pub fn try_evaluate(&self, facts: &EntityFacts) -> Result<bool, CoreError> {
        let op = self.validate()?;
        let Some(value) = facts.get(&self.argument) else {
            tracing::debug!(argument = %self.argument, "Filter argument not in fact set");
            return Ok(false);
        };
        let reference = self.reference.as_deref().unwrap_or_default();

        let matched = match op {
            Operation::IsTrue => truthiness(value) == Some(true),
            Operation::IsFalse => truthiness(value) == Some(false),
            Operation::IsNull => value.is_null(),
            Operation::IsNotNull => !value.is_null(),
            Operation::Equals => equals(value, reference),
            Operation::DoesNotEqual => !value.is_null() && !equals(value, reference),
            Operation::StartsWith => with_text(value, |s| s.starts_with(&lower(reference))),
            Operation::DoesNotStartWith => {
                with_text(value, |s| !s.starts_with(&lower(reference)))
            }
            Operation::EndsWith => with_text(value, |s| s.ends_with(&lower(reference))),
            Operation::DoesNotEndWith => with_text(value, |s| !s.ends_with(&lower(reference))),
            Operation::Contains => with_text(value, |s| s.contains(&lower(reference))),
            Operation::DoesNotContain => with_text(value, |s| !s.contains(&lower(reference))),
            Operation::Matches => regex_match(value, reference)?,
            Operation::DoesNotMatch => {
                !value.is_null() && text(value).is_some() && !regex_match(value, reference)?
            }
            Operation::LessThan => compare_numbers(value, reference, Ordering::is_lt),
            Operation::LessThanOrEqual => compare_numbers(value, reference, Ordering::is_le),
            Operation::GreaterThan => compare_numbers(value, reference, Ordering::is_gt),
            Operation::GreaterThanOrEqual => compare_numbers(value, reference, Ordering::is_ge),
            Operation::IsBefore => compare_dates(value, reference, Ordering::is_lt),
            Operation::IsAfter => compare_dates(value, reference, Ordering::is_gt),
        };
        Ok(matched)
    }

    fn invalid(&self, reason: &str) -> CoreError {
        CoreError::InvalidFilterCondition {
            argument: self.argument.clone(),
            reason: reason.to_string(),
        }
    }
}

/// True when every condition matches. An empty list always matches.
pub fn all_match(conditions: &[FilterCondition], facts: &EntityFacts) -> bool {
    conditions.iter().all(|c| c.evaluate(facts))
}

// ---------------------------------------------------------------------------
// Coercion helpers
// ---------------------------------------------------------------------------

fn lower(s: &str) -> String {
    s.to_lowercase()
}

/// Lower-cased textual form of a scalar fact.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.to_lowercase()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn with_text(value: &Value, check: impl Fn(&str) -> bool) -> bool {
    text(value).is_some_and(|s| check(&s))
}

fn truthiness(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn equals(value: &Value, reference: &str) -> bool {
    if let (Some(a), Ok(b)) = (number(value), reference.trim().parse::<f64>()) {
        return a == b;
    }
    text(value).is_some_and(|s| s == lower(reference))
}

fn regex_match(value: &Value, pattern: &str) -> Result<bool, CoreError> {
    let Some(s) = value.as_str().map(str::to_string).or_else(|| text(value)) else {
        return Ok(false);
    };
    let re = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| CoreError::InvalidFilterCondition {
            argument: pattern.to_string(),
            reason: format!("invalid regex: {e}"),
        })?;
    Ok(re.is_match(&s))
}

fn compare_numbers(value: &Value, reference: &str, accept: fn(Ordering) -> bool) -> bool {
    let (Some(a), Ok(b)) = (number(value), reference.trim().parse::<f64>()) else {
        return false;
    };
    a.partial_cmp(&b).is_some_and(accept)
}

/// Parse `YYYY-MM-DD` or an RFC 3339 timestamp down to its date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

fn compare_dates(value: &Value, reference: &str, accept: fn(Ordering) -> bool) -> bool {
    let Some(a) = value.as_str().and_then(parse_date) else {
        return false;
    };
    let Some(b) = parse_date(reference) else {
        return false;
    };
    accept(a.cmp(&b))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
