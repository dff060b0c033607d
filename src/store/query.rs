use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::hierarchy::{Unit, UnitKind};

/// A single filter condition. Predicates in a [`Query`] form a conjunction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    Equals { field: String, value: String },
    LessThan { field: String, value: String },
    GreaterThan { field: String, value: String },
    /// SQL-style pattern: `%` matches any run of characters, `_` exactly one.
    Like { field: String, pattern: String },
    In { field: String, values: Vec<String> },
}

impl Predicate {
    pub fn equals(field: &str, value: impl Into<String>) -> Self {
        Predicate::Equals {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn less_than(field: &str, value: impl Into<String>) -> Self {
        Predicate::LessThan {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn greater_than(field: &str, value: impl Into<String>) -> Self {
        Predicate::GreaterThan {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn like(field: &str, pattern: impl Into<String>) -> Self {
        Predicate::Like {
            field: field.to_string(),
            pattern: pattern.into(),
        }
    }

    pub fn one_of<I, V>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Predicate::In {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Predicate::Equals { field, .. }
            | Predicate::LessThan { field, .. }
            | Predicate::GreaterThan { field, .. }
            | Predicate::Like { field, .. }
            | Predicate::In { field, .. } => field,
        }
    }

    /// Evaluates the predicate against a unit. Null fields never match.
    pub fn matches(&self, unit: &Unit) -> Result<bool, StoreError> {
        let Some(value) = lookup(unit, self.field())? else {
            return Ok(false);
        };

        let matched = match self {
            Predicate::Equals { value: want, .. } => value == want,
            Predicate::LessThan { value: bound, .. } => {
                compare_values(value, bound) == Ordering::Less
            }
            Predicate::GreaterThan { value: bound, .. } => {
                compare_values(value, bound) == Ordering::Greater
            }
            Predicate::Like { pattern, .. } => like_match(value, pattern),
            Predicate::In { values, .. } => values.iter().any(|v| v == value),
        };
        Ok(matched)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub direction: Direction,
}

/// A filtered, ordered selection of one kind of unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub kind: UnitKind,
    #[serde(default)]
    pub predicates: Vec<Predicate>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
}

impl Query {
    pub fn new(kind: UnitKind) -> Self {
        Self {
            kind,
            predicates: Vec::new(),
            order_by: Vec::new(),
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by.push(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    /// True when the unit is of the queried kind and satisfies every predicate.
    pub fn matches(&self, unit: &Unit) -> Result<bool, StoreError> {
        if unit.kind() != self.kind {
            return Ok(false);
        }
        for predicate in &self.predicates {
            if !predicate.matches(unit)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Stable sort by the query's ordering; units keep their relative order on ties.
    pub fn sort(&self, units: &mut [Unit]) -> Result<(), StoreError> {
        if self.order_by.is_empty() {
            return Ok(());
        }
        // Validate field names up front so the comparator can't fail.
        if let Some(sample) = units.first() {
            for order in &self.order_by {
                lookup(sample, &order.field)?;
            }
        }

        units.sort_by(|a, b| {
            for order in &self.order_by {
                let left = a.field(&order.field).flatten();
                let right = b.field(&order.field).flatten();
                let ord = match (left, right) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                    (Some(l), Some(r)) => compare_values(l, r),
                };
                let ord = match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        Ok(())
    }
}

fn lookup<'u>(unit: &'u Unit, field: &str) -> Result<Option<&'u str>, StoreError> {
    unit.field(field).ok_or_else(|| StoreError::UnknownField {
        kind: unit.kind(),
        field: field.to_string(),
    })
}

/// Total order over field values: numbers first, compared numerically, then
/// everything else lexicographically. `NaN` counts as text. Equal numbers with
/// different spellings ("1" and "1.0") fall back to the raw text.
fn compare_values(left: &str, right: &str) -> Ordering {
    match (numeric(left), numeric(right)) {
        (Some(l), Some(r)) => l.total_cmp(&r).then_with(|| left.cmp(right)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => left.cmp(right),
    }
}

fn numeric(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|n| !n.is_nan())
}

fn like_match(value: &str, pattern: &str) -> bool {
    let value: Vec<char> = value.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    // matched[j]: value[..i] matches pattern[..j]
    let mut matched = vec![false; pattern.len() + 1];
    matched[0] = true;
    for (j, p) in pattern.iter().enumerate() {
        matched[j + 1] = matched[j] && *p == '%';
    }

    for c in &value {
        let mut next = vec![false; pattern.len() + 1];
        for (j, p) in pattern.iter().enumerate() {
            next[j + 1] = match *p {
                '%' => next[j] || matched[j + 1],
                '_' => matched[j],
                lit => matched[j] && lit == *c,
            };
        }
        matched = next;
    }
    matched[pattern.len()]
}
