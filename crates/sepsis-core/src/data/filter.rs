//! Row filters ("exclusions").
//!
//! A filter is a conjunction of simple comparisons written the way cohort
//! exclusions are usually noted down:
//!
//! ```text
//! adult = 1 and icustay_num = 1 and gender != 'F'
//! ```
//!
//! Values that parse as numbers compare numerically; anything else compares
//! against text columns. A missing value never satisfies a comparison.

use super::{Column, Dataset};
use sepsis_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// Comparison operator of a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn symbol(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "!=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }

    fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Comparison::Eq => ordering == Equal,
            Comparison::Ne => ordering != Equal,
            Comparison::Lt => ordering == Less,
            Comparison::Le => ordering != Greater,
            Comparison::Gt => ordering == Greater,
            Comparison::Ge => ordering != Less,
        }
    }
}

/// Right-hand side of a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    Number(f64),
    Text(String),
}

/// `column op value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub op: Comparison,
    pub value: FilterValue,
}

/// Conjunction of conditions; an empty filter keeps every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowFilter {
    pub conditions: Vec<Condition>,
}

// Two-character operators first so `<=` is not read as `<`.
const OPERATORS: [(&str, Comparison); 7] = [
    ("!=", Comparison::Ne),
    ("<>", Comparison::Ne),
    ("<=", Comparison::Le),
    (">=", Comparison::Ge),
    ("=", Comparison::Eq),
    ("<", Comparison::Lt),
    (">", Comparison::Gt),
];

impl RowFilter {
    /// Parse an exclusion expression.
    pub fn parse(expr: &str) -> Result<Self> {
        let mut conditions = Vec::new();
        for clause in split_and(expr) {
            let clause = clause.trim();
            if clause.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "empty condition in filter '{}'",
                    expr
                )));
            }
            conditions.push(parse_condition(clause)?);
        }
        Ok(Self { conditions })
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Row mask of the rows satisfying every condition.
    pub fn mask(&self, data: &Dataset) -> Result<Vec<bool>> {
        let mut keep = vec![true; data.n_rows()];
        for condition in &self.conditions {
            let column = data.column(&condition.column)?;
            for (row, slot) in keep.iter_mut().enumerate() {
                if *slot {
                    *slot = condition.matches(column, row)?;
                }
            }
        }
        Ok(keep)
    }

    /// The rows of `data` satisfying the filter, in their original order.
    pub fn apply(&self, data: &Dataset) -> Result<Dataset> {
        if self.is_empty() {
            return Ok(data.clone());
        }
        let keep = self.mask(data)?;
        data.select_rows(&keep)
    }
}

impl std::fmt::Display for RowFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, c) in self.conditions.iter().enumerate() {
            if i > 0 {
                write!(f, " and ")?;
            }
            match &c.value {
                FilterValue::Number(v) => write!(f, "{} {} {}", c.column, c.op.symbol(), v)?,
                FilterValue::Text(v) => write!(f, "{} {} '{}'", c.column, c.op.symbol(), v)?,
            }
        }
        Ok(())
    }
}

impl Condition {
    fn matches(&self, column: &Column, row: usize) -> Result<bool> {
        let ordering = match (column, &self.value) {
            (Column::Numeric(values), FilterValue::Number(rhs)) => values[row].partial_cmp(rhs),
            (Column::Text(values), FilterValue::Text(rhs)) => {
                values[row].as_deref().map(|lhs| lhs.cmp(rhs.as_str()))
            }
            (Column::Text(values), FilterValue::Number(rhs)) => {
                // Numeric literal against a text column: compare the spelling.
                let rhs = rhs.to_string();
                values[row].as_deref().map(|lhs| lhs.cmp(rhs.as_str()))
            }
            (other, _) => {
                return Err(Error::InvalidConfig(format!(
                    "cannot compare {} column '{}' with {:?}",
                    other.kind(),
                    self.column,
                    self.value
                )))
            }
        };
        Ok(ordering.is_some_and(|o| self.op.holds(o)))
    }
}

/// Split on the keyword `and` (any case), outside quotes.
fn split_and(expr: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for word in expr.split_inclusive(char::is_whitespace) {
        for ch in word.chars() {
            match quote {
                Some(q) if ch == q => quote = None,
                None if ch == '\'' || ch == '"' => quote = Some(ch),
                _ => {}
            }
        }
        if quote.is_none() && word.trim().eq_ignore_ascii_case("and") {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push_str(word);
        }
    }
    parts.push(current);
    parts
}

fn parse_condition(clause: &str) -> Result<Condition> {
    let (position, token, op) = OPERATORS
        .iter()
        .filter_map(|(token, op)| clause.find(token).map(|pos| (pos, *token, *op)))
        .min_by_key(|(pos, token, _)| (*pos, std::cmp::Reverse(token.len())))
        .ok_or_else(|| {
            Error::InvalidConfig(format!("no comparison operator in condition '{}'", clause))
        })?;

    let column = clause[..position].trim();
    let raw = clause[position + token.len()..].trim();
    if column.is_empty() || raw.is_empty() {
        return Err(Error::InvalidConfig(format!(
            "malformed condition '{}'",
            clause
        )));
    }

    let value = if let Some(text) = unquote(raw) {
        FilterValue::Text(text.to_string())
    } else if let Ok(number) = raw.parse::<f64>() {
        FilterValue::Number(number)
    } else if raw.eq_ignore_ascii_case("true") {
        FilterValue::Number(1.0)
    } else if raw.eq_ignore_ascii_case("false") {
        FilterValue::Number(0.0)
    } else {
        FilterValue::Text(raw.to_string())
    };

    Ok(Condition {
        column: column.to_string(),
        op,
        value,
    })
}

fn unquote(raw: &str) -> Option<&str> {
    for q in ['\'', '"'] {
        if raw.len() >= 2 && raw.starts_with(q) && raw.ends_with(q) {
            return Some(&raw[1..raw.len() - 1]);
        }
    }
    None
}
