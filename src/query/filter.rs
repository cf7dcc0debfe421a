use serde::Deserialize;
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite};
use tracing::warn;

use crate::db::table::{Column, ColumnKind, TableDef};
use crate::error::{AppError, Result};
use crate::query::value::{coerce, scalar_text, time_span, Mode, SqlValue, TimeSpan};

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gt,
    Lt,
    Ge,
    Le,
    Like,
    ILike,
    In,
    Regex { case_insensitive: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    pub comparison: Comparison,
    pub negated: bool,
}

impl Operator {
    /// Parse the operator DSL: `=, >, <, >=, <=, like, ilike, in, regex,
    /// iregex`, each optionally prefixed with `not`, plus the symbolic regex
    /// forms `~ ~* !~ !~*`. Anything else is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let op = raw.trim().to_ascii_lowercase();
        let symbolic = match op.as_str() {
            "~" => Some((false, false)),
            "~*" => Some((false, true)),
            "!~" => Some((true, false)),
            "!~*" => Some((true, true)),
            _ => None,
        };
        if let Some((negated, case_insensitive)) = symbolic {
            return Some(Self { comparison: Comparison::Regex { case_insensitive }, negated });
        }

        let (negated, base) = match op.strip_prefix("not") {
            Some(rest) => (true, rest.trim_start()),
            None => (false, op.as_str()),
        };
        let comparison = match base {
            "=" => Comparison::Eq,
            ">" => Comparison::Gt,
            "<" => Comparison::Lt,
            ">=" => Comparison::Ge,
            "<=" => Comparison::Le,
            "like" => Comparison::Like,
            "ilike" => Comparison::ILike,
            "in" => Comparison::In,
            "regex" => Comparison::Regex { case_insensitive: false },
            "iregex" => Comparison::Regex { case_insensitive: true },
            _ => return None,
        };
        Some(Self { comparison, negated })
    }
}

// ---------------------------------------------------------------------------
// Criteria
// ---------------------------------------------------------------------------

/// One `{field, operator, value}` element of a search request, as loosely
/// typed as the caller sent it.
#[derive(Debug, Default, Deserialize)]
pub struct Criterion {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Single(SqlValue),
    List(Vec<SqlValue>),
    /// Timestamp comparisons work on the span the caller's value names.
    Span(TimeSpan),
    Spans(Vec<TimeSpan>),
}

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    column: &'static Column,
    operator: Operator,
    operand: Operand,
}

/// Why a criterion contributed nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Skip {
    #[error("not an object")]
    NotAnObject,
    #[error("unknown field {0:?}")]
    UnknownField(Option<String>),
    #[error("missing value")]
    MissingValue,
    #[error("unknown operator {0:?}")]
    UnknownOperator(Option<String>),
    #[error("bad value: {0}")]
    BadValue(String),
}

/// A validated conjunction of conditions against one table.
#[derive(Debug, Clone)]
pub struct Filter {
    table: &'static TableDef,
    conditions: Vec<Condition>,
}

impl Filter {
    /// Parse a search payload. The payload itself must be a JSON array;
    /// individual malformed criteria are dropped with a warning.
    pub fn from_json(table: &'static TableDef, payload: &Value) -> Result<Self> {
        let items = payload
            .as_array()
            .ok_or_else(|| AppError::Validation("search data must be a JSON array of criteria".to_string()))?;
        Ok(Self::build(table, items))
    }

    pub fn build(table: &'static TableDef, items: &[Value]) -> Self {
        let mut conditions = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match parse_condition(table, item) {
                Ok(condition) => conditions.push(condition),
                Err(reason) => warn!(table = table.name, index, %reason, "search criterion ignored"),
            }
        }
        Self { table, conditions }
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Append ` WHERE c1 AND c2 ...` to `qb`; nothing when there are no
    /// conditions. Values only ever reach the statement as bound parameters.
    pub fn push_where(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        for (i, condition) in self.conditions.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            self.push_condition(qb, condition);
        }
    }

    fn push_condition(&self, qb: &mut QueryBuilder<'_, Sqlite>, condition: &Condition) {
        let column = self.table.qualified(condition.column);
        let Operator { comparison, negated } = condition.operator;
        if negated {
            qb.push("NOT (");
        }
        match (comparison, condition.operand.clone()) {
            (Comparison::In, Operand::Spans(spans)) if !spans.is_empty() => {
                qb.push("(");
                for (i, span) in spans.into_iter().enumerate() {
                    if i > 0 {
                        qb.push(" OR ");
                    }
                    push_span(qb, &column, Comparison::Eq, span);
                }
                qb.push(")");
            }
            (Comparison::In, operand) => {
                qb.push(format!("{column} IN ("));
                let values = match operand {
                    Operand::List(values) => values,
                    Operand::Single(value) => vec![value],
                    Operand::Span(span) => vec![SqlValue::Text(span.start)],
                    Operand::Spans(_) => Vec::new(),
                };
                for (i, value) in values.into_iter().enumerate() {
                    if i > 0 {
                        qb.push(", ");
                    }
                    value.push_bind(qb);
                }
                qb.push(")");
            }
            (cmp, Operand::Span(span)) => push_span(qb, &column, cmp, span),
            (Comparison::Like, Operand::Single(value)) => {
                qb.push(format!("{} LIKE ", text_expr(condition.column, &column)));
                value.push_bind(qb);
            }
            (Comparison::ILike | Comparison::Regex { .. }, Operand::Single(value)) => {
                qb.push(format!("{} REGEXP ", text_expr(condition.column, &column)));
                value.push_bind(qb);
            }
            (cmp, Operand::Single(value)) => {
                qb.push(format!("{column} {} ", symbol(cmp)));
                value.push_bind(qb);
            }
            // Only `in` carries a list operand.
            (_, Operand::List(_) | Operand::Spans(_)) => {
                qb.push("0");
            }
        }
        if negated {
            qb.push(")");
        }
    }
}

fn symbol(cmp: Comparison) -> &'static str {
    match cmp {
        Comparison::Gt => ">",
        Comparison::Lt => "<",
        Comparison::Ge => ">=",
        Comparison::Le => "<=",
        _ => "=",
    }
}

/// Compare a timestamp column against `[start, end)`: equal means inside
/// the span, `>` after all of it, `<` before all of it.
fn push_span(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, cmp: Comparison, span: TimeSpan) {
    let (symbol, bound) = match cmp {
        Comparison::Gt => (">=", span.end),
        Comparison::Ge => (">=", span.start),
        Comparison::Lt => ("<", span.start),
        Comparison::Le => ("<", span.end),
        _ => {
            qb.push(format!("({column} >= "));
            qb.push_bind(span.start);
            qb.push(format!(" AND {column} < "));
            qb.push_bind(span.end);
            qb.push(")");
            return;
        }
    };
    qb.push(format!("{column} {symbol} "));
    qb.push_bind(bound);
}

/// Translate a LIKE pattern into an anchored, case-insensitive regex so that
/// `ilike` folds case beyond ASCII. `%` and `_` are wildcards, `\` escapes.
fn like_to_regex(pattern: &str) -> String {
    let mut out = String::from("(?is)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '\\' => out.push_str(&regex::escape(&chars.next().unwrap_or('\\').to_string())),
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    out
}

/// Expression a pattern operator matches against: the column itself for
/// text, its printed form otherwise.
fn text_expr(column: &Column, qualified: &str) -> String {
    match column.kind {
        ColumnKind::Price => format!("printf('%.2f', {qualified} / 100.0)"),
        ColumnKind::Bool | ColumnKind::SmallInt | ColumnKind::PositiveSmallInt => {
            format!("CAST({qualified} AS TEXT)")
        }
        // The printed `YYYY-MM-DD HH:MM` form.
        ColumnKind::Timestamp => format!("replace(substr({qualified}, 1, 16), 'T', ' ')"),
        ColumnKind::Uuid | ColumnKind::Text | ColumnKind::Enum(_) => qualified.to_string(),
    }
}

fn parse_condition(table: &'static TableDef, item: &Value) -> std::result::Result<Condition, Skip> {
    if !item.is_object() {
        return Err(Skip::NotAnObject);
    }
    let criterion: Criterion = serde_json::from_value(item.clone()).unwrap_or_default();

    let column = criterion
        .field
        .as_deref()
        .and_then(|f| table.column(f))
        .ok_or_else(|| Skip::UnknownField(criterion.field.clone()))?;
    let value = match criterion.value {
        Some(v) if !v.is_null() => v,
        _ => return Err(Skip::MissingValue),
    };
    let operator = criterion
        .operator
        .as_deref()
        .and_then(Operator::parse)
        .ok_or_else(|| Skip::UnknownOperator(criterion.operator.clone()))?;

    let is_time = column.kind == ColumnKind::Timestamp;
    let span = |v: &Value| time_span(v).map_err(|e| Skip::BadValue(format!("{} {e}", column.name)));
    let operand = match operator.comparison {
        Comparison::In if is_time => match &value {
            Value::Array(items) => Operand::Spans(items.iter().map(span).collect::<std::result::Result<_, _>>()?),
            scalar => Operand::Spans(vec![span(scalar)?]),
        },
        Comparison::In => match &value {
            Value::Array(items) => Operand::List(
                items
                    .iter()
                    .map(|v| coerce(column, v, Mode::Filter))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(Skip::BadValue)?,
            ),
            scalar => Operand::Single(coerce(column, scalar, Mode::Filter).map_err(Skip::BadValue)?),
        },
        Comparison::Like => {
            let text = scalar_text(&value).ok_or_else(|| Skip::BadValue("pattern must be a scalar".into()))?;
            Operand::Single(SqlValue::Text(format!("%{text}%")))
        }
        Comparison::ILike => {
            let text = scalar_text(&value).ok_or_else(|| Skip::BadValue("pattern must be a scalar".into()))?;
            Operand::Single(SqlValue::Text(like_to_regex(&format!("%{text}%"))))
        }
        Comparison::Regex { case_insensitive } => {
            let text = scalar_text(&value).ok_or_else(|| Skip::BadValue("pattern must be a scalar".into()))?;
            regex::Regex::new(&text).map_err(|e| Skip::BadValue(e.to_string()))?;
            Operand::Single(SqlValue::Text(if case_insensitive { format!("(?i){text}") } else { text }))
        }
        _ if is_time => Operand::Span(span(&value)?),
        _ => Operand::Single(coerce(column, &value, Mode::Filter).map_err(Skip::BadValue)?),
    };

    Ok(Condition { column, operator, operand })
}
