//! Field-level query engine, a thin layer over iteration.
//!
//! A query bundles a target type, up to [`MAX_CONDITIONS`] conditions
//! (evaluated as a conjunction), and optional limit/offset. Execution runs
//! the database's `for_each` with an adapter that evaluates conditions per
//! record, so queries see exactly what iteration sees - main file layered
//! with staged WAL entries.
//!
//! Comparison semantics: integers compare as `i64`; if either side is a
//! float, both compare as `f64` with equality meaning an absolute
//! difference below `1e-9`; booleans support only equality; strings
//! compare lexicographically, with `LIKE` using a glob grammar (`*`, `?`,
//! `\*`, `\?`). `IS NULL` is true when the field is zero / empty - the only
//! null model available.

mod field;
mod pattern;

pub use field::{FieldDef, FieldValue, Queryable};
pub use pattern::like_match;

use crate::database::Database;
use crate::error::{CoreResult, Error};
use std::marker::PhantomData;

/// Maximum number of conditions per query.
pub const MAX_CONDITIONS: usize = 8;

/// Absolute tolerance for float equality.
const FLOAT_EQ_EPSILON: f64 = 1e-9;

/// Comparison operator for a query condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    /// Field equals the value.
    Eq,
    /// Field differs from the value.
    Ne,
    /// Field is less than the value.
    Lt,
    /// Field is less than or equal to the value.
    Le,
    /// Field is greater than the value.
    Gt,
    /// Field is greater than or equal to the value.
    Ge,
    /// Field lies inside an inclusive range.
    Between,
    /// Field matches a glob pattern.
    Like,
    /// Field is zero / empty.
    IsNull,
    /// Field is non-zero / non-empty.
    NotNull,
}

#[derive(Debug, Clone, PartialEq)]
enum CondValue {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Str(String),
    None,
}

impl CondValue {
    fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::I32(v) => Some(i64::from(v)),
            Self::I64(v) => Some(v),
            Self::Bool(v) => Some(i64::from(v)),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::F32(v) => Some(f64::from(v)),
            Self::F64(v) => Some(v),
            Self::I32(v) => Some(f64::from(v)),
            Self::I64(v) => Some(v as f64),
            _ => None,
        }
    }

    fn is_float(&self) -> bool {
        matches!(self, Self::F32(_) | Self::F64(_))
    }
}

#[derive(Debug)]
struct Condition {
    field: usize,
    op: QueryOp,
    value: CondValue,
    upper: CondValue,
}

/// A query over one record type.
///
/// Build with [`Database::query`], add conditions with the typed `where_*`
/// methods, then run [`exec`](Query::exec) or [`count`](Query::count).
///
/// # Example
///
/// ```rust,ignore
/// let mut names = Vec::new();
/// db.query::<Product>()
///     .where_str("name", QueryOp::Like, "Test*")?
///     .where_bool("active", QueryOp::Eq, true)?
///     .limit(10)
///     .exec(|p| {
///         names.push(p.name.clone());
///         true
///     })?;
/// ```
pub struct Query<'db, T: Queryable> {
    db: &'db Database,
    conditions: Vec<Condition>,
    limit: usize,
    offset: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<'db, T: Queryable> std::fmt::Debug for Query<'db, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("conditions", &self.conditions)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish()
    }
}

impl<'db, T: Queryable> Query<'db, T> {
    pub(crate) fn new(db: &'db Database) -> Self {
        Self {
            db,
            conditions: Vec::new(),
            limit: 0,
            offset: 0,
            _marker: PhantomData,
        }
    }

    fn push(
        mut self,
        field: &str,
        op: QueryOp,
        value: CondValue,
        upper: CondValue,
    ) -> CoreResult<Self> {
        if self.conditions.len() >= MAX_CONDITIONS {
            return Err(Error::full(format!(
                "queries hold at most {MAX_CONDITIONS} conditions"
            )));
        }
        let index = T::fields()
            .iter()
            .position(|f| f.name == field)
            .ok_or_else(|| {
                Error::not_found(format!(
                    "field {field} on record type {}",
                    T::type_name()
                ))
            })?;
        self.conditions.push(Condition {
            field: index,
            op,
            value,
            upper,
        });
        Ok(self)
    }

    /// Adds a condition against an `i32` value.
    pub fn where_i32(self, field: &str, op: QueryOp, value: i32) -> CoreResult<Self> {
        self.push(field, op, CondValue::I32(value), CondValue::None)
    }

    /// Adds a condition against an `i64` value.
    pub fn where_i64(self, field: &str, op: QueryOp, value: i64) -> CoreResult<Self> {
        self.push(field, op, CondValue::I64(value), CondValue::None)
    }

    /// Adds a condition against an `f32` value.
    pub fn where_f32(self, field: &str, op: QueryOp, value: f32) -> CoreResult<Self> {
        self.push(field, op, CondValue::F32(value), CondValue::None)
    }

    /// Adds a condition against an `f64` value.
    pub fn where_f64(self, field: &str, op: QueryOp, value: f64) -> CoreResult<Self> {
        self.push(field, op, CondValue::F64(value), CondValue::None)
    }

    /// Adds a condition against a string value. With [`QueryOp::Like`] the
    /// value is a glob pattern (`*`, `?`, `\*`, `\?`).
    pub fn where_str(self, field: &str, op: QueryOp, value: &str) -> CoreResult<Self> {
        self.push(
            field,
            op,
            CondValue::Str(value.to_owned()),
            CondValue::None,
        )
    }

    /// Adds a condition against a boolean value (equality only).
    pub fn where_bool(self, field: &str, op: QueryOp, value: bool) -> CoreResult<Self> {
        self.push(field, op, CondValue::Bool(value), CondValue::None)
    }

    /// Adds an inclusive `min <= field <= max` condition over `i32`.
    pub fn where_between_i32(self, field: &str, min: i32, max: i32) -> CoreResult<Self> {
        self.push(
            field,
            QueryOp::Between,
            CondValue::I32(min),
            CondValue::I32(max),
        )
    }

    /// Adds an inclusive `min <= field <= max` condition over `i64`.
    pub fn where_between_i64(self, field: &str, min: i64, max: i64) -> CoreResult<Self> {
        self.push(
            field,
            QueryOp::Between,
            CondValue::I64(min),
            CondValue::I64(max),
        )
    }

    /// Adds an inclusive `min <= field <= max` condition over `f32`.
    pub fn where_between_f32(self, field: &str, min: f32, max: f32) -> CoreResult<Self> {
        self.push(
            field,
            QueryOp::Between,
            CondValue::F32(min),
            CondValue::F32(max),
        )
    }

    /// Adds an inclusive `min <= field <= max` condition over `f64`.
    pub fn where_between_f64(self, field: &str, min: f64, max: f64) -> CoreResult<Self> {
        self.push(
            field,
            QueryOp::Between,
            CondValue::F64(min),
            CondValue::F64(max),
        )
    }

    /// Adds an `IS NULL` / `NOT NULL` condition (zero / empty is null).
    pub fn where_null(self, field: &str, is_null: bool) -> CoreResult<Self> {
        let op = if is_null {
            QueryOp::IsNull
        } else {
            QueryOp::NotNull
        };
        self.push(field, op, CondValue::None, CondValue::None)
    }

    /// Caps the number of results (0 = unlimited).
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Skips the first `offset` matching records.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    fn matches(&self, record: &T) -> bool {
        self.conditions
            .iter()
            .all(|cond| eval_condition::<T>(cond, record))
    }

    /// Runs the query, visiting each match; `false` from the callback stops
    /// the scan.
    pub fn exec(&self, mut visit: impl FnMut(&T) -> bool) -> CoreResult<()> {
        let mut skipped = 0usize;
        let mut matched = 0usize;
        self.db.for_each::<T, _>(|record| {
            if !self.matches(record) {
                return true;
            }
            if skipped < self.offset {
                skipped += 1;
                return true;
            }
            if self.limit > 0 && matched >= self.limit {
                return false;
            }
            matched += 1;
            visit(record)
        })
    }

    /// Counts all matches, ignoring limit and offset.
    pub fn count(&self) -> CoreResult<usize> {
        let mut count = 0usize;
        self.db.for_each::<T, _>(|record| {
            if self.matches(record) {
                count += 1;
            }
            true
        })?;
        Ok(count)
    }
}

impl Database {
    /// Starts a query over a queryable record type.
    pub fn query<T: Queryable>(&self) -> Query<'_, T> {
        Query::new(self)
    }
}

fn eval_condition<T: Queryable>(cond: &Condition, record: &T) -> bool {
    let value = (T::fields()[cond.field].get)(record);

    match cond.op {
        QueryOp::IsNull => return value.is_empty(),
        QueryOp::NotNull => return !value.is_empty(),
        _ => {}
    }

    if let Some(field_str) = value.as_str() {
        let CondValue::Str(expected) = &cond.value else {
            return false;
        };
        if cond.op == QueryOp::Like {
            return like_match(expected, field_str);
        }
        return match cond.op {
            QueryOp::Eq => field_str == expected,
            QueryOp::Ne => field_str != expected,
            QueryOp::Lt => field_str < expected.as_str(),
            QueryOp::Le => field_str <= expected.as_str(),
            QueryOp::Gt => field_str > expected.as_str(),
            QueryOp::Ge => field_str >= expected.as_str(),
            _ => false,
        };
    }

    // Either side floating promotes the comparison to f64.
    if value.is_float() || cond.value.is_float() {
        let (Some(field_val), Some(cmp)) = (value.as_f64(), cond.value.as_f64())
        else {
            return false;
        };
        return match cond.op {
            QueryOp::Eq => (field_val - cmp).abs() < FLOAT_EQ_EPSILON,
            QueryOp::Ne => (field_val - cmp).abs() >= FLOAT_EQ_EPSILON,
            QueryOp::Lt => field_val < cmp,
            QueryOp::Le => field_val <= cmp,
            QueryOp::Gt => field_val > cmp,
            QueryOp::Ge => field_val >= cmp,
            QueryOp::Between => match cond.upper.as_f64() {
                Some(upper) => field_val >= cmp && field_val <= upper,
                None => false,
            },
            _ => false,
        };
    }

    if matches!(value, FieldValue::Bool(_)) || matches!(cond.value, CondValue::Bool(_))
    {
        let Some(field_val) = value.as_bool() else {
            return false;
        };
        let CondValue::Bool(cmp) = cond.value else {
            return false;
        };
        return match cond.op {
            QueryOp::Eq => field_val == cmp,
            QueryOp::Ne => field_val != cmp,
            _ => false,
        };
    }

    let (Some(field_val), Some(cmp)) = (value.as_i64(), cond.value.as_i64()) else {
        return false;
    };
    match cond.op {
        QueryOp::Eq => field_val == cmp,
        QueryOp::Ne => field_val != cmp,
        QueryOp::Lt => field_val < cmp,
        QueryOp::Le => field_val <= cmp,
        QueryOp::Gt => field_val > cmp,
        QueryOp::Ge => field_val >= cmp,
        QueryOp::Between => match cond.upper.as_i64() {
            Some(upper) => field_val >= cmp && field_val <= upper,
            None => false,
        },
        _ => false,
    }
}
