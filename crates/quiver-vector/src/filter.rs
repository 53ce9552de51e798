//! Portable metadata filters.
//!
//! A [`VectorSearchFilter`] maps field names to either a literal scalar
//! (implicit equality) or a [`FilterOperator`] object. All fields, and all
//! operators within one object, are ANDed; there is no OR/NOT combinator.
//!
//! Two evaluation strategies share one set of semantics:
//!
//! - [`compile_filter`] renders a parameterized SQL predicate for stores that
//!   evaluate filters inside the nearest-neighbour query (SQLite JSON columns,
//!   Postgres JSONB columns);
//! - [`matches_filter`] evaluates the filter against a metadata map for stores
//!   that can only filter after retrieval.
//!
//! # Semantics
//!
//! | Operator | Meaning |
//! |----------|---------|
//! | `$eq` / literal | strict equality; numbers compare numerically, strings and booleans only match their own type |
//! | `$ne` | negated `$eq`; a missing field matches |
//! | `$gt` `$gte` `$lt` `$lte` | numeric only; non-numbers never match |
//! | `$in` | `$eq` against any member; an empty list matches nothing |
//! | `$prefix` | case-sensitive string starts-with |
//! | `$exists` | key presence (`true`) or absence (`false`) |
//!
//! SQL comparisons are wrapped in `CASE WHEN <json type test> THEN … ELSE
//! FALSE END` so that the database's loose typing cannot change the result.

use quiver_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::types::{Metadata, MetadataValue};

/// A metadata filter: field name → condition.
pub type VectorSearchFilter = BTreeMap<String, FilterCondition>;

// ============================================================================
// Filter types
// ============================================================================

/// A scalar operand in a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterScalar {
    /// Boolean operand.
    Bool(bool),
    /// Integer operand.
    Integer(i64),
    /// Floating point operand.
    Float(f64),
    /// String operand.
    String(String),
}

impl From<&str> for FilterScalar {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FilterScalar {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for FilterScalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FilterScalar {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FilterScalar {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for FilterScalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Operator object for one field. Every operator that is set must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterOperator {
    /// Strict equality.
    #[serde(rename = "$eq", skip_serializing_if = "Option::is_none")]
    pub eq: Option<FilterScalar>,

    /// Strict inequality.
    #[serde(rename = "$ne", skip_serializing_if = "Option::is_none")]
    pub ne: Option<FilterScalar>,

    /// Numeric greater-than.
    #[serde(rename = "$gt", skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,

    /// Numeric greater-or-equal.
    #[serde(rename = "$gte", skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,

    /// Numeric less-than.
    #[serde(rename = "$lt", skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,

    /// Numeric less-or-equal.
    #[serde(rename = "$lte", skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,

    /// Membership in a literal list.
    #[serde(rename = "$in", skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<FilterScalar>>,

    /// String starts-with.
    #[serde(rename = "$prefix", skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Key presence.
    #[serde(rename = "$exists", skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
}

impl FilterOperator {
    /// `$eq` operator.
    pub fn eq(value: impl Into<FilterScalar>) -> Self {
        Self {
            eq: Some(value.into()),
            ..Default::default()
        }
    }

    /// `$ne` operator.
    pub fn ne(value: impl Into<FilterScalar>) -> Self {
        Self {
            ne: Some(value.into()),
            ..Default::default()
        }
    }

    /// `$gt` operator.
    pub fn gt(value: f64) -> Self {
        Self {
            gt: Some(value),
            ..Default::default()
        }
    }

    /// `$gte` operator.
    pub fn gte(value: f64) -> Self {
        Self {
            gte: Some(value),
            ..Default::default()
        }
    }

    /// `$lt` operator.
    pub fn lt(value: f64) -> Self {
        Self {
            lt: Some(value),
            ..Default::default()
        }
    }

    /// `$lte` operator.
    pub fn lte(value: f64) -> Self {
        Self {
            lte: Some(value),
            ..Default::default()
        }
    }

    /// `$in` operator.
    pub fn any_of<T: Into<FilterScalar>>(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            any_of: Some(values.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// `$prefix` operator.
    pub fn prefix(value: impl Into<String>) -> Self {
        Self {
            prefix: Some(value.into()),
            ..Default::default()
        }
    }

    /// `$exists` operator.
    pub fn exists(value: bool) -> Self {
        Self {
            exists: Some(value),
            ..Default::default()
        }
    }
}

/// Condition on a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterCondition {
    /// Operator object such as `{"$gt": 3}`.
    Operator(FilterOperator),
    /// Literal value, meaning `$eq`.
    Value(FilterScalar),
}

impl From<FilterOperator> for FilterCondition {
    fn from(value: FilterOperator) -> Self {
        Self::Operator(value)
    }
}

macro_rules! literal_condition {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FilterCondition {
                fn from(value: $ty) -> Self {
                    Self::Value(value.into())
                }
            }
        )*
    };
}

literal_condition!(FilterScalar, &str, String, bool, i64, i32, f64);

// ============================================================================
// In-memory evaluation
// ============================================================================

/// Whether `metadata` satisfies every condition of `filter`.
///
/// An empty filter matches everything.
pub fn matches_filter(filter: &VectorSearchFilter, metadata: &Metadata) -> bool {
    filter
        .iter()
        .all(|(field, condition)| matches_condition(condition, metadata.get(field)))
}

fn matches_condition(condition: &FilterCondition, actual: Option<&MetadataValue>) -> bool {
    match condition {
        FilterCondition::Value(expected) => scalar_eq(actual, expected),
        FilterCondition::Operator(op) => matches_operator(op, actual),
    }
}

fn matches_operator(op: &FilterOperator, actual: Option<&MetadataValue>) -> bool {
    let number = actual.and_then(Number::of_metadata);
    let numeric = |bound: Option<f64>, accept: fn(Ordering) -> bool| match bound {
        Some(b) => number
            .and_then(|n| n.compare(Number::Real(b)))
            .is_some_and(accept),
        None => true,
    };

    op.eq.as_ref().is_none_or(|v| scalar_eq(actual, v))
        && op.ne.as_ref().is_none_or(|v| !scalar_eq(actual, v))
        && numeric(op.gt, Ordering::is_gt)
        && numeric(op.gte, Ordering::is_ge)
        && numeric(op.lt, Ordering::is_lt)
        && numeric(op.lte, Ordering::is_le)
        && op
            .any_of
            .as_ref()
            .is_none_or(|vs| vs.iter().any(|v| scalar_eq(actual, v)))
        && op.prefix.as_ref().is_none_or(|p| {
            actual
                .and_then(MetadataValue::as_str)
                .is_some_and(|s| s.starts_with(p.as_str()))
        })
        && op.exists.is_none_or(|want| actual.is_some() == want)
}

fn scalar_eq(actual: Option<&MetadataValue>, expected: &FilterScalar) -> bool {
    match (actual, expected) {
        (None, _) => false,
        (Some(MetadataValue::Bool(a)), FilterScalar::Bool(b)) => a == b,
        (Some(MetadataValue::String(a)), FilterScalar::String(b)) => a == b,
        (Some(a), b) => match (Number::of_metadata(a), Number::of_scalar(b)) {
            (Some(x), Some(y)) => x.compare(y).is_some_and(Ordering::is_eq),
            _ => false,
        },
    }
}

/// A JSON number as SQLite stores it: integers stay integers.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Real(f64),
}

impl Number {
    fn of_metadata(value: &MetadataValue) -> Option<Self> {
        match value {
            MetadataValue::Integer(i) => Some(Self::Int(*i)),
            MetadataValue::Float(f) => Some(Self::Real(*f)),
            _ => None,
        }
    }

    fn of_scalar(value: &FilterScalar) -> Option<Self> {
        match value {
            FilterScalar::Integer(i) => Some(Self::Int(*i)),
            FilterScalar::Float(f) => Some(Self::Real(*f)),
            _ => None,
        }
    }

    /// Exact ordering; an integer is never rounded through `f64`.
    fn compare(self, other: Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(&b)),
            (Self::Real(a), Self::Real(b)) => a.partial_cmp(&b),
            (Self::Int(a), Self::Real(b)) => compare_int_real(a, b),
            (Self::Real(a), Self::Int(b)) => compare_int_real(b, a).map(Ordering::reverse),
        }
    }
}

/// 2^63, the first float above `i64::MAX`.
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

fn compare_int_real(int: i64, real: f64) -> Option<Ordering> {
    if real.is_nan() {
        return None;
    }
    if real >= I64_LIMIT {
        return Some(Ordering::Less);
    }
    if real < -I64_LIMIT {
        return Some(Ordering::Greater);
    }
    // `real` is in range, so truncation is exact
    match int.cmp(&(real.trunc() as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&real.fract()),
        other => Some(other),
    }
}

// ============================================================================
// SQL compilation
// ============================================================================

/// How the metadata column is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlMode {
    /// JSON text column read with `json_extract` (SQLite, libSQL).
    Json,
    /// JSONB column read with `->>` (Postgres).
    Jsonb,
}

/// A positional parameter bound to a compiled predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// Text parameter.
    Text(String),
    /// Integer parameter (booleans bind as `0`/`1`).
    Integer(i64),
    /// Floating point parameter.
    Float(f64),
}

/// A compiled predicate with `?` placeholders and their values, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilter {
    /// Predicate fragment; empty when the filter is empty.
    pub sql: String,
    /// Values for the `?` placeholders, in order of appearance.
    pub params: Vec<SqlParam>,
}

impl CompiledFilter {
    /// Whether the filter had no conditions.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// The predicate, or `TRUE` for an empty filter.
    pub fn predicate(&self) -> &str {
        if self.sql.is_empty() { "TRUE" } else { &self.sql }
    }
}

/// Compile `filter` into a parameterized SQL predicate.
///
/// Values are always bound through `?` placeholders. Field names are the
/// only identifiers rendered into the SQL text and must consist of ASCII
/// letters, digits, `_`, `-` or `.`.
///
/// # Arguments
///
/// * `filter` - The portable filter
/// * `mode` - How the metadata column is encoded
/// * `table_alias` - Optional alias qualifying the `metadata` column
pub fn compile_filter(
    filter: &VectorSearchFilter,
    mode: SqlMode,
    table_alias: Option<&str>,
) -> Result<CompiledFilter> {
    let column = match table_alias {
        Some(alias) => {
            validate_identifier(alias)?;
            format!("{alias}.metadata")
        }
        None => "metadata".to_string(),
    };

    let mut clauses = Vec::new();
    let mut params = Vec::new();

    for (field, condition) in filter {
        validate_field(field)?;
        let access = FieldAccess {
            mode,
            column: &column,
            field,
        };
        match condition {
            FilterCondition::Value(value) => {
                clauses.push(access.eq(value, &mut params));
            }
            FilterCondition::Operator(op) => {
                compile_operator(&access, op, &mut clauses, &mut params);
            }
        }
    }

    Ok(CompiledFilter {
        sql: clauses.join(" AND "),
        params,
    })
}

fn compile_operator(
    access: &FieldAccess<'_>,
    op: &FilterOperator,
    clauses: &mut Vec<String>,
    params: &mut Vec<SqlParam>,
) {
    if let Some(value) = &op.eq {
        clauses.push(access.eq(value, params));
    }
    if let Some(value) = &op.ne {
        clauses.push(format!("(NOT {})", access.eq(value, params)));
    }
    for (bound, symbol) in [(op.gt, ">"), (op.gte, ">="), (op.lt, "<"), (op.lte, "<=")] {
        if let Some(bound) = bound {
            params.push(SqlParam::Float(bound));
            clauses.push(guarded(
                &access.is_number(),
                &format!("{} {symbol} ?", access.number()),
            ));
        }
    }
    if let Some(values) = &op.any_of {
        if values.is_empty() {
            clauses.push("FALSE".to_string());
        } else {
            let members: Vec<String> = values.iter().map(|v| access.eq(v, params)).collect();
            clauses.push(format!("({})", members.join(" OR ")));
        }
    }
    if let Some(prefix) = &op.prefix {
        clauses.push(access.prefix(prefix, params));
    }
    if let Some(want) = op.exists {
        let present = access.exists();
        clauses.push(if want { present } else { format!("(NOT ({present}))") });
    }
}

fn guarded(guard: &str, expr: &str) -> String {
    format!("(CASE WHEN {guard} THEN {expr} ELSE FALSE END)")
}

/// SQL expressions for one metadata field.
struct FieldAccess<'a> {
    mode: SqlMode,
    column: &'a str,
    field: &'a str,
}

impl FieldAccess<'_> {
    fn text(&self) -> String {
        match self.mode {
            SqlMode::Json => format!("json_extract({}, '$.\"{}\"')", self.column, self.field),
            SqlMode::Jsonb => format!("{}->>'{}'", self.column, self.field),
        }
    }

    fn json_type(&self) -> String {
        match self.mode {
            SqlMode::Json => format!("json_type({}, '$.\"{}\"')", self.column, self.field),
            SqlMode::Jsonb => format!("jsonb_typeof({}->'{}')", self.column, self.field),
        }
    }

    fn is_number(&self) -> String {
        match self.mode {
            SqlMode::Json => format!("{} IN ('integer', 'real')", self.json_type()),
            SqlMode::Jsonb => format!("{} = 'number'", self.json_type()),
        }
    }

    fn is_string(&self) -> String {
        match self.mode {
            SqlMode::Json => format!("{} = 'text'", self.json_type()),
            SqlMode::Jsonb => format!("{} = 'string'", self.json_type()),
        }
    }

    fn is_bool(&self) -> String {
        match self.mode {
            SqlMode::Json => format!("{} IN ('true', 'false')", self.json_type()),
            SqlMode::Jsonb => format!("{} = 'boolean'", self.json_type()),
        }
    }

    fn number(&self) -> String {
        match self.mode {
            SqlMode::Json => self.text(),
            SqlMode::Jsonb => format!("({})::float8", self.text()),
        }
    }

    fn bool_int(&self) -> String {
        match self.mode {
            // json_extract already yields 1/0 for JSON booleans
            SqlMode::Json => self.text(),
            SqlMode::Jsonb => format!("({})::boolean::int", self.text()),
        }
    }

    fn exists(&self) -> String {
        match self.mode {
            SqlMode::Json => format!("{} IS NOT NULL", self.json_type()),
            SqlMode::Jsonb => format!("{}->'{}' IS NOT NULL", self.column, self.field),
        }
    }

    fn eq(&self, value: &FilterScalar, params: &mut Vec<SqlParam>) -> String {
        match value {
            FilterScalar::Bool(b) => {
                params.push(SqlParam::Integer(i64::from(*b)));
                guarded(&self.is_bool(), &format!("{} = ?", self.bool_int()))
            }
            FilterScalar::Integer(i) => {
                params.push(SqlParam::Integer(*i));
                guarded(&self.is_number(), &format!("{} = ?", self.number()))
            }
            FilterScalar::Float(f) => {
                params.push(SqlParam::Float(*f));
                guarded(&self.is_number(), &format!("{} = ?", self.number()))
            }
            FilterScalar::String(s) => {
                params.push(SqlParam::Text(s.clone()));
                guarded(&self.is_string(), &format!("{} = ?", self.text()))
            }
        }
    }

    fn prefix(&self, prefix: &str, params: &mut Vec<SqlParam>) -> String {
        match self.mode {
            // SQLite's LIKE ignores ASCII case, so compare the leading substring
            SqlMode::Json => {
                params.push(SqlParam::Text(prefix.to_string()));
                params.push(SqlParam::Text(prefix.to_string()));
                guarded(
                    &self.is_string(),
                    &format!("substr({}, 1, length(?)) = ?", self.text()),
                )
            }
            SqlMode::Jsonb => {
                params.push(SqlParam::Text(format!("{}%", escape_like(prefix))));
                guarded(
                    &self.is_string(),
                    &format!("{} LIKE ? ESCAPE '\\'", self.text()),
                )
            }
        }
    }
}

fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn validate_field(field: &str) -> Result<()> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_filter(format!(
            "field name '{field}' may only contain ASCII letters, digits, '_', '-' and '.'"
        )))
    }
}

/// Check that `name` is a plain SQL identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn validate_identifier(name: &str) -> Result<()> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(Error::config(format!("'{name}' is not a valid SQL identifier")))
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Renumber `?` placeholders to `$N` for drivers that need numbered
/// parameters.
///
/// Numbering starts at `offset + 1`, so parameters already bound ahead of
/// the predicate (such as the query vector) keep their positions.
/// Placeholders inside quoted literals are left alone.
pub fn pg_params(sql: &str, offset: usize) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut next = offset;
    let mut quote: Option<char> = None;

    for c in sql.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                out.push(c);
            }
            (Some(_), c) => out.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                out.push(c);
            }
            (None, '?') => {
                next += 1;
                out.push('$');
                out.push_str(&next.to_string());
            }
            (None, c) => out.push(c),
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::bind_params;
    use proptest::prelude::*;
    use sqlx::Row;
    use sqlx::sqlite::SqlitePoolOptions;

    fn meta(pairs: &[(&str, MetadataValue)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn filter(pairs: Vec<(&str, FilterCondition)>) -> VectorSearchFilter {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    // ------------------------------------------------------------------------
    // Deserialization
    // ------------------------------------------------------------------------

    #[test]
    fn test_filter_deserialize_literal_and_operator() {
        let f: VectorSearchFilter = serde_json::from_str(
            r#"{"tag": "x", "n": {"$gte": 2, "$lt": 5}, "tags": {"$in": ["a", 1, true]}}"#,
        )
        .unwrap();

        assert_eq!(f["tag"], FilterCondition::Value(FilterScalar::String("x".into())));
        match &f["n"] {
            FilterCondition::Operator(op) => {
                assert_eq!(op.gte, Some(2.0));
                assert_eq!(op.lt, Some(5.0));
                assert!(op.eq.is_none());
            }
            other => panic!("expected operator, got {other:?}"),
        }
        match &f["tags"] {
            FilterCondition::Operator(op) => assert_eq!(op.any_of.as_ref().unwrap().len(), 3),
            other => panic!("expected operator, got {other:?}"),
        }
    }

    #[test]
    fn test_filter_deserialize_rejects_unknown_operator() {
        let parsed: std::result::Result<VectorSearchFilter, _> =
            serde_json::from_str(r#"{"n": {"$regex": "a.*"}}"#);
        assert!(parsed.is_err());
    }

    // ------------------------------------------------------------------------
    // matches_filter
    // ------------------------------------------------------------------------

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(matches_filter(&VectorSearchFilter::new(), &Metadata::new()));
        assert!(matches_filter(
            &VectorSearchFilter::new(),
            &meta(&[("a", 1.into())])
        ));
    }

    #[test]
    fn test_literal_equality_is_strict() {
        let m = meta(&[("n", 3.into()), ("s", "3".into()), ("b", true.into())]);

        assert!(matches_filter(&filter(vec![("n", 3.into())]), &m));
        assert!(matches_filter(&filter(vec![("n", 3.0.into())]), &m));
        assert!(!matches_filter(&filter(vec![("n", "3".into())]), &m));
        assert!(!matches_filter(&filter(vec![("s", 3.into())]), &m));
        assert!(matches_filter(&filter(vec![("b", true.into())]), &m));
        assert!(!matches_filter(&filter(vec![("b", 1.into())]), &m));
        assert!(!matches_filter(&filter(vec![("missing", 1.into())]), &m));
    }

    #[test]
    fn test_ne_matches_missing_field() {
        let m = meta(&[("tag", "x".into())]);
        assert!(!matches_filter(&filter(vec![("tag", FilterOperator::ne("x").into())]), &m));
        assert!(matches_filter(&filter(vec![("tag", FilterOperator::ne("y").into())]), &m));
        assert!(matches_filter(&filter(vec![("other", FilterOperator::ne("x").into())]), &m));
    }

    #[test]
    fn test_range_operators_are_numeric_only() {
        let m = meta(&[("n", 5.into()), ("s", "10".into())]);

        assert!(matches_filter(&filter(vec![("n", FilterOperator::gt(4.0).into())]), &m));
        assert!(!matches_filter(&filter(vec![("n", FilterOperator::gt(5.0).into())]), &m));
        assert!(matches_filter(&filter(vec![("n", FilterOperator::gte(5.0).into())]), &m));
        assert!(matches_filter(&filter(vec![("n", FilterOperator::lt(5.5).into())]), &m));
        assert!(matches_filter(&filter(vec![("n", FilterOperator::lte(5.0).into())]), &m));
        assert!(!matches_filter(&filter(vec![("s", FilterOperator::gt(1.0).into())]), &m));
        assert!(!matches_filter(&filter(vec![("missing", FilterOperator::lt(1.0).into())]), &m));
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        let above = 9_007_199_254_740_993_i64;
        let m = meta(&[("n", above.into())]);
        let limit = 9_007_199_254_740_992.0;

        assert!(!matches_filter(&filter(vec![("n", limit.into())]), &m));
        assert!(!matches_filter(&filter(vec![("n", (above - 1).into())]), &m));
        assert!(matches_filter(&filter(vec![("n", above.into())]), &m));
        assert!(matches_filter(&filter(vec![("n", FilterOperator::gt(limit).into())]), &m));
        assert!(!matches_filter(&filter(vec![("n", FilterOperator::lte(limit).into())]), &m));
        assert!(matches_filter(
            &filter(vec![("n", FilterOperator::lt(9_223_372_036_854_775_808.0).into())]),
            &meta(&[("n", i64::MAX.into())])
        ));
    }

    #[test]
    fn test_int_real_ordering() {
        assert_eq!(compare_int_real(3, 3.0), Some(Ordering::Equal));
        assert_eq!(compare_int_real(3, 3.5), Some(Ordering::Less));
        assert_eq!(compare_int_real(-3, -3.5), Some(Ordering::Greater));
        assert_eq!(compare_int_real(i64::MIN, -9_223_372_036_854_775_808.0), Some(Ordering::Equal));
        assert_eq!(compare_int_real(0, f64::NAN), None);
        assert_eq!(
            Number::Real(2.5).compare(Number::Int(2)),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn test_combined_operators_are_anded() {
        let op = FilterOperator {
            gte: Some(2.0),
            lt: Some(5.0),
            ..Default::default()
        };
        let f = filter(vec![("n", op.into())]);
        assert!(matches_filter(&f, &meta(&[("n", 2.into())])));
        assert!(matches_filter(&f, &meta(&[("n", 4.5.into())])));
        assert!(!matches_filter(&f, &meta(&[("n", 5.into())])));
    }

    #[test]
    fn test_in_operator() {
        let m = meta(&[("lang", "rust".into())]);
        assert!(matches_filter(
            &filter(vec![("lang", FilterOperator::any_of(["go", "rust"]).into())]),
            &m
        ));
        assert!(!matches_filter(
            &filter(vec![("lang", FilterOperator::any_of(["go"]).into())]),
            &m
        ));
        assert!(!matches_filter(
            &filter(vec![("lang", FilterOperator::any_of(Vec::<&str>::new()).into())]),
            &m
        ));
    }

    #[test]
    fn test_prefix_and_exists() {
        let m = meta(&[
            ("path", "src/lib.rs".into()),
            ("tags", vec!["a".to_string()].into()),
        ]);
        assert!(matches_filter(&filter(vec![("path", FilterOperator::prefix("src/").into())]), &m));
        assert!(!matches_filter(&filter(vec![("path", FilterOperator::prefix("SRC/").into())]), &m));
        assert!(!matches_filter(&filter(vec![("tags", FilterOperator::prefix("a").into())]), &m));
        assert!(matches_filter(&filter(vec![("tags", FilterOperator::exists(true).into())]), &m));
        assert!(matches_filter(&filter(vec![("nope", FilterOperator::exists(false).into())]), &m));
        assert!(!matches_filter(&filter(vec![("path", FilterOperator::exists(false).into())]), &m));
    }

    // ------------------------------------------------------------------------
    // compile_filter
    // ------------------------------------------------------------------------

    #[test]
    fn test_compile_empty_filter() {
        let compiled = compile_filter(&VectorSearchFilter::new(), SqlMode::Json, None).unwrap();
        assert!(compiled.is_empty());
        assert_eq!(compiled.predicate(), "TRUE");
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn test_compile_json_equality() {
        let compiled =
            compile_filter(&filter(vec![("tag", "x".into())]), SqlMode::Json, None).unwrap();
        assert_eq!(
            compiled.sql,
            "(CASE WHEN json_type(metadata, '$.\"tag\"') = 'text' \
             THEN json_extract(metadata, '$.\"tag\"') = ? ELSE FALSE END)"
        );
        assert_eq!(compiled.params, vec![SqlParam::Text("x".into())]);
    }

    #[test]
    fn test_compile_jsonb_with_alias() {
        let compiled = compile_filter(
            &filter(vec![("n", FilterOperator::gt(3.0).into())]),
            SqlMode::Jsonb,
            Some("d"),
        )
        .unwrap();
        assert_eq!(
            compiled.sql,
            "(CASE WHEN jsonb_typeof(d.metadata->'n') = 'number' \
             THEN (d.metadata->>'n')::float8 > ? ELSE FALSE END)"
        );
        assert_eq!(compiled.params, vec![SqlParam::Float(3.0)]);
    }

    #[test]
    fn test_compile_booleans_bind_as_integers() {
        let compiled =
            compile_filter(&filter(vec![("ok", true.into())]), SqlMode::Json, None).unwrap();
        assert_eq!(compiled.params, vec![SqlParam::Integer(1)]);

        let compiled =
            compile_filter(&filter(vec![("ok", false.into())]), SqlMode::Jsonb, None).unwrap();
        assert_eq!(compiled.params, vec![SqlParam::Integer(0)]);
        assert!(compiled.sql.contains("::boolean::int = ?"));
    }

    #[test]
    fn test_compile_never_interpolates_values() {
        let hostile = "x'; DROP TABLE documents; --";
        let compiled = compile_filter(
            &filter(vec![
                ("a", hostile.into()),
                ("b", FilterOperator::prefix(hostile).into()),
            ]),
            SqlMode::Jsonb,
            None,
        )
        .unwrap();
        assert!(!compiled.sql.contains("DROP"));
        assert_eq!(compiled.params.len(), 2);
    }

    #[test]
    fn test_compile_rejects_bad_field_names() {
        let err = compile_filter(&filter(vec![("a'b", 1.into())]), SqlMode::Json, None);
        assert!(matches!(err, Err(Error::InvalidFilter(_))));

        let err = compile_filter(&filter(vec![("", 1.into())]), SqlMode::Json, None);
        assert!(err.is_err());

        let err = compile_filter(&filter(vec![("a", 1.into())]), SqlMode::Json, Some("t;"));
        assert!(err.is_err());
    }

    #[test]
    fn test_compile_in_and_exists() {
        let compiled = compile_filter(
            &filter(vec![
                ("a", FilterOperator::any_of([1, 2]).into()),
                ("b", FilterOperator::any_of(Vec::<i64>::new()).into()),
                ("c", FilterOperator::exists(false).into()),
            ]),
            SqlMode::Json,
            None,
        )
        .unwrap();
        assert!(compiled.sql.contains(" OR "));
        assert!(compiled.sql.ends_with("FALSE AND (NOT (json_type(metadata, '$.\"c\"') IS NOT NULL))"));
        assert_eq!(compiled.params, vec![SqlParam::Integer(1), SqlParam::Integer(2)]);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_a\\b"), "50\\%\\_a\\\\b");
    }

    // ------------------------------------------------------------------------
    // pg_params
    // ------------------------------------------------------------------------

    #[test]
    fn test_pg_params_renumbers() {
        assert_eq!(pg_params("a = ? AND b = ?", 0), "a = $1 AND b = $2");
        assert_eq!(pg_params("a = ? AND b = ?", 1), "a = $2 AND b = $3");
    }

    #[test]
    fn test_pg_params_skips_literals() {
        assert_eq!(
            pg_params("x LIKE ? ESCAPE '\\' AND y = '?' AND z = ?", 2),
            "x LIKE $3 ESCAPE '\\' AND y = '?' AND z = $4"
        );
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_identifier("documents"));
        assert!(is_identifier("_v2"));
        assert!(!is_identifier("2docs"));
        assert!(!is_identifier("docs-x"));
        assert!(!is_identifier(""));
    }

    // ------------------------------------------------------------------------
    // Equivalence: SQLite execution agrees with matches_filter
    // ------------------------------------------------------------------------

    /// Integers around 2^53, where `f64` stops being exact, and at the `i64` edges.
    const BIG_INTS: &[i64] = &[
        9_007_199_254_740_992,
        9_007_199_254_740_993,
        -9_007_199_254_740_993,
        i64::MAX,
    ];

    const BIG_FLOATS: &[f64] = &[
        9_007_199_254_740_992.0,
        9_007_199_254_740_994.0,
        -9_007_199_254_740_992.0,
        9_223_372_036_854_775_808.0,
    ];

    fn arb_value() -> impl Strategy<Value = MetadataValue> {
        prop_oneof![
            any::<bool>().prop_map(MetadataValue::Bool),
            (-3i64..=3).prop_map(MetadataValue::Integer),
            prop::sample::select(BIG_INTS.to_vec()).prop_map(MetadataValue::Integer),
            (-6i32..=6).prop_map(|h| MetadataValue::Float(f64::from(h) / 2.0)),
            prop::sample::select(BIG_FLOATS.to_vec()).prop_map(MetadataValue::Float),
            prop::sample::select(vec!["", "a", "ab", "abc", "b", "A"])
                .prop_map(|s| MetadataValue::String(s.to_string())),
            prop::collection::vec(prop::sample::select(vec!["a", "b"]), 0..3)
                .prop_map(|v| MetadataValue::List(v.into_iter().map(String::from).collect())),
        ]
    }

    fn arb_scalar() -> impl Strategy<Value = FilterScalar> {
        prop_oneof![
            any::<bool>().prop_map(FilterScalar::Bool),
            (-3i64..=3).prop_map(FilterScalar::Integer),
            prop::sample::select(BIG_INTS.to_vec()).prop_map(FilterScalar::Integer),
            (-6i32..=6).prop_map(|h| FilterScalar::Float(f64::from(h) / 2.0)),
            prop::sample::select(BIG_FLOATS.to_vec()).prop_map(FilterScalar::Float),
            prop::sample::select(vec!["", "a", "ab", "b", "A", "1"])
                .prop_map(|s| FilterScalar::String(s.to_string())),
        ]
    }

    fn arb_bound() -> impl Strategy<Value = Option<f64>> {
        prop::option::weighted(
            0.3,
            prop_oneof![
                (-6i32..=6).prop_map(|h| f64::from(h) / 2.0),
                prop::sample::select(BIG_FLOATS.to_vec()),
            ],
        )
    }

    fn arb_operator() -> impl Strategy<Value = FilterOperator> {
        (
            prop::option::weighted(0.3, arb_scalar()),
            prop::option::weighted(0.3, arb_scalar()),
            (arb_bound(), arb_bound(), arb_bound(), arb_bound()),
            prop::option::weighted(0.3, prop::collection::vec(arb_scalar(), 0..3)),
            prop::option::weighted(
                0.3,
                prop::sample::select(vec!["", "a", "ab", "A"]).prop_map(String::from),
            ),
            prop::option::weighted(0.3, any::<bool>()),
        )
            .prop_map(|(eq, ne, (gt, gte, lt, lte), any_of, prefix, exists)| FilterOperator {
                eq,
                ne,
                gt,
                gte,
                lt,
                lte,
                any_of,
                prefix,
                exists,
            })
    }

    fn arb_condition() -> impl Strategy<Value = FilterCondition> {
        prop_oneof![
            arb_scalar().prop_map(FilterCondition::Value),
            arb_operator().prop_map(FilterCondition::Operator),
        ]
    }

    fn arb_case() -> impl Strategy<Value = (VectorSearchFilter, Metadata)> {
        let keys = || prop::sample::select(vec!["a", "b", "c.d", "missing"]).prop_map(String::from);
        (
            prop::collection::btree_map(keys(), arb_condition(), 0..3),
            prop::collection::btree_map(keys(), arb_value(), 0..4),
        )
    }

    #[test]
    fn test_sql_and_memory_agree() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let pool = rt.block_on(async {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await
                .unwrap();
            sqlx::query("CREATE TABLE docs (metadata TEXT NOT NULL)")
                .execute(&pool)
                .await
                .unwrap();
            pool
        });

        let mut runner = proptest::test_runner::TestRunner::new(ProptestConfig::with_cases(256));
        runner
            .run(&arb_case(), |(filter, metadata)| {
                let expected = matches_filter(&filter, &metadata);
                let compiled = compile_filter(&filter, SqlMode::Json, Some("t")).unwrap();

                let actual = rt.block_on(async {
                    sqlx::query("DELETE FROM docs").execute(&pool).await.unwrap();
                    sqlx::query("INSERT INTO docs (metadata) VALUES (?)")
                        .bind(serde_json::to_string(&metadata).unwrap())
                        .execute(&pool)
                        .await
                        .unwrap();
                    let sql = format!(
                        "SELECT COUNT(*) FROM docs t WHERE {}",
                        compiled.predicate()
                    );
                    let row = bind_params(sqlx::query(&sql), &compiled.params)
                        .fetch_one(&pool)
                        .await
                        .unwrap();
                    row.get::<i64, _>(0) == 1
                });

                prop_assert_eq!(
                    actual,
                    expected,
                    "filter {:?} metadata {:?} sql {}",
                    filter,
                    metadata,
                    compiled.sql
                );
                Ok(())
            })
            .unwrap();
    }
}
