//! Request/response value objects: `Point`, `WriteRequest`, `QueryRequest`,
//! `Response`. These are constructed by the external request surface (HTTP
//! decoding lives outside this crate) and are otherwise opaque to the core
//! aside from `Point::name()` and `Point::precision_string()`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single field value in line protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(f64),
    Int(i64),
    UInt(u64),
    Str(String),
    Bool(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Int(v) => write!(f, "{}i", v),
            FieldValue::UInt(v) => write!(f, "{}u", v),
            FieldValue::Str(v) => write!(f, "\"{}\"", v.replace('"', "\\\"")),
            FieldValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// A parsed line-protocol record.
///
/// Opaque to the routing core aside from `name()` (used for shard hashing) and
/// `precision_string()` (the write-path serializer).
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    /// Nanosecond timestamp, when present in the original line.
    timestamp: Option<i64>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("empty line protocol input")]
    Empty,
    #[error("missing field set in line {0:?}")]
    MissingFields(String),
    #[error("invalid timestamp in line {0:?}")]
    InvalidTimestamp(String),
    #[error("invalid field value {0:?} in line {1:?}")]
    InvalidField(String, String),
    #[error("unsupported query precision {0:?}")]
    UnsupportedPrecision(String),
    #[error("empty query")]
    EmptyQuery,
}

impl Point {
    /// Measurement name, used as the shard-hashing key.
    pub fn name(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Serialize back to line protocol, rendering the timestamp at the given
    /// precision (`ns`, `u`, `ms`, `s`, `m`, `h`, or empty for nanoseconds).
    pub fn precision_string(&self, precision: &str) -> Result<String, ParseError> {
        let mut out = escape_measurement(&self.measurement);
        for (k, v) in &self.tags {
            out.push(',');
            out.push_str(&escape_tag(k));
            out.push('=');
            out.push_str(&escape_tag(v));
        }
        out.push(' ');
        let mut first = true;
        for (k, v) in &self.fields {
            if !first {
                out.push(',');
            }
            first = false;
            out.push_str(&escape_tag(k));
            out.push('=');
            out.push_str(&v.to_string());
        }
        if let Some(ts) = self.timestamp {
            out.push(' ');
            out.push_str(&scale_timestamp(ts, precision)?.to_string());
        }
        Ok(out)
    }

    /// Parse one line-protocol record. A minimal parser sufficient for the
    /// routing core's own needs: it does not attempt the full line-protocol
    /// grammar (escaped commas inside quoted string field values with
    /// embedded spaces, for instance), see DESIGN.md.
    pub fn parse_line(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut parts = line.splitn(3, ' ');
        let measurement_and_tags = parts.next().ok_or(ParseError::Empty)?;
        let field_set = parts
            .next()
            .ok_or_else(|| ParseError::MissingFields(line.to_string()))?;
        let timestamp = parts.next();

        let mut mt = measurement_and_tags.split(',');
        let measurement = mt.next().unwrap_or_default().replace("\\,", ",");
        let mut tags = BTreeMap::new();
        for tag in mt {
            if let Some((k, v)) = tag.split_once('=') {
                tags.insert(k.to_string(), v.to_string());
            }
        }

        let mut fields = BTreeMap::new();
        for kv in field_set.split(',') {
            let (k, v) = kv
                .split_once('=')
                .ok_or_else(|| ParseError::InvalidField(kv.to_string(), line.to_string()))?;
            fields.insert(k.to_string(), parse_field_value(v, line)?);
        }

        let timestamp = match timestamp {
            Some(ts) => Some(
                ts.trim()
                    .parse::<i64>()
                    .map_err(|_| ParseError::InvalidTimestamp(line.to_string()))?,
            ),
            None => None,
        };

        Ok(Point {
            measurement,
            tags,
            fields,
            timestamp,
        })
    }
}

fn parse_field_value(raw: &str, line: &str) -> Result<FieldValue, ParseError> {
    let raw = raw.trim();
    if let Some(stripped) = raw.strip_suffix('i') {
        return stripped
            .parse::<i64>()
            .map(FieldValue::Int)
            .map_err(|_| ParseError::InvalidField(raw.to_string(), line.to_string()));
    }
    if let Some(stripped) = raw.strip_suffix('u') {
        return stripped
            .parse::<u64>()
            .map(FieldValue::UInt)
            .map_err(|_| ParseError::InvalidField(raw.to_string(), line.to_string()));
    }
    if raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("t") {
        return Ok(FieldValue::Bool(true));
    }
    if raw.eq_ignore_ascii_case("false") || raw.eq_ignore_ascii_case("f") {
        return Ok(FieldValue::Bool(false));
    }
    if raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2 {
        return Ok(FieldValue::Str(raw[1..raw.len() - 1].replace("\\\"", "\"")));
    }
    raw.parse::<f64>()
        .map(FieldValue::Float)
        .map_err(|_| ParseError::InvalidField(raw.to_string(), line.to_string()))
}

fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_tag(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

fn scale_timestamp(ns: i64, precision: &str) -> Result<i64, ParseError> {
    Ok(match precision {
        "" | "ns" => ns,
        "u" => ns / 1_000,
        "ms" => ns / 1_000_000,
        "s" => ns / 1_000_000_000,
        "m" => ns / (60 * 1_000_000_000),
        "h" => ns / (3600 * 1_000_000_000),
        other => return Err(ParseError::UnsupportedPrecision(other.to_string())),
    })
}

/// An ordered batch of points destined for one database/retention policy.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub points: Vec<Point>,
    pub database: String,
    pub retention_policy: String,
    pub precision: String,
    /// Original payload length in bytes, used for retry-buffer accounting.
    size: usize,
}

impl WriteRequest {
    pub fn new(
        points: Vec<Point>,
        database: impl Into<String>,
        retention_policy: impl Into<String>,
        precision: impl Into<String>,
        size: usize,
    ) -> Self {
        Self {
            points,
            database: database.into(),
            retention_policy: retention_policy.into(),
            precision: precision.into(),
            size,
        }
    }

    /// Parse newline-separated line protocol into a `WriteRequest`.
    pub fn parse(
        body: &str,
        database: impl Into<String>,
        retention_policy: impl Into<String>,
        precision: impl Into<String>,
    ) -> Result<Self, ParseError> {
        let mut points = Vec::new();
        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            points.push(Point::parse_line(line)?);
        }
        Ok(Self::new(
            points,
            database,
            retention_policy,
            precision,
            body.len(),
        ))
    }

    /// Original payload size in bytes (retry-buffer accounting unit).
    pub fn size(&self) -> usize {
        self.size
    }

    /// A copy of this request with `points` replaced. Used when the Engine
    /// forwards a per-shard subset to a `ShardNode`.
    pub fn with_points(&self, points: Vec<Point>) -> Self {
        Self {
            points,
            database: self.database.clone(),
            retention_policy: self.retention_policy.clone(),
            precision: self.precision.clone(),
            size: self.size,
        }
    }
}

/// Classification of an InfluxQL statement by dispatch policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// SELECT: routed by hashing the FROM clause's source string.
    Select,
    /// DDL/DML/user/retention/subscription/grant/revoke/etc: every shard, every replica.
    EachNode,
    /// Cluster-wide config reads: any one shard.
    OneNode,
    /// SHOW MEASUREMENTS: concatenate the `values` of each shard's first series.
    MergeValues,
    /// SHOW DIAGNOSTICS / TAG KEYS / TAG VALUES: concatenate each shard's series.
    MergeSeries,
}

/// One InfluxQL statement, classified and (for SELECT) carrying its source text.
///
/// This is a minimal statement splitter/classifier, not a full InfluxQL
/// parser, see DESIGN.md. It is sufficient for the routing core, which only
/// needs a statement's keyword and, for SELECT, the literal FROM-clause
/// source text to hash.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub kind: Option<StatementKind>,
    /// For `Select`, the FROM-clause source text used for shard hashing.
    pub source: Option<String>,
}

impl Statement {
    fn classify(text: &str) -> Self {
        let lower = text.to_ascii_lowercase();
        let mut words = lower.split_whitespace();
        let first = words.next().unwrap_or("");
        let second = words.next().unwrap_or("");

        let kind = match (first, second) {
            ("select", _) => Some(StatementKind::Select),
            ("show", "measurements") => Some(StatementKind::MergeValues),
            ("show", "diagnostics") | ("show", "tag") => Some(StatementKind::MergeSeries),
            // Closed set of recognized SHOW statements, matching the keywords
            // original_source/engine/query_executor.go's exhaustive switch
            // dispatches to executeStatementOneNode. An unlisted SHOW (e.g.
            // "SHOW FIELD KEYS", plain "SHOW SERIES") falls through to the
            // unrecognized-statement error, same as that switch's default arm.
            (
                "show",
                "databases" | "continuous" | "grants" | "measurement" | "series" | "shards"
                | "shard" | "stats" | "users" | "retention",
            ) => Some(StatementKind::OneNode),
            (kw, _)
                if matches!(
                    kw,
                    "create"
                        | "drop"
                        | "delete"
                        | "alter"
                        | "grant"
                        | "revoke"
                ) =>
            {
                Some(StatementKind::EachNode)
            }
            _ => None,
        };

        let source = if kind == Some(StatementKind::Select) {
            extract_from_clause(text)
        } else {
            None
        };

        Self {
            text: text.to_string(),
            kind,
            source,
        }
    }
}

/// Extract the literal text between `FROM` and the next top-level keyword
/// (`WHERE`, `GROUP`, `ORDER`, `LIMIT`, `SLIMIT`, `FILL`, `TZ`), or end of
/// statement. This is the string hashed for SELECT routing.
fn extract_from_clause(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let from_idx = lower.find(" from ")? + 6;
    let rest = &text[from_idx..];
    let rest_lower = &lower[from_idx..];
    const STOP_WORDS: &[&str] = &[
        " where ", " group ", " order ", " limit ", " slimit ", " fill ", " tz(",
    ];
    let mut end = rest.len();
    for stop in STOP_WORDS {
        if let Some(idx) = rest_lower.find(stop) {
            end = end.min(idx);
        }
    }
    Some(rest[..end].trim().to_string())
}

/// A parsed statement list, database, precision and chunked flag.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub statements: Vec<Statement>,
    pub database: String,
    pub precision: String,
    pub chunked: bool,
}

impl QueryRequest {
    /// Split `query` on top-level `;` and classify each statement.
    ///
    /// Rejects empty input up front; statement bodies themselves are not
    /// grammar-checked beyond classification (see `Statement::classify`).
    pub fn parse(
        query: &str,
        database: impl Into<String>,
        precision: impl Into<String>,
        chunked: bool,
    ) -> Result<Self, ParseError> {
        let statements: Vec<Statement> = split_statements(query)
            .into_iter()
            .map(|s| Statement::classify(s.trim()))
            .collect();

        if statements.is_empty() {
            return Err(ParseError::EmptyQuery);
        }

        Ok(Self {
            statements,
            database: database.into(),
            precision: precision.into(),
            chunked,
        })
    }

    /// A copy of this request containing only the statement at `index`,
    /// preserving `database`/`precision`/`chunked`.
    pub fn single_statement(&self, index: usize) -> Self {
        Self {
            statements: vec![self.statements[index].clone()],
            database: self.database.clone(),
            precision: self.precision.clone(),
            chunked: self.chunked,
        }
    }
}

/// Split on `;` outside single/double quotes.
fn split_statements(query: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut in_single = false;
    let mut in_double = false;
    for (i, c) in query.char_indices() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            ';' if !in_single && !in_double => {
                let stmt = query[start..i].trim();
                if !stmt.is_empty() {
                    statements.push(stmt);
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = query[start..].trim();
    if !tail.is_empty() {
        statements.push(tail);
    }
    statements
}

/// One series within a statement result: name, columns, tags and value rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

/// Result of a single statement, decoded from one replica's `/query` response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatementResult {
    #[serde(default)]
    pub statement_id: usize,
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Top-level response: per-statement results plus an optional top-level
/// error. This is also the shape a replica's `/query` JSON body decodes into.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub results: Vec<StatementResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_simple_line() {
        let p = Point::parse_line("weather,location=us-midwest temperature=82 1465839830100400200")
            .unwrap();
        assert_eq!(p.name(), "weather");
        assert_eq!(p.tags().get("location").unwrap(), "us-midwest");
        assert_eq!(p.fields().get("temperature").unwrap(), &FieldValue::Float(82.0));
    }

    #[test]
    fn precision_string_scales_timestamp() {
        let p = Point::parse_line("foo x=1i 1000000000").unwrap();
        assert_eq!(p.precision_string("s").unwrap(), "foo x=1i 1");
        assert_eq!(p.precision_string("ns").unwrap(), "foo x=1i 1000000000");
    }

    #[test]
    fn write_request_size_matches_payload_len() {
        let body = "weather,location=a t=1\nfoo,x=1 y=1\n";
        let wr = WriteRequest::parse(body, "db", "", "").unwrap();
        assert_eq!(wr.size(), body.len());
        assert_eq!(wr.points.len(), 2);
    }

    #[test]
    fn classifies_select_and_extracts_source() {
        let qr = QueryRequest::parse("SELECT * FROM bar WHERE x = 1", "db", "", false).unwrap();
        assert_eq!(qr.statements[0].kind, Some(StatementKind::Select));
        assert_eq!(qr.statements[0].source.as_deref(), Some("bar"));
    }

    #[test]
    fn classifies_show_measurements_as_merge_values() {
        let qr = QueryRequest::parse("SHOW MEASUREMENTS", "db", "", false).unwrap();
        assert_eq!(qr.statements[0].kind, Some(StatementKind::MergeValues));
    }

    #[test]
    fn classifies_create_database_as_each_node() {
        let qr = QueryRequest::parse("CREATE DATABASE foo", "db", "", false).unwrap();
        assert_eq!(qr.statements[0].kind, Some(StatementKind::EachNode));
    }

    #[test]
    fn classifies_show_retention_policies_as_one_node() {
        let qr = QueryRequest::parse("SHOW RETENTION POLICIES ON foo", "db", "", false).unwrap();
        assert_eq!(qr.statements[0].kind, Some(StatementKind::OneNode));
    }

    #[test]
    fn unlisted_show_statement_is_unclassified() {
        let qr = QueryRequest::parse("SHOW FIELD KEYS", "db", "", false).unwrap();
        assert_eq!(qr.statements[0].kind, None);
    }

    #[test]
    fn rejects_empty_query() {
        assert!(QueryRequest::parse("   ", "db", "", false).is_err());
    }

    #[test]
    fn splits_multiple_statements_in_order() {
        let qr = QueryRequest::parse("SHOW DATABASES; SELECT * FROM bar", "db", "", false).unwrap();
        assert_eq!(qr.statements.len(), 2);
        assert_eq!(qr.statements[0].kind, Some(StatementKind::OneNode));
        assert_eq!(qr.statements[1].kind, Some(StatementKind::Select));
    }
}
