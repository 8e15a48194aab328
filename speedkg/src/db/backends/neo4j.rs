use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use neo4rs::{
    query, BoltMap, BoltType, Graph, Neo4jClientErrorKind, Neo4jErrorKind,
    Neo4jSecurityErrorKind, Query, Row,
};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Number, Value};

use crate::config::GraphConfig;
use crate::db::connection;
use crate::db::traits::GraphStore;
use crate::error::{KgError, Result};
use crate::models::{GraphQuery, ResultRow};

static RETURN_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bRETURN\b").expect("valid regex"));
static PROJECTION_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(ORDER\s+BY|SKIP|LIMIT|UNION)\b").expect("valid regex"));
static ALIAS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^.*\s+AS\s+(`[^`]+`|\w+)$").expect("valid regex"));

/// [`GraphStore`] over a pooled Neo4j driver.
#[derive(Clone)]
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        let graph = connection::connect(config).await?;
        Ok(Self { graph })
    }

    pub fn from_graph(graph: Graph) -> Self {
        Self { graph }
    }

    fn build_query(graph_query: &GraphQuery) -> Query {
        graph_query
            .params
            .iter()
            .fold(query(&graph_query.text), |q, (key, value)| {
                q.param(key, to_bolt(value))
            })
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn run(&self, graph_query: &GraphQuery) -> Result<Vec<ResultRow>> {
        let columns = projection_columns(&graph_query.text);
        let mut stream = self
            .graph
            .execute(Self::build_query(graph_query))
            .await
            .map_err(map_driver_error)?;

        let mut rows = Vec::new();
        while let Some(row) = stream.next().await.map_err(map_driver_error)? {
            rows.push(decode_row(&row, &columns)?);
        }

        tracing::debug!(rows = rows.len(), "Graph query returned");
        Ok(rows)
    }

    async fn ping(&self) -> Result<()> {
        let mut stream = self
            .graph
            .execute(query("RETURN 1 AS ok"))
            .await
            .map_err(map_driver_error)?;
        stream.next().await.map_err(map_driver_error)?;
        Ok(())
    }
}

/// Column names of the final RETURN clause, in projection order.
///
/// The driver hands rows back as hash maps, so this is the only record of the
/// order the query asked for. Unaliased items are named by their expression
/// text, as Neo4j does.
fn projection_columns(text: &str) -> Vec<String> {
    let Some(keyword) = RETURN_KEYWORD.find_iter(text).last() else {
        return Vec::new();
    };
    let mut clause = &text[keyword.end()..];
    if let Some(end) = PROJECTION_END.find(clause) {
        clause = &clause[..end.start()];
    }
    let clause = clause.trim_start();
    let clause = clause
        .get(..9)
        .filter(|head| head.eq_ignore_ascii_case("DISTINCT "))
        .map_or(clause, |_| &clause[9..]);

    split_top_level(clause)
        .into_iter()
        .map(str::trim)
        .filter(|item| !item.is_empty() && *item != "*")
        .map(|item| match ALIAS.captures(item) {
            Some(caps) => caps[1].trim_matches('`').to_string(),
            None => item.to_string(),
        })
        .collect()
}

/// Split on commas that are outside brackets and string literals.
fn split_top_level(clause: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0_i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (index, ch) in clause.char_indices() {
        match (quote, ch) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(ch),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth -= 1,
            (None, ',') if depth == 0 => {
                items.push(&clause[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    items.push(&clause[start..]);
    items
}

fn decode_row(row: &Row, columns: &[String]) -> Result<ResultRow> {
    let values: HashMap<String, BoltType> = row
        .to_strict()
        .map_err(|e| KgError::GraphDecode(e.to_string()))?;
    Ok(order_columns(values, columns))
}

/// Projected columns first, in order; anything the projection did not name
/// (e.g. `RETURN *`) follows alphabetically.
fn order_columns(mut values: HashMap<String, BoltType>, columns: &[String]) -> ResultRow {
    let mut row = ResultRow::new();
    for name in columns {
        if let Some(value) = values.remove(name) {
            row.insert(name.clone(), bolt_to_json(&value));
        }
    }

    let mut rest: Vec<_> = values.into_iter().collect();
    rest.sort_by(|a, b| a.0.cmp(&b.0));
    for (name, value) in rest {
        row.insert(name, bolt_to_json(&value));
    }
    row
}

fn bolt_to_json(value: &BoltType) -> Value {
    match value {
        BoltType::Null(_) => Value::Null,
        BoltType::Boolean(b) => Value::Bool(b.value),
        BoltType::Integer(i) => Value::from(i.value),
        BoltType::Float(f) => Number::from_f64(f.value).map_or(Value::Null, Value::Number),
        BoltType::String(s) => Value::String(s.value.clone()),
        BoltType::List(list) => Value::Array(list.value.iter().map(bolt_to_json).collect()),
        BoltType::Map(map) => Value::Object(map_to_json(map)),
        BoltType::Node(node) => {
            let labels = node
                .labels
                .value
                .iter()
                .map(bolt_to_json)
                .collect::<Vec<_>>();
            serde_json::json!({
                "id": node.id.value.to_string(),
                "labels": labels,
                "properties": map_to_json(&node.properties),
            })
        }
        BoltType::Relation(rel) => serde_json::json!({
            "id": rel.id.value.to_string(),
            "type": rel.typ.value,
            "start": rel.start_node_id.value.to_string(),
            "end": rel.end_node_id.value.to_string(),
            "properties": map_to_json(&rel.properties),
        }),
        BoltType::UnboundedRelation(rel) => serde_json::json!({
            "id": rel.id.value.to_string(),
            "type": rel.typ.value,
            "properties": map_to_json(&rel.properties),
        }),
        BoltType::Path(path) => serde_json::json!({
            "nodes": path.nodes.value.iter().map(bolt_to_json).collect::<Vec<_>>(),
            "relationships": path.rels.value.iter().map(bolt_to_json).collect::<Vec<_>>(),
        }),
        BoltType::Bytes(bytes) => Value::Array(bytes.value.iter().map(|b| Value::from(*b)).collect()),
        // Temporal and spatial values fall back to the driver's own rendering.
        other => Value::deserialize(serde::de::IntoDeserializer::into_deserializer(other))
            .unwrap_or(Value::Null),
    }
}

/// Bolt maps are unordered; keys are sorted so output is stable.
fn map_to_json(map: &BoltMap) -> Map<String, Value> {
    let mut entries: Vec<_> = map.value.iter().collect();
    entries.sort_by(|a, b| a.0.value.cmp(&b.0.value));
    entries
        .into_iter()
        .map(|(key, value)| (key.value.clone(), bolt_to_json(value)))
        .collect()
}

/// Connectivity, credentials and server-side trouble stay retryable; only what
/// the server refused about the query text itself is a rejection.
fn map_driver_error(error: neo4rs::Error) -> KgError {
    let message = error.to_string();
    match error {
        neo4rs::Error::IOError { .. }
        | neo4rs::Error::ConnectionError
        | neo4rs::Error::UrlParseError(_)
        | neo4rs::Error::UnsupportedScheme(_)
        | neo4rs::Error::InvalidDnsName(_)
        | neo4rs::Error::InvalidConfig
        | neo4rs::Error::AuthenticationError(_)
        | neo4rs::Error::UnsupportedVersion(_)
        | neo4rs::Error::UnexpectedMessage(_)
        | neo4rs::Error::UnknownMessage(_) => KgError::GraphUnavailable(message),
        neo4rs::Error::DeserializationError(_)
        | neo4rs::Error::ConversionError
        | neo4rs::Error::UnknownType(_)
        | neo4rs::Error::InvalidTypeMarker(_) => KgError::GraphDecode(message),
        neo4rs::Error::Neo4j(e) => server_error(e.kind(), message),
        _ => KgError::QueryRejected(message),
    }
}

fn server_error(kind: Neo4jErrorKind, message: String) -> KgError {
    match kind {
        Neo4jErrorKind::Transient
        | Neo4jErrorKind::Database
        | Neo4jErrorKind::Client(
            Neo4jClientErrorKind::SessionExpired
            | Neo4jClientErrorKind::FatalDiscovery
            | Neo4jClientErrorKind::Security(
                Neo4jSecurityErrorKind::Authentication
                | Neo4jSecurityErrorKind::AuthorizationExpired
                | Neo4jSecurityErrorKind::TokenExpired,
            ),
        ) => KgError::GraphUnavailable(message),
        Neo4jErrorKind::Client(_) | Neo4jErrorKind::Unknown => KgError::QueryRejected(message),
    }
}

fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(neo4rs::BoltNull),
        Value::Bool(b) => BoltType::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::from(i),
            None => BoltType::from(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => BoltType::from(s.as_str()),
        Value::Array(items) => BoltType::from(items.iter().map(to_bolt).collect::<Vec<_>>()),
        Value::Object(map) => BoltType::from(
            map.iter()
                .map(|(k, v)| (k.clone(), to_bolt(v)))
                .collect::<HashMap<String, BoltType>>(),
        ),
    }
}
