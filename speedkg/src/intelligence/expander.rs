use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::db::GraphExecutor;
use crate::error::{KgError, Result};
use crate::models::{GraphEdge, GraphNode, GraphQuery, Intent, ResultRow, Subgraph};

pub const INITIATED_BY: &str = "INITIATED_BY";
pub const TARGETED: &str = "TARGETED";
pub const VICTIMIZED: &str = "VICTIMIZED";
pub const OCCURRED_AT: &str = "OCCURRED_AT";
pub const OF_TYPE: &str = "OF_TYPE";
pub const LINKED_TO: &str = "LINKED_TO";

/// Row keys whose values are event identifiers.
const SEED_KEYS: [&str; 3] = ["eventId", "e.eventId", "event_id"];

static EVENT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^EID\d+$").expect("valid regex"));

/// Per-intent bounds on subgraph expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalStrategy {
    pub max_hops: u32,
    pub max_nodes: usize,
    /// `None` traverses every relationship type
    pub allowed_relationships: Option<&'static [&'static str]>,
    pub aggregation_only: bool,
}

impl RetrievalStrategy {
    pub fn for_intent(intent: Intent) -> Self {
        match intent {
            Intent::SingleEvent => Self {
                max_hops: 1,
                max_nodes: 100,
                allowed_relationships: Some(&[
                    INITIATED_BY,
                    TARGETED,
                    VICTIMIZED,
                    OCCURRED_AT,
                    OF_TYPE,
                ]),
                aggregation_only: false,
            },
            Intent::EventChain => Self {
                max_hops: 2,
                max_nodes: 300,
                allowed_relationships: Some(&[LINKED_TO]),
                aggregation_only: false,
            },
            Intent::ActorAnalysis => Self {
                max_hops: 2,
                max_nodes: 500,
                allowed_relationships: Some(&[INITIATED_BY, TARGETED, VICTIMIZED]),
                aggregation_only: false,
            },
            Intent::PatternAnalysis => Self {
                max_hops: 0,
                max_nodes: 0,
                allowed_relationships: None,
                aggregation_only: true,
            },
            Intent::TemporalAnalysis => Self {
                max_hops: 1,
                max_nodes: 500,
                allowed_relationships: Some(&[OCCURRED_AT]),
                aggregation_only: true,
            },
            Intent::GeographicAnalysis => Self {
                max_hops: 2,
                max_nodes: 500,
                allowed_relationships: Some(&[OCCURRED_AT, INITIATED_BY, TARGETED]),
                aggregation_only: false,
            },
        }
    }

    /// Node cap after applying a global ceiling.
    pub fn effective_max_nodes(&self, ceiling: usize) -> usize {
        self.max_nodes.min(ceiling)
    }

    pub fn allows(&self, rel_type: &str) -> bool {
        self.allowed_relationships
            .map_or(true, |allowed| allowed.contains(&rel_type))
    }
}

/// Grows the executed rows into a bounded neighbourhood of the seed events.
#[derive(Clone)]
pub struct SubgraphExpander {
    executor: GraphExecutor,
    max_subgraph_nodes: usize,
}

impl SubgraphExpander {
    pub fn new(executor: GraphExecutor, max_subgraph_nodes: usize) -> Self {
        Self {
            executor,
            max_subgraph_nodes,
        }
    }

    pub async fn expand(&self, rows: &[ResultRow], intent: Intent) -> Result<Subgraph> {
        let strategy = RetrievalStrategy::for_intent(intent);

        if rows.is_empty() {
            return Ok(Subgraph::empty());
        }

        if strategy.aggregation_only {
            tracing::debug!(intent = %intent, "Aggregation intent, skipping expansion");
            return Ok(Subgraph::aggregation());
        }

        let seeds = extract_seeds(rows);
        if seeds.is_empty() {
            tracing::info!("No event identifiers in results, using rows as context");
            return Ok(Subgraph::aggregation());
        }

        let max_nodes = strategy.effective_max_nodes(self.max_subgraph_nodes);
        let query = expansion_query(&strategy, max_nodes, &seeds);
        let result_rows = self.executor.run(&query).await?;

        let (nodes, edges) = decode_expansion(&result_rows)?;
        let subgraph = enforce_bounds(nodes, edges, &seeds, &strategy, max_nodes);

        tracing::info!(
            seeds = seeds.len(),
            nodes = subgraph.node_count,
            edges = subgraph.edge_count,
            max_hops = strategy.max_hops,
            max_nodes,
            "Subgraph expanded"
        );
        Ok(subgraph)
    }
}

/// Event identifiers referenced by the rows, first occurrence first.
///
/// Picks up `EID<digits>` strings anywhere (including inside node maps and
/// lists) and any value stored under an event-id column.
pub fn extract_seeds(rows: &[ResultRow]) -> Vec<String> {
    let mut seeds = Vec::new();
    let mut seen = HashSet::new();
    for row in rows {
        for (key, value) in row {
            collect_seeds(key, value, &mut seeds, &mut seen);
        }
    }
    seeds
}

fn collect_seeds(key: &str, value: &Value, seeds: &mut Vec<String>, seen: &mut HashSet<String>) {
    match value {
        Value::String(s) if EVENT_ID.is_match(s) || SEED_KEYS.contains(&key) => {
            if seen.insert(s.clone()) {
                seeds.push(s.clone());
            }
        }
        Value::Number(n) if SEED_KEYS.contains(&key) => {
            let id = n.to_string();
            if seen.insert(id.clone()) {
                seeds.push(id);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_seeds(key, item, seeds, seen);
            }
        }
        Value::Object(map) => {
            for (inner_key, inner) in map {
                collect_seeds(inner_key, inner, seeds, seen);
            }
        }
        _ => {}
    }
}

/// Single variable-length expansion from all seeds, returning node and edge
/// maps in two collected columns.
pub fn expansion_query(
    strategy: &RetrievalStrategy,
    max_nodes: usize,
    seeds: &[String],
) -> GraphQuery {
    let rel_filter = strategy
        .allowed_relationships
        .map(|allowed| format!(":{}", allowed.join("|")))
        .unwrap_or_default();
    let max_hops = strategy.max_hops;

    let text = format!(
        "MATCH (seed:Event)
WHERE seed.eventId IN $seeds
CALL {{
    WITH seed
    MATCH path = (seed)-[{rel_filter}*0..{max_hops}]-(connected)
    RETURN path
    LIMIT {max_nodes}
}}
WITH collect(path) AS paths
CALL {{
    WITH paths
    UNWIND paths AS p
    UNWIND nodes(p) AS n
    WITH DISTINCT n
    RETURN collect({{id: elementId(n), labels: labels(n), properties: properties(n)}}) AS nodes
}}
CALL {{
    WITH paths
    UNWIND paths AS p
    UNWIND relationships(p) AS r
    WITH DISTINCT r
    RETURN collect({{id: elementId(r), type: type(r), start: elementId(startNode(r)), end: elementId(endNode(r)), properties: properties(r)}}) AS edges
}}
RETURN nodes, edges"
    );

    GraphQuery::new(text).param("seeds", seeds.to_vec())
}

fn decode_expansion(rows: &[ResultRow]) -> Result<(Vec<GraphNode>, Vec<GraphEdge>)> {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    for row in rows {
        if let Some(value) = row.get("nodes").filter(|v| !v.is_null()) {
            let batch: Vec<GraphNode> = serde_json::from_value(value.clone())
                .map_err(|e| KgError::GraphDecode(format!("Invalid expansion nodes: {e}")))?;
            nodes.extend(batch);
        }
        if let Some(value) = row.get("edges").filter(|v| !v.is_null()) {
            let batch: Vec<GraphEdge> = serde_json::from_value(value.clone())
                .map_err(|e| KgError::GraphDecode(format!("Invalid expansion edges: {e}")))?;
            edges.extend(batch);
        }
    }
    Ok((nodes, edges))
}

/// Apply the strategy's bounds to whatever the store returned.
///
/// Nodes and edges are deduplicated by id and disallowed edge types dropped.
/// Hop distance is measured from the seed events; nodes are kept nearest
/// first up to `max_nodes`, and an edge survives only when both endpoints
/// survive and it lies within `max_hops` of a seed.
pub fn enforce_bounds(
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    seeds: &[String],
    strategy: &RetrievalStrategy,
    max_nodes: usize,
) -> Subgraph {
    let mut seen_nodes = HashSet::new();
    let nodes: Vec<GraphNode> = nodes
        .into_iter()
        .filter(|node| seen_nodes.insert(node.id.clone()))
        .collect();

    let mut seen_edges = HashSet::new();
    let edges: Vec<GraphEdge> = edges
        .into_iter()
        .filter(|edge| strategy.allows(&edge.rel_type))
        .filter(|edge| seen_nodes.contains(&edge.start) && seen_nodes.contains(&edge.end))
        .filter(|edge| seen_edges.insert(edge.id.clone()))
        .collect();

    let seed_set: HashSet<&str> = seeds.iter().map(String::as_str).collect();
    let distances = hop_distances(&nodes, &edges, &seed_set, strategy.max_hops);

    let mut ranked: Vec<(usize, u32, GraphNode)> = nodes
        .into_iter()
        .enumerate()
        .filter_map(|(order, node)| distances.get(&node.id).map(|d| (order, *d, node)))
        .collect();
    ranked.sort_by_key(|(order, distance, _)| (*distance, *order));
    ranked.truncate(max_nodes);

    let kept: HashMap<String, u32> = ranked
        .iter()
        .map(|(_, distance, node)| (node.id.clone(), *distance))
        .collect();

    let edges: Vec<GraphEdge> = edges
        .into_iter()
        .filter(|edge| match (kept.get(&edge.start), kept.get(&edge.end)) {
            (Some(a), Some(b)) => (*a).min(*b) + 1 <= strategy.max_hops,
            _ => false,
        })
        .collect();

    let nodes = ranked.into_iter().map(|(_, _, node)| node).collect();
    Subgraph::from_parts(nodes, edges, seeds.len())
}

/// Undirected BFS from nodes whose `eventId` is a seed, up to `max_hops`.
fn hop_distances(
    nodes: &[GraphNode],
    edges: &[GraphEdge],
    seeds: &HashSet<&str>,
    max_hops: u32,
) -> HashMap<String, u32> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        adjacency.entry(&edge.start).or_default().push(&edge.end);
        adjacency.entry(&edge.end).or_default().push(&edge.start);
    }

    let mut distances: HashMap<String, u32> = HashMap::new();
    let mut queue: VecDeque<(&str, u32)> = VecDeque::new();
    for node in nodes {
        let is_seed = node
            .property_str("eventId")
            .is_some_and(|id| seeds.contains(id));
        if is_seed {
            distances.insert(node.id.clone(), 0);
            queue.push_back((node.id.as_str(), 0));
        }
    }

    while let Some((id, distance)) = queue.pop_front() {
        if distance >= max_hops {
            continue;
        }
        for next in adjacency.get(id).into_iter().flatten() {
            if !distances.contains_key(*next) {
                distances.insert((*next).to_string(), distance + 1);
                queue.push_back((*next, distance + 1));
            }
        }
    }

    distances
}
