use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A node returned by subgraph expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Store-assigned identity, unique within one store
    pub id: String,

    #[serde(default)]
    pub labels: Vec<String>,

    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// A relationship returned by subgraph expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,

    /// Relationship type, e.g. `INITIATED_BY`
    #[serde(rename = "type")]
    pub rel_type: String,

    /// Start node id
    pub start: String,

    /// End node id
    pub end: String,

    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Bounded context gathered around the seed entities of a request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Subgraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub node_count: usize,
    pub edge_count: usize,
    pub seed_count: usize,
    /// True when the result rows themselves are the whole context.
    pub aggregation_only: bool,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, label: &str) -> Self {
        Self {
            id: id.into(),
            labels: vec![label.to_string()],
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// First label, used to group nodes for display.
    pub fn primary_label(&self) -> &str {
        self.labels.first().map(String::as_str).unwrap_or("Unknown")
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

impl GraphEdge {
    pub fn new(
        id: impl Into<String>,
        rel_type: &str,
        start: impl Into<String>,
        end: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            rel_type: rel_type.to_string(),
            start: start.into(),
            end: end.into(),
            properties: Map::new(),
        }
    }
}

impl Subgraph {
    pub fn empty() -> Self {
        Self::default()
    }

    /// No expansion was issued; the result rows stand on their own.
    pub fn aggregation() -> Self {
        Self {
            aggregation_only: true,
            ..Self::default()
        }
    }

    pub fn from_parts(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>, seed_count: usize) -> Self {
        Self {
            node_count: nodes.len(),
            edge_count: edges.len(),
            nodes,
            edges,
            seed_count,
            aggregation_only: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Nodes grouped by primary label, labels in order of first appearance.
    pub fn nodes_by_label(&self) -> Vec<(&str, Vec<&GraphNode>)> {
        let mut groups: Vec<(&str, Vec<&GraphNode>)> = Vec::new();
        for node in &self.nodes {
            let label = node.primary_label();
            match groups.iter_mut().find(|(existing, _)| *existing == label) {
                Some((_, members)) => members.push(node),
                None => groups.push((label, vec![node])),
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_parts_sets_counts() {
        let subgraph = Subgraph::from_parts(
            vec![GraphNode::new("1", "Event"), GraphNode::new("2", "Actor")],
            vec![GraphEdge::new("r1", "INITIATED_BY", "1", "2")],
            1,
        );
        assert_eq!(subgraph.node_count, 2);
        assert_eq!(subgraph.edge_count, 1);
        assert_eq!(subgraph.seed_count, 1);
        assert!(!subgraph.aggregation_only);
    }

    #[test]
    fn test_nodes_by_label_keeps_first_seen_order() {
        let subgraph = Subgraph::from_parts(
            vec![
                GraphNode::new("1", "Event"),
                GraphNode::new("2", "Actor"),
                GraphNode::new("3", "Event"),
                GraphNode {
                    id: "4".to_string(),
                    labels: vec![],
                    properties: Map::new(),
                },
            ],
            vec![],
            1,
        );

        let groups = subgraph.nodes_by_label();
        let labels: Vec<&str> = groups.iter().map(|(label, _)| *label).collect();
        assert_eq!(labels, vec!["Event", "Actor", "Unknown"]);
        assert_eq!(groups[0].1.len(), 2);
    }

    #[test]
    fn test_edge_serializes_type_field() {
        let edge = GraphEdge::new("r1", "LINKED_TO", "a", "b");
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["type"], json!("LINKED_TO"));
        assert!(json.get("rel_type").is_none());
    }

    #[test]
    fn test_node_deserializes_without_optional_fields() {
        let node: GraphNode = serde_json::from_value(json!({"id": "42"})).unwrap();
        assert_eq!(node.primary_label(), "Unknown");
        assert!(node.properties.is_empty());
    }

    #[test]
    fn test_aggregation_subgraph_is_empty() {
        let subgraph = Subgraph::aggregation();
        assert!(subgraph.aggregation_only);
        assert!(subgraph.is_empty());
    }
}
