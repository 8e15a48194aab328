use serde_json::Value;

use crate::config::ContextConfig;
use crate::models::{GraphNode, ResultRow, Subgraph};

const TRUNCATION_MARKER: &str = "\n[context truncated]";

/// Renders rows and subgraph into the bounded text the reasoner reads.
#[derive(Debug, Clone)]
pub struct ContextSerializer {
    config: ContextConfig,
}

impl Default for ContextSerializer {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}

impl ContextSerializer {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    pub fn serialize(&self, rows: &[ResultRow], subgraph: &Subgraph) -> String {
        let text = if subgraph.aggregation_only {
            self.aggregation_section(rows)
        } else {
            let mut sections = self.results_section(rows);
            if !subgraph.nodes.is_empty() {
                sections.extend(self.subgraph_section(subgraph));
            }
            sections.join("\n")
        };

        truncate_chars(text, self.config.max_chars)
    }

    fn aggregation_section(&self, rows: &[ResultRow]) -> String {
        let mut sections = vec!["# Aggregation Results\n".to_string()];
        for (i, row) in rows.iter().take(self.config.aggregation_rows).enumerate() {
            sections.push(format!("\n{}. {}", i + 1, format_row(row)));
        }
        if rows.len() > self.config.aggregation_rows {
            sections.push(format!(
                "\n... and {} more rows",
                rows.len() - self.config.aggregation_rows
            ));
        }
        sections.join("\n")
    }

    fn results_section(&self, rows: &[ResultRow]) -> Vec<String> {
        let mut sections = vec![
            "# Query Results\n".to_string(),
            format!("Found {} matching records\n", rows.len()),
        ];
        if !rows.is_empty() {
            sections.push("\n## Sample Results:\n".to_string());
            for (i, row) in rows.iter().take(self.config.row_preview).enumerate() {
                sections.push(format!("\n{}. {}", i + 1, format_row(row)));
            }
        }
        sections
    }

    fn subgraph_section(&self, subgraph: &Subgraph) -> Vec<String> {
        let mut sections = vec![
            "\n\n# Subgraph Context\n".to_string(),
            format!("Total nodes: {}", subgraph.node_count),
            format!("Total relationships: {}\n", subgraph.edge_count),
        ];
        for (label, nodes) in subgraph.nodes_by_label() {
            sections.push(format!("\n## {label} Nodes ({}):\n", nodes.len()));
            for node in nodes.iter().take(self.config.nodes_per_label) {
                sections.push(format!("- {}", format_node(node)));
            }
        }
        sections
    }
}

/// `key: value` pairs in column order, nulls omitted.
pub fn format_row(row: &ResultRow) -> String {
    row.iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| format!("{key}: {}", display_value(value)))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn format_node(node: &GraphNode) -> String {
    let prop = |key: &str| {
        node.properties
            .get(key)
            .filter(|v| !v.is_null())
            .map(display_value)
            .unwrap_or_else(|| "N/A".to_string())
    };

    match node.primary_label() {
        "Event" => format!("Event {} ({})", prop("eventId"), prop("year")),
        "Actor" => format!("Actor: {}", prop("name")),
        "Location" => format!("Location: {}, {}", prop("name"), prop("country")),
        label => {
            let properties = Value::Object(node.properties.clone()).to_string();
            let preview: String = properties.chars().take(100).collect();
            format!("{label}: {preview}")
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    let keep = max_chars.saturating_sub(TRUNCATION_MARKER.len());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
