use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static EVENT_ID_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"EID\d+").expect("valid regex"));

/// Citations referenced by an answer, in first-seen order without duplicates.
///
/// Event-id tokens found anywhere in the text come first, followed by the
/// bullet items of a `Citations` section when one is present. A missing or
/// malformed section only means fewer entries.
///
/// # Example
/// ```
/// use speedkg::intelligence::extract_citations;
///
/// let answer = "**Answer**: EID7 and EID9.\n\n**Citations**:\n- Events: EID7\n- Actors: Hamas";
/// assert_eq!(
///     extract_citations(answer),
///     vec!["EID7", "EID9", "Events: EID7", "Actors: Hamas"]
/// );
/// ```
pub fn extract_citations(answer: &str) -> Vec<String> {
    let mut citations: Vec<String> = EVENT_ID_TOKEN
        .find_iter(answer)
        .map(|m| m.as_str().to_string())
        .collect();
    citations.extend(citation_section_items(answer));

    let mut seen = HashSet::new();
    citations.retain(|c| seen.insert(c.clone()));
    citations
}

fn citation_section_items(answer: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut in_section = false;

    for line in answer.lines() {
        if line.contains("Citations") || line.contains("citations") {
            in_section = true;
            continue;
        }
        if !in_section {
            continue;
        }
        if line.starts_with('#') || line.starts_with("**") {
            break;
        }

        let trimmed = line.trim();
        if trimmed.starts_with('-') || trimmed.starts_with('•') {
            let item = trimmed.trim_start_matches(['-', '•']).trim();
            if !item.is_empty() {
                items.push(item.to_string());
            }
        }
    }

    items
}
