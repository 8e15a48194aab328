//! Prompt templates for the model-service calls of the pipeline
//!
//! These templates use basic `format!()` interpolation for type safety.
//! Missing variables will cause compile-time errors.

use crate::models::Intent;

/// Graph schema shown to the model when it writes a query.
pub const SCHEMA_DESCRIPTION: &str = r#"# Neo4j Schema for the SPEED-CAMEO Knowledge Graph

## Node Types

**Event**: Historical conflict/mediation events
- Properties: eventId (unique, e.g. 'EID12345'), year, month, day, eventType, peType, atkType, dsaType, newsSource, articleId, isCoup, isLinked
- Temporal: julianStartDate, julianEndDate, daySpan
- Flags: isQuasiEvent, isStateAction, isCoupFailed, isPosthoc

**Actor**: People, groups, organizations involved in events
- Properties: actorId (unique), name, cameoCode, actorType, governmentType, governmentLevel, isKnown, ambiguity, numParticipants, numArmed

**Location**: Geographic locations
- Properties: locationId (unique), name, country, latitude, longitude, locationType, region, cowCode

**EventType**: CAMEO event classification hierarchy
- Properties: cameoCode (unique), label, level (1-4), category

## Relationships

- (Event)-[:INITIATED_BY {actorType, governmentType, ambiguity}]->(Actor)
- (Event)-[:TARGETED {actorType, governmentType}]->(Actor)
- (Event)-[:VICTIMIZED {actorType, governmentType}]->(Actor)
- (Event)-[:OCCURRED_AT]->(Location)
- (Event)-[:OF_TYPE]->(EventType)
- (Event)-[:LINKED_TO {linkType, direction}]->(Event)
- (EventType)-[:PARENT_TYPE]->(EventType)

## Key Patterns

**Temporal Queries**: Use e.year, e.month, e.day for filtering
**Actor Queries**: Match through INITIATED_BY, TARGETED, or VICTIMIZED relationships
**Location Queries**: Use OCCURRED_AT, filter by l.country or l.region
**Event Chains**: Follow LINKED_TO relationships
**Aggregations**: Use count(), collect() for pattern analysis
**Always add LIMIT**: Default 100 for lists"#;

/// Read-only rules restated to the model; enforcement lives in the validator.
pub const SECURITY_RULES: &str = r#"# Security Rules
- NEVER use DELETE, REMOVE, DROP, DETACH, SET, CREATE, MERGE statements
- Only use MATCH, OPTIONAL MATCH, WHERE, WITH, RETURN, ORDER BY, LIMIT
- Always add a LIMIT clause (max 1000)"#;

/// A question paired with the query that answers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkedExample {
    pub intent: Intent,
    pub question: &'static str,
    pub query: &'static str,
}

pub const WORKED_EXAMPLES: &[WorkedExample] = &[
    WorkedExample {
        intent: Intent::SingleEvent,
        question: "What happened in event EID12345?",
        query: "MATCH (e:Event {eventId: 'EID12345'})
OPTIONAL MATCH (e)-[:INITIATED_BY]->(ini:Actor)
OPTIONAL MATCH (e)-[:TARGETED]->(tar:Actor)
OPTIONAL MATCH (e)-[:OCCURRED_AT]->(l:Location)
RETURN e.eventId, e.year, e.month, e.day, e.eventType,
       ini.name AS initiator, tar.name AS target, l.name AS location, l.country",
    },
    WorkedExample {
        intent: Intent::ActorAnalysis,
        question: "What actions did Palestinian Arabs take in 2003?",
        query: "MATCH (a:Actor {name: 'Palestinian Arab'})<-[:INITIATED_BY]-(e:Event)
WHERE e.year = 2003
RETURN e.eventId, e.year, e.month, e.day, e.eventType, e.newsSource
ORDER BY e.year, e.month, e.day
LIMIT 100",
    },
    WorkedExample {
        intent: Intent::TemporalAnalysis,
        question: "How many protests occurred each year between 2000 and 2005?",
        query: "MATCH (e:Event)
WHERE e.year >= 2000 AND e.year <= 2005 AND e.eventType IN [14, 15]
RETURN e.year, count(e) AS event_count
ORDER BY e.year",
    },
    WorkedExample {
        intent: Intent::GeographicAnalysis,
        question: "What events occurred in Palestine?",
        query: "MATCH (e:Event)-[:OCCURRED_AT]->(l:Location)
WHERE l.country = 'Palestine' OR l.name CONTAINS 'Palestine'
RETURN e.eventId, e.year, e.month, e.day, e.eventType, l.name, l.country
ORDER BY e.year DESC, e.month DESC, e.day DESC
LIMIT 100",
    },
    WorkedExample {
        intent: Intent::EventChain,
        question: "What events were linked to the coup in Chile?",
        query: "MATCH (e:Event)-[:OCCURRED_AT]->(:Location {country: 'Chile'})
WHERE e.isCoup = true
OPTIONAL MATCH (e)-[:LINKED_TO*1..2]-(linked:Event)
RETURN e.eventId, e.year, linked.eventId AS linked_event, linked.year AS linked_year
LIMIT 50",
    },
    WorkedExample {
        intent: Intent::PatternAnalysis,
        question: "What are the top 5 most active actors?",
        query: "MATCH (a:Actor)<-[:INITIATED_BY]-(e:Event)
RETURN a.name, count(e) AS event_count
ORDER BY event_count DESC
LIMIT 5",
    },
    WorkedExample {
        intent: Intent::ActorAnalysis,
        question: "Which actors did Hamas target most frequently?",
        query: "MATCH (ini:Actor {name: 'Hamas'})<-[:INITIATED_BY]-(e:Event)-[:TARGETED]->(tar:Actor)
RETURN tar.name, count(e) AS target_count
ORDER BY target_count DESC
LIMIT 10",
    },
    WorkedExample {
        intent: Intent::TemporalAnalysis,
        question: "Show me protest trends over time",
        query: "MATCH (e:Event)
WHERE e.eventType IN [14, 15]
RETURN e.year, count(e) AS protest_count
ORDER BY e.year",
    },
];

/// System prompt for intent classification.
///
/// Lists the closed label set and asks for a two-line `intent:` / `confidence:`
/// reply.
///
/// # Example
/// ```
/// use speedkg::llm::prompts::intent_system_prompt;
///
/// let prompt = intent_system_prompt();
/// assert!(prompt.contains("geographic_analysis"));
/// assert!(prompt.contains("confidence: <score>"));
/// ```
pub fn intent_system_prompt() -> String {
    let labels = Intent::ALL
        .iter()
        .map(|intent| intent.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are an expert at analyzing user queries about historical conflict and mediation events.

Your task is to classify queries into one of these intent categories:

1. **single_event**: a specific event or a small set of events
   - Example: "What happened in event EID12345?"
2. **event_chain**: sequences of linked events or event progressions
   - Example: "What events led to the coup in Chile?"
3. **actor_analysis**: actors (people, groups, organizations) and their activities
   - Example: "What actions did Hamas take in 2003?"
4. **pattern_analysis**: patterns, trends, or comparisons across many events
   - Example: "What are the most common types of protests?"
5. **temporal_analysis**: time-based trends or specific years and periods
   - Example: "How did protest activity change over time?"
6. **geographic_analysis**: geographic patterns or specific locations
   - Example: "What events occurred in Palestine?"

Respond with ONLY the intent category name ({labels}) and a confidence score (0.0-1.0) in this format:

intent: <category>
confidence: <score>

If the query is ambiguous, choose the most likely intent and lower the confidence score."#
    )
}

/// Render the worked examples, listing those matching `intent` first.
pub fn format_examples(examples: &[WorkedExample], intent: Intent) -> String {
    let mut ordered: Vec<&WorkedExample> = examples.iter().filter(|e| e.intent == intent).collect();
    ordered.extend(examples.iter().filter(|e| e.intent != intent));

    let mut out = String::from("# Example Queries\n");
    for (index, example) in ordered.iter().enumerate() {
        out.push_str(&format!(
            "\n**Example {}**\nUser: \"{}\"\nIntent: {}\nCypher:\n{}\n",
            index + 1,
            example.question,
            example.intent,
            example.query
        ));
    }
    out
}

/// System prompt for query generation.
///
/// # Example
/// ```
/// use speedkg::llm::prompts::{query_generation_prompt, SCHEMA_DESCRIPTION, WORKED_EXAMPLES};
/// use speedkg::models::Intent;
///
/// let prompt = query_generation_prompt(SCHEMA_DESCRIPTION, WORKED_EXAMPLES, Intent::TemporalAnalysis);
/// assert!(prompt.contains("The query intent is: temporal_analysis"));
/// assert!(prompt.contains("INITIATED_BY"));
/// ```
pub fn query_generation_prompt(
    schema_description: &str,
    examples: &[WorkedExample],
    intent: Intent,
) -> String {
    format!(
        r#"{schema_description}

{examples}

{SECURITY_RULES}

Generate a Cypher query for the user's question. Return ONLY the Cypher query without any explanation, markdown formatting, or backticks.

The query intent is: {intent}"#,
        examples = format_examples(examples, intent),
    )
}

pub fn query_generation_user_message(question: &str) -> String {
    format!("Generate a Cypher query for: {question}")
}

/// System prompt for the final answer.
pub const REASONING_SYSTEM_PROMPT: &str = r#"You are an expert analyst of historical conflict and mediation events from the SPEED dataset (1946-2008).

Your task is to analyze graph data from a Neo4j knowledge graph and answer user questions about historical events, actors, patterns, and trends.

## Dataset Context

**SPEED Dataset**: Social, Political, and Economic Events Database covering historical events from 1946-2008, drawn from news articles and historical records.

**CAMEO Ontology**: Conflict and Mediation Event Observations. Event types form a hierarchy; actors are countries, organizations, ethnic groups or political entities acting as initiators, targets or victims.

## Analysis Guidelines

1. Cite specific event IDs (e.g. EID12345), dates, actors, and locations
2. Only state facts present in the provided data
3. Analyze patterns and trends when relevant
4. Say so explicitly when the data is incomplete or does not answer the question

## Response Format

**Answer**: [Direct answer to the question]

**Evidence**: [Specific data points from the graph data]

**Analysis**: [Insights about patterns, trends, or context]

**Citations**:
- Events: EID12345, EID67890
- Actors: Hamas, Palestinian Arab
- Locations: Gaza, Palestine
- Time Period: 2003-2005"#;

/// User message for the final answer: question, serialized graph data and
/// the query that produced it.
///
/// # Example
/// ```
/// use speedkg::llm::prompts::reasoning_user_message;
///
/// let message = reasoning_user_message("Who?", "# Query Results", Some("MATCH (e) RETURN e LIMIT 1"));
/// assert!(message.starts_with("User Question: Who?"));
/// assert!(message.contains("Cypher Query Used:"));
/// ```
pub fn reasoning_user_message(question: &str, context: &str, query: Option<&str>) -> String {
    let mut message = format!("User Question: {question}\n\nGraph Data Retrieved:\n{context}\n");

    if let Some(query) = query.filter(|q| !q.trim().is_empty()) {
        message.push_str(&format!("\n\nCypher Query Used:\n```\n{query}\n```"));
    }

    message.push_str(
        "\n\nPlease analyze this data and answer the user's question following the response format guidelines.",
    );
    message
}
