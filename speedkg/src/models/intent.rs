use serde::{Deserialize, Serialize};

/// Shape of a user question, used to pick a retrieval strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// A specific event or a small set of events
    SingleEvent,
    /// Sequences of linked events
    EventChain,
    /// Actors and their activities
    ActorAnalysis,
    /// Patterns, trends and comparisons across many events
    PatternAnalysis,
    /// Time-based trends
    TemporalAnalysis,
    /// Locations and regional patterns
    GeographicAnalysis,
}

impl Intent {
    pub const ALL: [Intent; 6] = [
        Intent::SingleEvent,
        Intent::EventChain,
        Intent::ActorAnalysis,
        Intent::PatternAnalysis,
        Intent::TemporalAnalysis,
        Intent::GeographicAnalysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleEvent => "single_event",
            Self::EventChain => "event_chain",
            Self::ActorAnalysis => "actor_analysis",
            Self::PatternAnalysis => "pattern_analysis",
            Self::TemporalAnalysis => "temporal_analysis",
            Self::GeographicAnalysis => "geographic_analysis",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "single_event" => Ok(Self::SingleEvent),
            "event_chain" => Ok(Self::EventChain),
            "actor_analysis" => Ok(Self::ActorAnalysis),
            "pattern_analysis" => Ok(Self::PatternAnalysis),
            "temporal_analysis" => Ok(Self::TemporalAnalysis),
            "geographic_analysis" => Ok(Self::GeographicAnalysis),
            _ => Err(format!("Unknown intent: {s}")),
        }
    }
}

/// An intent together with the model's self-reported confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f32,
}

impl Classification {
    pub const FALLBACK_INTENT: Intent = Intent::PatternAnalysis;
    pub const FALLBACK_CONFIDENCE: f32 = 0.5;

    pub fn new(intent: Intent, confidence: f32) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            Self::FALLBACK_CONFIDENCE
        };
        Self { intent, confidence }
    }

    /// Substituted when classification fails; never fatal to the request.
    pub fn fallback() -> Self {
        Self {
            intent: Self::FALLBACK_INTENT,
            confidence: Self::FALLBACK_CONFIDENCE,
        }
    }
}
