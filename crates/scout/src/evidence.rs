use serde::Serialize;

/// Strength classification for evidence.
///
/// Determines how evidence contributes to confidence aggregation:
/// - `Definitive`: certain indicators (config_declared, rulepack exclusions)
/// - `Strong`: high confidence standalone
/// - `Moderate`: needs corroboration (file_descriptors, environment)
/// - `Weak`: must combine with others (parent_process alone)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Definitive,
    Strong,
    Moderate,
    Weak,
}

/// A tagged observation supporting (or vetoing) an MCP server detection.
///
/// Constructed once and never mutated. `is_negative` marks "confirmed NOT
/// MCP" and forces the owning candidate's score to zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub confidence: f64,
    pub source: String,
    pub strength: Strength,
    pub is_negative: bool,
}

impl Evidence {
    pub fn new(
        kind: impl Into<String>,
        description: impl Into<String>,
        confidence: f64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
            confidence,
            source: source.into(),
            strength: Strength::Moderate,
            is_negative: false,
        }
    }

    pub fn with_strength(mut self, strength: Strength) -> Self {
        self.strength = strength;
        self
    }

    /// A veto: confirmed NOT MCP. Always `Definitive`.
    pub fn negative(
        kind: impl Into<String>,
        description: impl Into<String>,
        confidence: f64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
            confidence,
            source: source.into(),
            strength: Strength::Definitive,
            is_negative: true,
        }
    }
}
