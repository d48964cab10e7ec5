//! On-disk rulepack JSON.
//!
//! ```json
//! { "name": str, "version": str, "description": str,
//!   "rules": [ { "name": str, "description": str,
//!                "match":  { recognized_key: value, ... },
//!                "action": { recognized_key: value, ... } } ] }
//! ```
//!
//! Match and action objects map recognized keys to values; unrecognized keys
//! are ignored for forward compatibility. Keys are processed in declaration
//! order, so actions run in the order the author wrote them.

use anyhow::Context;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{Rule, RuleAction, RuleMatch, Rulepack};

#[derive(Debug, Deserialize)]
struct RulepackFile {
    #[serde(default = "default_pack_name")]
    name: String,
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    description: String,
    rules: Vec<RuleFile>,
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default = "default_rule_name")]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default, rename = "match")]
    match_conditions: Map<String, Value>,
    #[serde(default)]
    action: Map<String, Value>,
}

fn default_pack_name() -> String {
    "Unnamed Rulepack".to_string()
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_rule_name() -> String {
    "Unnamed Rule".to_string()
}

pub(super) fn rulepack_from_value(value: &Value) -> anyhow::Result<Rulepack> {
    let file: RulepackFile =
        serde_json::from_value(value.clone()).context("invalid rulepack shape")?;

    let mut rules = Vec::with_capacity(file.rules.len());
    for rule in file.rules {
        let rule_name = rule.name;
        rules.push(Rule {
            match_conditions: parse_matches(&rule.match_conditions)
                .with_context(|| format!("rule {rule_name:?}"))?,
            actions: parse_actions(&rule.action)
                .with_context(|| format!("rule {rule_name:?}"))?,
            name: rule_name,
            description: rule.description,
        });
    }

    Ok(Rulepack {
        name: file.name,
        version: file.version,
        description: file.description,
        rules,
    })
}

fn parse_matches(map: &Map<String, Value>) -> anyhow::Result<Vec<RuleMatch>> {
    let mut conditions = Vec::new();

    for (key, value) in map {
        let as_str = || {
            value
                .as_str()
                .map(str::to_string)
                .with_context(|| format!("`{key}` must be a string"))
        };

        match key.as_str() {
            "process_name" => conditions.push(RuleMatch::ProcessName(as_str()?)),
            "command_contains" => conditions.push(RuleMatch::CommandContains(as_str()?)),
            "command_regex" => conditions.push(RuleMatch::CommandRegex(as_str()?)),
            "port" => {
                let port = value
                    .as_u64()
                    .and_then(|p| u16::try_from(p).ok())
                    .context("`port` must be an integer in 0..=65535")?;
                conditions.push(RuleMatch::PortEquals(port));
            }
            "url_contains" => conditions.push(RuleMatch::UrlContains(as_str()?)),
            "config_file" => conditions.push(RuleMatch::ConfigFile(as_str()?)),
            "has_evidence_type" => conditions.push(RuleMatch::EvidenceType(as_str()?)),
            "parent_process" => conditions.push(RuleMatch::ParentProcess(as_str()?)),
            _ => {}
        }
    }

    Ok(conditions)
}

fn parse_actions(map: &Map<String, Value>) -> anyhow::Result<Vec<RuleAction>> {
    let mut actions = Vec::new();

    for (key, value) in map {
        match key.as_str() {
            "add_evidence" => {
                let fields = value
                    .as_object()
                    .context("`add_evidence` must be an object")?;
                actions.push(RuleAction::AddEvidence {
                    kind: opt_str(fields, "type", "custom_rule"),
                    description: opt_str(fields, "description", ""),
                    confidence: opt_f64(fields, "confidence", 0.5),
                    source: opt_str(fields, "source", "rulepack"),
                });
            }
            "boost_confidence" => {
                actions.push(RuleAction::BoostConfidence(
                    value
                        .as_f64()
                        .context("`boost_confidence` must be a number")?,
                ));
            }
            "set_minimum_confidence" => {
                actions.push(RuleAction::SetMinimumConfidence(
                    value
                        .as_f64()
                        .context("`set_minimum_confidence` must be a number")?,
                ));
            }
            "add_tag" => {
                actions.push(RuleAction::AddTag(
                    value
                        .as_str()
                        .context("`add_tag` must be a string")?
                        .to_string(),
                ));
            }
            "add_negative_evidence" => {
                let fields = value
                    .as_object()
                    .context("`add_negative_evidence` must be an object")?;
                actions.push(RuleAction::AddNegativeEvidence {
                    kind: opt_str(fields, "type", "rulepack_negative"),
                    description: opt_str(fields, "description", ""),
                    confidence: opt_f64(fields, "confidence", 0.99),
                });
            }
            "set_maximum_confidence" => {
                actions.push(RuleAction::SetMaximumConfidence(
                    value
                        .as_f64()
                        .context("`set_maximum_confidence` must be a number")?,
                ));
            }
            "exclude" => {
                if value.as_bool().context("`exclude` must be a boolean")? {
                    actions.push(RuleAction::Exclude);
                }
            }
            _ => {}
        }
    }

    Ok(actions)
}

fn opt_str(map: &Map<String, Value>, key: &str, default: &str) -> String {
    map.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or(default)
        .to_string()
}

fn opt_f64(map: &Map<String, Value>, key: &str, default: f64) -> f64 {
    map.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
}

pub(super) fn rulepack_to_value(rulepack: &Rulepack) -> Value {
    let rules: Vec<Value> = rulepack
        .rules
        .iter()
        .map(|rule| {
            let mut match_map = Map::new();
            for condition in &rule.match_conditions {
                let (key, value) = match condition {
                    RuleMatch::ProcessName(v) => ("process_name", json!(v)),
                    RuleMatch::CommandContains(v) => ("command_contains", json!(v)),
                    RuleMatch::CommandRegex(v) => ("command_regex", json!(v)),
                    RuleMatch::PortEquals(v) => ("port", json!(v)),
                    RuleMatch::UrlContains(v) => ("url_contains", json!(v)),
                    RuleMatch::ConfigFile(v) => ("config_file", json!(v)),
                    RuleMatch::EvidenceType(v) => ("has_evidence_type", json!(v)),
                    RuleMatch::ParentProcess(v) => ("parent_process", json!(v)),
                };
                match_map.insert(key.to_string(), value);
            }

            let mut action_map = Map::new();
            for action in &rule.actions {
                let (key, value) = match action {
                    RuleAction::AddEvidence {
                        kind,
                        description,
                        confidence,
                        source,
                    } => (
                        "add_evidence",
                        json!({
                            "type": kind,
                            "description": description,
                            "confidence": confidence,
                            "source": source,
                        }),
                    ),
                    RuleAction::BoostConfidence(factor) => ("boost_confidence", json!(factor)),
                    RuleAction::SetMinimumConfidence(floor) => {
                        ("set_minimum_confidence", json!(floor))
                    }
                    RuleAction::AddTag(tag) => ("add_tag", json!(tag)),
                    RuleAction::AddNegativeEvidence {
                        kind,
                        description,
                        confidence,
                    } => (
                        "add_negative_evidence",
                        json!({
                            "type": kind,
                            "description": description,
                            "confidence": confidence,
                        }),
                    ),
                    RuleAction::SetMaximumConfidence(cap) => {
                        ("set_maximum_confidence", json!(cap))
                    }
                    RuleAction::Exclude => ("exclude", json!(true)),
                };
                action_map.insert(key.to_string(), value);
            }

            json!({
                "name": rule.name,
                "description": rule.description,
                "match": match_map,
                "action": action_map,
            })
        })
        .collect();

    json!({
        "name": rulepack.name,
        "version": rulepack.version,
        "description": rulepack.description,
        "rules": rules,
    })
}
