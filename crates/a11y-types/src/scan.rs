//! Scan results as produced by the axe-core audit engine
//!
//! Field names follow the axe JSON (`helpUrl`, `failureSummary`) so a raw
//! `axe.run()` result deserializes directly. Fields this pipeline does not use
//! (`passes`, `incomplete`, `testEngine`, ...) are ignored.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::evidence::EvidenceKey;

/// Result of one accessibility audit against a single URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    /// The URL that was audited
    pub url: String,
    /// Engine timestamp, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Rule failures in engine order
    #[serde(default)]
    pub violations: Vec<Violation>,
}

impl ScanResult {
    /// Total number of failing nodes across all violations
    pub fn node_count(&self) -> usize {
        self.violations.iter().map(|v| v.nodes.len()).sum()
    }

    /// Iterate every `(violation, node)` pair together with its evidence key
    pub fn keyed_nodes(&self) -> impl Iterator<Item = (EvidenceKey, &Violation, &Node)> {
        self.violations
            .iter()
            .enumerate()
            .flat_map(|(vi, violation)| {
                violation
                    .nodes
                    .iter()
                    .enumerate()
                    .map(move |(ni, node)| (EvidenceKey::new(vi, ni), violation, node))
            })
    }
}

/// One rule failure grouping the elements that fail it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Rule id, e.g. `color-contrast`
    pub id: String,
    /// Short help text
    #[serde(default)]
    pub help: String,
    /// Longer description of what the rule checks
    #[serde(default)]
    pub description: String,
    /// Link to the rule documentation
    #[serde(default)]
    pub help_url: String,
    #[serde(default, deserialize_with = "deserialize_impact")]
    pub impact: Impact,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

/// A single DOM element failing a violation's rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(default)]
    pub target: Vec<Target>,
    #[serde(default)]
    pub html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_summary: Option<String>,
    #[serde(default, deserialize_with = "deserialize_impact")]
    pub impact: Impact,
}

impl Node {
    /// The CSS selector used to resolve this node in the live page.
    ///
    /// For shadow DOM chains the outermost selector is returned.
    pub fn primary_selector(&self) -> Option<&str> {
        self.target
            .first()
            .and_then(Target::first_selector)
            .filter(|s| !s.trim().is_empty())
    }
}

/// A node target: a plain selector or a chain of selectors crossing shadow roots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    Selector(String),
    Chain(Vec<String>),
}

impl Target {
    pub fn first_selector(&self) -> Option<&str> {
        match self {
            Target::Selector(s) => Some(s.as_str()),
            Target::Chain(chain) => chain.first().map(String::as_str),
        }
    }
}

/// Severity tag attached to violations and nodes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Minor,
    Moderate,
    Serious,
    Critical,
    #[default]
    Unspecified,
}

impl Impact {
    /// Parse an axe impact string; anything unknown is `Unspecified`
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "minor" => Impact::Minor,
            "moderate" => Impact::Moderate,
            "serious" => Impact::Serious,
            "critical" => Impact::Critical,
            _ => Impact::Unspecified,
        }
    }

    /// The four levels shown in the report legend, least severe first
    pub const LEGEND: [Impact; 4] = [
        Impact::Minor,
        Impact::Moderate,
        Impact::Serious,
        Impact::Critical,
    ];

    pub fn is_specified(self) -> bool {
        self != Impact::Unspecified
    }

    /// Label used in the report
    pub fn label(self) -> &'static str {
        match self {
            Impact::Minor => "minor",
            Impact::Moderate => "moderate",
            Impact::Serious => "serious",
            Impact::Critical => "critical",
            Impact::Unspecified => "not specified",
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn deserialize_impact<'de, D>(deserializer: D) -> Result<Impact, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().map(Impact::parse).unwrap_or_default())
}
