//! Parses kube-hunter's JSON report.
//!
//! kube-hunter logs progress as free text and prints its report as a single
//! JSON object on the last line of output.

use crate::ParseError;
use collie_agent_core::{ComplianceFinding, Status};
use serde::{Deserialize, Deserializer};

pub const PLUGIN: &str = "kube-hunter";

const CATEGORY_SEPARATOR: &str = "//";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Report {
    #[serde(default, deserialize_with = "nullable", alias = "Nodes")]
    pub nodes: Vec<Node>,
    #[serde(default, deserialize_with = "nullable", alias = "Services")]
    pub services: Vec<Service>,
    #[serde(default, deserialize_with = "nullable", alias = "Vulnerabilities")]
    pub vulnerabilities: Vec<Vulnerability>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Node {
    #[serde(default, deserialize_with = "nullable", rename = "type")]
    pub kind: String,
    #[serde(default, deserialize_with = "nullable")]
    pub location: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Service {
    #[serde(default, deserialize_with = "nullable")]
    pub service: String,
    #[serde(default, deserialize_with = "nullable")]
    pub location: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Vulnerability {
    #[serde(default, deserialize_with = "nullable")]
    pub location: String,
    #[serde(default, deserialize_with = "nullable")]
    pub vid: String,
    #[serde(default, deserialize_with = "nullable")]
    pub category: String,
    #[serde(default, deserialize_with = "nullable")]
    pub severity: String,
    #[serde(default, deserialize_with = "nullable")]
    pub vulnerability: String,
    #[serde(default, deserialize_with = "nullable")]
    pub description: String,
    #[serde(default, deserialize_with = "nullable")]
    pub evidence: String,
    #[serde(default, deserialize_with = "nullable")]
    pub avd_reference: String,
    #[serde(default, deserialize_with = "nullable")]
    pub hunter: String,
}

/// Parses kube-hunter's output into findings, one per vulnerability.
pub fn parse(content: &str) -> Result<Vec<ComplianceFinding>, ParseError> {
    decode(content)?
        .vulnerabilities
        .into_iter()
        .map(Vulnerability::into_finding)
        .collect()
}

/// Decodes the JSON report from the output's second-to-last line. Output is
/// newline-terminated, so this is the last line with content.
pub fn decode(content: &str) -> Result<Report, ParseError> {
    let lines = content.split('\n').collect::<Vec<_>>();
    if lines.len() < 2 {
        return Err(ParseError::MissingJsonLine(lines.len()));
    }
    let json = lines[lines.len() - 2];
    serde_json::from_str(json).map_err(Into::into)
}

/// Decodes `null` as the type's default value.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// === impl Vulnerability ===

impl Vulnerability {
    fn into_finding(self) -> Result<ComplianceFinding, ParseError> {
        let parts = self
            .category
            .split(CATEGORY_SEPARATOR)
            .map(|part| part.trim().to_string())
            .collect::<Vec<_>>();
        let [category, subcategory] = <[String; 2]>::try_from(parts).map_err(|_| {
            ParseError::MalformedCategory {
                vid: self.vid.clone(),
                category: self.category.clone(),
            }
        })?;

        Ok(ComplianceFinding {
            plugin: PLUGIN.to_string(),
            rule_id: self.vid,
            category,
            subcategory,
            description: self.description,
            status: Status::Warn,
            remediation: String::new(),
        })
    }
}
