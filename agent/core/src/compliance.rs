use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// The outcome of a single scanner check.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Fail,
    Warn,
    Info,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidStatus(String);

/// A scanner result normalized across scanners.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceFinding {
    pub plugin: String,
    pub rule_id: String,
    pub category: String,
    pub subcategory: String,
    pub description: String,
    pub status: Status,
    pub remediation: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
}

/// A finding produced by evaluating a policy rule against a live object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceRecord {
    pub rule_id: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

// === impl Status ===

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Warn => "WARN",
            Self::Info => "INFO",
        }
    }
}

impl FromStr for Status {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PASS" => Ok(Self::Pass),
            "FAIL" => Ok(Self::Fail),
            "WARN" => Ok(Self::Warn),
            "INFO" => Ok(Self::Info),
            s => Err(InvalidStatus(s.to_string())),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for InvalidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid status: {:?}", self.0)
    }
}

impl std::error::Error for InvalidStatus {}

// === impl ComplianceRecord ===

impl ComplianceRecord {
    pub fn new(rule_id: impl Into<String>, severity: Severity) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity,
            url: None,
            data: BTreeMap::new(),
        }
    }

    /// Attaches contextual data unless a previous decoration already did.
    pub fn decorate<I, K, V>(&mut self, data: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if self.data.is_empty() {
            self.data = data
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    #[test]
    fn status_round_trips_through_text() {
        for status in [Status::Pass, Status::Fail, Status::Warn, Status::Info] {
            assert_eq!(status.as_str().parse::<Status>(), Ok(status));
        }
        assert!("pass".parse::<Status>().is_err());
    }

    #[test]
    fn finding_uses_camel_case_keys() {
        let finding = ComplianceFinding {
            plugin: "kube-bench".to_string(),
            rule_id: "1.1.1".to_string(),
            category: "1 Control Plane".to_string(),
            subcategory: "1.1 Files".to_string(),
            description: "Ensure".to_string(),
            status: Status::Fail,
            remediation: String::new(),
        };
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["ruleId"], "1.1.1");
        assert_eq!(json["status"], "FAIL");
    }

    #[test]
    fn first_decoration_wins() {
        let mut record = ComplianceRecord::new("deprecate-host-port", Severity::Info);
        record.decorate([("pod", "web-0"), ("namespace", "default")]);
        record.decorate([("pod", "other")]);
        assert_eq!(
            record.data,
            btreemap! {
                "namespace".to_string() => "default".to_string(),
                "pod".to_string() => "web-0".to_string(),
            }
        );
    }
}
