//! Parses kube-bench's plain-text report.
//!
//! The report is a sequence of sections:
//!
//! ```text
//! [INFO] 1 Control Plane Security Configuration
//! [INFO] 1.1 Control Plane Node Configuration Files
//! [PASS] 1.1.1 Ensure that the API server pod specification file permissions are set (Automated)
//! [FAIL] 1.1.2 Ensure that the API server pod specification file ownership is set (Automated)
//!
//! == Remediations master ==
//! 1.1.2 Run the below command (based on the file location on your system) on the control plane node.
//! For example, chown root:root /etc/kubernetes/manifests/kube-apiserver.yaml
//!
//! == Summary master ==
//! 42 checks PASS
//! ```
//!
//! Lines are classified independently and drive a small state machine that
//! tracks the current category, subcategory, and which finding (if any) free
//! text belongs to.

use ahash::AHashMap as HashMap;
use collie_agent_core::{ComplianceFinding, Status};
use regex::Regex;
use tracing::{debug, trace};

pub const PLUGIN: &str = "kube-bench";

/// Parses a kube-bench report into one finding per rule id.
///
/// The order of the returned findings is unspecified.
pub fn parse(content: &str) -> Vec<ComplianceFinding> {
    let grammar = Grammar::new();
    let mut parser = Parser::default();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        parser.step(grammar.classify(line));
    }
    parser.finish()
}

struct Grammar {
    category: Regex,
    subcategory: Regex,
    rule: Regex,
    remediation_section: Regex,
    remediation_item: Regex,
    summary: Regex,
    section: Regex,
}

#[derive(Debug, PartialEq, Eq)]
enum Line<'l> {
    Category(&'l str),
    Subcategory(&'l str),
    Rule {
        status: Status,
        id: &'l str,
        description: &'l str,
    },
    RemediationSection,
    RemediationItem {
        id: &'l str,
        text: &'l str,
    },
    SectionEnd,
    Text(&'l str),
}

#[derive(Debug, Default, PartialEq, Eq)]
enum State {
    /// Outside of a remediation section. Free text is discarded.
    #[default]
    Checks,

    /// Inside a remediation section without a target, either because no item
    /// has been seen yet or because the last item named an unknown rule.
    /// Free text is discarded.
    Remediations,

    /// Inside a remediation section. Free text extends the named finding's
    /// remediation.
    Remediation(String),
}

#[derive(Debug, Default)]
struct Parser {
    category: String,
    subcategory: String,
    state: State,
    findings: HashMap<String, ComplianceFinding>,
}

// === impl Grammar ===

impl Grammar {
    fn new() -> Self {
        let re = |pattern: &str| Regex::new(pattern).expect("should compile");
        Self {
            category: re(r"^\[INFO\] (\d+ .+)$"),
            subcategory: re(r"^\[INFO\] (\d+\.\d+ .+)$"),
            rule: re(r"^\[(PASS|FAIL|WARN|INFO)\] (\d+\.\d+\.\d+) (.+)$"),
            remediation_section: re(r"^== Remediations .+ ==$"),
            remediation_item: re(r"^(\d+\.\d+\.\d+) (.+)$"),
            summary: re(r"^== Summary .+ ==$"),
            section: re(r"^== .+ ==$"),
        }
    }

    /// Classifies a trimmed, non-empty line. Patterns are checked in a fixed
    /// priority order; the first match wins.
    fn classify<'l>(&self, line: &'l str) -> Line<'l> {
        if let Some(caps) = self.category.captures(line) {
            return Line::Category(group(&caps, 1));
        }
        if let Some(caps) = self.subcategory.captures(line) {
            return Line::Subcategory(group(&caps, 1));
        }
        if let Some(caps) = self.rule.captures(line) {
            if let Ok(status) = group(&caps, 1).parse() {
                return Line::Rule {
                    status,
                    id: group(&caps, 2),
                    description: group(&caps, 3),
                };
            }
        }
        if self.remediation_section.is_match(line) {
            return Line::RemediationSection;
        }
        if let Some(caps) = self.remediation_item.captures(line) {
            return Line::RemediationItem {
                id: group(&caps, 1),
                text: group(&caps, 2),
            };
        }
        if self.summary.is_match(line) || self.section.is_match(line) {
            return Line::SectionEnd;
        }
        Line::Text(line)
    }
}

fn group<'l>(caps: &regex::Captures<'l>, i: usize) -> &'l str {
    caps.get(i).map(|m| m.as_str()).unwrap_or_default()
}

// === impl Parser ===

impl Parser {
    fn step(&mut self, line: Line<'_>) {
        trace!(?line, state = ?self.state);
        match line {
            Line::Category(category) => {
                self.category = category.to_string();
                self.state = State::Checks;
            }

            Line::Subcategory(subcategory) => {
                self.subcategory = subcategory.to_string();
                self.state = State::Checks;
            }

            Line::Rule {
                status,
                id,
                description,
            } => {
                self.findings.insert(
                    id.to_string(),
                    ComplianceFinding {
                        plugin: PLUGIN.to_string(),
                        rule_id: id.to_string(),
                        category: self.category.clone(),
                        subcategory: self.subcategory.clone(),
                        description: description.to_string(),
                        status,
                        remediation: String::new(),
                    },
                );
                self.state = State::Checks;
            }

            Line::RemediationSection => {
                self.state = State::Remediations;
            }

            Line::RemediationItem { id, text } => {
                let known = match self.findings.get_mut(id) {
                    Some(finding) => {
                        finding.remediation = text.to_string();
                        true
                    }
                    None => false,
                };
                match (&self.state, known) {
                    (State::Checks, _) => {}
                    (_, true) => self.state = State::Remediation(id.to_string()),
                    (_, false) => {
                        debug!(rule = %id, "Remediation for unknown rule");
                        self.state = State::Remediations;
                    }
                }
            }

            Line::SectionEnd => {
                self.state = State::Checks;
            }

            Line::Text(text) => {
                if let State::Remediation(id) = &self.state {
                    if let Some(finding) = self.findings.get_mut(id) {
                        finding.remediation.push('\n');
                        finding.remediation.push_str(text);
                    }
                }
            }
        }
    }

    fn finish(self) -> Vec<ComplianceFinding> {
        self.findings.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    const REPORT: &str = "
[INFO] 1 Control Plane Security Configuration
[INFO] 1.1 Control Plane Node Configuration Files
[PASS] 1.1.1 Ensure that the API server pod specification file permissions are set to 600 or more restrictive (Automated)
[FAIL] 1.1.12 Ensure that the etcd data directory ownership is set to etcd:etcd (Automated)
[INFO] 1.2 API Server
[WARN] 1.2.1 Ensure that the --anonymous-auth argument is set to false (Manual)

== Remediations master ==
1.1.12 On the etcd server node, get the etcd data directory, passed as an argument --data-dir,
from the command 'ps -ef | grep etcd'.
chown etcd:etcd /var/lib/etcd

1.2.1 Edit the API server pod specification file /etc/kubernetes/manifests/kube-apiserver.yaml
on the control plane node and set the below parameter.
--anonymous-auth=false

== Summary master ==
1 checks PASS
1 checks FAIL
1 checks WARN
0 checks INFO
";

    fn by_id(findings: Vec<ComplianceFinding>) -> HashMap<String, ComplianceFinding> {
        findings
            .into_iter()
            .map(|f| (f.rule_id.clone(), f))
            .collect()
    }

    #[test]
    fn classifies_lines_by_priority() {
        let grammar = Grammar::new();
        assert_eq!(
            grammar.classify("[INFO] 1 Control Plane"),
            Line::Category("1 Control Plane")
        );
        assert_eq!(
            grammar.classify("[INFO] 1.2 API Server"),
            Line::Subcategory("1.2 API Server")
        );
        assert_eq!(
            grammar.classify("[INFO] 4.2.10 Ensure rotation (Manual)"),
            Line::Rule {
                status: Status::Info,
                id: "4.2.10",
                description: "Ensure rotation (Manual)",
            }
        );
        assert_eq!(
            grammar.classify("== Remediations node =="),
            Line::RemediationSection
        );
        assert_eq!(
            grammar.classify("4.2.10 Edit the kubelet config"),
            Line::RemediationItem {
                id: "4.2.10",
                text: "Edit the kubelet config",
            }
        );
        assert_eq!(grammar.classify("== Summary node =="), Line::SectionEnd);
        assert_eq!(grammar.classify("== Summary total =="), Line::SectionEnd);
        assert_eq!(grammar.classify("== Other =="), Line::SectionEnd);
        assert_eq!(
            grammar.classify("[UNKNOWN] 1.1.1 Status"),
            Line::Text("[UNKNOWN] 1.1.1 Status")
        );
    }

    #[test]
    fn assigns_categories_and_remediations() {
        let findings = by_id(parse(REPORT));
        assert_eq!(findings.len(), 3);

        let passed = &findings["1.1.1"];
        assert_eq!(passed.plugin, PLUGIN);
        assert_eq!(passed.status, Status::Pass);
        assert_eq!(passed.category, "1 Control Plane Security Configuration");
        assert_eq!(passed.subcategory, "1.1 Control Plane Node Configuration Files");
        assert_eq!(passed.remediation, "");

        let etcd = &findings["1.1.12"];
        assert_eq!(etcd.status, Status::Fail);
        assert_eq!(
            etcd.remediation,
            "On the etcd server node, get the etcd data directory, passed as an argument --data-dir,\n\
             from the command 'ps -ef | grep etcd'.\n\
             chown etcd:etcd /var/lib/etcd"
        );

        let anon = &findings["1.2.1"];
        assert_eq!(anon.subcategory, "1.2 API Server");
        assert_eq!(anon.status, Status::Warn);
        assert!(anon.remediation.ends_with("\n--anonymous-auth=false"));
    }

    #[test]
    fn joins_multiline_remediation_once() {
        let findings = parse(
            "[INFO] 1 Control Plane\n\
             [INFO] 1.1 Files\n\
             [FAIL] 1.1.1 Ensure permissions\n\
             == Remediations master ==\n\
             1.1.1 Run the below command\n\
             chmod 600 /etc/kubernetes/manifests/kube-apiserver.yaml\n\
             == Summary master ==\n",
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_id, "1.1.1");
        assert_eq!(
            findings[0].remediation,
            "Run the below command\nchmod 600 /etc/kubernetes/manifests/kube-apiserver.yaml"
        );
    }

    #[test]
    fn repeated_rule_overwrites_previous_finding() {
        let findings = parse(
            "[FAIL] 1.1.1 First run\n\
             [PASS] 1.1.1 Second run\n",
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].status, Status::Pass);
        assert_eq!(findings[0].description, "Second run");
    }

    #[test]
    fn orphan_remediation_discards_following_text() {
        let findings = by_id(parse(
            "[FAIL] 1.1.1 Ensure permissions\n\
             == Remediations master ==\n\
             1.1.1 Fix it\n\
             9.9.9 Not a rule that ran\n\
             this text belongs to nothing\n",
        ));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings["1.1.1"].remediation, "Fix it");
    }

    #[test]
    fn text_after_summary_is_discarded() {
        let findings = parse(
            "[FAIL] 1.1.1 Ensure permissions\n\
             == Remediations master ==\n\
             1.1.1 Fix it\n\
             == Summary master ==\n\
             1 checks FAIL\n",
        );
        assert_eq!(findings[0].remediation, "Fix it");
    }

    #[test]
    fn text_outside_remediations_is_discarded() {
        let findings = parse(
            "[FAIL] 1.1.1 Ensure permissions\n\
             some stray output\n",
        );
        assert_eq!(findings[0].remediation, "");
    }

    #[test]
    fn parsing_is_idempotent() {
        let first: HashSet<_> = parse(REPORT).into_iter().collect();
        let second: HashSet<_> = parse(REPORT).into_iter().collect();
        assert_eq!(first, second);
    }
}
