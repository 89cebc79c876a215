//! Text markers at the agent boundary.
//!
//! Agents signal completion with a fixed vocabulary inside free-form output.
//! These parsers turn that text into the tagged reports the rest of the crate
//! uses; nothing past this module branches on raw text.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use super::{Delivery, DeveloperReport, QaReport, QaVerdict};
use crate::worker::{WorkerOutcome, WorkerResult};

pub const DEVELOPMENT_COMPLETE: &str = "DEVELOPMENT_COMPLETE";
pub const DEVELOPMENT_BLOCKED: &str = "DEVELOPMENT_BLOCKED";
pub const VERIFICATION_PASS: &str = "VERIFICATION_STATUS: PASS";
pub const VERIFICATION_FAIL: &str = "VERIFICATION_STATUS: FAIL";

const RESULT_RULE: &str = "══════════════════════════════════════════════════════════════";
const FEEDBACK_LIMIT: usize = 3000;

static BRANCH_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*-?\s*Branch:\s*`?([^\s`]+)`?").unwrap());
static PR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*-?\s*PR(?:_NUMBER)?:\s*#?(\d+)").unwrap());
static URL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*-?\s*(?:PR_)?URL:\s*(\S+)").unwrap());
static ISSUE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*-?\s*Issue:\s*(.+)$").unwrap());
static COVERAGE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*[-✅]*\s*(?:Coverage|Current):\s*(\d+(?:\.\d+)?)\s*%").unwrap()
});
static RESULT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"RESULT FROM IssueWorker_worker_(\d+):\s*\n\s*STATUS:\s*WORKER_([A-Z]+)").unwrap()
});

fn capture<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
    re.captures(text)?.get(1).map(|m| m.as_str().trim())
}

/// Parse a developer hand-back. The last marker in the text wins; no marker at
/// all counts as blocked, since nothing was confirmed delivered.
pub fn parse_developer_output(text: &str) -> DeveloperReport {
    let complete = text.rfind(DEVELOPMENT_COMPLETE);
    let blocked = text.rfind(DEVELOPMENT_BLOCKED);

    match (complete, blocked) {
        (Some(c), b) if b.is_none_or(|b| c > b) => {
            let tail = &text[c..];
            DeveloperReport::Complete(Delivery {
                branch: capture(&BRANCH_LINE, tail).map(str::to_string),
                pr_number: capture(&PR_LINE, tail).and_then(|n| n.parse().ok()),
                pr_url: capture(&URL_LINE, tail).map(str::to_string),
                summary: tail[DEVELOPMENT_COMPLETE.len()..]
                    .trim_start_matches(':')
                    .trim()
                    .to_string(),
            })
        }
        (_, Some(b)) => {
            let tail = &text[b..];
            let reason = capture(&ISSUE_LINE, tail)
                .map(str::to_string)
                .unwrap_or_else(|| {
                    tail[DEVELOPMENT_BLOCKED.len()..]
                        .trim_start_matches(':')
                        .trim()
                        .to_string()
                });
            DeveloperReport::Blocked {
                reason: if reason.is_empty() {
                    "developer reported blocked without detail".to_string()
                } else {
                    reason
                },
            }
        }
        _ => DeveloperReport::Blocked {
            reason: "developer returned without a completion marker".to_string(),
        },
    }
}

/// Parse a QA hand-back. A missing verdict is a failure.
pub fn parse_qa_output(text: &str) -> QaReport {
    let pass = text.rfind(VERIFICATION_PASS);
    let fail = text.rfind(VERIFICATION_FAIL);
    let coverage_percent = capture(&COVERAGE_LINE, text).and_then(|v| v.parse().ok());

    match (pass, fail) {
        (Some(p), f) if f.is_none_or(|f| p > f) => QaReport {
            verdict: QaVerdict::Pass,
            coverage_percent,
            feedback: String::new(),
        },
        (_, Some(f)) => {
            let body = text[f + VERIFICATION_FAIL.len()..].trim();
            QaReport {
                verdict: QaVerdict::Fail,
                coverage_percent,
                feedback: crate::util::truncate_output(body, FEEDBACK_LIMIT),
            }
        }
        _ => QaReport {
            verdict: QaVerdict::Fail,
            coverage_percent,
            feedback: "QA returned without a verification status".to_string(),
        },
    }
}

/// The labelled block a worker leaves in transcripts.
pub fn render_result_block(result: &WorkerResult) -> String {
    let mut lines = vec![
        RESULT_RULE.to_string(),
        format!("RESULT FROM IssueWorker_worker_{}:", result.worker),
        format!("STATUS: WORKER_{}", result.outcome.label()),
    ];
    if let Some(issue) = result.issue {
        lines.push(format!("ISSUE: #{}", issue));
    }
    if let Some(pr) = result.pr_number {
        lines.push(format!("PR_NUMBER: #{}", pr));
    }
    if let Some(url) = &result.pr_url {
        lines.push(format!("PR_URL: {}", url));
    }
    if let Some(qa) = result.qa_passed {
        lines.push(format!("QA_STATUS: {}", if qa { "PASSED" } else { "FAILED" }));
    }
    if result.attempts > 0 {
        lines.push(format!("ATTEMPTS: {}", result.attempts));
    }
    if let Some(reason) = &result.reason {
        lines.push(format!("REASON: {}", reason));
    }
    lines.push(RESULT_RULE.to_string());
    lines.join("\n")
}

/// Outcome label per worker index from transcript text. Unknown labels are skipped.
pub fn parse_result_blocks(text: &str) -> BTreeMap<usize, WorkerOutcome> {
    RESULT_BLOCK
        .captures_iter(text)
        .filter_map(|caps| {
            let worker = caps.get(1)?.as_str().parse().ok()?;
            let outcome = WorkerOutcome::from_label(caps.get(2)?.as_str())?;
            Some((worker, outcome))
        })
        .collect()
}
