//! Final quality gate. Every criterion is checked and reported; any one failing
//! rejects the PR with itemized feedback.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::github::{CiStatus, PrRecord, is_valid_github_token};
use crate::sandbox::MutationScore;

static CONFLICT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:<{7}|={7}|>{7})(?:\s|$)").unwrap());
static AWS_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bAKIA[0-9A-Z]{16}\b").unwrap());
static TOKEN_CANDIDATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9_]{24,}\b").unwrap());
static PY_DEBUG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:breakpoint\(\)|import i?pdb|(?:i?pdb)\.set_trace\(\))").unwrap()
});
static JS_DEBUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:debugger;?|console\.log\()").unwrap());
static RS_DEBUG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bdbg!\(").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateThresholds {
    pub min_coverage: f64,
    pub min_mutation_score: f64,
    pub require_mutation: bool,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            min_coverage: 80.0,
            min_mutation_score: 60.0,
            require_mutation: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    MergeConflict,
    Ci,
    Coverage,
    Mutation,
    CodeQuality,
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Criterion::MergeConflict => "Merge conflicts",
            Criterion::Ci => "CI",
            Criterion::Coverage => "Coverage",
            Criterion::Mutation => "Mutation score",
            Criterion::CodeQuality => "Code quality",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateFinding {
    pub criterion: Criterion,
    pub message: String,
    pub file: Option<String>,
}

impl GateFinding {
    fn new(criterion: Criterion, message: impl Into<String>) -> Self {
        Self {
            criterion,
            message: message.into(),
            file: None,
        }
    }

    fn in_file(criterion: Criterion, file: &str, message: impl Into<String>) -> Self {
        Self {
            criterion,
            message: message.into(),
            file: Some(file.to_string()),
        }
    }
}

/// What the gate looks at for one PR.
#[derive(Debug, Clone)]
pub struct GateInput<'a> {
    pub pr: &'a PrRecord,
    /// Settled CI status; the PR record's may be stale.
    pub ci: CiStatus,
    pub coverage_percent: Option<f64>,
    pub mutation: Option<MutationScore>,
    /// `(path, content)` of changed files at the PR head.
    pub files: &'a [(String, String)],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GateVerdict {
    pub findings: Vec<GateFinding>,
    /// Noted but not blocking.
    pub warnings: Vec<String>,
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        self.findings.is_empty()
    }

    /// Itemized comment body for the developer.
    pub fn to_feedback(&self, pr_number: u64) -> String {
        let mut out = format!(
            "## Code Review Feedback\n\nPR #{} did not pass the quality gate. Please address each item:\n\n",
            pr_number
        );
        for (i, finding) in self.findings.iter().enumerate() {
            match &finding.file {
                Some(file) => out.push_str(&format!(
                    "{}. **{}** (`{}`): {}\n",
                    i + 1,
                    finding.criterion,
                    file,
                    finding.message
                )),
                None => out.push_str(&format!("{}. **{}**: {}\n", i + 1, finding.criterion, finding.message)),
            }
        }
        if !self.warnings.is_empty() {
            out.push_str("\n**Notes:**\n");
            for w in &self.warnings {
                out.push_str(&format!("- {}\n", w));
            }
        }
        out
    }
}

/// Apply every criterion. Pure: all remote reads happen before this.
pub fn evaluate(input: &GateInput<'_>, thresholds: &GateThresholds) -> GateVerdict {
    let mut verdict = GateVerdict::default();

    match input.pr.mergeable {
        Some(false) => verdict.findings.push(GateFinding::new(
            Criterion::MergeConflict,
            format!(
                "Branch `{}` conflicts with `{}`. Rebase or merge the base branch and resolve the conflicts",
                input.pr.head_branch, input.pr.base_branch
            ),
        )),
        None => verdict
            .warnings
            .push("Mergeability not computed yet by the platform".to_string()),
        Some(true) => {}
    }

    if input.ci != CiStatus::Success {
        verdict.findings.push(GateFinding::new(
            Criterion::Ci,
            format!("CI is `{}`, it must be green before approval", input.ci),
        ));
    }

    match input.coverage_percent {
        Some(c) if c >= thresholds.min_coverage => {}
        Some(c) => verdict.findings.push(GateFinding::new(
            Criterion::Coverage,
            format!(
                "Coverage {:.1}% is below the required {:.1}% (gap {:.1}%). Add tests for the uncovered paths",
                c,
                thresholds.min_coverage,
                thresholds.min_coverage - c
            ),
        )),
        None => verdict.findings.push(GateFinding::new(
            Criterion::Coverage,
            "Coverage could not be measured. Make the test command print a coverage summary",
        )),
    }

    if thresholds.require_mutation {
        match input.mutation {
            Some(MutationScore::Measured(s)) if s >= thresholds.min_mutation_score => {}
            Some(MutationScore::Measured(s)) => verdict.findings.push(GateFinding::new(
                Criterion::Mutation,
                format!(
                    "Mutation score {:.1}% is below the required {:.1}%. Strengthen assertions so surviving mutants are killed",
                    s, thresholds.min_mutation_score
                ),
            )),
            Some(MutationScore::Unknown) | None => verdict.findings.push(GateFinding::new(
                Criterion::Mutation,
                "Mutation score unknown. The baseline must pass and the mutation tool must report its counts",
            )),
        }
    }

    for (path, content) in input.files {
        verdict.findings.extend(read_through(path, content));
    }

    verdict
}

/// Line-level problems in one changed file.
pub fn read_through(path: &str, content: &str) -> Vec<GateFinding> {
    let mut findings = Vec::new();

    if CONFLICT_MARKER.is_match(content) {
        findings.push(GateFinding::in_file(
            Criterion::CodeQuality,
            path,
            "Unresolved merge conflict markers",
        ));
    }

    let leaked_token = TOKEN_CANDIDATE
        .find_iter(content)
        .any(|m| is_valid_github_token(m.as_str()));
    if leaked_token || AWS_KEY.is_match(content) {
        findings.push(GateFinding::in_file(
            Criterion::CodeQuality,
            path,
            "Hard-coded credential. Move it to a secret and reference it through the environment",
        ));
    }

    let ext = path.rsplit_once('.').map(|(_, e)| e).unwrap_or_default();
    let debug = match ext {
        "py" => PY_DEBUG.is_match(content),
        "js" | "jsx" | "ts" | "tsx" => JS_DEBUG.is_match(content),
        "rs" => RS_DEBUG.is_match(content),
        _ => false,
    };
    if debug {
        findings.push(GateFinding::in_file(
            Criterion::CodeQuality,
            path,
            "Leftover debug statement",
        ));
    }

    findings
}
