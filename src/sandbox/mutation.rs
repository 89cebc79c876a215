//! Mutation-testing results.
//!
//! Stryker output is read first; mutmut-style counters are the fallback when
//! no Stryker total is found. The score is derived as
//! `killed / (total - no_coverage) * 100` whenever the counts allow it, falls
//! back to a reported "Mutation score: N%" line, and is otherwise `Unknown`.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use super::ExecutionResult;

static STRYKER_TOTAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"with\s+(\d+)\s+mutant").unwrap());

static STRYKER_PROGRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)/(\d+)\s+tested\s*\((\d+)\s+survived,?\s*(\d+)?\s*timed\s*out\)").unwrap()
});

static REPORTED_SCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Mutation\s+score[:\s]+(\d+(?:\.\d+)?)\s*%").unwrap());

static NO_COVERAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[NoCoverage\]").unwrap());

fn first_of(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){}", p)).unwrap())
        .collect()
}

static FALLBACK_TOTAL: LazyLock<Vec<Regex>> =
    LazyLock::new(|| first_of(&[r"(\d+)\s*mutants", r"Total:\s*(\d+)", r"(\d+)\s*mutations"]));
static FALLBACK_KILLED: LazyLock<Vec<Regex>> =
    LazyLock::new(|| first_of(&[r"Killed:\s*(\d+)", r"(\d+)\s*killed", r"(\d+)\s*detected"]));
static FALLBACK_SURVIVED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    first_of(&[r"Survived:\s*(\d+)", r"(\d+)\s*survived", r"(\d+)\s*undetected"])
});
static FALLBACK_SCORE: LazyLock<Vec<Regex>> =
    LazyLock::new(|| first_of(&[r"Mutation\s*score:\s*([\d.]+)%?", r"Score:\s*([\d.]+)%?"]));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationStatus {
    Completed,
    /// Baseline tests failed, so no mutant was run.
    Skipped,
}

/// A mutation score, or an explicit "could not determine".
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum MutationScore {
    Measured(f64),
    Unknown,
}

impl MutationScore {
    pub fn value(&self) -> Option<f64> {
        match self {
            MutationScore::Measured(v) => Some(*v),
            MutationScore::Unknown => None,
        }
    }
}

impl std::fmt::Display for MutationScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationScore::Measured(v) => write!(f, "{:.1}%", v),
            MutationScore::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MutationCounts {
    pub total: u32,
    pub killed: u32,
    pub survived: u32,
    pub timed_out: u32,
    pub no_coverage: u32,
}

fn capture_u32(re: &Regex, text: &str) -> Option<u32> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

fn first_u32(patterns: &[Regex], text: &str) -> Option<u32> {
    patterns.iter().find_map(|re| capture_u32(re, text))
}

fn first_f64(patterns: &[Regex], text: &str) -> Option<f64> {
    patterns
        .iter()
        .find_map(|re| re.captures(text)?.get(1)?.as_str().parse().ok())
}

/// Parse mutant counts and derive the score.
pub fn parse_mutation_output(text: &str) -> (MutationCounts, MutationScore) {
    let mut counts = MutationCounts::default();
    let mut killed_known = false;

    if let Some(total) = capture_u32(&STRYKER_TOTAL, text) {
        counts.total = total;
    }
    if let Some(caps) = STRYKER_PROGRESS.captures(text) {
        let num = |i: usize| {
            caps.get(i)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .unwrap_or(0)
        };
        let tested = num(1);
        if counts.total == 0 {
            counts.total = num(2);
        }
        counts.survived = num(3);
        counts.timed_out = num(4);
        counts.killed = tested.saturating_sub(counts.survived + counts.timed_out);
        killed_known = true;
    }
    let mut reported = REPORTED_SCORE
        .captures(text)
        .and_then(|c| c.get(1)?.as_str().parse::<f64>().ok());
    counts.no_coverage = NO_COVERAGE.find_iter(text).count() as u32;

    if counts.total == 0 {
        if let Some(total) = first_u32(&FALLBACK_TOTAL, text) {
            counts.total = total;
        }
        if let Some(killed) = first_u32(&FALLBACK_KILLED, text) {
            counts.killed = killed;
            killed_known = true;
        }
        if let Some(survived) = first_u32(&FALLBACK_SURVIVED, text) {
            counts.survived = survived;
        }
        if reported.is_none() {
            reported = first_f64(&FALLBACK_SCORE, text);
        }
    }

    let effective = counts.total.saturating_sub(counts.no_coverage);
    let score = if killed_known && effective > 0 {
        MutationScore::Measured(counts.killed as f64 / effective as f64 * 100.0)
    } else if let Some(value) = reported {
        MutationScore::Measured(value)
    } else {
        MutationScore::Unknown
    };

    (counts, score)
}

/// Outcome of one mutation-testing run on a branch.
#[derive(Debug, Clone, Serialize)]
pub struct MutationResult {
    pub status: MutationStatus,
    pub counts: MutationCounts,
    pub score: MutationScore,
    /// The baseline run when skipped, otherwise the mutation run.
    pub execution: ExecutionResult,
}

impl MutationResult {
    pub fn skipped(baseline: ExecutionResult) -> Self {
        Self {
            status: MutationStatus::Skipped,
            counts: MutationCounts::default(),
            score: MutationScore::Unknown,
            execution: baseline,
        }
    }

    /// Build from a run whose output has not been truncated yet.
    pub fn from_run(execution: ExecutionResult) -> Self {
        let combined = format!("{}\n{}", execution.stdout, execution.stderr);
        let (counts, score) = parse_mutation_output(&combined);
        Self {
            status: MutationStatus::Completed,
            counts,
            score,
            execution,
        }
    }

    /// `None` when skipped or the score is unknown.
    pub fn meets(&self, min_score: f64) -> Option<bool> {
        match (self.status, self.score) {
            (MutationStatus::Completed, MutationScore::Measured(v)) => Some(v >= min_score),
            _ => None,
        }
    }

    pub fn to_report(&self, min_score: f64) -> String {
        if self.status == MutationStatus::Skipped {
            return format!(
                "## Mutation Testing Skipped\n\n**MUTATION_STATUS: SKIPPED**\n\n\
                 **Reason:** Baseline tests failed. Mutation testing needs a passing baseline.\n\n\
                 ### Baseline Test Output\n```\n{}\n```\n{}",
                self.execution.stdout,
                if self.execution.stderr.is_empty() {
                    String::new()
                } else {
                    format!("### Errors\n```\n{}\n```\n", self.execution.stderr)
                }
            );
        }
        let verdict = match self.meets(min_score) {
            Some(true) => "PASSED",
            Some(false) => "NEEDS_IMPROVEMENT",
            None => "UNKNOWN",
        };
        format!(
            "## Mutation Testing Report\n\n**MUTATION_STATUS: {}**\n**Mutation Score:** {}\n\
             **Required Score:** {:.0}%\n\n### Mutant Summary\n- Total: {}\n- Killed: {}\n\
             - Survived: {}\n- Timed Out: {}\n- Not Covered: {}\n\n### Raw Output\n```\n{}\n```\n",
            verdict,
            self.score,
            min_score,
            self.counts.total,
            self.counts.killed,
            self.counts.survived,
            self.counts.timed_out,
            self.counts.no_coverage,
            self.execution.stdout,
        )
    }
}
