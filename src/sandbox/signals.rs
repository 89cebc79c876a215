//! Test-count and coverage extraction from raw tool output.
//!
//! Every ecosystem is one row in a table. Count rows are all applied and their
//! contributions summed (a run that prints both a pytest and a cargo summary
//! reports the sum). Coverage rows are tried in order and the first match wins.
//!
//! A counter that no row touched stays `None`: "could not determine" is kept
//! apart from "measured zero".

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Which counter a rule feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tally {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy)]
enum RuleShape {
    /// First match, capture group 1 added to one counter.
    Single(Tally),
    /// Every occurrence of the pattern adds one.
    Occurrences(Tally),
    /// Maven/Gradle `Tests run: R, Failures: F, Errors: E, Skipped: S`.
    MavenSummary,
    /// cargo `N passed; F failed; I ignored`.
    CargoTriple,
}

struct CountRule {
    ecosystem: &'static str,
    regex: Regex,
    shape: RuleShape,
}

fn count_rule(ecosystem: &'static str, pattern: &str, shape: RuleShape) -> CountRule {
    CountRule {
        ecosystem,
        regex: Regex::new(pattern).unwrap(),
        shape,
    }
}

static COUNT_RULES: LazyLock<Vec<CountRule>> = LazyLock::new(|| {
    use RuleShape::*;
    use Tally::*;
    vec![
        count_rule("pytest", r"(\d+) passed", Single(Passed)),
        count_rule("pytest", r"(\d+) failed", Single(Failed)),
        count_rule("pytest", r"(\d+) skipped", Single(Skipped)),
        count_rule("jest", r"Tests:\s*(\d+) passed", Single(Passed)),
        count_rule("jest", r"Tests:.*?(\d+) failed", Single(Failed)),
        count_rule("mocha", r"(\d+) passing", Single(Passed)),
        count_rule("mocha", r"(\d+) failing", Single(Failed)),
        count_rule("mocha", r"(\d+) pending", Single(Skipped)),
        count_rule(
            "maven",
            r"Tests run:\s*(\d+),\s*Failures:\s*(\d+),\s*Errors:\s*(\d+),\s*Skipped:\s*(\d+)",
            MavenSummary,
        ),
        count_rule("go", r"--- PASS:", Occurrences(Passed)),
        count_rule("go", r"--- FAIL:", Occurrences(Failed)),
        count_rule("go", r"--- SKIP:", Occurrences(Skipped)),
        count_rule(
            "cargo",
            r"test result:.*?(\d+) passed;\s*(\d+) failed;\s*(\d+) ignored",
            CargoTriple,
        ),
        count_rule("dotnet", r"Passed:\s*(\d+)", Single(Passed)),
        count_rule("dotnet", r"Failed:\s*(\d+)", Single(Failed)),
        count_rule("dotnet", r"Skipped:\s*(\d+),\s*Total:", Single(Skipped)),
    ]
});

/// Coverage patterns in priority order; capture group 1 is the percentage.
static COVERAGE_RULES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("coverage.py total", r"TOTAL\s+\d+\s+\d+\s+(\d+)%"),
        ("istanbul table", r"All files\s*\|\s*([\d.]+)"),
        ("istanbul statements", r"Statements\s*:\s*([\d.]+)%"),
        ("istanbul lines", r"Lines\s*:\s*([\d.]+)%"),
        ("go total", r"total:\s*\(statements\)\s*([\d.]+)%"),
        ("go package", r"coverage:\s*([\d.]+)%\s*of\s*statements"),
        ("generic", r"coverage:\s*(\d+(?:\.\d+)?)%"),
        ("generic suffix", r"(\d+(?:\.\d+)?)\s*%\s*coverage"),
        ("jacoco", r"Line coverage:\s*([\d.]+)%"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(&format!("(?i){}", pattern)).unwrap()))
    .collect()
});

/// Test counts extracted from output. `None` means no pattern matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TestCounts {
    pub passed: Option<u32>,
    pub failed: Option<u32>,
    pub skipped: Option<u32>,
}

impl TestCounts {
    fn add(&mut self, tally: Tally, n: u32) {
        let slot = match tally {
            Tally::Passed => &mut self.passed,
            Tally::Failed => &mut self.failed,
            Tally::Skipped => &mut self.skipped,
        };
        *slot = Some(slot.unwrap_or(0).saturating_add(n));
    }

    /// True when at least one counter was determined.
    pub fn is_known(&self) -> bool {
        self.passed.is_some() || self.failed.is_some() || self.skipped.is_some()
    }
}

/// Everything extractable from one run's output.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OutputSignals {
    pub tests: TestCounts,
    pub coverage_percent: Option<f64>,
}

fn group_u32(caps: &regex::Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx).and_then(|m| m.as_str().parse().ok())
}

impl CountRule {
    fn apply(&self, text: &str, counts: &mut TestCounts) {
        match self.shape {
            RuleShape::Single(tally) => {
                if let Some(n) = self.regex.captures(text).and_then(|c| group_u32(&c, 1)) {
                    counts.add(tally, n);
                }
            }
            RuleShape::Occurrences(tally) => {
                let n = self.regex.find_iter(text).count() as u32;
                if n > 0 {
                    counts.add(tally, n);
                }
            }
            RuleShape::MavenSummary => {
                let Some(caps) = self.regex.captures(text) else {
                    return;
                };
                let (Some(run), Some(failures), Some(errors), Some(skip)) = (
                    group_u32(&caps, 1),
                    group_u32(&caps, 2),
                    group_u32(&caps, 3),
                    group_u32(&caps, 4),
                ) else {
                    return;
                };
                counts.add(
                    Tally::Passed,
                    run.saturating_sub(failures + errors + skip),
                );
                counts.add(Tally::Failed, failures + errors);
                counts.add(Tally::Skipped, skip);
            }
            RuleShape::CargoTriple => {
                let Some(caps) = self.regex.captures(text) else {
                    return;
                };
                let (Some(passed), Some(failed), Some(ignored)) =
                    (group_u32(&caps, 1), group_u32(&caps, 2), group_u32(&caps, 3))
                else {
                    return;
                };
                counts.add(Tally::Passed, passed);
                counts.add(Tally::Failed, failed);
                counts.add(Tally::Skipped, ignored);
            }
        }
    }
}

/// Sum test counts across every known ecosystem.
pub fn parse_test_counts(text: &str) -> TestCounts {
    let mut counts = TestCounts::default();
    for rule in COUNT_RULES.iter() {
        let before = counts;
        rule.apply(text, &mut counts);
        if before != counts {
            tracing::trace!(ecosystem = rule.ecosystem, "test count pattern matched");
        }
    }
    counts
}

/// First coverage percentage found, if any.
pub fn parse_coverage(text: &str) -> Option<f64> {
    COVERAGE_RULES.iter().find_map(|(name, regex)| {
        let value = regex.captures(text)?.get(1)?.as_str().parse::<f64>().ok()?;
        tracing::trace!(pattern = *name, value, "coverage pattern matched");
        Some(value)
    })
}

/// Extract all signals from stdout and stderr together.
pub fn extract_signals(stdout: &str, stderr: &str) -> OutputSignals {
    let combined = format!("{}\n{}", stdout, stderr);
    OutputSignals {
        tests: parse_test_counts(&combined),
        coverage_percent: parse_coverage(&combined),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pytest_summary_with_coverage_table() {
        let out = "===== 12 passed, 2 failed in 3.21s =====\n\
                   Name    Stmts   Miss  Cover\n\
                   TOTAL 100 20 80%";
        let signals = extract_signals(out, "");
        assert_eq!(signals.tests.passed, Some(12));
        assert_eq!(signals.tests.failed, Some(2));
        assert_eq!(signals.tests.skipped, None);
        assert_eq!(signals.coverage_percent, Some(80.0));
    }

    #[test]
    fn test_nothing_matched_is_unknown_not_zero() {
        let signals = extract_signals("build finished", "warning: unused import");
        assert!(!signals.tests.is_known());
        assert_eq!(signals.tests.failed, None);
        assert_eq!(signals.coverage_percent, None);
    }

    #[test]
    fn test_measured_zero_failures_is_some_zero() {
        let counts = parse_test_counts("5 passed, 0 failed");
        assert_eq!(counts.failed, Some(0));
    }

    #[test]
    fn test_jest_summary() {
        let counts = parse_test_counts("Tests:       1 failed, 9 passed, 10 total");
        // "1 failed" satisfies both the pytest and the jest rule.
        assert_eq!(counts.passed, Some(9));
        assert_eq!(counts.failed, Some(2));
    }

    #[test]
    fn test_mocha_summary() {
        let counts = parse_test_counts("  14 passing (2s)\n  1 failing\n  3 pending");
        assert_eq!(counts.passed, Some(14));
        assert_eq!(counts.failed, Some(1));
        assert_eq!(counts.skipped, Some(3));
    }

    #[test]
    fn test_maven_summary() {
        let counts = parse_test_counts("Tests run: 20, Failures: 2, Errors: 1, Skipped: 3");
        assert_eq!(counts.passed, Some(14));
        assert_eq!(counts.failed, Some(3));
        assert_eq!(counts.skipped, Some(3));
    }

    #[test]
    fn test_go_markers_are_counted() {
        let out = "--- PASS: TestA (0.00s)\n--- PASS: TestB (0.00s)\n--- FAIL: TestC (0.01s)\n--- SKIP: TestD";
        let counts = parse_test_counts(out);
        assert_eq!(counts.passed, Some(2));
        assert_eq!(counts.failed, Some(1));
        assert_eq!(counts.skipped, Some(1));
    }

    #[test]
    fn test_cargo_summary_adds_to_generic_rule() {
        let counts = parse_test_counts("test result: ok. 7 passed; 0 failed; 2 ignored; 0 measured");
        // pytest-style "7 passed" and "0 failed" also match.
        assert_eq!(counts.passed, Some(14));
        assert_eq!(counts.failed, Some(0));
        assert_eq!(counts.skipped, Some(2));
    }

    #[test]
    fn test_dotnet_summary() {
        let counts = parse_test_counts("Failed!  - Failed:     1, Passed:    41, Skipped:     0, Total:    42");
        assert_eq!(counts.passed, Some(41));
        assert_eq!(counts.failed, Some(1));
        assert_eq!(counts.skipped, Some(0));
    }

    #[test]
    fn test_coverage_istanbul_table() {
        let out = "File      | % Stmts | % Branch\nAll files |   85.71 |    50";
        assert_eq!(parse_coverage(out), Some(85.71));
    }

    #[test]
    fn test_coverage_statements_summary() {
        assert_eq!(
            parse_coverage("Statements   : 91.5% ( 183/200 )"),
            Some(91.5)
        );
    }

    #[test]
    fn test_coverage_go_output() {
        assert_eq!(
            parse_coverage("ok  pkg/foo  0.01s  coverage: 72.3% of statements"),
            Some(72.3)
        );
    }

    #[test]
    fn test_coverage_generic_suffix_fallback() {
        assert_eq!(parse_coverage("achieved 64% coverage overall"), Some(64.0));
    }

    #[test]
    fn test_coverage_first_rule_wins() {
        let out = "TOTAL 50 5 90%\nCoverage: 10%";
        assert_eq!(parse_coverage(out), Some(90.0));
    }

    #[test]
    fn test_signals_read_stderr_too() {
        let signals = extract_signals("", "3 passed");
        assert_eq!(signals.tests.passed, Some(3));
    }
}
