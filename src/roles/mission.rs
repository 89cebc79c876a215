use chrono::{DateTime, Utc};
use serde::Serialize;

/// The top-level orders for one run. Printed verbatim by `--dry-run`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mission {
    pub repo: String,
    pub issue: Option<u64>,
    pub parallel: bool,
    pub workers: usize,
    pub started_at: DateTime<Utc>,
}

impl Mission {
    pub fn new(repo: impl Into<String>, issue: Option<u64>) -> Self {
        Self {
            repo: repo.into(),
            issue,
            parallel: false,
            workers: 1,
            started_at: Utc::now(),
        }
    }

    pub fn parallel(mut self, workers: usize) -> Self {
        self.parallel = true;
        self.workers = workers.max(1);
        self
    }

    pub fn to_text(&self) -> String {
        let mut out = format!(
            "Mission Time: {}\nTarget Repository: {}\n",
            self.started_at.to_rfc3339(),
            self.repo
        );
        let orders: Vec<String> = match self.issue {
            Some(n) => {
                out.push_str(&format!("Specific Issue: #{}\n", n));
                vec![
                    format!("Read issue #{}", n),
                    "Delegate the fix to the developer".into(),
                    "Ensure quality gates are met".into(),
                    "Report when complete".into(),
                ]
            }
            None if self.parallel => vec![
                "Check inbox for assigned issues".into(),
                format!("Assign up to {} issues to parallel workers", self.workers),
                "Wait for every worker to report".into(),
                "Review each PR against the quality gates".into(),
                "Repeat until the inbox is empty".into(),
            ],
            None => vec![
                "Check inbox for assigned issues".into(),
                "Fix them one at a time, highest priority first".into(),
                "Ensure quality gates are met".into(),
                "Repeat until the inbox is empty".into(),
            ],
        };
        out.push_str("\nORDERS:\n");
        for (i, order) in orders.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, order));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_issue_orders() {
        let text = Mission::new("acme/widgets", Some(42)).to_text();
        assert!(text.contains("Target Repository: acme/widgets"));
        assert!(text.contains("Specific Issue: #42"));
        assert!(text.contains("1. Read issue #42"));
    }

    #[test]
    fn test_parallel_orders_name_worker_count() {
        let text = Mission::new("acme/widgets", None).parallel(3).to_text();
        assert!(text.contains("Assign up to 3 issues"));
        assert!(!text.contains("Specific Issue"));
    }
}
