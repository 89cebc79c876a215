use console::style;

use nightwatch::roles::Mission;
use nightwatch::sequencer::{MissionReport, MissionStatus};

const RULE: &str = "─────────────────────────────────────────";

pub fn banner(mission: &Mission, dry_run: bool) {
    println!();
    println!("{}", style("Nightwatch").bold().cyan());
    println!("{}", RULE);
    println!("Target:  {}", mission.repo);
    match mission.issue {
        Some(n) => println!("Issue:   #{}", n),
        None => println!("Issue:   Auto-detect from inbox"),
    }
    let mode = if dry_run {
        "dry run".to_string()
    } else if mission.parallel {
        format!("parallel ({} workers)", mission.workers)
    } else {
        "sequential".to_string()
    };
    println!("Mode:    {}", mode);
    println!("Started: {}", mission.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("{}", RULE);
}

pub fn config_errors(problems: &[String]) {
    eprintln!("{}", style("Configuration Error:").red().bold());
    for problem in problems {
        eprintln!("  - {}", problem);
    }
}

pub fn verdict(report: &MissionReport) {
    println!();
    match report.status {
        MissionStatus::DryRun => {
            println!("{}", style("DRY RUN COMPLETE").green().bold());
            if let Some(text) = &report.mission {
                println!("\n{}", text);
            }
        }
        MissionStatus::Complete | MissionStatus::Idle => {
            println!("{}", style("MISSION COMPLETE").green().bold());
            println!("\n{}", report.summary);
            for url in report.pr_urls() {
                println!("PR: {}", url);
            }
            println!("Duration: {:.1}s", report.duration.as_secs_f64());
        }
        MissionStatus::Failed => {
            println!("{}", style("MISSION FAILED").red().bold());
            if !report.summary.is_empty() {
                println!("\n{}", report.summary);
            }
            if let Some(error) = &report.error {
                println!("{} {}", style("Error:").red().bold(), error);
            }
            println!("Duration: {:.1}s", report.duration.as_secs_f64());
        }
    }
}
