//! `berth rmi`: Remove images together with everything built on them.
//!
//! Each image is planned against a fresh engine snapshot. The plan lists the
//! image, its descendants, and the containers that use any of them. Removing
//! containers needs confirmation unless `--yes` is given.

use std::io::{self, BufRead, Write};

use berth_common::types::ImageId;
use berth_engine::outcome::ExecutionReport;
use berth_graph::DeletionPlan;
use clap::Args;
use serde_json::{Value, json};

use super::{GlobalArgs, connect};
use crate::output;

/// Arguments for the `rmi` command.
#[derive(Args, Debug)]
pub struct RmiArgs {
    /// Image IDs, ID prefixes or tags.
    #[arg(required = true)]
    pub images: Vec<String>,

    /// Remove blocking containers without asking.
    #[arg(short, long)]
    pub yes: bool,

    /// Plan and execute against an in-memory copy of the engine.
    #[arg(long)]
    pub dry_run: bool,

    /// Print plans and outcomes as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Asks until the answer is yes or no. End of input counts as no.
///
/// # Errors
///
/// Returns an error if reading or writing the terminal fails.
pub fn confirm(input: &mut impl BufRead, prompt: &mut impl Write) -> io::Result<bool> {
    loop {
        write!(prompt, "Continue? (y/n) : ")?;
        prompt.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(false);
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => {}
        }
    }
}

fn plan_lines(plan: &DeletionPlan) -> Vec<String> {
    let mut lines = vec![format!("Removing image {}", plan.target.short())];
    if plan.images.len() > 1 {
        let dependents: Vec<&str> = plan
            .images
            .iter()
            .filter(|id| **id != plan.target)
            .map(ImageId::short)
            .collect();
        lines.push(format!("Dependent images: {}", dependents.join(" ")));
    }
    if plan.requires_container_removal() {
        lines.push("The following containers would also be stopped and deleted.".into());
        lines.push(String::new());
        lines.extend(output::blocking_rows(&plan.containers));
        lines.push(String::new());
    }
    lines
}

fn plan_json(plan: &DeletionPlan, confirmed: bool, report: &ExecutionReport) -> Value {
    json!({
        "target": plan.target.as_str(),
        "images": plan.images.iter().map(ImageId::as_str).collect::<Vec<_>>(),
        "containers": plan.containers.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
        "confirmed": confirmed,
        "steps": report.steps,
    })
}

/// Executes the `rmi` command.
///
/// # Errors
///
/// Returns an error if the engine cannot be reached, an image reference
/// does not resolve, or any removal step fails.
pub fn execute(args: RmiArgs, global: &GlobalArgs) -> anyhow::Result<()> {
    let config = global.config()?;
    let mut console = connect(&config)?;
    if args.dry_run {
        console = console.dry_run()?;
        tracing::info!("dry run, the engine is not modified");
    }

    let stdin = io::stdin();
    let mut documents = Vec::new();
    let mut failed = 0_usize;

    for reference in &args.images {
        let plan = match console.plan_deletion(reference) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!(image = %reference, error = %e, "cannot plan removal");
                failed += 1;
                continue;
            }
        };
        if !args.json {
            output::print_lines(plan_lines(&plan));
        }

        let confirmed = !plan.requires_container_removal()
            || args.yes
            || confirm(&mut stdin.lock(), &mut io::stderr())?;
        let report = if confirmed {
            console.execute_plan(&plan)
        } else {
            ExecutionReport::default()
        };

        failed += report.failures().count();
        if args.json {
            documents.push(plan_json(&plan, confirmed, &report));
        } else if confirmed {
            output::print_lines(&report.steps);
        } else {
            output::print_lines(["Not deleting ..."]);
        }
    }

    if args.json {
        output::print_lines([serde_json::to_string_pretty(&documents)?]);
    }
    if failed > 0 {
        anyhow::bail!("{failed} removal(s) failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use berth_common::types::{ContainerRecord, ImageRecord};
    use berth_engine::client::memory::MemoryEngine;
    use berth_engine::console::Console;

    use super::*;

    fn answer(text: &str) -> (bool, String) {
        let mut prompt = Vec::new();
        let yes = confirm(&mut Cursor::new(text), &mut prompt).expect("confirm");
        (yes, String::from_utf8(prompt).expect("utf8"))
    }

    #[test]
    fn confirm_accepts_yes() {
        assert!(answer("Y\n").0);
        assert!(answer("yes\n").0);
    }

    #[test]
    fn confirm_repeats_until_valid() {
        let (yes, prompt) = answer("maybe\nn\n");
        assert!(!yes);
        assert_eq!(prompt.matches("Continue? (y/n)").count(), 2);
    }

    #[test]
    fn confirm_treats_eof_as_no() {
        assert!(!answer("").0);
    }

    fn console() -> Console {
        let base = {
            let mut image = ImageRecord::new("sha256:aaaa0001", None);
            image.repo_tags = vec!["base:1".into()];
            image
        };
        let app = {
            let mut image = ImageRecord::new("sha256:aaaa0002", Some("sha256:aaaa0001"));
            image.repo_tags = vec!["app:1".into()];
            image
        };
        let mut web = ContainerRecord::new("c0ffee000001", "sha256:aaaa0002").running_with_pid(10);
        web.name = "web".into();
        web.image = "app:1".into();
        Console::new(Arc::new(MemoryEngine::from_snapshot(vec![base, app], vec![web])))
    }

    #[test]
    fn plan_lines_list_dependents_and_blockers() {
        let plan = console().plan_deletion("base:1").expect("plan");
        let lines = plan_lines(&plan);
        assert_eq!(lines[0], "Removing image aaaa0001");
        assert_eq!(lines[1], "Dependent images: aaaa0002");
        assert!(lines.iter().any(|l| l.starts_with("c0ffee00") && l.contains("web")));
    }

    #[test]
    fn plan_json_reports_steps() {
        let console = console();
        let plan = console.plan_deletion("base:1").expect("plan");
        let report = console.execute_plan(&plan);
        let doc = plan_json(&plan, true, &report);
        assert_eq!(doc["target"], "sha256:aaaa0001");
        assert_eq!(doc["images"], json!(["sha256:aaaa0002", "sha256:aaaa0001"]));
        assert_eq!(doc["containers"], json!(["c0ffee000001"]));
        assert_eq!(doc["steps"][0]["action"], "stop_container");
        assert!(report.succeeded());
    }
}
