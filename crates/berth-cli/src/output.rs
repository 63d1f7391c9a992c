//! Formatted output helpers for CLI commands.
//!
//! Table rows are built as strings so they can be checked without a
//! terminal; [`print_lines`] is the only place that writes to stdout.

use std::fmt;

use berth_common::types::{ContainerRecord, ImageRecord};
use berth_engine::outcome::ExecutionReport;
use chrono::{DateTime, TimeZone, Utc};

/// Formats a byte count in decimal units: `1.50 GB` above one gigabyte,
/// otherwise whole megabytes rounded down.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const MB: u64 = 1_000_000;
    const GB: u64 = 1_000_000_000;

    if bytes > GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else {
        format!("{} MB", bytes / MB)
    }
}

/// Formats a creation time as `%d %b %y %H:%M` in `zone`.
#[must_use]
pub fn format_created<Tz>(at: &DateTime<Utc>, zone: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    at.with_timezone(zone).format("%d %b %y %H:%M").to_string()
}

/// Repository column: the first tag's repository, with its tag appended when
/// the image carries several tags.
#[must_use]
pub fn repo_label(tags: &[String]) -> String {
    let Some(first) = tags.first() else {
        return "<none>".to_string();
    };
    if tags.len() > 1 {
        return first.clone();
    }
    first
        .rsplit_once(':')
        .filter(|(_, tag)| !tag.contains('/'))
        .map_or_else(|| first.clone(), |(repo, _)| repo.to_string())
}

const fn run_state(container: &ContainerRecord) -> &'static str {
    if container.running {
        "Running"
    } else {
        "Not Running"
    }
}

/// Rows for the `ps` table, header first.
#[must_use]
pub fn container_rows(containers: &[ContainerRecord]) -> Vec<String> {
    let mut rows = vec![format!("{:>2} {:<12} {:<25} {:<8}", "#", "ID", "Image", "Status")];
    rows.extend(containers.iter().enumerate().map(|(i, c)| {
        format!(
            "{i:>2} {:<12} {:<25} {:<8}",
            c.id.short(),
            c.image,
            run_state(c)
        )
    }));
    rows
}

/// Rows for the `images` table, header first, with dates in `zone`.
#[must_use]
pub fn image_rows<Tz>(images: &[ImageRecord], zone: &Tz) -> Vec<String>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let mut rows = vec![format!(
        "{:>2} {:<20} {:<10} {:<18} {:<8}",
        "#", "Repo", "Image ID", "Created", "Size"
    )];
    rows.extend(images.iter().enumerate().map(|(i, image)| {
        format!(
            "{i:>2} {:<20} {:<10} {:<18} {:<8}",
            repo_label(&image.repo_tags),
            image.id.short(),
            format_created(&image.created_at, zone),
            format_size(image.virtual_size)
        )
    }));
    rows
}

/// Rows describing containers that block an image removal.
#[must_use]
pub fn blocking_rows(containers: &[ContainerRecord]) -> Vec<String> {
    containers
        .iter()
        .map(|c| {
            format!(
                "{:<12} {:<15} {:<15} {:<10}",
                c.id.short(),
                c.image,
                c.name,
                run_state(c)
            )
        })
        .collect()
}

/// Writes each line to stdout.
#[allow(clippy::print_stdout)]
pub fn print_lines<I>(lines: I)
where
    I: IntoIterator,
    I::Item: fmt::Display,
{
    for line in lines {
        println!("{line}");
    }
}

/// Prints every step of `report` and fails if any step failed.
///
/// # Errors
///
/// Returns an error naming the number of failed steps.
pub fn finish(report: &ExecutionReport) -> anyhow::Result<()> {
    print_lines(&report.steps);
    let failed = report.failures().count();
    if failed > 0 {
        anyhow::bail!("{failed} step(s) failed");
    }
    Ok(())
}
