//! Terminal output for run results

use batchpress_engine::RunReport;
use batchpress_types::{Error, Phase};
use console::style;
use std::time::Duration;

/// Print the statistics of a finished run
pub fn print_run_summary(report: &RunReport) {
    let snapshot = &report.snapshot;

    println!();
    println!("{}", style("Compression Statistics:").bold().underlined());
    println!("  Files found: {}", style(snapshot.total_files).cyan());
    println!(
        "  Compressed: {}",
        style(snapshot.success_count).green()
    );
    println!(
        "  Failed: {}",
        if snapshot.fail_count > 0 {
            style(snapshot.fail_count).red()
        } else {
            style(snapshot.fail_count).green()
        }
    );
    if snapshot.skip_count > 0 {
        println!(
            "  Skipped (cancelled): {}",
            style(snapshot.skip_count).yellow()
        );
    }
    println!(
        "  Original size: {}",
        style(format_bytes(snapshot.total_original_bytes)).blue()
    );
    println!(
        "  Compressed size: {}",
        style(format_bytes(snapshot.total_compressed_bytes)).blue()
    );
    println!(
        "  Saved: {} ({})",
        style(format_signed_bytes(snapshot.saved_bytes)).green().bold(),
        style(format!("{:.1}%", snapshot.average_ratio)).green()
    );
    println!(
        "  Duration: {}",
        style(format_duration(snapshot.elapsed)).blue()
    );

    if !report.failures.is_empty() {
        println!();
        println!("{}", style("Failed files:").bold().red());
        for failure in &report.failures {
            println!(
                "  {} {}: {}",
                style("✗").red(),
                failure.path.display(),
                style(&failure.error).dim()
            );
        }
    }

    println!();
    let clean = report.failures.is_empty() && snapshot.skip_count == 0;
    if snapshot.phase == Phase::Completed && clean {
        println!("{} Run completed", style("✓").green().bold());
    } else {
        println!(
            "{} Run completed with {} failed and {} skipped files",
            style("⚠").yellow().bold(),
            snapshot.fail_count,
            snapshot.skip_count
        );
    }
}

/// Print a run-level error with a hint on how to fix it
pub fn print_run_error(error: &Error) {
    eprintln!("{} {}", style("✗").red().bold(), style(error).red());
    if let Some(hint) = hint_for(error) {
        eprintln!("  {}", style(hint).dim());
    }
}

fn hint_for(error: &Error) -> Option<&'static str> {
    match error {
        Error::SourceNotFound { .. } => {
            Some("Pass an existing directory or set scanner.source_directory")
        }
        Error::TargetDirectory { .. } => {
            Some("Check scanner.target_directory or run with --replace")
        }
        Error::NoFilesFound { .. } => {
            Some("Only files with an enabled extension are compressed")
        }
        Error::Config { .. } => Some("Run `batchpress config` to inspect the effective settings"),
        _ => None,
    }
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format a byte delta that may be negative
pub fn format_signed_bytes(bytes: i64) -> String {
    if bytes < 0 {
        format!("-{}", format_bytes(bytes.unsigned_abs()))
    } else {
        format_bytes(bytes.unsigned_abs())
    }
}

/// Format duration in human-readable format
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.0}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::PathBuf;

    #[rstest]
    #[case(0, "0.00 B")]
    #[case(1023, "1023.00 B")]
    #[case(1024, "1.00 KB")]
    #[case(1536, "1.50 KB")]
    #[case(5 * 1024 * 1024, "5.00 MB")]
    fn test_format_bytes(#[case] bytes: u64, #[case] expected: &str) {
        assert_eq!(format_bytes(bytes), expected);
    }

    #[test]
    fn test_format_signed_bytes() {
        assert_eq!(format_signed_bytes(-2048), "-2.00 KB");
        assert_eq!(format_signed_bytes(600), "600.00 B");
    }

    #[rstest]
    #[case(Duration::from_secs(42), "42s")]
    #[case(Duration::from_secs(125), "2m 5s")]
    #[case(Duration::from_secs(3723), "1h 2m 3s")]
    fn test_format_duration(#[case] duration: Duration, #[case] expected: &str) {
        assert_eq!(format_duration(duration), expected);
    }

    #[test]
    fn test_hints_for_run_level_errors() {
        let missing = Error::SourceNotFound {
            path: PathBuf::from("/nope"),
        };
        assert!(hint_for(&missing).is_some());
        assert!(hint_for(&Error::Cancelled).is_none());
    }
}
