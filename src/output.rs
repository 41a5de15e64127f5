use colored::Colorize;
use indicatif::{HumanBytes, HumanCount};

use crate::run::RunReport;

/// Which run produced a report, for headings and verbs
#[derive(Debug, Clone, Copy)]
pub enum ReportKind {
    Backup,
    Dedup,
    Prune,
}

impl ReportKind {
    fn title(self) -> &'static str {
        match self {
            ReportKind::Backup => "Backup Report",
            ReportKind::Dedup => "Dedup Report",
            ReportKind::Prune => "Prune Report",
        }
    }

    fn verb(self) -> &'static str {
        match self {
            ReportKind::Backup => "Archived",
            ReportKind::Dedup => "Moved",
            ReportKind::Prune => "Deleted",
        }
    }
}

impl RunReport {
    /// Output as human-readable colored text
    pub fn print_human(&self, kind: ReportKind, verbose: bool) {
        let stats = &self.stats;

        let mut title = kind.title().bold().underline().to_string();
        if self.dry_run {
            title = format!("{} {}", title, "[dry-run]".yellow());
        }
        println!("\n{}", title);
        println!("  Scanned: {} files", HumanCount(stats.total_files as u64).to_string().cyan());
        println!("  New content: {}", HumanCount(stats.new_files as u64).to_string().cyan());
        println!("  Already known: {}", HumanCount(stats.known_files as u64).to_string().cyan());
        println!("  Duplicates: {}", HumanCount(stats.duplicate_files as u64).to_string().cyan());
        println!(
            "  {} {} files, {}",
            kind.verb(),
            stats.processed_files,
            HumanBytes(stats.processed_bytes).to_string().yellow()
        );
        println!("  Index entries: {}", HumanCount(stats.index_entries as u64).to_string().cyan());

        if self.failures.is_empty() {
            println!("\n{}", "No errors.".green());
        } else {
            println!(
                "\n{}",
                format!("{} files failed and will be retried next run", self.failures.len()).red()
            );
        }

        if !verbose {
            return;
        }

        //
        // Verbose logs
        //

        if !self.duplicates.is_empty() {
            println!("\n{}", "Duplicates:".bold());
            for record in &self.duplicates {
                println!("  {} {}", &record.digest[..12.min(record.digest.len())], record.path.display());
            }
        }

        if !self.failures.is_empty() {
            println!("\n{}", "Failures:".bold());
            for failure in &self.failures {
                println!("  {} {}: {}", "[failed]".red(), failure.path.display(), failure.reason);
            }
        }
    }

    /// Output as JSON
    pub fn print_json(&self) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error serializing to JSON: {}", e),
        }
    }
}
