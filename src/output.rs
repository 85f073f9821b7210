use std::io::{self, Write};
use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::app::{LineageResult, LoadReport, Phase, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_load(result: &LoadReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_lineage(result: &LineageResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Renders load progress on stderr: a byte bar while downloading, a
/// `pos/len` bar while saving, plain status lines otherwise.
pub struct TerminalProgress {
    state: Mutex<Option<(Phase, ProgressBar)>>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    pub fn finish(&self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some((_, bar)) = state.take() {
                bar.finish_and_clear();
            }
        }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalProgress {
    fn event(&self, event: ProgressEvent) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        let Some(progress) = event.progress else {
            if let Some((_, bar)) = state.take() {
                bar.finish_and_clear();
            }
            eprintln!("[{}] {}", event.phase.label(), event.message);
            return;
        };

        let reuse = matches!(state.as_ref(), Some((phase, _)) if *phase == event.phase);
        if !reuse {
            if let Some((_, bar)) = state.take() {
                bar.finish_and_clear();
            }
            let bar = create_bar(event.phase, progress.total);
            bar.set_message(event.message.clone());
            *state = Some((event.phase, bar));
        }

        if let Some((_, bar)) = state.as_ref() {
            if let Some(total) = progress.total {
                bar.set_length(total);
            }
            bar.set_position(progress.done);
            if progress.total == Some(progress.done) {
                bar.finish_with_message(format!("{} done", event.message));
            }
        }
    }
}

fn create_bar(phase: Phase, total: Option<u64>) -> ProgressBar {
    let template = match (phase, total) {
        (Phase::Fetch, Some(_)) => {
            "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})"
        }
        (Phase::Fetch, None) => "{spinner:.green} {msg} {bytes}",
        _ => "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({percent}%)",
    };
    let bar = match total {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::new_spinner(),
    };
    if let Ok(style) = ProgressStyle::with_template(template) {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar
}

/// Human-readable summary of a finished load.
pub fn print_load_summary(report: &LoadReport) {
    println!("taxtree: loaded {} taxa into {}", report.taxa, report.db_path);
    println!("  archive: {}{}", report.archive, if report.downloaded { " (downloaded)" } else { "" });
    println!("  root: {}", report.root);
    println!(
        "  named: {} (missing: {}, duplicate scientific names: {})",
        report.named, report.missing_names, report.duplicate_names
    );
    for count in &report.rank_counts {
        println!("  {:<8} {}", count.rank.as_str(), count.taxa);
    }
}

pub fn print_lineage(result: &LineageResult) {
    println!(
        "{} {} ({})",
        result.taxon.id,
        result.taxon.name.as_deref().unwrap_or("-"),
        result.taxon.rank
    );
    for entry in &result.lineage {
        match (&entry.id, &entry.name) {
            (Some(id), name) => println!(
                "  {:<8} {:<10} {}",
                entry.rank.as_str(),
                id.as_str(),
                name.as_deref().unwrap_or("-")
            ),
            (None, _) => println!("  {:<8} -", entry.rank.as_str()),
        }
    }
}
