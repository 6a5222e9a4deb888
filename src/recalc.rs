//! Best-effort formula recalculation through a headless office suite
//!
//! Round-tripping the workbook through the suite's converter forces every
//! formula to be evaluated against the freshly imported data. Nothing in here
//! returns an error; every failure degrades to an unrecalculated workbook.

use crate::bootstrap::RuntimeContext;
use crate::command::{CommandRunner, CommandSpec};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecalcOutcome {
    /// Office suite not available on this host
    Skipped,
    /// Converted copy written back over the workbook
    Recalculated,
    /// Converter produced nothing matching the workbook name; original kept
    NoOutput,
    /// Something went wrong; original kept
    Failed(String),
}

pub struct Recalculator<'a, R: CommandRunner> {
    runtime: &'a RuntimeContext,
    runner: &'a R,
}

impl<'a, R: CommandRunner> Recalculator<'a, R> {
    pub fn new(runtime: &'a RuntimeContext, runner: &'a R) -> Self {
        Self { runtime, runner }
    }

    pub fn command(&self, workbook: &Path, outdir: &Path) -> CommandSpec {
        CommandSpec::new(&self.runtime.office_program)
            .args(["--headless", "--calc", "--convert-to", "xlsx", "--outdir"])
            .arg(outdir.to_string_lossy())
            .arg(workbook.to_string_lossy())
    }

    pub fn recalculate(&self, workbook: &Path) -> RecalcOutcome {
        if !self.runtime.recalc_available {
            warn!("Skipping formula recalculation (office suite not available)");
            return RecalcOutcome::Skipped;
        }

        match self.try_recalculate(workbook) {
            Ok(outcome) => outcome,
            Err(message) => {
                error!(workbook = %workbook.display(), "Error during formula recalculation: {}", message);
                RecalcOutcome::Failed(message)
            }
        }
    }

    fn try_recalculate(&self, workbook: &Path) -> Result<RecalcOutcome, String> {
        let scratch = TempDir::new().map_err(|e| format!("scratch directory: {}", e))?;

        info!(workbook = %workbook.display(), "Recalculating formulas");
        let output = self
            .runner
            .run(&self.command(workbook, scratch.path()))
            .map_err(|e| e.to_string())?;
        if !output.success() {
            warn!(
                status = %output.status_text(),
                "Recalculation warning: {}",
                output.stderr.trim()
            );
        }

        let Some(converted) = find_converted(scratch.path(), workbook)
            .map_err(|e| format!("reading scratch directory: {}", e))?
        else {
            warn!(
                scratch = %scratch.path().display(),
                "Converter did not create a matching file"
            );
            return Ok(RecalcOutcome::NoOutput);
        };

        fs::copy(&converted, workbook).map_err(|e| format!("copying result back: {}", e))?;
        info!(workbook = %workbook.display(), "Recalculated file saved back");
        Ok(RecalcOutcome::Recalculated)
    }
}

/// First file in `dir` whose name starts with the workbook's stem. The
/// converter may change extension or case, so this is a heuristic.
fn find_converted(dir: &Path, workbook: &Path) -> std::io::Result<Option<PathBuf>> {
    let stem = workbook
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if stem.is_empty() {
        return Ok(None);
    }

    let mut matches: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().starts_with(stem.as_str()))
                .unwrap_or(false)
        })
        .collect();
    matches.sort();
    Ok(matches.into_iter().next())
}
