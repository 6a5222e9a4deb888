//! Environment probing at construction time
//!
//! Produces a read-only [`RuntimeContext`]. Nothing here is fatal: a missing
//! office suite disables recalculation, and a missing export runtime surfaces
//! later as an export error.

use crate::command::{program_available, CommandRunner, CommandSpec};
use crate::config::PipelineConfig;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const RUNTIME_DIR: &str = ".venv";
pub const SETUP_SCRIPT: &str = "setup.sh";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeContext {
    /// Office suite found on this host; gates recalculation
    pub recalc_available: bool,
    /// Program used for recalculation
    pub office_program: String,
    /// Sandboxed runtime of the export tool
    pub runtime_dir: PathBuf,
    /// Interpreter inside the runtime that runs the export script
    pub interpreter: PathBuf,
    /// Export tool directory; working directory for the export
    pub tool_dir: PathBuf,
}

impl RuntimeContext {
    /// Context for a given tool directory without probing anything.
    pub fn unprobed(tool_dir: &Path, office_program: &str) -> Self {
        let runtime_dir = tool_dir.join(RUNTIME_DIR);
        Self {
            recalc_available: false,
            office_program: office_program.to_string(),
            interpreter: interpreter_path(&runtime_dir),
            runtime_dir,
            tool_dir: tool_dir.to_path_buf(),
        }
    }

    pub fn runtime_ready(&self) -> bool {
        self.interpreter.exists()
    }
}

/// Probe the office suite and make sure the export runtime exists.
pub fn probe<R: CommandRunner>(config: &PipelineConfig, runner: &R) -> RuntimeContext {
    let mut context = RuntimeContext::unprobed(&config.export_tool_dir(), &config.office_program);

    context.recalc_available = program_available(runner, &config.office_program);
    if context.recalc_available {
        info!(program = %config.office_program, "Office suite available for formula recalculation");
    } else {
        warn!(
            program = %config.office_program,
            "Office suite not found - formula recalculation disabled"
        );
    }

    if context.runtime_dir.exists() {
        info!(runtime = %context.runtime_dir.display(), "Found export tool runtime");
    } else {
        warn!(
            runtime = %context.runtime_dir.display(),
            "Export tool runtime not found, attempting setup"
        );
        setup_runtime(&context.tool_dir, runner);
    }

    context
}

/// Run `setup.sh` beside the export tool. Failures are logged only.
fn setup_runtime<R: CommandRunner>(tool_dir: &Path, runner: &R) -> bool {
    let script = tool_dir.join(SETUP_SCRIPT);
    if !script.exists() {
        error!(script = %script.display(), "Setup script not found");
        return false;
    }

    info!(script = %script.display(), "Running export tool setup script");
    let spec = CommandSpec::new("bash")
        .args(["-c", "source ./setup.sh"])
        .current_dir(tool_dir);
    match runner.run(&spec) {
        Ok(output) if output.success() => {
            info!("Export tool setup completed");
            true
        }
        Ok(output) => {
            error!(
                status = %output.status_text(),
                stderr = %output.stderr.trim(),
                "Export tool setup failed"
            );
            false
        }
        Err(e) => {
            error!(error = %e, "Failed to run export tool setup");
            false
        }
    }
}

fn interpreter_path(runtime_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        runtime_dir.join("Scripts").join("python.exe")
    } else {
        runtime_dir.join("bin").join("python")
    }
}
