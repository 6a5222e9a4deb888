//! Raw telemetry export
//!
//! Runs the external export tool for one business day's window and checks
//! that it actually produced the raw artifact.

use crate::bootstrap::RuntimeContext;
use crate::command::{summarize_output, CommandRunner, CommandSpec, Redactor};
use crate::config::PipelineConfig;
use crate::date::{DateResolver, Fallback};
use crate::error::{ReportError, ReportResult};
use crate::types::{BusinessDate, ExportWindow};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

pub const RESOURCE_NAME: &str = "langer_fill";
pub const BUCKET_PERIOD: &str = "PT5M";
pub const BUCKET_METHOD: &str = "max";
pub const INCLUDE_KEYS: &str = ".*_raw";
/// Sheet the export tool writes into
pub const RAW_SHEET: &str = "RAW";

pub struct ExportInvoker<'a, R: CommandRunner> {
    config: &'a PipelineConfig,
    runtime: &'a RuntimeContext,
    resolver: &'a DateResolver,
    runner: &'a R,
    redactor: Redactor,
}

impl<'a, R: CommandRunner> ExportInvoker<'a, R> {
    pub fn new(
        config: &'a PipelineConfig,
        runtime: &'a RuntimeContext,
        resolver: &'a DateResolver,
        runner: &'a R,
    ) -> Self {
        Self {
            config,
            runtime,
            resolver,
            runner,
            redactor: Redactor::new(config.credentials.secrets()),
        }
    }

    pub fn window(&self, date: BusinessDate) -> ReportResult<ExportWindow> {
        ExportWindow::for_date(date, self.config.export_start, self.config.export_end)
    }

    /// The full export invocation, secrets included. Log only
    /// [`CommandSpec::masked_command_line`].
    pub fn command(&self, output: &Path, window: &ExportWindow) -> CommandSpec {
        let creds = &self.config.credentials;
        CommandSpec::new(&self.runtime.interpreter)
            .arg(self.config.export_script.to_string_lossy())
            .args(["-vv", "excel"])
            .args(["--apiKeyId", creds.api_key_id.as_str()])
            .args(["--apiKey", creds.api_key.as_str()])
            .args(["--orgId", creds.org_id.as_str()])
            .args(["--resourceName", RESOURCE_NAME])
            .arg("--start")
            .arg(window.start_iso())
            .arg("--end")
            .arg(window.end_iso())
            .args(["--timezone", self.config.timezone.as_str()])
            .args(["--bucketPeriod", BUCKET_PERIOD])
            .args(["--bucketMethod", BUCKET_METHOD])
            .args(["--includeKeys", INCLUDE_KEYS])
            .arg("--output")
            .arg(output.to_string_lossy())
            .args(["--tab", RAW_SHEET])
            .current_dir(&self.runtime.tool_dir)
    }

    /// Masked single-line form of the export command.
    pub fn masked_command_line(&self, output: &Path, window: &ExportWindow) -> String {
        self.redactor
            .redact(&self.command(output, window).masked_command_line())
    }

    /// Export `target` (yesterday when `None`) into `output`.
    pub fn run_export(&self, output: &Path, target: Option<BusinessDate>) -> ReportResult<PathBuf> {
        let date = match target {
            Some(date) => date,
            None => {
                let date = self.resolver.yesterday()?;
                info!(target_date = %date, fallback = ?Fallback::Yesterday, "No target date provided");
                date
            }
        };

        let window = self.window(date)?;
        info!(
            start = %window.start_iso(),
            end = %window.end_iso(),
            "Exporting data from {} to {}",
            self.config.export_start,
            self.config.export_end
        );

        if !self.runtime.runtime_ready() {
            error!(interpreter = %self.runtime.interpreter.display(), "Export runtime missing");
            return Err(ReportError::RuntimeMissing(self.runtime.interpreter.clone()));
        }

        // A leftover artifact must not pass for this run's output
        match fs::remove_file(output) {
            Ok(()) => debug!(output = %output.display(), "Removed previous raw export"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let spec = self.command(output, &window);
        info!("Running export command: {}", self.masked_command_line(output, &window));

        let result = self.runner.run(&spec)?;

        if !result.success() {
            let stderr = self.redactor.redact(result.stderr.trim());
            error!(status = %result.status_text(), "Export command failed");
            if !stderr.is_empty() {
                error!("Export stderr output:");
                for line in stderr.lines() {
                    error!("  {}", line);
                }
            }
            return Err(ReportError::ExportFailed {
                status: result.status_text(),
                stderr,
            });
        }

        let summary = summarize_output(&result.stdout);
        if !summary.is_empty() {
            info!("Export output:");
            for line in summary {
                info!("  {}", self.redactor.redact(&line));
            }
        }

        if !output.exists() {
            error!(output = %output.display(), "Export exited cleanly without writing output");
            return Err(ReportError::MissingOutput(output.to_path_buf()));
        }

        info!(output = %output.display(), "Generated raw data");
        Ok(output.to_path_buf())
    }
}
