//! Pipeline orchestrator: export, then merge, for one business day

use crate::bootstrap::{self, RuntimeContext};
use crate::command::{CommandRunner, SystemRunner};
use crate::config::PipelineConfig;
use crate::date::{DateResolver, Fallback, ResolvedDate};
use crate::error::ReportResult;
use crate::excel::{WorkbookStore, XlsxStore};
use crate::export::ExportInvoker;
use crate::merge::WorkbookMerger;
use crate::types::ExportWindow;
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Raw export artifact inside the working directory, overwritten every run
pub const RAW_EXPORT_FILE: &str = "raw_export.xlsx";

/// What a run would do, without doing it.
#[derive(Debug, Clone, Serialize)]
pub struct RunPlan {
    pub target_date: String,
    pub date_source: String,
    pub window_start: String,
    pub window_end: String,
    pub raw_export: PathBuf,
    pub output: PathBuf,
    /// Export command with credentials masked
    pub export_command: String,
}

pub struct Pipeline<R: CommandRunner = SystemRunner, S: WorkbookStore = XlsxStore> {
    config: PipelineConfig,
    runtime: RuntimeContext,
    resolver: DateResolver,
    runner: R,
    store: S,
}

impl Pipeline {
    /// Real processes and real .xlsx files.
    pub fn new(config: PipelineConfig) -> ReportResult<Self> {
        Self::with_parts(config, SystemRunner, XlsxStore)
    }
}

impl<R: CommandRunner, S: WorkbookStore> Pipeline<R, S> {
    /// Probe the environment once; the result stays fixed for this pipeline.
    pub fn with_parts(mut config: PipelineConfig, runner: R, store: S) -> ReportResult<Self> {
        config.make_paths_absolute()?;
        let runtime = bootstrap::probe(&config, &runner);
        Self::with_runtime(config, runtime, runner, store)
    }

    /// Use an already probed runtime.
    pub fn with_runtime(
        mut config: PipelineConfig,
        runtime: RuntimeContext,
        runner: R,
        store: S,
    ) -> ReportResult<Self> {
        config.make_paths_absolute()?;
        let resolver = DateResolver::new(config.tz()?, &config.naming)?;
        Ok(Self {
            config,
            runtime,
            resolver,
            runner,
            store,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn runtime(&self) -> &RuntimeContext {
        &self.runtime
    }

    pub fn raw_export_path(&self) -> PathBuf {
        self.config.work_dir.join(RAW_EXPORT_FILE)
    }

    /// Explicit date, else template date + 1, else yesterday.
    pub fn resolve_date(
        &self,
        template: &Path,
        explicit: Option<NaiveDate>,
    ) -> ReportResult<ResolvedDate> {
        self.resolver
            .resolve_target(explicit, template, Fallback::Yesterday)
    }

    pub fn plan(&self, template: &Path, explicit: Option<NaiveDate>) -> ReportResult<RunPlan> {
        let resolved = self.resolve_date(template, explicit)?;
        let window = ExportWindow::for_date(
            resolved.date,
            self.config.export_start,
            self.config.export_end,
        )?;
        let raw_export = self.raw_export_path();
        let export_command = self
            .invoker()
            .masked_command_line(&raw_export, &window);

        Ok(RunPlan {
            target_date: resolved.date.to_string(),
            date_source: resolved.source.to_string(),
            window_start: window.start_iso(),
            window_end: window.end_iso(),
            output: self.merger().output_path(resolved.date),
            raw_export,
            export_command,
        })
    }

    /// Run export and merge for one day and return the dated workbook path.
    /// Errors from either step are returned as-is.
    pub fn process(&self, template: &Path, explicit: Option<NaiveDate>) -> ReportResult<PathBuf> {
        fs::create_dir_all(&self.config.work_dir)?;

        let resolved = self.resolve_date(template, explicit)?;
        info!(
            target_date = %resolved.date,
            source = %resolved.source,
            template = %template.display(),
            "Processing template"
        );

        let raw = self
            .invoker()
            .run_export(&self.raw_export_path(), Some(resolved.date))?;
        let output = self.merger().merge(&raw, template, Some(resolved.date))?;

        info!(output = %output.display(), "Processing complete");
        Ok(output)
    }

    fn invoker(&self) -> ExportInvoker<'_, R> {
        ExportInvoker::new(&self.config, &self.runtime, &self.resolver, &self.runner)
    }

    fn merger(&self) -> WorkbookMerger<'_, R, S> {
        WorkbookMerger::new(
            &self.config,
            &self.runtime,
            &self.resolver,
            &self.runner,
            &self.store,
        )
    }
}
