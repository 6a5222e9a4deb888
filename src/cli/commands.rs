use crate::bootstrap::RuntimeContext;
use crate::command::SystemRunner;
use crate::config::PipelineConfig;
use crate::error::{ReportError, ReportResult};
use crate::excel::XlsxStore;
use crate::pipeline::Pipeline;
use chrono::NaiveDate;
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct ProcessReport {
    template: PathBuf,
    raw_export: PathBuf,
    output: PathBuf,
}

/// Execute the process command
pub fn process(
    config: PipelineConfig,
    template: PathBuf,
    date: Option<NaiveDate>,
    json: bool,
) -> ReportResult<()> {
    if !json {
        println!("{}", "📊 Daily workbook - Processing template".bold().green());
        println!("   Template: {}", template.display());
        if let Some(d) = date {
            println!("   Date:     {}", d.to_string().bright_yellow().bold());
        }
        println!();
    }

    let pipeline = Pipeline::new(config)?;
    let output = pipeline.process(&template, date)?;

    if json {
        let report = ProcessReport {
            raw_export: pipeline.raw_export_path(),
            template,
            output,
        };
        let text = serde_json::to_string_pretty(&report)
            .map_err(|e| ReportError::Workbook(format!("JSON report: {}", e)))?;
        println!("{}", text);
    } else {
        println!("{}", "✅ Dated workbook written".bold().green());
        println!("   {}", output.display().to_string().bright_blue().bold());
    }
    Ok(())
}

/// Execute the plan command (dry run, nothing is executed or written)
pub fn plan(config: PipelineConfig, template: &Path, date: Option<NaiveDate>) -> ReportResult<()> {
    println!("{}", "📋 Daily workbook - Plan (dry run)".bold().green());
    println!("   Template: {}", template.display());
    println!();

    // No probing: planning must not run setup scripts
    let runtime = RuntimeContext::unprobed(&config.export_tool_dir(), &config.office_program);
    let pipeline = Pipeline::with_runtime(config, runtime, SystemRunner, XlsxStore)?;
    let plan = pipeline.plan(template, date)?;

    println!(
        "   Target date: {} ({})",
        plan.target_date.bright_yellow().bold(),
        plan.date_source
    );
    println!("   Window:      {} → {}", plan.window_start, plan.window_end);
    println!("   Raw export:  {}", plan.raw_export.display());
    println!(
        "   Output:      {}",
        plan.output.display().to_string().bright_blue().bold()
    );
    println!();
    println!("{}", "🔧 Export command:".cyan());
    println!("   {}", plan.export_command);
    Ok(())
}

/// Execute the check command
pub fn check(config: PipelineConfig) -> ReportResult<()> {
    println!("{}", "🔍 Daily workbook - Environment check".bold().green());
    println!();

    let pipeline = Pipeline::new(config)?;
    let runtime = pipeline.runtime();

    println!("   Export tool:  {}", runtime.tool_dir.display());
    if runtime.runtime_ready() {
        println!(
            "   Runtime:      {} {}",
            "✅".green(),
            runtime.interpreter.display()
        );
    } else {
        println!(
            "   Runtime:      {} {} not found",
            "❌".red(),
            runtime.interpreter.display()
        );
    }
    if runtime.recalc_available {
        println!("   Recalculate:  {} {}", "✅".green(), runtime.office_program);
    } else {
        println!(
            "   Recalculate:  {} {} not found (formulas recalculate on open)",
            "⚠️".yellow(),
            runtime.office_program
        );
    }
    println!();

    if !runtime.runtime_ready() {
        return Err(ReportError::RuntimeMissing(runtime.interpreter.clone()));
    }
    println!("{}", "✅ Ready".bold().green());
    Ok(())
}
