//! Daily workbook - telemetry export merged into dated spreadsheet templates
//!
//! One run covers one business day:
//!
//! 1. Resolve the target date (explicit, else the template's date + 1, else yesterday)
//! 2. Run the external export tool for that day's window into `raw_export.xlsx`
//! 3. Copy the master template to `<prefix>_MMDDYY.xlsx`
//! 4. Replace the values of its `Raw Import` sheet with the export's `RAW` sheet
//! 5. Recalculate formulas through a headless office suite, when one is installed
//!
//! # Example
//!
//! ```no_run
//! use daily_workbook::config::{ConfigOverrides, PipelineConfig};
//! use daily_workbook::pipeline::Pipeline;
//! use std::path::Path;
//!
//! let config = PipelineConfig::load(Some(Path::new("report.yaml")), ConfigOverrides::default())?;
//! let pipeline = Pipeline::new(config)?;
//! let output = pipeline.process(Path::new("templates/3895th_070124.xlsx"), None)?;
//! println!("Wrote {}", output.display());
//! # Ok::<(), daily_workbook::ReportError>(())
//! ```

pub mod bootstrap;
pub mod cli;
pub mod command;
pub mod config;
pub mod date;
pub mod error;
pub mod excel;
pub mod export;
pub mod logging;
pub mod merge;
pub mod pipeline;
pub mod recalc;
pub mod types;

// Re-export commonly used types
pub use error::{ReportError, ReportResult};
pub use pipeline::Pipeline;
pub use types::{BusinessDate, CellValue, ExportWindow, TimeOfDay};
