//! Workbook merger
//!
//! Copies the template to its dated name, replaces the `Raw Import` sheet's
//! values with the export's `RAW` sheet, saves, then asks for recalculation.

use crate::bootstrap::RuntimeContext;
use crate::command::CommandRunner;
use crate::config::PipelineConfig;
use crate::date::{DateResolver, Fallback};
use crate::error::{ReportError, ReportResult};
use crate::excel::{Sheet, WorkbookStore};
use crate::recalc::Recalculator;
use crate::types::BusinessDate;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub use crate::export::RAW_SHEET;

/// Destination sheet in the template
pub const IMPORT_SHEET: &str = "Raw Import";

/// Suffix of the diagnostic copy kept when a merge fails
pub const ERROR_SUFFIX: &str = "error";

pub struct WorkbookMerger<'a, R: CommandRunner, S: WorkbookStore> {
    config: &'a PipelineConfig,
    runtime: &'a RuntimeContext,
    resolver: &'a DateResolver,
    runner: &'a R,
    store: &'a S,
}

impl<'a, R: CommandRunner, S: WorkbookStore> WorkbookMerger<'a, R, S> {
    pub fn new(
        config: &'a PipelineConfig,
        runtime: &'a RuntimeContext,
        resolver: &'a DateResolver,
        runner: &'a R,
        store: &'a S,
    ) -> Self {
        Self {
            config,
            runtime,
            resolver,
            runner,
            store,
        }
    }

    /// Path of the dated workbook for `date`.
    pub fn output_path(&self, date: BusinessDate) -> PathBuf {
        self.config
            .work_dir
            .join(self.config.naming.file_name(&date.token()))
    }

    /// Merge `raw` into a dated copy of `template` and return its path.
    ///
    /// Without `target`, the date is the template's date plus one day, or
    /// today when the template name carries no date.
    pub fn merge(
        &self,
        raw: &Path,
        template: &Path,
        target: Option<BusinessDate>,
    ) -> ReportResult<PathBuf> {
        let date = match target {
            Some(date) => date,
            None => self.resolver.resolve_target(None, template, Fallback::Today)?.date,
        };

        let output = self.output_path(date);
        if same_file(template, &output)? {
            return Err(ReportError::Workbook(format!(
                "template and output are the same file: {}",
                output.display()
            )));
        }
        fs::copy(template, &output)?;
        info!(output = %output.display(), "Created new workbook");

        match self.fill(raw, &output) {
            Ok(rows) => {
                info!(rows, output = %output.display(), "Copied raw data into '{}'", IMPORT_SHEET);
                Recalculator::new(self.runtime, self.runner).recalculate(&output);
                Ok(output)
            }
            Err(err) => {
                error!(output = %output.display(), "Error merging raw data: {}", err);
                preserve_failed(&output);
                Err(err)
            }
        }
    }

    /// Returns the number of source rows copied.
    fn fill(&self, raw: &Path, output: &Path) -> ReportResult<u32> {
        let source = self.store.open_source(raw, RAW_SHEET)?;
        let mut target = self.store.open_target(output, IMPORT_SHEET)?;

        target.clear_values();
        let rows = transfer_values(&source, &mut target);
        self.store.save(target)?;
        Ok(rows)
    }
}

/// Copy every value of `source` to the same coordinates in `target`.
pub fn transfer_values<A: Sheet, B: Sheet>(source: &A, target: &mut B) -> u32 {
    let (rows, columns) = source.extent();
    for row in 1..=rows {
        for column in 1..=columns {
            let value = source.get_cell(row, column);
            if !value.is_empty() {
                target.set_cell(row, column, value);
            }
        }
    }
    rows
}

fn same_file(a: &Path, b: &Path) -> ReportResult<bool> {
    if !b.exists() {
        return Ok(false);
    }
    Ok(fs::canonicalize(a)? == fs::canonicalize(b)?)
}

/// Keep a `<path>.error` copy for inspection. Failure here is only logged.
fn preserve_failed(output: &Path) {
    let mut name = output.as_os_str().to_owned();
    name.push(".");
    name.push(ERROR_SUFFIX);
    let error_path = PathBuf::from(name);

    match fs::copy(output, &error_path) {
        Ok(_) => warn!(copy = %error_path.display(), "Saved partial workbook for diagnosis"),
        Err(e) => warn!("Could not save diagnostic copy: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandOutput, CommandSpec};
    use crate::excel::Grid;
    use crate::types::CellValue;
    use chrono::NaiveDate;
    use chrono_tz::Tz;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct NoCommands;

    impl CommandRunner for NoCommands {
        fn run(&self, spec: &CommandSpec) -> ReportResult<CommandOutput> {
            panic!("unexpected command {}", spec.masked_command_line());
        }
    }

    /// Sheets held in memory, one per side.
    struct MemoryStore {
        source: Grid,
        target: Grid,
        fail_save: bool,
        opened_target: RefCell<bool>,
        saved: RefCell<Option<Grid>>,
    }

    impl MemoryStore {
        fn new(source: Grid, target: Grid) -> Self {
            Self {
                source,
                target,
                fail_save: false,
                opened_target: RefCell::new(false),
                saved: RefCell::new(None),
            }
        }
    }

    impl WorkbookStore for MemoryStore {
        type Source = Grid;
        type Target = Grid;

        fn open_source(&self, path: &Path, sheet: &str) -> ReportResult<Grid> {
            if self.source.name() != sheet {
                return Err(ReportError::MissingSheet {
                    path: path.to_path_buf(),
                    sheet: sheet.to_string(),
                });
            }
            Ok(self.source.clone())
        }

        fn open_target(&self, path: &Path, sheet: &str) -> ReportResult<Grid> {
            *self.opened_target.borrow_mut() = true;
            if self.target.name() != sheet {
                return Err(ReportError::MissingSheet {
                    path: path.to_path_buf(),
                    sheet: sheet.to_string(),
                });
            }
            Ok(self.target.clone())
        }

        fn save(&self, target: Grid) -> ReportResult<()> {
            if self.fail_save {
                return Err(ReportError::Workbook("disk full".to_string()));
            }
            *self.saved.borrow_mut() = Some(target);
            Ok(())
        }
    }

    struct Fixture {
        _temp: TempDir,
        config: PipelineConfig,
        runtime: RuntimeContext,
        resolver: DateResolver,
        template: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let template = temp.path().join("3895th_070124.xlsx");
        fs::write(&template, b"template bytes").unwrap();
        let work_dir = temp.path().join("work");
        fs::create_dir_all(&work_dir).unwrap();

        let config = PipelineConfig {
            work_dir,
            ..PipelineConfig::default()
        };
        let tz: Tz = "America/New_York".parse().unwrap();
        Fixture {
            runtime: RuntimeContext::unprobed(temp.path(), "libreoffice"),
            resolver: DateResolver::new(tz, &config.naming).unwrap(),
            config,
            template,
            _temp: temp,
        }
    }

    fn raw_grid() -> Grid {
        Grid::from_rows(
            RAW_SHEET,
            [
                vec![CellValue::from("time"), CellValue::from("fill_raw")],
                vec![CellValue::from("07:00"), CellValue::from(41.0)],
                vec![CellValue::from("07:05"), CellValue::from(42.5)],
            ],
        )
    }

    #[test]
    fn test_merge_clears_sentinels_and_copies_values() {
        let fx = fixture();
        let mut target = Grid::new(IMPORT_SHEET);
        target.set_cell(1, 1, "SENTINEL".into());
        target.set_cell(10, 8, "SENTINEL".into());
        let store = MemoryStore::new(raw_grid(), target);
        let merger = WorkbookMerger::new(&fx.config, &fx.runtime, &fx.resolver, &NoCommands, &store);

        let output = merger.merge(Path::new("raw.xlsx"), &fx.template, None).unwrap();

        assert_eq!(output, fx.config.work_dir.join("3895th_070224.xlsx"));
        assert_eq!(fs::read(&output).unwrap(), b"template bytes");

        let saved = store.saved.borrow().clone().unwrap();
        let expected: Vec<_> = raw_grid().cells().map(|(k, v)| (k, v.clone())).collect();
        let actual: Vec<_> = saved.cells().map(|(k, v)| (k, v.clone())).collect();
        assert_eq!(saved.name(), IMPORT_SHEET);
        assert_eq!(actual, expected);
        assert_eq!(saved.get_cell(10, 8), CellValue::Empty);
    }

    #[test]
    fn test_explicit_date_names_output() {
        let fx = fixture();
        let store = MemoryStore::new(raw_grid(), Grid::new(IMPORT_SHEET));
        let merger = WorkbookMerger::new(&fx.config, &fx.runtime, &fx.resolver, &NoCommands, &store);
        let date = BusinessDate::new(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(), fx.resolver.tz());

        let output = merger
            .merge(Path::new("raw.xlsx"), &fx.template, Some(date))
            .unwrap();
        assert_eq!(output.file_name().unwrap(), "3895th_123124.xlsx");
    }

    #[test]
    fn test_missing_raw_sheet_fails_before_target_is_touched() {
        let fx = fixture();
        let store = MemoryStore::new(Grid::new("Sheet1"), Grid::new(IMPORT_SHEET));
        let merger = WorkbookMerger::new(&fx.config, &fx.runtime, &fx.resolver, &NoCommands, &store);

        let err = merger
            .merge(Path::new("raw.xlsx"), &fx.template, None)
            .unwrap_err();

        assert!(matches!(err, ReportError::MissingSheet { ref sheet, .. } if sheet == RAW_SHEET));
        assert!(!*store.opened_target.borrow());
        assert!(store.saved.borrow().is_none());
    }

    #[test]
    fn test_missing_import_sheet_is_error() {
        let fx = fixture();
        let store = MemoryStore::new(raw_grid(), Grid::new("Summary"));
        let merger = WorkbookMerger::new(&fx.config, &fx.runtime, &fx.resolver, &NoCommands, &store);

        let err = merger
            .merge(Path::new("raw.xlsx"), &fx.template, None)
            .unwrap_err();
        assert!(matches!(err, ReportError::MissingSheet { ref sheet, .. } if sheet == IMPORT_SHEET));
    }

    #[test]
    fn test_failed_merge_keeps_error_copy() {
        let fx = fixture();
        let mut store = MemoryStore::new(raw_grid(), Grid::new(IMPORT_SHEET));
        store.fail_save = true;
        let merger = WorkbookMerger::new(&fx.config, &fx.runtime, &fx.resolver, &NoCommands, &store);

        let err = merger
            .merge(Path::new("raw.xlsx"), &fx.template, None)
            .unwrap_err();

        assert!(matches!(err, ReportError::Workbook(_)));
        let error_copy = fx.config.work_dir.join("3895th_070224.xlsx.error");
        assert!(error_copy.exists());
    }

    #[test]
    fn test_undated_template_falls_back_to_today() {
        let fx = fixture();
        let template = fx.template.with_file_name("master.xlsx");
        fs::copy(&fx.template, &template).unwrap();
        let store = MemoryStore::new(raw_grid(), Grid::new(IMPORT_SHEET));
        let merger = WorkbookMerger::new(&fx.config, &fx.runtime, &fx.resolver, &NoCommands, &store);

        let before = fx.resolver.today();
        let output = merger.merge(Path::new("raw.xlsx"), &template, None).unwrap();
        let after = fx.resolver.today();

        let name = output.file_name().unwrap().to_string_lossy().into_owned();
        assert!(
            name == fx.config.naming.file_name(&before.token())
                || name == fx.config.naming.file_name(&after.token())
        );
    }

    #[test]
    fn test_template_at_output_path_is_left_alone() {
        let fx = fixture();
        let template = fx.config.work_dir.join("3895th_070124.xlsx");
        fs::copy(&fx.template, &template).unwrap();
        let store = MemoryStore::new(raw_grid(), Grid::new(IMPORT_SHEET));
        let merger = WorkbookMerger::new(&fx.config, &fx.runtime, &fx.resolver, &NoCommands, &store);
        let date = BusinessDate::new(NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(), fx.resolver.tz());

        let err = merger
            .merge(Path::new("raw.xlsx"), &template, Some(date))
            .unwrap_err();

        assert!(matches!(err, ReportError::Workbook(ref msg) if msg.contains("same file")));
        assert_eq!(fs::read(&template).unwrap(), b"template bytes");
        assert!(!*store.opened_target.borrow());
        assert!(!fx.config.work_dir.join("3895th_070124.xlsx.error").exists());
    }

    #[test]
    fn test_transfer_keeps_coordinates() {
        let mut source = Grid::new(RAW_SHEET);
        source.set_cell(4, 3, CellValue::Number(7.0));
        let mut target = Grid::new(IMPORT_SHEET);

        assert_eq!(transfer_values(&source, &mut target), 4);
        assert_eq!(target.get_cell(4, 3), CellValue::Number(7.0));
        assert_eq!(target.len(), 1);
    }
}
