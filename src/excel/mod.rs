//! Workbook access for the merge step
//!
//! - Source: the raw export, read by value through calamine ([`ExcelImporter`])
//! - Target: the dated template copy, edited in place ([`XlsxPackage`])
//!
//! Both sides are seen through the [`Sheet`] trait so the merge logic can be
//! exercised against in-memory grids.

mod cell_ref;
mod grid;
mod importer;
mod package;
mod worksheet;

pub use cell_ref::{cell_reference, column_letter, parse_cell_reference};
pub use grid::Grid;
pub use importer::ExcelImporter;
pub use package::{TemplateSheet, XlsxPackage};

use crate::error::ReportResult;
use crate::types::CellValue;
use std::path::Path;

/// A rectangular sheet addressed by 1-based `(row, column)`.
pub trait Sheet {
    fn name(&self) -> &str;

    /// `(max_row, max_column)` over cells holding a value; `(0, 0)` when empty.
    fn extent(&self) -> (u32, u32);

    fn get_cell(&self, row: u32, column: u32) -> CellValue;

    fn set_cell(&mut self, row: u32, column: u32, value: CellValue);

    /// Empty every cell value. Formatting stays where the backend has any.
    fn clear_values(&mut self);
}

/// Opens the two sides of a merge and persists the destination.
pub trait WorkbookStore {
    type Source: Sheet;
    type Target: Sheet;

    fn open_source(&self, path: &Path, sheet: &str) -> ReportResult<Self::Source>;

    fn open_target(&self, path: &Path, sheet: &str) -> ReportResult<Self::Target>;

    fn save(&self, target: Self::Target) -> ReportResult<()>;
}

/// .xlsx files on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct XlsxStore;

impl WorkbookStore for XlsxStore {
    type Source = Grid;
    type Target = TemplateSheet;

    fn open_source(&self, path: &Path, sheet: &str) -> ReportResult<Grid> {
        ExcelImporter::new(path).import_sheet(sheet)
    }

    fn open_target(&self, path: &Path, sheet: &str) -> ReportResult<TemplateSheet> {
        XlsxPackage::open(path)?.into_sheet(sheet)
    }

    fn save(&self, target: TemplateSheet) -> ReportResult<()> {
        target.save()
    }
}
