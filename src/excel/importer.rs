//! Raw export reader - one named sheet of an .xlsx into a [`Grid`]

use super::Grid;
use super::Sheet;
use crate::error::{ReportError, ReportResult};
use crate::types::CellValue;
use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use std::path::{Path, PathBuf};

pub struct ExcelImporter {
    path: PathBuf,
}

impl ExcelImporter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read `sheet_name` as values. Missing sheet is [`ReportError::MissingSheet`].
    pub fn import_sheet(&self, sheet_name: &str) -> ReportResult<Grid> {
        let mut workbook: Xlsx<_> = open_workbook(&self.path)?;

        if !workbook.sheet_names().iter().any(|n| n == sheet_name) {
            return Err(ReportError::MissingSheet {
                path: self.path.clone(),
                sheet: sheet_name.to_string(),
            });
        }

        let range = workbook.worksheet_range(sheet_name)?;
        Ok(range_to_grid(sheet_name, &range))
    }
}

fn range_to_grid(name: &str, range: &Range<Data>) -> Grid {
    let mut grid = Grid::new(name);
    // Range coordinates are relative to its first used cell
    let Some((start_row, start_col)) = range.start() else {
        return grid;
    };

    for (row, col, data) in range.used_cells() {
        let value = convert_data(data);
        if !value.is_empty() {
            grid.set_cell(
                start_row + row as u32 + 1,
                start_col + col as u32 + 1,
                value,
            );
        }
    }
    grid
}

pub(crate) fn convert_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        // Serial number; the destination cell's own format decides how it shows
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Error(e.to_string()),
    }
}
