use super::Sheet;
use crate::types::CellValue;
use std::collections::BTreeMap;

/// In-memory sheet of values keyed by 1-based `(row, column)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    name: String,
    cells: BTreeMap<(u32, u32), CellValue>,
}

impl Grid {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
        }
    }

    /// Build from rows of values starting at A1.
    pub fn from_rows<I, R, V>(name: impl Into<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = V>,
        V: Into<CellValue>,
    {
        let mut grid = Self::new(name);
        for (r, row) in rows.into_iter().enumerate() {
            for (c, value) in row.into_iter().enumerate() {
                grid.set_cell(r as u32 + 1, c as u32 + 1, value.into());
            }
        }
        grid
    }

    /// Non-empty cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = ((u32, u32), &CellValue)> {
        self.cells.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Sheet for Grid {
    fn name(&self) -> &str {
        &self.name
    }

    fn extent(&self) -> (u32, u32) {
        self.cells.keys().fold((0, 0), |(rows, cols), &(r, c)| {
            (rows.max(r), cols.max(c))
        })
    }

    fn get_cell(&self, row: u32, column: u32) -> CellValue {
        self.cells.get(&(row, column)).cloned().unwrap_or_default()
    }

    fn set_cell(&mut self, row: u32, column: u32, value: CellValue) {
        if value.is_empty() {
            self.cells.remove(&(row, column));
        } else {
            self.cells.insert((row, column), value);
        }
    }

    fn clear_values(&mut self) {
        self.cells.clear();
    }
}
