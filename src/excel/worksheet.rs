//! Worksheet XML (`xl/worksheets/sheetN.xml`) cell model
//!
//! Only `<sheetData>` and `<dimension>` are regenerated; every other element
//! of the worksheet (columns, merges, conditional formats, drawings...) is
//! streamed through untouched.

use super::cell_ref::{cell_reference, parse_cell_reference};
use crate::error::{ReportError, ReportResult};
use crate::types::CellValue;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Reader as XmlReader;
use quick_xml::Writer as XmlWriter;
use std::collections::BTreeMap;
use std::io::Cursor;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellEntry {
    /// Style index (`s` attribute); survives clearing
    pub style: Option<String>,
    pub value: CellValue,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorksheetCells {
    pub cells: BTreeMap<(u32, u32), CellEntry>,
    /// Row-level attributes other than `r` and `spans` (height, row style...)
    pub row_attrs: BTreeMap<u32, Vec<(String, String)>>,
}

impl WorksheetCells {
    /// Highest row and column holding a value.
    pub fn value_extent(&self) -> (u32, u32) {
        self.cells
            .iter()
            .filter(|(_, e)| !e.value.is_empty())
            .fold((0, 0), |(rows, cols), (&(r, c), _)| (rows.max(r), cols.max(c)))
    }

    /// Bounding box over every cell element that will be written.
    fn written_extent(&self) -> Option<((u32, u32), (u32, u32))> {
        let mut min = (u32::MAX, u32::MAX);
        let mut max = (0, 0);
        for (&(r, c), entry) in &self.cells {
            if entry.style.is_none() && entry.value.is_empty() {
                continue;
            }
            min = (min.0.min(r), min.1.min(c));
            max = (max.0.max(r), max.1.max(c));
        }
        (max.0 > 0).then_some((min, max))
    }
}

struct PendingCell {
    row: u32,
    col: u32,
    style: Option<String>,
    kind: Option<String>,
    value_text: String,
    inline_text: String,
}

#[derive(PartialEq)]
enum Capture {
    None,
    Value,
    InlineText,
}

/// Parse the cells of a worksheet part.
pub fn parse_cells(xml: &[u8], shared_strings: &[String]) -> ReportResult<WorksheetCells> {
    let mut reader = XmlReader::from_reader(Cursor::new(xml));
    reader.trim_text(false);
    let mut buf = Vec::new();
    let mut out = WorksheetCells::default();

    let mut in_sheet_data = false;
    let mut current_row = 0u32;
    let mut last_col = 0u32;
    let mut pending: Option<PendingCell> = None;
    let mut capture = Capture::None;
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => match e.local_name().as_ref() {
                b"sheetData" => in_sheet_data = true,
                b"row" if in_sheet_data => {
                    current_row = read_row(&e, &reader, current_row, &mut out)?;
                    last_col = 0;
                }
                b"c" if in_sheet_data => {
                    let cell = read_cell_start(&e, &reader, current_row, last_col)?;
                    last_col = cell.col;
                    pending = Some(cell);
                }
                b"v" if pending.is_some() => capture = Capture::Value,
                b"rPh" if pending.is_some() => phonetic_depth += 1,
                b"t" if pending.is_some() && phonetic_depth == 0 => capture = Capture::InlineText,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"row" if in_sheet_data => {
                    current_row = read_row(&e, &reader, current_row, &mut out)?;
                    last_col = 0;
                }
                b"c" if in_sheet_data => {
                    let cell = read_cell_start(&e, &reader, current_row, last_col)?;
                    last_col = cell.col;
                    finish_cell(cell, shared_strings, &mut out);
                }
                _ => {}
            },
            Event::Text(t) => {
                if let Some(cell) = pending.as_mut() {
                    match capture {
                        Capture::Value => cell.value_text.push_str(&t.unescape()?),
                        Capture::InlineText => cell.inline_text.push_str(&t.unescape()?),
                        Capture::None => {}
                    }
                }
            }
            Event::CData(t) => {
                if let Some(cell) = pending.as_mut() {
                    let text = String::from_utf8_lossy(&t);
                    match capture {
                        Capture::Value => cell.value_text.push_str(&text),
                        Capture::InlineText => cell.inline_text.push_str(&text),
                        Capture::None => {}
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"sheetData" => in_sheet_data = false,
                b"v" | b"t" => capture = Capture::None,
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"c" => {
                    if let Some(cell) = pending.take() {
                        finish_cell(cell, shared_strings, &mut out);
                    }
                    capture = Capture::None;
                }
                _ => {}
            },
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

fn read_row(
    e: &BytesStart<'_>,
    reader: &XmlReader<Cursor<&[u8]>>,
    previous_row: u32,
    out: &mut WorksheetCells,
) -> ReportResult<u32> {
    let mut row = None;
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.decode_and_unescape_value(reader)?.into_owned();
        match key.as_str() {
            "r" => row = value.parse::<u32>().ok(),
            "spans" => {}
            _ => attrs.push((key, value)),
        }
    }
    let row = row.unwrap_or(previous_row + 1);
    if !attrs.is_empty() {
        out.row_attrs.insert(row, attrs);
    }
    Ok(row)
}

fn read_cell_start(
    e: &BytesStart<'_>,
    reader: &XmlReader<Cursor<&[u8]>>,
    current_row: u32,
    last_col: u32,
) -> ReportResult<PendingCell> {
    let mut position = None;
    let mut style = None;
    let mut kind = None;
    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"r" => {
                let reference = attr.decode_and_unescape_value(reader)?;
                position = Some(parse_cell_reference(&reference).ok_or_else(|| {
                    ReportError::Workbook(format!("bad cell reference '{}'", reference))
                })?);
            }
            b"s" => style = Some(attr.decode_and_unescape_value(reader)?.into_owned()),
            b"t" => kind = Some(attr.decode_and_unescape_value(reader)?.into_owned()),
            _ => {}
        }
    }
    let (row, col) = position.unwrap_or((current_row.max(1), last_col + 1));
    Ok(PendingCell {
        row,
        col,
        style,
        kind,
        value_text: String::new(),
        inline_text: String::new(),
    })
}

fn finish_cell(cell: PendingCell, shared_strings: &[String], out: &mut WorksheetCells) {
    let value = match cell.kind.as_deref() {
        Some("s") => cell
            .value_text
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared_strings.get(i))
            .map(|s| CellValue::Text(s.clone()))
            .unwrap_or_default(),
        Some("inlineStr") => CellValue::Text(cell.inline_text),
        Some("b") => CellValue::Bool(cell.value_text.trim() == "1"),
        Some("e") => CellValue::Error(cell.value_text),
        Some("str") | Some("d") => CellValue::Text(cell.value_text),
        _ if cell.value_text.is_empty() => CellValue::Empty,
        _ => match cell.value_text.trim().parse::<f64>() {
            Ok(n) => CellValue::Number(n),
            Err(_) => CellValue::Text(cell.value_text),
        },
    };
    out.cells.insert(
        (cell.row, cell.col),
        CellEntry {
            style: cell.style,
            value,
        },
    );
}

/// Re-emit `original` with its `<sheetData>` replaced by `cells` and the
/// `<dimension>` reference updated.
pub fn rewrite_sheet(original: &[u8], cells: &WorksheetCells) -> ReportResult<Vec<u8>> {
    let mut reader = XmlReader::from_reader(Cursor::new(original));
    reader.trim_text(false);
    let mut writer = XmlWriter::new(Vec::new());
    let mut buf = Vec::new();
    let mut skip_depth = 0usize;
    let mut wrote_sheet_data = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                // The closing </sheetData> was already written by write_sheet_data
                Event::End(_) => skip_depth -= 1,
                Event::Eof => {
                    return Err(ReportError::Workbook("unterminated sheetData".to_string()))
                }
                _ => {}
            }
            buf.clear();
            continue;
        }

        match event {
            Event::Eof => break,
            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                write_sheet_data(&mut writer, &prefix_of(&e), cells)?;
                wrote_sheet_data = true;
                skip_depth = 1;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                write_sheet_data(&mut writer, &prefix_of(&e), cells)?;
                wrote_sheet_data = true;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"dimension" => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let mut dimension = BytesStart::new(name);
                dimension.push_attribute(("ref", dimension_ref(cells).as_str()));
                writer.write_event(Event::Empty(dimension))?;
            }
            event => writer.write_event(event)?,
        }
        buf.clear();
    }

    if !wrote_sheet_data {
        return Err(ReportError::Workbook(
            "worksheet has no sheetData element".to_string(),
        ));
    }
    Ok(writer.into_inner())
}

/// Namespace prefix used by the worksheet (`x:` in some generators).
fn prefix_of(e: &BytesStart<'_>) -> String {
    let name = e.name();
    match name.prefix() {
        Some(p) => format!("{}:", String::from_utf8_lossy(p.as_ref())),
        None => String::new(),
    }
}

fn dimension_ref(cells: &WorksheetCells) -> String {
    match cells.written_extent() {
        Some(((r1, c1), (r2, c2))) if (r1, c1) == (r2, c2) => cell_reference(r1, c1),
        Some(((r1, c1), (r2, c2))) => {
            format!("{}:{}", cell_reference(r1, c1), cell_reference(r2, c2))
        }
        None => "A1".to_string(),
    }
}

fn write_sheet_data(
    writer: &mut XmlWriter<Vec<u8>>,
    prefix: &str,
    cells: &WorksheetCells,
) -> ReportResult<()> {
    let tag = |local: &str| format!("{}{}", prefix, local);

    let mut rows: BTreeMap<u32, Vec<(u32, &CellEntry)>> = BTreeMap::new();
    for (&(r, c), entry) in &cells.cells {
        if entry.style.is_none() && entry.value.is_empty() {
            continue;
        }
        rows.entry(r).or_default().push((c, entry));
    }
    for &r in cells.row_attrs.keys() {
        rows.entry(r).or_default();
    }

    writer.write_event(Event::Start(BytesStart::new(tag("sheetData"))))?;
    for (row, row_cells) in rows {
        let row_number = row.to_string();
        let mut row_start = BytesStart::new(tag("row"));
        row_start.push_attribute(("r", row_number.as_str()));
        if let Some(attrs) = cells.row_attrs.get(&row) {
            for (k, v) in attrs {
                row_start.push_attribute((k.as_str(), v.as_str()));
            }
        }
        if row_cells.is_empty() {
            writer.write_event(Event::Empty(row_start))?;
            continue;
        }
        writer.write_event(Event::Start(row_start))?;
        for (col, entry) in row_cells {
            write_cell(writer, prefix, row, col, entry)?;
        }
        writer.write_event(Event::End(BytesEnd::new(tag("row"))))?;
    }
    writer.write_event(Event::End(BytesEnd::new(tag("sheetData"))))?;
    Ok(())
}

fn write_cell(
    writer: &mut XmlWriter<Vec<u8>>,
    prefix: &str,
    row: u32,
    col: u32,
    entry: &CellEntry,
) -> ReportResult<()> {
    let tag = |local: &str| format!("{}{}", prefix, local);
    let reference = cell_reference(row, col);
    let mut start = BytesStart::new(tag("c"));
    start.push_attribute(("r", reference.as_str()));
    if let Some(style) = &entry.style {
        start.push_attribute(("s", style.as_str()));
    }

    let (kind, text) = match &entry.value {
        CellValue::Empty => {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        CellValue::Number(n) => (None, n.to_string()),
        CellValue::Bool(b) => (Some("b"), if *b { "1" } else { "0" }.to_string()),
        CellValue::Error(e) => (Some("e"), e.clone()),
        CellValue::Text(s) => (Some("inlineStr"), s.clone()),
    };
    if let Some(kind) = kind {
        start.push_attribute(("t", kind));
    }
    writer.write_event(Event::Start(start))?;

    if kind == Some("inlineStr") {
        writer.write_event(Event::Start(BytesStart::new(tag("is"))))?;
        let mut t = BytesStart::new(tag("t"));
        if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
            t.push_attribute(("xml:space", "preserve"));
        }
        writer.write_event(Event::Start(t))?;
        writer.write_event(Event::Text(BytesText::new(&text)))?;
        writer.write_event(Event::End(BytesEnd::new(tag("t"))))?;
        writer.write_event(Event::End(BytesEnd::new(tag("is"))))?;
    } else {
        writer.write_event(Event::Start(BytesStart::new(tag("v"))))?;
        writer.write_event(Event::Text(BytesText::new(&text)))?;
        writer.write_event(Event::End(BytesEnd::new(tag("v"))))?;
    }

    writer.write_event(Event::End(BytesEnd::new(tag("c"))))?;
    Ok(())
}

/// Plain text of every `<si>` in `xl/sharedStrings.xml`, phonetic runs excluded.
pub fn parse_shared_strings(xml: &[u8]) -> ReportResult<Vec<String>> {
    let mut reader = XmlReader::from_reader(Cursor::new(xml));
    reader.trim_text(false);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => phonetic_depth += 1,
                b"t" if phonetic_depth == 0 => in_text = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(t) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&t.unescape()?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"t" => in_text = false,
                _ => {}
            },
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}
