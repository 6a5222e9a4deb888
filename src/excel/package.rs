//! In-place editing of an .xlsx package
//!
//! The dated workbook starts as a byte-for-byte copy of the template, which may
//! carry macros, charts and pivot caches that no writer library reproduces.
//! So instead of re-generating the workbook, one worksheet part is rewritten
//! and every other zip entry is copied back as-is.

use super::worksheet::{self, WorksheetCells};
use super::Sheet;
use crate::error::{ReportError, ReportResult};
use crate::types::CellValue;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;
use quick_xml::Writer as XmlWriter;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const CALC_CHAIN_PART: &str = "xl/calcChain.xml";

/// Workbook children that must come after `<calcPr>`.
const AFTER_CALC_PR: [&[u8]; 9] = [
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

struct Entry {
    name: String,
    is_dir: bool,
    data: Vec<u8>,
}

/// All parts of an .xlsx held in memory, in their original order.
pub struct XlsxPackage {
    path: PathBuf,
    entries: Vec<Entry>,
    /// Sheet name → worksheet part name
    sheets: Vec<(String, String)>,
}

impl XlsxPackage {
    pub fn open(path: &Path) -> ReportResult<Self> {
        let file = File::open(path)?;
        let mut zip = ZipArchive::new(file)?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i)?;
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            entries.push(Entry {
                name: entry.name().to_string(),
                is_dir: entry.is_dir(),
                data,
            });
        }

        let mut package = Self {
            path: path.to_path_buf(),
            entries,
            sheets: Vec::new(),
        };
        package.sheets = package.resolve_sheets()?;
        Ok(package)
    }

    fn part(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| !e.is_dir && e.name == name)
            .map(|e| e.data.as_slice())
    }

    fn required_part(&self, name: &str) -> ReportResult<&[u8]> {
        self.part(name)
            .ok_or_else(|| ReportError::Workbook(format!("missing package part {}", name)))
    }

    fn resolve_sheets(&self) -> ReportResult<Vec<(String, String)>> {
        let rels = parse_relationships(self.required_part(WORKBOOK_RELS_PART)?)?;
        let declared = parse_workbook_sheets(self.required_part(WORKBOOK_PART)?)?;

        let mut sheets = Vec::with_capacity(declared.len());
        for (name, rel_id) in declared {
            let target = rels.get(&rel_id).ok_or_else(|| {
                ReportError::Workbook(format!("sheet '{}' has no relationship {}", name, rel_id))
            })?;
            sheets.push((name, resolve_target(target)));
        }
        Ok(sheets)
    }

    /// Open `sheet_name` for editing, consuming the package.
    pub fn into_sheet(self, sheet_name: &str) -> ReportResult<TemplateSheet> {
        let Some(part) = self
            .sheets
            .iter()
            .find(|(name, _)| name == sheet_name)
            .map(|(_, part)| part.clone())
        else {
            return Err(ReportError::MissingSheet {
                path: self.path.clone(),
                sheet: sheet_name.to_string(),
            });
        };

        let shared_strings = match self.part(SHARED_STRINGS_PART) {
            Some(bytes) => worksheet::parse_shared_strings(bytes)?,
            None => Vec::new(),
        };
        let cells = worksheet::parse_cells(self.required_part(&part)?, &shared_strings)?;

        Ok(TemplateSheet {
            name: sheet_name.to_string(),
            part,
            cells,
            package: self,
        })
    }

    /// Write the package back to its path with `part` replaced. The calc chain
    /// is dropped and a full recalculation on load is requested, since cell
    /// values changed underneath the formulas.
    fn save_with(&self, part: &str, data: Vec<u8>) -> ReportResult<()> {
        let mut overrides: HashMap<&str, Vec<u8>> = HashMap::new();
        overrides.insert(part, data);
        overrides.insert(
            WORKBOOK_PART,
            patch_full_calc_on_load(self.required_part(WORKBOOK_PART)?)?,
        );
        overrides.insert(
            WORKBOOK_RELS_PART,
            remove_calc_chain_relationship(self.required_part(WORKBOOK_RELS_PART)?)?,
        );
        if let Some(types) = self.part(CONTENT_TYPES_PART) {
            overrides.insert(CONTENT_TYPES_PART, remove_calc_chain_content_type(types)?);
        }

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = ZipWriter::new(temp.as_file_mut());
            let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

            for entry in &self.entries {
                if entry.is_dir {
                    writer.add_directory(entry.name.as_str(), options)?;
                    continue;
                }
                if entry.name.eq_ignore_ascii_case(CALC_CHAIN_PART) {
                    continue;
                }
                writer.start_file(entry.name.as_str(), options)?;
                match overrides.get(entry.name.as_str()) {
                    Some(bytes) => writer.write_all(bytes)?,
                    None => writer.write_all(&entry.data)?,
                }
            }
            writer.finish()?;
        }
        // Keep the mode of the file being replaced, not the temp file's 0600
        fs::set_permissions(temp.path(), fs::metadata(&self.path)?.permissions())?;
        temp.persist(&self.path).map_err(|e| ReportError::Io(e.error))?;
        Ok(())
    }
}

/// The destination sheet of a workbook opened through [`XlsxPackage`].
pub struct TemplateSheet {
    name: String,
    part: String,
    cells: WorksheetCells,
    package: XlsxPackage,
}

impl TemplateSheet {
    pub fn save(self) -> ReportResult<()> {
        let original = self.package.required_part(&self.part)?;
        let rewritten = worksheet::rewrite_sheet(original, &self.cells)?;
        self.package.save_with(&self.part, rewritten)
    }
}

impl Sheet for TemplateSheet {
    fn name(&self) -> &str {
        &self.name
    }

    fn extent(&self) -> (u32, u32) {
        self.cells.value_extent()
    }

    fn get_cell(&self, row: u32, column: u32) -> CellValue {
        self.cells
            .cells
            .get(&(row, column))
            .map(|e| e.value.clone())
            .unwrap_or_default()
    }

    fn set_cell(&mut self, row: u32, column: u32, value: CellValue) {
        self.cells.cells.entry((row, column)).or_default().value = value;
    }

    fn clear_values(&mut self) {
        for entry in self.cells.cells.values_mut() {
            entry.value = CellValue::Empty;
        }
    }
}

/// `xl/worksheets/sheet1.xml` from a workbook relationship target.
fn resolve_target(target: &str) -> String {
    let target = target.replace('\\', "/");
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut parts: Vec<&str> = vec!["xl"];
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

fn xml_attr_value(
    e: &BytesStart<'_>,
    reader: &XmlReader<Cursor<&[u8]>>,
    key: &[u8],
) -> ReportResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.decode_and_unescape_value(reader)?.into_owned()));
        }
    }
    Ok(None)
}

/// Relationship id → target.
fn parse_relationships(xml: &[u8]) -> ReportResult<HashMap<String, String>> {
    let mut reader = XmlReader::from_reader(Cursor::new(xml));
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut out = HashMap::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let id = xml_attr_value(&e, &reader, b"Id")?;
                let target = xml_attr_value(&e, &reader, b"Target")?;
                if let (Some(id), Some(target)) = (id, target) {
                    out.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// `(sheet name, relationship id)` in workbook order.
fn parse_workbook_sheets(xml: &[u8]) -> ReportResult<Vec<(String, String)>> {
    let mut reader = XmlReader::from_reader(Cursor::new(xml));
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut out = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut rel_id = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    // `r:id`, whatever the relationships prefix is called
                    if attr.key.local_name().as_ref() == b"id" && attr.key.prefix().is_some() {
                        rel_id = Some(attr.decode_and_unescape_value(&reader)?.into_owned());
                    } else if attr.key.as_ref() == b"name" {
                        name = Some(attr.decode_and_unescape_value(&reader)?.into_owned());
                    }
                }
                if let (Some(name), Some(rel_id)) = (name, rel_id) {
                    out.push((name, rel_id));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Set `fullCalcOnLoad="1"` on `<calcPr>`, inserting the element if absent.
fn patch_full_calc_on_load(xml: &[u8]) -> ReportResult<Vec<u8>> {
    let mut reader = XmlReader::from_reader(Cursor::new(xml));
    reader.trim_text(false);
    let mut writer = XmlWriter::new(Vec::new());
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut calc_pr_done = false;
    let mut prefix = String::new();

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,
            Event::Start(ref e) | Event::Empty(ref e)
                if depth == 1 && e.local_name().as_ref() == b"calcPr" =>
            {
                let patched = with_full_calc(e, &reader)?;
                if matches!(event, Event::Start(_)) {
                    writer.write_event(Event::Start(patched))?;
                    depth += 1;
                } else {
                    writer.write_event(Event::Empty(patched))?;
                }
                calc_pr_done = true;
            }
            Event::Start(ref e) | Event::Empty(ref e)
                if depth == 1
                    && !calc_pr_done
                    && AFTER_CALC_PR.iter().any(|n| *n == e.local_name().as_ref()) =>
            {
                writer.write_event(Event::Empty(new_calc_pr(&prefix)))?;
                calc_pr_done = true;
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                }
                writer.write_event(event)?;
            }
            Event::Start(ref e) => {
                if depth == 0 {
                    let name = e.name();
                    if let Some(p) = name.prefix() {
                        prefix = format!("{}:", String::from_utf8_lossy(p.as_ref()));
                    }
                }
                depth += 1;
                writer.write_event(event)?;
            }
            Event::End(_) => {
                if depth == 1 && !calc_pr_done {
                    writer.write_event(Event::Empty(new_calc_pr(&prefix)))?;
                    calc_pr_done = true;
                }
                depth = depth.saturating_sub(1);
                writer.write_event(event)?;
            }
            event => writer.write_event(event)?,
        }
        buf.clear();
    }
    Ok(writer.into_inner())
}

fn new_calc_pr(prefix: &str) -> BytesStart<'static> {
    let mut calc_pr = BytesStart::new(format!("{}calcPr", prefix));
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    calc_pr
}

fn with_full_calc(
    e: &BytesStart<'_>,
    reader: &XmlReader<Cursor<&[u8]>>,
) -> ReportResult<BytesStart<'static>> {
    let mut patched = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"fullCalcOnLoad" {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.decode_and_unescape_value(reader)?.into_owned();
        patched.push_attribute((key.as_str(), value.as_str()));
    }
    patched.push_attribute(("fullCalcOnLoad", "1"));
    Ok(patched)
}

/// Copy `xml`, dropping any element (and its children) matched by `excluded`.
fn filter_elements<F>(xml: &[u8], excluded: F) -> ReportResult<Vec<u8>>
where
    F: Fn(&BytesStart<'_>, &XmlReader<Cursor<&[u8]>>) -> ReportResult<bool>,
{
    let mut reader = XmlReader::from_reader(Cursor::new(xml));
    reader.trim_text(false);
    let mut writer = XmlWriter::new(Vec::new());
    let mut buf = Vec::new();
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
            continue;
        }
        match event {
            Event::Eof => break,
            Event::Start(ref e) if excluded(e, &reader)? => skip_depth = 1,
            Event::Empty(ref e) if excluded(e, &reader)? => {}
            event => writer.write_event(event)?,
        }
        buf.clear();
    }
    Ok(writer.into_inner())
}

fn remove_calc_chain_relationship(xml: &[u8]) -> ReportResult<Vec<u8>> {
    filter_elements(xml, |e, reader| {
        if e.local_name().as_ref() != b"Relationship" {
            return Ok(false);
        }
        let target = xml_attr_value(e, reader, b"Target")?.unwrap_or_default();
        let kind = xml_attr_value(e, reader, b"Type")?.unwrap_or_default();
        Ok(target.to_ascii_lowercase().ends_with("calcchain.xml")
            || kind.to_ascii_lowercase().ends_with("/calcchain"))
    })
}

fn remove_calc_chain_content_type(xml: &[u8]) -> ReportResult<Vec<u8>> {
    filter_elements(xml, |e, reader| {
        if e.local_name().as_ref() != b"Override" {
            return Ok(false);
        }
        let part = xml_attr_value(e, reader, b"PartName")?.unwrap_or_default();
        Ok(part
            .trim_start_matches('/')
            .eq_ignore_ascii_case(CALC_CHAIN_PART))
    })
}
