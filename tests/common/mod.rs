//! Shared fixtures: fixture workbooks and a fake export tool / office suite

#![allow(dead_code)]

use daily_workbook::bootstrap::RuntimeContext;
use daily_workbook::command::{CommandOutput, CommandRunner, CommandSpec};
use daily_workbook::config::{Credentials, PipelineConfig};
use daily_workbook::ReportResult;
use rust_xlsxwriter::{Format, Workbook};
use std::cell::RefCell;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

pub const API_KEY_ID: &str = "KEYID-7f3a9c";
pub const API_KEY: &str = "SECRET-b41d0e77";
pub const MACRO_BYTES: &[u8] = b"\xd0\xcf\x11\xe0fake vba project";

/// Raw sheet rows written by the fake export tool
pub fn raw_rows() -> Vec<(String, f64)> {
    vec![
        ("2024-07-02 07:00".to_string(), 41.0),
        ("2024-07-02 07:05".to_string(), 42.5),
        ("2024-07-02 07:10".to_string(), 40.25),
    ]
}

pub fn write_raw_export(path: &Path, sheet: &str) {
    let mut workbook = Workbook::new();
    let ws = workbook.add_worksheet();
    ws.set_name(sheet).unwrap();
    ws.write_string(0, 0, "time").unwrap();
    ws.write_string(0, 1, "fill_raw").unwrap();
    for (i, (time, value)) in raw_rows().iter().enumerate() {
        let row = i as u32 + 1;
        ws.write_string(row, 0, time).unwrap();
        ws.write_number(row, 1, *value).unwrap();
    }
    workbook.save(path).unwrap();
}

/// Template with a `Summary` sheet whose formulas read `Raw Import`, and a
/// `Raw Import` sheet full of stale sentinel values.
pub fn write_template(path: &Path) {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    let summary = workbook.add_worksheet();
    summary.set_name("Summary").unwrap();
    summary.write_string(0, 0, "Peak fill").unwrap();
    summary
        .write_formula(0, 1, "=MAX('Raw Import'!B2:B300)")
        .unwrap();

    let import = workbook.add_worksheet();
    import.set_name("Raw Import").unwrap();
    import.write_string_with_format(0, 0, "SENTINEL", &bold).unwrap();
    import.write_string(0, 1, "SENTINEL").unwrap();
    import.write_number(5, 0, 999.0).unwrap();
    import.write_string(20, 6, "SENTINEL").unwrap();

    workbook.save(path).unwrap();
}

/// Rewrite a package, letting `patch` edit any part, then append `extra` parts.
pub fn rewrite_package<F>(path: &Path, patch: F, extra: &[(&str, &[u8])])
where
    F: Fn(&str, Vec<u8>) -> Vec<u8>,
{
    let mut parts = Vec::new();
    {
        let mut zip = ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).unwrap();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            parts.push((entry.name().to_string(), data));
        }
    }

    let file = fs::File::create(path).unwrap();
    let mut writer = ZipWriter::new(file);
    for (name, data) in parts {
        let data = patch(&name, data);
        writer.start_file(name, FileOptions::default()).unwrap();
        writer.write_all(&data).unwrap();
    }
    for (name, data) in extra {
        writer.start_file(*name, FileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap();
}

/// Add a macro project and a calc chain, the way a desktop-saved .xlsm has them.
pub fn add_macro_and_calc_chain(path: &Path) {
    rewrite_package(
        path,
        |name, data| {
            let text = String::from_utf8(data.clone()).unwrap_or_default();
            match name {
                "[Content_Types].xml" => text
                    .replace(
                        "</Types>",
                        "<Override PartName=\"/xl/calcChain.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml\"/></Types>",
                    )
                    .into_bytes(),
                "xl/_rels/workbook.xml.rels" => text
                    .replace(
                        "</Relationships>",
                        "<Relationship Id=\"rId99\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain\" Target=\"calcChain.xml\"/></Relationships>",
                    )
                    .into_bytes(),
                _ => data,
            }
        },
        &[
            (
                "xl/calcChain.xml",
                &b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<calcChain xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"><c r=\"B1\" i=\"1\"/></calcChain>"[..],
            ),
            ("xl/vbaProject.bin", MACRO_BYTES),
        ],
    );
}

pub fn read_part(path: &Path, name: &str) -> Option<Vec<u8>> {
    let mut zip = ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    let mut entry = zip.by_name(name).ok()?;
    let mut data = Vec::new();
    entry.read_to_end(&mut data).unwrap();
    Some(data)
}

/// Working layout: export tool with a ready runtime, templates, work dir.
pub struct Workspace {
    pub temp: TempDir,
    pub config: PipelineConfig,
    pub templates: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let tool_dir = temp.path().join("vde");
        fs::create_dir_all(&tool_dir).unwrap();
        let templates = temp.path().join("templates");
        fs::create_dir_all(&templates).unwrap();

        let config = PipelineConfig {
            work_dir: temp.path().join("work"),
            export_script: tool_dir.join("vde.py"),
            credentials: Credentials {
                api_key_id: API_KEY_ID.to_string(),
                api_key: API_KEY.to_string(),
                org_id: "org-3895".to_string(),
            },
            ..PipelineConfig::default()
        };
        config.validate().unwrap();

        let runtime = RuntimeContext::unprobed(&tool_dir, &config.office_program);
        fs::create_dir_all(runtime.interpreter.parent().unwrap()).unwrap();
        fs::write(&runtime.interpreter, b"").unwrap();

        Self {
            temp,
            config,
            templates,
        }
    }

    pub fn template(&self, name: &str) -> PathBuf {
        let path = self.templates.join(name);
        write_template(&path);
        path
    }
}

/// Stands in for `which`, the export tool and the office suite.
pub struct FakeTools {
    pub office_installed: bool,
    pub export_status: i32,
    pub export_writes_output: bool,
    pub raw_sheet: String,
    pub stdout_lines: usize,
    pub calls: RefCell<Vec<CommandSpec>>,
}

impl Default for FakeTools {
    fn default() -> Self {
        Self {
            office_installed: false,
            export_status: 0,
            export_writes_output: true,
            raw_sheet: "RAW".to_string(),
            stdout_lines: 3,
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl FakeTools {
    pub fn export_calls(&self) -> Vec<CommandSpec> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.args.iter().any(|a| a == "excel"))
            .cloned()
            .collect()
    }

    pub fn office_calls(&self) -> Vec<CommandSpec> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.args.iter().any(|a| a == "--headless"))
            .cloned()
            .collect()
    }

    fn value_after(spec: &CommandSpec, flag: &str) -> String {
        let idx = spec.args.iter().position(|a| a == flag).unwrap();
        spec.args[idx + 1].clone()
    }
}

impl CommandRunner for FakeTools {
    fn run(&self, spec: &CommandSpec) -> ReportResult<CommandOutput> {
        self.calls.borrow_mut().push(spec.clone());
        let program = spec.program_name();

        if program == "which" {
            let status = if self.office_installed { 0 } else { 1 };
            return Ok(CommandOutput {
                status: Some(status),
                ..CommandOutput::default()
            });
        }

        if spec.args.iter().any(|a| a == "--headless") {
            // Converter: write `<stem>.xlsx` into --outdir
            let outdir = PathBuf::from(Self::value_after(spec, "--outdir"));
            let input = PathBuf::from(spec.args.last().unwrap());
            fs::copy(&input, outdir.join(input.file_name().unwrap())).unwrap();
            return Ok(CommandOutput {
                status: Some(0),
                stdout: "convert ok".to_string(),
                ..CommandOutput::default()
            });
        }

        // Export tool
        if self.export_status == 0 && self.export_writes_output {
            let output = PathBuf::from(Self::value_after(spec, "--output"));
            write_raw_export(&output, &self.raw_sheet);
        }
        let stdout = (1..=self.stdout_lines)
            .map(|i| format!("progress line {} (key {})", i, API_KEY_ID))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(CommandOutput {
            status: Some(self.export_status),
            stdout,
            stderr: if self.export_status == 0 {
                String::new()
            } else {
                format!("401 Unauthorized for key {}", API_KEY)
            },
        })
    }
}
