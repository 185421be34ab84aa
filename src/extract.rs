//! Multi-format text extraction for uploaded documents.
//!
//! Handles every content type the validator admits: PDF, OOXML Word and
//! Excel, legacy Word 97 / Excel 97, and plain text. The result is a single
//! UTF-8 string; structure beyond paragraph and row breaks is discarded.
//!
//! Parsing is CPU-bound, so [`TextExtractor::extract`] runs it on the
//! blocking thread pool.

use std::io::Read;

use quick_xml::events::Event;
use thiserror::Error;

use docqa_core::validate::{
    media_type_essence, MIME_DOC, MIME_DOCX, MIME_PDF, MIME_TEXT, MIME_XLS, MIME_XLSX,
};
use docqa_core::IngestError;

/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Compound File Binary signature shared by `.doc` and `.xls`.
const OLE_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
/// The CFB header sector carries no document text.
const OLE_HEADER_BYTES: usize = 512;
/// Shortest printable run kept from a legacy binary.
const MIN_LEGACY_RUN: usize = 4;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("legacy Office extraction failed: {0}")]
    Legacy(String),
}

impl From<ExtractError> for IngestError {
    fn from(e: ExtractError) -> Self {
        IngestError::ExtractionFailed(e.to_string())
    }
}

/// Extracts plain text from document bytes by declared content type.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    match media_type_essence(content_type).as_str() {
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes),
        MIME_XLSX => extract_xlsx(bytes),
        MIME_DOC | MIME_XLS => extract_legacy(bytes),
        MIME_TEXT => Ok(extract_plain(bytes)),
        _ => Err(ExtractError::UnsupportedContentType(
            content_type.to_string(),
        )),
    }
}

/// Handle to the extractor, held by the application context.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextExtractor;

impl TextExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract on the blocking pool. A panic inside a parser is reported as
    /// an extraction failure.
    pub async fn extract(&self, bytes: Vec<u8>, content_type: &str) -> Result<String, IngestError> {
        let content_type = content_type.to_string();
        let text = tokio::task::spawn_blocking(move || extract_text(&bytes, &content_type))
            .await
            .map_err(|e| IngestError::ExtractionFailed(format!("extractor aborted: {e}")))??;
        Ok(text)
    }
}

fn extract_plain(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text: &str = text.as_ref();
    text.strip_prefix('\u{feff}').unwrap_or(text).to_string()
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut Archive<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{name}: {e}")))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let doc_xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    docx_paragraphs(&doc_xml)
}

/// Text of `w:t` runs, one line per non-empty `w:p`. Tabs and breaks inside
/// a paragraph become `\t` and `\n`.
fn docx_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut para = String::new();
    let mut in_t = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_t = true,
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => para.push('\t'),
                b"br" | b"cr" => para.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                para.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => {
                    let line = para.trim();
                    if !line.is_empty() {
                        if !out.is_empty() {
                            out.push('\n');
                        }
                        out.push_str(line);
                    }
                    para.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    let tail = para.trim();
    if !tail.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(tail);
    }
    Ok(out)
}

fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let sheet_names = list_worksheet_names(&archive);
    let mut sheets = Vec::new();
    for name in sheet_names.into_iter().take(XLSX_MAX_SHEETS) {
        let sheet_xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let text = extract_xlsx_sheet_cells(&sheet_xml, &shared_strings)?;
        if !text.is_empty() {
            sheets.push(text);
        }
    }
    Ok(sheets.join("\n\n"))
}

/// One string per `si`, concatenating rich-text runs. A workbook without a
/// shared string table is valid.
fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>, ExtractError> {
    if archive.index_for_name("xl/sharedStrings.xml").is_none() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn list_worksheet_names(archive: &Archive<'_>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

#[derive(Clone, Copy, PartialEq)]
enum CellKind {
    Shared,
    Inline,
    Value,
}

/// Cells of one sheet: tab-separated within a row, one row per line.
fn extract_xlsx_sheet_cells(xml: &[u8], shared_strings: &[String]) -> Result<String, ExtractError> {
    let mut rows: Vec<String> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut kind = CellKind::Value;
    let mut in_value = false;
    let mut cell_text = String::new();
    let mut cell_count = 0usize;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    kind = CellKind::Value;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"t" {
                            kind = match attr.value.as_ref() {
                                b"s" => CellKind::Shared,
                                b"inlineStr" => CellKind::Inline,
                                _ => CellKind::Value,
                            };
                        }
                    }
                    cell_text.clear();
                }
                b"v" => in_value = kind != CellKind::Inline,
                b"t" => in_value = kind == CellKind::Inline,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                cell_text.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    let raw = cell_text.trim();
                    let value = match kind {
                        CellKind::Shared => raw
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| shared_strings.get(i))
                            .cloned()
                            .unwrap_or_default(),
                        CellKind::Inline | CellKind::Value => raw.to_string(),
                    };
                    if !value.is_empty() {
                        row.push(value);
                        cell_count += 1;
                    }
                }
                b"row" => {
                    if !row.is_empty() {
                        rows.push(row.join("\t"));
                        row.clear();
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !row.is_empty() {
        rows.push(row.join("\t"));
    }
    Ok(rows.join("\n"))
}

/// Best-effort text recovery from a Word 97 / Excel 97 compound file.
///
/// The container is not parsed. Printable UTF-16LE runs and printable
/// 8-bit runs are collected in file order, which recovers body text and
/// cell strings along with some stream names and metadata.
fn extract_legacy(bytes: &[u8]) -> Result<String, ExtractError> {
    if bytes.len() < OLE_SIGNATURE.len() || bytes[..OLE_SIGNATURE.len()] != OLE_SIGNATURE {
        return Err(ExtractError::Legacy(
            "missing compound file signature".to_string(),
        ));
    }
    let body = bytes.get(OLE_HEADER_BYTES..).unwrap_or(&[]);

    let mut runs = utf16_runs(body);
    runs.extend(byte_runs(body));
    runs.sort_by_key(|(offset, _)| *offset);

    Ok(runs
        .into_iter()
        .map(|(_, text)| text)
        .collect::<Vec<_>>()
        .join("\n"))
}

fn is_text_char(c: char) -> bool {
    !c.is_control() || c == '\t'
}

fn keep_run(run: &str) -> bool {
    run.chars().count() >= MIN_LEGACY_RUN && run.chars().any(|c| c.is_alphabetic())
}

/// UTF-16LE runs at even offsets. Code units at or above U+2000 are
/// rejected, which keeps pairs of ASCII bytes from decoding as CJK.
fn utf16_runs(bytes: &[u8]) -> Vec<(usize, String)> {
    let mut runs = Vec::new();
    let mut current = String::new();
    let mut start = 0;
    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let unit = u16::from_le_bytes([pair[0], pair[1]]);
        let ch = if unit < 0x2000 {
            char::from_u32(unit as u32).filter(|c| is_text_char(*c) && *c != '\0')
        } else {
            None
        };
        match ch {
            Some(c) => {
                if current.is_empty() {
                    start = i * 2;
                }
                current.push(c);
            }
            None => {
                let run = current.trim();
                if keep_run(run) && mostly_latin(run) {
                    runs.push((start, run.to_string()));
                }
                current.clear();
            }
        }
    }
    let run = current.trim();
    if keep_run(run) && mostly_latin(run) {
        runs.push((start, run.to_string()));
    }
    runs
}

/// At least half of the run is Latin-1.
fn mostly_latin(run: &str) -> bool {
    let total = run.chars().count();
    let latin = run.chars().filter(|c| (*c as u32) < 0x100).count();
    latin * 2 >= total
}

/// Runs of printable ASCII and Latin-1 bytes.
fn byte_runs(bytes: &[u8]) -> Vec<(usize, String)> {
    let mut runs = Vec::new();
    let mut current = String::new();
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        let printable = (0x20..0x7F).contains(&b) || b == b'\t' || b >= 0xA0;
        if printable {
            if current.is_empty() {
                start = i;
            }
            current.push(char::from(b));
        } else {
            let run = current.trim();
            if keep_run(run) {
                runs.push((start, run.to_string()));
            }
            current.clear();
        }
    }
    let run = current.trim();
    if keep_run(run) {
        runs.push((start, run.to_string()));
    }
    runs
}
