use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use inventory_model::{CellRef, CellValue, SheetNameError, Workbook, Worksheet};
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use zip::ZipArchive;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const DEFAULT_SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const REL_TYPE_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const REL_TYPE_SHARED_STRINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    XmlAttr(#[from] AttrError),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("invalid worksheet name: {0}")]
    InvalidSheetName(#[from] SheetNameError),
    #[error("missing required part: {0}")]
    MissingPart(String),
    #[error("invalid cell reference: {0}")]
    InvalidCellRef(String),
    #[error("invalid workbook: {0}")]
    Invalid(String),
}

/// Read the cell values of every worksheet in the XLSX file at `path`.
pub fn read_workbook(path: impl AsRef<Path>) -> Result<Workbook, ReadError> {
    let file = File::open(path)?;
    read_workbook_from_reader(file)
}

pub fn read_workbook_from_bytes(bytes: &[u8]) -> Result<Workbook, ReadError> {
    read_workbook_from_reader(Cursor::new(bytes))
}

pub fn read_workbook_from_reader<R: Read + Seek>(mut reader: R) -> Result<Workbook, ReadError> {
    // Callers may pass a reused reader.
    reader.seek(SeekFrom::Start(0))?;
    let mut archive = ZipArchive::new(reader)?;

    let workbook_xml = read_zip_part_required(&mut archive, WORKBOOK_PART)?;
    let workbook_rels = read_zip_part_required(&mut archive, WORKBOOK_RELS_PART)?;

    let rels = parse_relationships(&workbook_rels)?;
    let shared_strings_part = rels
        .values()
        .find(|rel| rel.rel_type == REL_TYPE_SHARED_STRINGS)
        .map(|rel| resolve_target("xl", &rel.target))
        .unwrap_or_else(|| DEFAULT_SHARED_STRINGS_PART.to_string());
    let shared_strings = match read_zip_part_optional(&mut archive, &shared_strings_part)? {
        Some(bytes) => parse_shared_strings(&bytes)?,
        None => Vec::new(),
    };

    let mut workbook = Workbook::new();
    for sheet in parse_workbook_sheets(&workbook_xml)? {
        let Some(rel) = rels.get(&sheet.relationship_id) else {
            return Err(ReadError::Invalid(format!(
                "sheet {:?} references unknown relationship {}",
                sheet.name, sheet.relationship_id
            )));
        };
        if rel.rel_type != REL_TYPE_WORKSHEET {
            // Chart sheets and dialog sheets carry no cell data.
            log::debug!("skipping non-worksheet sheet {:?}", sheet.name);
            continue;
        }
        let part = resolve_target("xl", &rel.target);
        let xml = read_zip_part_optional(&mut archive, &part)?
            .ok_or_else(|| ReadError::MissingPart(part.clone()))?;

        let worksheet = workbook.add_sheet(&sheet.name)?;
        parse_worksheet_into(worksheet, &xml, &shared_strings)?;
    }

    Ok(workbook)
}

pub(crate) fn read_zip_part_required<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, ReadError> {
    read_zip_part_optional(archive, name)?.ok_or_else(|| ReadError::MissingPart(name.to_string()))
}

pub(crate) fn read_zip_part_optional<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>, ReadError> {
    match archive.by_name(name) {
        Ok(mut file) => {
            if file.is_dir() {
                return Ok(None);
            }
            // ZIP metadata is untrusted; don't preallocate from the advertised size.
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            Ok(Some(buf))
        }
        Err(zip::result::ZipError::FileNotFound) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Relationship {
    pub(crate) rel_type: String,
    pub(crate) target: String,
}

pub(crate) fn parse_relationships(bytes: &[u8]) -> Result<HashMap<String, Relationship>, ReadError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut out = HashMap::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let id = attr_value(&e, b"Id")?;
                let rel_type = attr_value(&e, b"Type")?;
                let target = attr_value(&e, b"Target")?;
                if let (Some(id), Some(rel_type), Some(target)) = (id, rel_type, target) {
                    out.insert(id, Relationship { rel_type, target });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Resolve a relationship target relative to the directory of its source part.
pub(crate) fn resolve_target(base_dir: &str, target: &str) -> String {
    let target = target.replace('\\', "/");
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

#[derive(Debug, Clone)]
pub(crate) struct ParsedSheet {
    pub(crate) name: String,
    pub(crate) sheet_id: Option<u32>,
    pub(crate) relationship_id: String,
}

pub(crate) fn parse_workbook_sheets(bytes: &[u8]) -> Result<Vec<ParsedSheet>, ReadError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let name = attr_value(&e, b"name")?;
                // `r:id`; the local name is enough since `sheetId` differs.
                let relationship_id = attr_value(&e, b"id")?;
                let sheet_id = attr_value(&e, b"sheetId")?.and_then(|id| id.trim().parse().ok());
                match (name, relationship_id) {
                    (Some(name), Some(relationship_id)) => sheets.push(ParsedSheet {
                        name,
                        sheet_id,
                        relationship_id,
                    }),
                    _ => {
                        return Err(ReadError::Invalid(
                            "<sheet> without name or r:id".to_string(),
                        ))
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(sheets)
}

/// One `<si>` of the shared string table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SharedStringItem {
    pub(crate) text: String,
    /// The item carries runs or phonetic data besides its plain `<t>`.
    pub(crate) rich: bool,
}

fn parse_shared_strings(bytes: &[u8]) -> Result<Vec<String>, ReadError> {
    Ok(parse_shared_string_items(bytes)?
        .into_iter()
        .map(|item| item.text)
        .collect())
}

pub(crate) fn parse_shared_string_items(bytes: &[u8]) -> Result<Vec<SharedStringItem>, ReadError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut out = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"si" => {
                let mut rich = false;
                let text = parse_rich_text(&mut reader, b"si", &mut rich)?;
                out.push(SharedStringItem { text, rich });
            }
            Event::Empty(e) if e.local_name().as_ref() == b"si" => out.push(SharedStringItem {
                text: String::new(),
                rich: false,
            }),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Concatenate the `<t>` text of a string item (`<si>` or `<is>`), including
/// rich-text runs, ignoring phonetic hints. `rich` is set when anything other
/// than a plain `<t>` is present.
fn parse_rich_text<R: BufRead>(
    reader: &mut Reader<R>,
    end_local: &[u8],
    rich: &mut bool,
) -> Result<String, ReadError> {
    let mut buf = Vec::new();
    let mut out = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => {
                out.push_str(&read_text(reader, b"t")?);
            }
            Event::Start(e) if e.local_name().as_ref() == b"r" => {
                *rich = true;
                out.push_str(&parse_rich_text(reader, b"r", rich)?);
            }
            Event::Start(e) => {
                if end_local != b"r" {
                    *rich = true;
                }
                reader.read_to_end_into(e.name(), &mut Vec::new())?;
            }
            Event::End(e) if e.local_name().as_ref() == end_local => break,
            Event::Eof => {
                return Err(ReadError::Invalid(format!(
                    "unexpected EOF inside <{}>",
                    String::from_utf8_lossy(end_local)
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn read_text<R: BufRead>(reader: &mut Reader<R>, end_local: &[u8]) -> Result<String, ReadError> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::CData(e) => text.push_str(std::str::from_utf8(e.as_ref())?),
            Event::End(e) if e.local_name().as_ref() == end_local => break,
            Event::Eof => {
                return Err(ReadError::Invalid(format!(
                    "unexpected EOF inside <{}>",
                    String::from_utf8_lossy(end_local)
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

#[derive(Debug)]
struct PendingCell {
    cell_ref: CellRef,
    t: Option<String>,
    value_text: Option<String>,
    inline_text: Option<String>,
}

fn parse_worksheet_into(
    worksheet: &mut Worksheet,
    xml: &[u8],
    shared_strings: &[String],
) -> Result<(), ReadError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();

    // Rows and cells may omit `r`; fall back to document order.
    let mut next_row: u32 = 0;
    let mut current_row: u32 = 0;
    let mut next_col: u32 = 0;
    let mut pending: Option<PendingCell> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                current_row = match attr_value(&e, b"r")? {
                    Some(r) => match r.trim().parse::<u32>() {
                        Ok(n) if n >= 1 => n - 1,
                        _ => return Err(ReadError::InvalidCellRef(format!("row {r}"))),
                    },
                    None => next_row,
                };
                next_row = current_row + 1;
                next_col = 0;
            }
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                let cell_ref = cell_ref_for(&e, current_row, next_col)?;
                next_col = cell_ref.col + 1;
                pending = Some(PendingCell {
                    cell_ref,
                    t: attr_value(&e, b"t")?,
                    value_text: None,
                    inline_text: None,
                });
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                // Styled-but-empty cell.
                let cell_ref = cell_ref_for(&e, current_row, next_col)?;
                next_col = cell_ref.col + 1;
            }
            Event::Start(e) if e.local_name().as_ref() == b"v" => {
                let text = read_text(&mut reader, b"v")?;
                if let Some(cell) = pending.as_mut() {
                    cell.value_text = Some(text);
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"is" => {
                let text = parse_rich_text(&mut reader, b"is", &mut false)?;
                if let Some(cell) = pending.as_mut() {
                    cell.inline_text = Some(text);
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"f" => {
                // Formulas are not modelled; the cached `<v>` carries the value.
                reader.read_to_end_into(e.name(), &mut Vec::new())?;
            }
            Event::End(e) if e.local_name().as_ref() == b"c" => {
                if let Some(cell) = pending.take() {
                    let value = interpret_cell_value(&cell, shared_strings)?;
                    worksheet.set_value(cell.cell_ref, value);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn cell_ref_for(e: &BytesStart<'_>, current_row: u32, next_col: u32) -> Result<CellRef, ReadError> {
    match attr_value(e, b"r")? {
        Some(r) => CellRef::from_a1(&r).map_err(|_| ReadError::InvalidCellRef(r)),
        None => Ok(CellRef::new(current_row, next_col)),
    }
}

fn interpret_cell_value(cell: &PendingCell, shared_strings: &[String]) -> Result<CellValue, ReadError> {
    let v = cell.value_text.as_deref();
    let value = match cell.t.as_deref() {
        Some("s") => {
            let Some(raw) = v else {
                return Ok(CellValue::Empty);
            };
            let idx: usize = raw.trim().parse().map_err(|_| {
                ReadError::Invalid(format!("bad shared string index {raw:?} in {}", cell.cell_ref))
            })?;
            let text = shared_strings.get(idx).ok_or_else(|| {
                ReadError::Invalid(format!("shared string index {idx} out of range in {}", cell.cell_ref))
            })?;
            CellValue::String(text.clone())
        }
        Some("inlineStr") => match &cell.inline_text {
            Some(text) => CellValue::String(text.clone()),
            None => v.map(CellValue::from).unwrap_or_default(),
        },
        Some("b") => match v.map(str::trim) {
            Some("1") | Some("true") => CellValue::Boolean(true),
            Some(_) => CellValue::Boolean(false),
            None => CellValue::Empty,
        },
        // Formula string results, ISO dates and error values are kept as text.
        Some("str") | Some("d") | Some("e") => v.map(CellValue::from).unwrap_or_default(),
        _ => match v {
            Some(raw) => match raw.trim().parse::<f64>() {
                Ok(n) => CellValue::Number(n),
                Err(_) => CellValue::from(raw),
            },
            None => CellValue::Empty,
        },
    };
    Ok(value)
}

pub(crate) fn attr_value(e: &BytesStart<'_>, local: &[u8]) -> Result<Option<String>, ReadError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == local {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}
