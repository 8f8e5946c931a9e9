//! Cell-level patching of an existing XLSX package.
//!
//! Only the worksheet parts holding edited cells are rewritten (plus
//! `sharedStrings.xml` when new strings are needed, and the workbook, its
//! relationships and content types when a sheet is added). Every other part is
//! copied byte for byte, so styles, data validations, formulas, column widths
//! and drawings carried by the workbook survive a save.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{BufRead, Cursor, Write};

use inventory_model::{CellRef, CellValue, Workbook, Worksheet};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use zip::{ZipArchive, ZipWriter};

use crate::reader::{
    attr_value, parse_relationships, parse_shared_string_items, parse_workbook_sheets,
    read_zip_part_optional, read_zip_part_required, resolve_target, ReadError,
};
use crate::writer::WriteError;
use crate::xml::{escape_xml, needs_space_preserve};

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const REL_TYPE_WORKSHEET: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const REL_TYPE_SHARED_STRINGS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
const REL_TYPE_CALC_CHAIN: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain";
const WORKSHEET_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
const EMPTY_WORKSHEET_XML: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData/></worksheet>"#;

/// A single cell edit. Patching keeps the cell's existing style.
#[derive(Debug, Clone, PartialEq)]
pub enum CellPatch {
    /// Remove the value (and any formula).
    Clear,
    Set(CellValue),
}

/// Cell edits within one worksheet, in row-major order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorksheetCellPatches {
    cells: BTreeMap<(u32, u32), CellPatch>,
}

impl WorksheetCellPatches {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn set_cell(&mut self, cell: CellRef, patch: CellPatch) {
        self.cells.insert((cell.row, cell.col), patch);
    }

    pub fn get(&self, cell: CellRef) -> Option<&CellPatch> {
        self.cells.get(&(cell.row, cell.col))
    }

    /// Edits turning `before` into `after`.
    pub fn diff(before: &Worksheet, after: &Worksheet) -> Self {
        let mut patches = Self::default();
        for (cell, value) in after.iter_cells() {
            if before.value(cell) != value {
                patches.set_cell(cell, CellPatch::Set(value.clone()));
            }
        }
        for (cell, _) in before.iter_cells() {
            if after.value(cell).is_empty() {
                patches.set_cell(cell, CellPatch::Clear);
            }
        }
        patches
    }

    /// Patches grouped by 1-based row number.
    fn by_row(&self) -> Vec<(u32, Vec<(u32, &CellPatch)>)> {
        let mut rows: Vec<(u32, Vec<(u32, &CellPatch)>)> = Vec::new();
        for (&(row, col), patch) in &self.cells {
            match rows.last_mut() {
                Some((last, cells)) if *last == row + 1 => cells.push((col, patch)),
                _ => rows.push((row + 1, vec![(col, patch)])),
            }
        }
        rows
    }
}

/// Cell edits for a whole package, keyed by sheet name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkbookCellPatches {
    sheets: BTreeMap<String, WorksheetCellPatches>,
    /// Sheets absent from the package, in workbook order.
    new_sheets: Vec<String>,
}

impl WorkbookCellPatches {
    pub fn is_empty(&self) -> bool {
        self.new_sheets.is_empty() && self.sheets.values().all(WorksheetCellPatches::is_empty)
    }

    pub fn sheet(&self, name: &str) -> Option<&WorksheetCellPatches> {
        self.sheets.get(name)
    }

    pub fn new_sheets(&self) -> &[String] {
        &self.new_sheets
    }

    /// Edits turning `before` into `after`. Sheets of `after` unknown to
    /// `before` are added; sheets removed from `after` are left in place.
    pub fn diff(before: &Workbook, after: &Workbook) -> Self {
        let mut patches = Self::default();
        for sheet in &after.sheets {
            let sheet_patches = match before.sheet(&sheet.name) {
                Some(old) => WorksheetCellPatches::diff(old, sheet),
                None => {
                    patches.new_sheets.push(sheet.name.clone());
                    WorksheetCellPatches::diff(&Worksheet::new(sheet.name.as_str()), sheet)
                }
            };
            if !sheet_patches.is_empty() {
                patches.sheets.insert(sheet.name.clone(), sheet_patches);
            }
        }
        patches
    }
}

/// Apply `patches` to the XLSX `package`, returning the new package bytes.
pub fn apply_cell_patches(package: &[u8], patches: &WorkbookCellPatches) -> Result<Vec<u8>, WriteError> {
    if patches.is_empty() {
        return Ok(package.to_vec());
    }

    let mut archive = ZipArchive::new(Cursor::new(package))?;
    let part_names: HashSet<String> = archive.file_names().map(str::to_string).collect();

    let workbook_xml = read_zip_part_required(&mut archive, WORKBOOK_PART)?;
    let rels_xml = read_zip_part_required(&mut archive, WORKBOOK_RELS_PART)?;
    let rels = parse_relationships(&rels_xml)?;
    let sheets = parse_workbook_sheets(&workbook_xml)?;

    let mut shared_strings = match rels.values().find(|rel| rel.rel_type == REL_TYPE_SHARED_STRINGS) {
        Some(rel) => {
            let part = resolve_target("xl", &rel.target);
            read_zip_part_optional(&mut archive, &part)?
                .map(|bytes| SharedStrings::from_part(part, bytes))
                .transpose()?
        }
        None => None,
    };

    // Parts whose bytes change, and parts appended after the copied ones.
    let mut replaced: HashMap<String, Vec<u8>> = HashMap::new();
    let mut added: Vec<(String, Vec<u8>)> = Vec::new();
    let mut sheet_parts: HashMap<String, String> = HashMap::new();

    for sheet in &sheets {
        if let Some(rel) = rels.get(&sheet.relationship_id) {
            if rel.rel_type == REL_TYPE_WORKSHEET {
                sheet_parts.insert(sheet.name.to_lowercase(), resolve_target("xl", &rel.target));
            }
        }
    }

    if !patches.new_sheets.is_empty() {
        let mut workbook_entries = String::new();
        let mut rel_entries = String::new();
        let mut type_entries = String::new();
        let mut next_sheet_id = sheets.iter().filter_map(|s| s.sheet_id).max().unwrap_or(0) + 1;
        let mut next_part = 1u32;
        let mut next_rel = rels.len() as u32 + 1;

        for name in &patches.new_sheets {
            while part_names.contains(&format!("xl/worksheets/sheet{next_part}.xml")) {
                next_part += 1;
            }
            while rels.contains_key(&format!("rId{next_rel}")) {
                next_rel += 1;
            }
            let part = format!("xl/worksheets/sheet{next_part}.xml");
            let rel_id = format!("rId{next_rel}");

            workbook_entries.push_str(&format!(
                r#"<sheet xmlns:r="{REL_NS}" name="{}" sheetId="{next_sheet_id}" r:id="{rel_id}"/>"#,
                escape_xml(name)
            ));
            rel_entries.push_str(&format!(
                r#"<Relationship Id="{rel_id}" Type="{REL_TYPE_WORKSHEET}" Target="worksheets/sheet{next_part}.xml"/>"#
            ));
            type_entries.push_str(&format!(
                r#"<Override PartName="/{part}" ContentType="{WORKSHEET_CONTENT_TYPE}"/>"#
            ));

            log::debug!("adding sheet {name:?} as {part}");
            sheet_parts.insert(name.to_lowercase(), part.clone());
            added.push((part, EMPTY_WORKSHEET_XML.to_vec()));
            next_sheet_id += 1;
            next_part += 1;
            next_rel += 1;
        }

        let content_types = read_zip_part_required(&mut archive, CONTENT_TYPES_PART)?;
        replaced.insert(
            WORKBOOK_PART.to_string(),
            insert_before_end(&workbook_xml, b"sheets", &workbook_entries)?,
        );
        replaced.insert(
            WORKBOOK_RELS_PART.to_string(),
            insert_before_end(&rels_xml, b"Relationships", &rel_entries)?,
        );
        replaced.insert(
            CONTENT_TYPES_PART.to_string(),
            insert_before_end(&content_types, b"Types", &type_entries)?,
        );
    }

    let mut formula_replaced = false;
    for (name, sheet_patches) in &patches.sheets {
        let part = sheet_parts
            .get(&name.to_lowercase())
            .ok_or_else(|| WriteError::Invalid(format!("no worksheet part for sheet {name:?}")))?;
        let original = match added.iter().find(|(added_part, _)| added_part == part) {
            Some((_, bytes)) => bytes.clone(),
            None => read_zip_part_optional(&mut archive, part)?
                .ok_or_else(|| ReadError::MissingPart(part.clone()))?,
        };

        let mut patcher = SheetPatcher::new(sheet_patches, shared_strings.as_mut());
        let updated = patcher.patch(&original)?;
        formula_replaced |= patcher.formula_replaced;

        match added.iter_mut().find(|(added_part, _)| added_part == part) {
            Some((_, bytes)) => *bytes = updated,
            None => {
                replaced.insert(part.clone(), updated);
            }
        }
    }

    if let Some(shared) = shared_strings.as_ref().filter(|s| !s.appended.is_empty()) {
        let original = read_zip_part_required(&mut archive, &shared.part)?;
        replaced.insert(shared.part.clone(), shared.append_to(&original)?);
    }

    let mut dropped = HashSet::new();
    if formula_replaced {
        // A stale calculation chain makes Excel repair the file.
        if let Some(rel) = rels.values().find(|rel| rel.rel_type == REL_TYPE_CALC_CHAIN) {
            let part = resolve_target("xl", &rel.target);
            let rels_bytes = replaced.remove(WORKBOOK_RELS_PART).unwrap_or(rels_xml);
            replaced.insert(
                WORKBOOK_RELS_PART.to_string(),
                remove_empty_elements(&rels_bytes, b"Relationship", b"Type", REL_TYPE_CALC_CHAIN)?,
            );
            let types = match replaced.remove(CONTENT_TYPES_PART) {
                Some(bytes) => bytes,
                None => read_zip_part_required(&mut archive, CONTENT_TYPES_PART)?,
            };
            replaced.insert(
                CONTENT_TYPES_PART.to_string(),
                remove_empty_elements(&types, b"Override", b"PartName", &format!("/{part}"))?,
            );
            dropped.insert(part);
        }
        let workbook_bytes = replaced.remove(WORKBOOK_PART).unwrap_or(workbook_xml);
        replaced.insert(WORKBOOK_PART.to_string(), ensure_full_calc_on_load(&workbook_bytes)?);
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::with_capacity(package.len() + 1024)));
    let options = zip::write::FileOptions::<()>::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for idx in 0..archive.len() {
        let file = archive.by_index_raw(idx)?;
        let name = file.name().to_string();
        if dropped.contains(&name) {
            continue;
        }
        match replaced.remove(&name) {
            Some(bytes) => {
                zip.start_file(name, options)?;
                zip.write_all(&bytes)?;
            }
            // Unchanged parts keep their compressed bytes.
            None => zip.raw_copy_file(file)?,
        }
    }
    for (name, bytes) in added {
        zip.start_file(name, options)?;
        zip.write_all(&bytes)?;
    }
    Ok(zip.finish()?.into_inner())
}

/// Shared string table of the package, with the strings appended by a patch.
#[derive(Debug)]
struct SharedStrings {
    part: String,
    plain_index: HashMap<String, u32>,
    len: u32,
    appended: Vec<String>,
}

impl SharedStrings {
    fn from_part(part: String, bytes: Vec<u8>) -> Result<Self, ReadError> {
        let items = parse_shared_string_items(&bytes)?;
        let mut plain_index = HashMap::new();
        for (idx, item) in items.iter().enumerate() {
            if !item.rich {
                plain_index.entry(item.text.clone()).or_insert(idx as u32);
            }
        }
        Ok(Self {
            part,
            plain_index,
            len: items.len() as u32,
            appended: Vec::new(),
        })
    }

    fn index_of(&mut self, text: &str) -> u32 {
        if let Some(idx) = self.plain_index.get(text) {
            return *idx;
        }
        let idx = self.len;
        self.len += 1;
        self.plain_index.insert(text.to_string(), idx);
        self.appended.push(text.to_string());
        idx
    }

    /// Append the new items to the original table. `count` is dropped since
    /// it is optional and no longer known.
    fn append_to(&self, original: &[u8]) -> Result<Vec<u8>, WriteError> {
        let mut items = String::new();
        for text in &self.appended {
            items.push_str("<si>");
            items.push_str(&text_element(text));
            items.push_str("</si>");
        }
        let unique = self.len.to_string();

        let mut reader = Reader::from_reader(original);
        reader.config_mut().trim_text(false);
        let mut writer = Writer::new(Vec::with_capacity(original.len() + items.len()));
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if e.local_name().as_ref() == b"sst" => {
                    writer.write_event(Event::Start(with_attrs(&e, &[("uniqueCount", unique.as_str())], &[b"count".as_slice()])?))?;
                }
                Event::Empty(e) if e.local_name().as_ref() == b"sst" => {
                    let start = with_attrs(&e, &[("uniqueCount", unique.as_str())], &[b"count".as_slice()])?;
                    let end = BytesEnd::new(qualified_name(&start));
                    writer.write_event(Event::Start(start))?;
                    writer.get_mut().extend_from_slice(items.as_bytes());
                    writer.write_event(Event::End(end))?;
                }
                Event::End(e) if e.local_name().as_ref() == b"sst" => {
                    writer.get_mut().extend_from_slice(items.as_bytes());
                    writer.write_event(Event::End(e.into_owned()))?;
                }
                Event::Eof => break,
                ev => writer.write_event(ev.into_owned())?,
            }
            buf.clear();
        }
        Ok(writer.into_inner())
    }
}

/// Streams one worksheet part, rewriting the patched cells in place and
/// inserting patched rows and cells the part does not have yet.
struct SheetPatcher<'p, 's> {
    rows: Vec<(u32, Vec<(u32, &'p CellPatch)>)>,
    next_row: usize,
    shared_strings: Option<&'s mut SharedStrings>,
    formula_replaced: bool,
}

impl<'p, 's> SheetPatcher<'p, 's> {
    fn new(patches: &'p WorksheetCellPatches, shared_strings: Option<&'s mut SharedStrings>) -> Self {
        Self {
            rows: patches.by_row(),
            next_row: 0,
            shared_strings,
            formula_replaced: false,
        }
    }

    fn patch(&mut self, original: &[u8]) -> Result<Vec<u8>, WriteError> {
        let mut reader = Reader::from_reader(original);
        reader.config_mut().trim_text(false);
        let mut writer = Writer::new(Vec::with_capacity(original.len() + self.rows.len() * 256));
        let mut buf = Vec::new();
        let mut saw_sheet_data = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                    saw_sheet_data = true;
                    writer.write_event(Event::Start(e.into_owned()))?;
                    self.patch_sheet_data(&mut reader, &mut writer)?;
                }
                Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                    saw_sheet_data = true;
                    let start = e.into_owned();
                    let end = BytesEnd::new(qualified_name(&start));
                    writer.write_event(Event::Start(start))?;
                    self.write_rows_before(&mut writer, None)?;
                    writer.write_event(Event::End(end))?;
                }
                Event::End(e) if e.local_name().as_ref() == b"worksheet" => {
                    if !saw_sheet_data {
                        writer.write_event(Event::Start(BytesStart::new("sheetData")))?;
                        self.write_rows_before(&mut writer, None)?;
                        writer.write_event(Event::End(BytesEnd::new("sheetData")))?;
                    }
                    writer.write_event(Event::End(e.into_owned()))?;
                }
                Event::Eof => break,
                ev => writer.write_event(ev.into_owned())?,
            }
            buf.clear();
        }
        Ok(writer.into_inner())
    }

    fn patch_sheet_data<R: BufRead>(
        &mut self,
        reader: &mut Reader<R>,
        writer: &mut Writer<Vec<u8>>,
    ) -> Result<(), WriteError> {
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if e.local_name().as_ref() == b"row" => {
                    let start = e.into_owned();
                    let Some(row_num) = row_number(&start)? else {
                        writer.write_event(Event::Start(start))?;
                        buf.clear();
                        continue;
                    };
                    self.write_rows_before(writer, Some(row_num))?;
                    writer.write_event(Event::Start(start))?;
                    if let Some(cells) = self.take_row(row_num) {
                        self.patch_row(reader, writer, row_num, &cells)?;
                    }
                }
                Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                    let start = e.into_owned();
                    let Some(row_num) = row_number(&start)? else {
                        writer.write_event(Event::Empty(start))?;
                        buf.clear();
                        continue;
                    };
                    self.write_rows_before(writer, Some(row_num))?;
                    match self.take_row(row_num) {
                        Some(cells) => {
                            let end = BytesEnd::new(qualified_name(&start));
                            writer.write_event(Event::Start(start))?;
                            for (col, patch) in cells {
                                self.write_cell(writer, row_num, col, patch, None, None)?;
                            }
                            writer.write_event(Event::End(end))?;
                        }
                        None => writer.write_event(Event::Empty(start))?,
                    }
                }
                Event::End(e) if e.local_name().as_ref() == b"sheetData" => {
                    self.write_rows_before(writer, None)?;
                    writer.write_event(Event::End(e.into_owned()))?;
                    return Ok(());
                }
                Event::Eof => {
                    return Err(WriteError::Invalid(
                        "unexpected EOF inside <sheetData>".to_string(),
                    ))
                }
                ev => writer.write_event(ev.into_owned())?,
            }
            buf.clear();
        }
    }

    /// Rewrite the cells of an existing row; the row start is already written.
    fn patch_row<R: BufRead>(
        &mut self,
        reader: &mut Reader<R>,
        writer: &mut Writer<Vec<u8>>,
        row_num: u32,
        cells: &[(u32, &'p CellPatch)],
    ) -> Result<(), WriteError> {
        let mut buf = Vec::new();
        let mut pending = cells.iter().copied().peekable();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if e.local_name().as_ref() == b"c" => {
                    let start = e.into_owned();
                    let Some((col, t, s)) = cell_attrs(&start, row_num)? else {
                        writer.write_event(Event::Start(start))?;
                        buf.clear();
                        continue;
                    };
                    while let Some((patch_col, patch)) = pending.next_if(|(c, _)| *c < col) {
                        self.write_cell(writer, row_num, patch_col, patch, None, None)?;
                    }
                    match pending.next_if(|(c, _)| *c == col) {
                        Some((_, patch)) => {
                            if skip_cell_body(reader)? {
                                self.formula_replaced = true;
                            }
                            self.write_cell(writer, row_num, col, patch, t.as_deref(), s.as_deref())?;
                        }
                        None => writer.write_event(Event::Start(start))?,
                    }
                }
                Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                    let start = e.into_owned();
                    let Some((col, t, s)) = cell_attrs(&start, row_num)? else {
                        writer.write_event(Event::Empty(start))?;
                        buf.clear();
                        continue;
                    };
                    while let Some((patch_col, patch)) = pending.next_if(|(c, _)| *c < col) {
                        self.write_cell(writer, row_num, patch_col, patch, None, None)?;
                    }
                    match pending.next_if(|(c, _)| *c == col) {
                        Some((_, patch)) => {
                            self.write_cell(writer, row_num, col, patch, t.as_deref(), s.as_deref())?
                        }
                        None => writer.write_event(Event::Empty(start))?,
                    }
                }
                Event::End(e) if e.local_name().as_ref() == b"row" => {
                    for (col, patch) in pending.by_ref() {
                        self.write_cell(writer, row_num, col, patch, None, None)?;
                    }
                    writer.write_event(Event::End(e.into_owned()))?;
                    return Ok(());
                }
                Event::Eof => {
                    return Err(WriteError::Invalid(format!("unexpected EOF inside row {row_num}")))
                }
                ev => writer.write_event(ev.into_owned())?,
            }
            buf.clear();
        }
    }

    fn take_row(&mut self, row_num: u32) -> Option<Vec<(u32, &'p CellPatch)>> {
        match self.rows.get(self.next_row) {
            Some((row, _)) if *row == row_num => {
                let cells = std::mem::take(&mut self.rows[self.next_row].1);
                self.next_row += 1;
                Some(cells)
            }
            _ => None,
        }
    }

    /// Write the pending new rows numbered below `limit` (all when `None`).
    fn write_rows_before(&mut self, writer: &mut Writer<Vec<u8>>, limit: Option<u32>) -> Result<(), WriteError> {
        while let Some((row_num, _)) = self.rows.get(self.next_row) {
            let row_num = *row_num;
            if limit.is_some_and(|limit| row_num >= limit) {
                break;
            }
            let cells = std::mem::take(&mut self.rows[self.next_row].1);
            self.next_row += 1;

            let mut row = BytesStart::new("row");
            row.push_attribute(("r", row_num.to_string().as_str()));
            writer.write_event(Event::Start(row))?;
            for (col, patch) in cells {
                self.write_cell(writer, row_num, col, patch, None, None)?;
            }
            writer.write_event(Event::End(BytesEnd::new("row")))?;
        }
        Ok(())
    }

    fn write_cell(
        &mut self,
        writer: &mut Writer<Vec<u8>>,
        row_num: u32,
        col: u32,
        patch: &CellPatch,
        existing_t: Option<&str>,
        existing_s: Option<&str>,
    ) -> Result<(), WriteError> {
        let mut cell = format!(r#"<c r="{}""#, CellRef::new(row_num - 1, col).to_a1());
        if let Some(s) = existing_s.filter(|s| !s.is_empty() && *s != "0") {
            cell.push_str(&format!(r#" s="{}""#, escape_xml(s)));
        }

        let (t, body) = match patch {
            CellPatch::Clear | CellPatch::Set(CellValue::Empty) => (None, String::new()),
            CellPatch::Set(CellValue::Number(n)) if n.is_finite() => (None, format!("<v>{n}</v>")),
            CellPatch::Set(CellValue::Number(_)) => (None, String::new()),
            CellPatch::Set(CellValue::Boolean(b)) => {
                (Some("b"), format!("<v>{}</v>", if *b { 1 } else { 0 }))
            }
            CellPatch::Set(CellValue::String(text)) => match self.shared_strings.as_deref_mut() {
                Some(shared) if existing_t != Some("inlineStr") => {
                    (Some("s"), format!("<v>{}</v>", shared.index_of(text)))
                }
                _ => (Some("inlineStr"), format!("<is>{}</is>", text_element(text))),
            },
        };

        if let Some(t) = t {
            cell.push_str(&format!(r#" t="{t}""#));
        }
        if body.is_empty() {
            cell.push_str("/>");
        } else {
            cell.push('>');
            cell.push_str(&body);
            cell.push_str("</c>");
        }
        writer.get_mut().extend_from_slice(cell.as_bytes());
        Ok(())
    }
}

fn text_element(text: &str) -> String {
    if needs_space_preserve(text) {
        format!(r#"<t xml:space="preserve">{}</t>"#, escape_xml(text))
    } else {
        format!("<t>{}</t>", escape_xml(text))
    }
}

fn row_number(row: &BytesStart<'_>) -> Result<Option<u32>, WriteError> {
    Ok(attr_value(row, b"r")?.and_then(|r| r.trim().parse().ok()))
}

/// Column, `t` and `s` of a cell in row `row_num`. Cells without a usable
/// reference, or whose reference names another row, are passed through.
fn cell_attrs(
    cell: &BytesStart<'_>,
    row_num: u32,
) -> Result<Option<(u32, Option<String>, Option<String>)>, WriteError> {
    let Some(cell_ref) = attr_value(cell, b"r")?.and_then(|r| CellRef::from_a1(&r).ok()) else {
        return Ok(None);
    };
    if cell_ref.row + 1 != row_num {
        return Ok(None);
    }
    Ok(Some((cell_ref.col, attr_value(cell, b"t")?, attr_value(cell, b"s")?)))
}

/// Consume the body of a `<c>` element. Returns whether it held a formula.
fn skip_cell_body<R: BufRead>(reader: &mut Reader<R>) -> Result<bool, WriteError> {
    let mut buf = Vec::new();
    let mut depth = 1usize;
    let mut formula = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                formula |= depth == 1 && e.local_name().as_ref() == b"f";
                depth += 1;
            }
            Event::Empty(e) => formula |= depth == 1 && e.local_name().as_ref() == b"f",
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(formula);
                }
            }
            Event::Eof => return Err(WriteError::Invalid("unexpected EOF inside <c>".to_string())),
            _ => {}
        }
        buf.clear();
    }
}

fn qualified_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

/// Copy of `start` with `set` attributes replaced or added and `drop` removed.
fn with_attrs(
    start: &BytesStart<'_>,
    set: &[(&str, &str)],
    drop: &[&[u8]],
) -> Result<BytesStart<'static>, WriteError> {
    let mut out = BytesStart::new(qualified_name(start));
    for attr in start.attributes() {
        let attr = attr.map_err(ReadError::from)?;
        let local = attr.key.local_name();
        if drop.contains(&local.as_ref()) || set.iter().any(|(key, _)| key.as_bytes() == local.as_ref()) {
            continue;
        }
        out.push_attribute(attr);
    }
    for &(key, value) in set {
        out.push_attribute((key, value));
    }
    Ok(out)
}

/// Insert raw `snippet` just before the closing tag of the first `end_local`
/// element, expanding it when it is self-closing.
fn insert_before_end(xml: &[u8], end_local: &[u8], snippet: &str) -> Result<Vec<u8>, WriteError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + snippet.len()));
    let mut buf = Vec::new();
    let mut inserted = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::End(e) if !inserted && e.local_name().as_ref() == end_local => {
                inserted = true;
                writer.get_mut().extend_from_slice(snippet.as_bytes());
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Empty(e) if !inserted && e.local_name().as_ref() == end_local => {
                inserted = true;
                let start = e.into_owned();
                let end = BytesEnd::new(qualified_name(&start));
                writer.write_event(Event::Start(start))?;
                writer.get_mut().extend_from_slice(snippet.as_bytes());
                writer.write_event(Event::End(end))?;
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }
    if !inserted {
        return Err(WriteError::Invalid(format!(
            "no <{}> element to extend",
            String::from_utf8_lossy(end_local)
        )));
    }
    Ok(writer.into_inner())
}

/// Drop self-closing `local` elements whose `attr` equals `value`.
fn remove_empty_elements(xml: &[u8], local: &[u8], attr: &[u8], value: &str) -> Result<Vec<u8>, WriteError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(e)
                if e.local_name().as_ref() == local
                    && attr_value(&e, attr)?.as_deref() == Some(value) => {}
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }
    Ok(writer.into_inner())
}

/// Set `fullCalcOnLoad="1"` on `<calcPr>`, adding the element when missing.
fn ensure_full_calc_on_load(xml: &[u8]) -> Result<Vec<u8>, WriteError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 32));
    let mut buf = Vec::new();
    let mut saw_calc_pr = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"calcPr" => {
                saw_calc_pr = true;
                writer.write_event(Event::Start(with_attrs(&e, &[("fullCalcOnLoad", "1")], &[])?))?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"calcPr" => {
                saw_calc_pr = true;
                writer.write_event(Event::Empty(with_attrs(&e, &[("fullCalcOnLoad", "1")], &[])?))?;
            }
            Event::End(e) if e.local_name().as_ref() == b"workbook" => {
                if !saw_calc_pr {
                    writer.get_mut().extend_from_slice(br#"<calcPr fullCalcOnLoad="1"/>"#);
                }
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Eof => break,
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }
    Ok(writer.into_inner())
}
