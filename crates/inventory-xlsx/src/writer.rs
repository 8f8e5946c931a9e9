use std::collections::{BTreeMap, HashMap};
use std::io::{Seek, Write};

use inventory_model::{CellRef, CellValue, Workbook, Worksheet};
use thiserror::Error;
use zip::ZipWriter;

use crate::xml::{escape_xml, needs_space_preserve};

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    /// The package being patched could not be read.
    #[error("source package: {0}")]
    Package(#[from] crate::reader::ReadError),
    #[error("invalid workbook: {0}")]
    Invalid(String),
}

/// Serialize `workbook` as an XLSX package into `writer`.
///
/// Only cell values are written; every sheet gets the default cell style.
pub fn write_workbook_to_writer<W: Write + Seek>(
    workbook: &Workbook,
    writer: W,
) -> Result<(), WriteError> {
    if workbook.sheets.is_empty() {
        // Excel refuses to open a package without at least one worksheet.
        return Err(WriteError::Invalid("workbook has no sheets".to_string()));
    }

    let mut zip = ZipWriter::new(writer);
    let options = zip::write::FileOptions::<()>::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let shared_strings = build_shared_strings(workbook);

    zip.start_file("_rels/.rels", options)?;
    zip.write_all(ROOT_RELS_XML.as_bytes())?;

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(content_types_xml(workbook, &shared_strings).as_bytes())?;

    zip.start_file("xl/workbook.xml", options)?;
    zip.write_all(workbook_xml(workbook).as_bytes())?;

    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(workbook_rels_xml(workbook, !shared_strings.values.is_empty()).as_bytes())?;

    zip.start_file("xl/styles.xml", options)?;
    zip.write_all(STYLES_XML.as_bytes())?;

    if !shared_strings.values.is_empty() {
        zip.start_file("xl/sharedStrings.xml", options)?;
        zip.write_all(shared_strings_xml(&shared_strings).as_bytes())?;
    }

    for (idx, sheet) in workbook.sheets.iter().enumerate() {
        let sheet_path = format!("xl/worksheets/sheet{}.xml", idx + 1);
        zip.start_file(&sheet_path, options)?;
        zip.write_all(sheet_xml(sheet, &shared_strings).as_bytes())?;
    }

    let _writer = zip.finish()?;
    Ok(())
}

/// Serialize `workbook` into an in-memory XLSX package.
pub fn write_workbook_to_vec(workbook: &Workbook) -> Result<Vec<u8>, WriteError> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    write_workbook_to_writer(workbook, &mut cursor)?;
    Ok(cursor.into_inner())
}

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#;

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <fonts count="1"><font><sz val="11"/><name val="Calibri"/><family val="2"/></font></fonts>
  <fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>
  <borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>
  <cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
  <cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs>
  <cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>
</styleSheet>"#;

fn workbook_xml(workbook: &Workbook) -> String {
    let mut sheets_xml = String::new();
    for (idx, sheet) in workbook.sheets.iter().enumerate() {
        let sheet_id = idx + 1;
        sheets_xml.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            escape_xml(&sheet.name),
            sheet_id,
            sheet_id
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets>{sheets_xml}</sheets>
</workbook>"#
    )
}

fn workbook_rels_xml(workbook: &Workbook, has_shared_strings: bool) -> String {
    let mut rels = String::new();
    for idx in 0..workbook.sheets.len() {
        let rel_id = idx + 1;
        rels.push_str(&format!(
            r#"<Relationship Id="rId{rel_id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{rel_id}.xml"/>"#
        ));
    }
    let mut next = workbook.sheets.len() + 1;
    if has_shared_strings {
        rels.push_str(&format!(
            r#"<Relationship Id="rId{next}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#
        ));
        next += 1;
    }
    rels.push_str(&format!(
        r#"<Relationship Id="rId{next}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#
    ));

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  {rels}
</Relationships>"#
    )
}

fn sheet_xml(sheet: &Worksheet, shared_strings: &SharedStrings) -> String {
    // Excel expects rows in ascending order; `iter_cells` is already row-major.
    let mut rows: BTreeMap<u32, Vec<(CellRef, &CellValue)>> = BTreeMap::new();
    for (cell_ref, value) in sheet.iter_cells() {
        rows.entry(cell_ref.row).or_default().push((cell_ref, value));
    }

    let mut sheet_data = String::new();
    for (row_idx, cells) in rows {
        sheet_data.push_str(&format!(r#"<row r="{}">"#, row_idx + 1));
        for (cell_ref, value) in cells {
            sheet_data.push_str(&cell_xml(cell_ref, value, shared_strings));
        }
        sheet_data.push_str("</row>");
    }

    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push('\n');
    xml.push_str(r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#);
    xml.push('\n');
    if sheet_data.is_empty() {
        xml.push_str("  <sheetData/>\n");
    } else {
        xml.push_str("  <sheetData>");
        xml.push_str(&sheet_data);
        xml.push_str("</sheetData>\n");
    }
    xml.push_str("</worksheet>");
    xml
}

fn cell_xml(cell_ref: CellRef, value: &CellValue, shared_strings: &SharedStrings) -> String {
    let a1 = cell_ref.to_a1();
    match value {
        CellValue::Empty => format!(r#"<c r="{a1}"/>"#),
        CellValue::Number(n) if n.is_finite() => format!(r#"<c r="{a1}"><v>{n}</v></c>"#),
        // NaN/inf have no SpreadsheetML representation.
        CellValue::Number(_) => format!(r#"<c r="{a1}"/>"#),
        CellValue::Boolean(b) => {
            format!(r#"<c r="{a1}" t="b"><v>{}</v></c>"#, if *b { 1 } else { 0 })
        }
        CellValue::String(s) => {
            let idx = shared_strings.index.get(s).copied().unwrap_or_default();
            format!(r#"<c r="{a1}" t="s"><v>{idx}</v></c>"#)
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SharedStrings {
    values: Vec<String>,
    index: HashMap<String, usize>,
}

fn build_shared_strings(workbook: &Workbook) -> SharedStrings {
    let mut shared = SharedStrings::default();
    for sheet in &workbook.sheets {
        for (_cell_ref, value) in sheet.iter_cells() {
            if let CellValue::String(s) = value {
                if !shared.index.contains_key(s) {
                    shared.index.insert(s.clone(), shared.values.len());
                    shared.values.push(s.clone());
                }
            }
        }
    }
    shared
}

fn shared_strings_xml(shared: &SharedStrings) -> String {
    let count = shared.values.len();
    let mut si = String::new();
    for v in &shared.values {
        if needs_space_preserve(v) {
            si.push_str(&format!(
                r#"<si><t xml:space="preserve">{}</t></si>"#,
                escape_xml(v)
            ));
        } else {
            si.push_str(&format!(r#"<si><t>{}</t></si>"#, escape_xml(v)));
        }
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{count}" uniqueCount="{count}">{si}</sst>"#
    )
}

fn content_types_xml(workbook: &Workbook, shared_strings: &SharedStrings) -> String {
    let mut overrides = String::new();
    overrides.push_str(
        r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    );
    overrides.push_str(
        r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
    );
    if !shared_strings.values.is_empty() {
        overrides.push_str(
            r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#,
        );
    }
    for idx in 0..workbook.sheets.len() {
        let sheet_number = idx + 1;
        overrides.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{sheet_number}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  {overrides}
</Types>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_strings_are_deduplicated_across_sheets() {
        let mut workbook = Workbook::new();
        let a = workbook.add_sheet("Periféricos").unwrap();
        a.set_value_at(1, 7, "UCI");
        a.set_value_at(2, 7, "UCI");
        let b = workbook.add_sheet("Equipos de Red").unwrap();
        b.set_value_at(1, 9, "UCI");
        b.set_value_at(1, 10, "Operativo");

        let shared = build_shared_strings(&workbook);
        assert_eq!(shared.values, vec!["UCI".to_string(), "Operativo".to_string()]);
    }

    #[test]
    fn cell_xml_uses_typed_markup() {
        let shared = SharedStrings {
            values: vec!["EQC-0001".to_string()],
            index: HashMap::from([("EQC-0001".to_string(), 0)]),
        };
        assert_eq!(
            cell_xml(CellRef::new(1, 0), &CellValue::Number(1.0), &shared),
            r#"<c r="A2"><v>1</v></c>"#
        );
        assert_eq!(
            cell_xml(CellRef::new(1, 1), &CellValue::from("EQC-0001"), &shared),
            r#"<c r="B2" t="s"><v>0</v></c>"#
        );
        assert_eq!(
            cell_xml(CellRef::new(1, 61), &CellValue::Number(2.5), &shared),
            r#"<c r="BJ2"><v>2.5</v></c>"#
        );
        assert_eq!(
            cell_xml(CellRef::new(0, 0), &CellValue::Number(f64::NAN), &shared),
            r#"<c r="A1"/>"#
        );
    }

    #[test]
    fn refuses_workbook_without_sheets() {
        let err = write_workbook_to_vec(&Workbook::new()).unwrap_err();
        assert!(matches!(err, WriteError::Invalid(_)));
    }
}
