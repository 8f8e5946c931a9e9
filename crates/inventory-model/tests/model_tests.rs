use inventory_model::{CellRef, CellValue, Workbook};
use pretty_assertions::assert_eq;

#[test]
fn workbook_serializes_with_tagged_cell_values() {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_sheet("Equipos de Cómputo").expect("add sheet");
    sheet.set_value(CellRef::new(1, 0), 1u32);
    sheet.set_value(CellRef::new(1, 1), "EQC-0001");

    let json = serde_json::to_value(&workbook).expect("serialize");
    let cells = &json["sheets"][0]["cells"];
    assert_eq!(cells.as_array().map(Vec::len), Some(2));

    let back: Workbook = serde_json::from_value(json).expect("deserialize");
    assert_eq!(back, workbook);
}

#[test]
fn sheet_lookup_ignores_case() {
    let mut workbook = Workbook::new();
    workbook.add_sheet("Periféricos").expect("add sheet");
    assert!(workbook.sheet("PERIFÉRICOS").is_some());
    assert!(workbook.sheet("Impresoras y Escáneres").is_none());
}

#[test]
fn empty_writes_do_not_leave_placeholder_cells() {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_sheet("Mantenimientos").expect("add sheet");
    sheet.set_value_at(3, 2, CellValue::Empty);
    assert_eq!(sheet.cell_count(), 0);
    assert_eq!(sheet.max_row(), None);
}
