use std::collections::BTreeMap;

use inventory_model::CellValue;
use inventory_store::{
    Attributes, DecommissionCoordinator, EntityType, RecordRepository, StoreConfig, StoreError,
    TabularStore, DECOMMISSIONED_STATUS,
};
use pretty_assertions::assert_eq;

fn repository() -> (tempfile::TempDir, RecordRepository) {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = TabularStore::new(dir.path().join("inventario.xlsx"));
    store.initialize().expect("initialize workbook");
    (dir, RecordRepository::new(store, StoreConfig::default()))
}

fn computer(pairs: &[(&str, &str)]) -> Attributes {
    Attributes::parse(EntityType::ComputerEquipment, pairs.iter().copied()).expect("attributes")
}

#[test]
fn register_update_and_retire_computers() {
    let (_dir, repo) = repository();

    let first = repo.insert(&computer(&[("type", "Laptop"), ("area", "UCI")])).unwrap();
    assert_eq!(first.code, "EQC-0001");
    let second = repo.insert(&computer(&[("type", "Laptop"), ("area", "UCI")])).unwrap();
    assert_eq!(second.code, "EQC-0002");

    repo.update("EQC-0001", &computer(&[("area", "Urgencias")])).unwrap();
    let reread = repo.read(EntityType::ComputerEquipment, "EQC-0001").unwrap();
    assert_eq!(reread.code, "EQC-0001");
    assert_eq!(reread.sequence, Some(1));
    assert_eq!(reread.get("area"), Some("Urgencias"));
    assert_eq!(reread.get("type"), Some("Laptop"));

    let details = Attributes::parse(EntityType::DecommissionEvent, [("reason", "Obsoleto")]).unwrap();
    DecommissionCoordinator::new(&repo)
        .decommission("EQC-0002", &details)
        .unwrap();

    let retired = repo.read(EntityType::ComputerEquipment, "EQC-0002").unwrap();
    assert_eq!(retired.status(), Some(DECOMMISSIONED_STATUS));
    let events = repo.list(EntityType::DecommissionEvent).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].origin_code.as_deref(), Some("EQC-0002"));
    assert_eq!(events[0].get("type"), Some("Laptop"));
}

#[test]
fn insert_then_read_round_trips_attributes() {
    let (_dir, repo) = repository();
    let supplied = [("brand", "Cisco"), ("ports", "24"), ("status", "Activo"), ("ip_address", "10.0.0.2")];
    let attributes = Attributes::parse(EntityType::NetworkEquipment, supplied).unwrap();
    let inserted = repo.insert(&attributes).unwrap();
    let read = repo.read(EntityType::NetworkEquipment, &inserted.code).unwrap();

    let expected: BTreeMap<String, String> = EntityType::NetworkEquipment
        .schema()
        .editable_columns()
        .map(|(_, column)| {
            let value = supplied
                .iter()
                .find(|(k, _)| *k == column.key)
                .map(|(_, v)| v.to_string())
                .unwrap_or_default();
            (column.key.to_string(), value)
        })
        .collect();
    assert_eq!(read.attributes, expected);
    assert_eq!(read, inserted);
}

#[test]
fn update_never_touches_identity_columns() {
    let (_dir, repo) = repository();
    for _ in 0..3 {
        repo.insert(&computer(&[("type", "Desktop")])).unwrap();
    }
    let before = repo.store().load().unwrap();

    repo.update("EQC-0002", &computer(&[("hostname", "ADM-02"), ("type", "")])).unwrap();

    let after = repo.store().load().unwrap();
    let sheet_before = before.sheet("Equipos de Cómputo").unwrap();
    let sheet_after = after.sheet("Equipos de Cómputo").unwrap();
    for row in 1..=3 {
        for col in 0..2 {
            assert_eq!(sheet_after.value_at(row, col), sheet_before.value_at(row, col));
        }
    }
    assert_eq!(sheet_after.value_at(2, 2), &CellValue::from("ADM-02"));
    assert_eq!(sheet_after.value_at(2, 3), &CellValue::Empty);
}

#[test]
fn missing_codes_leave_the_file_unchanged() {
    let (dir, repo) = repository();
    repo.insert(&computer(&[("type", "Laptop")])).unwrap();
    let path = dir.path().join("inventario.xlsx");
    let before = std::fs::read(&path).unwrap();

    let err = repo.update("EQC-0099", &computer(&[("area", "UCI")])).unwrap_err();
    assert!(matches!(err, StoreError::RecordNotFound { .. }), "{err}");

    let details = Attributes::new(EntityType::DecommissionEvent);
    let err = DecommissionCoordinator::new(&repo)
        .decommission("PER-0001", &details)
        .unwrap_err();
    assert!(matches!(err, StoreError::RecordNotFound { entity: EntityType::Peripheral, .. }), "{err}");

    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn decommission_keeps_tables_consistent() {
    let (_dir, repo) = repository();
    let coordinator = DecommissionCoordinator::new(&repo);
    for entity in EntityType::ASSETS {
        let attributes = Attributes::parse(entity, [("brand", "Genérico")]).unwrap();
        let record = repo.insert(&attributes).unwrap();
        coordinator
            .decommission(&record.code, &Attributes::new(EntityType::DecommissionEvent))
            .unwrap();
    }

    let events = repo.list(EntityType::DecommissionEvent).unwrap();
    assert_eq!(events.len(), EntityType::ASSETS.len());
    for event in events {
        let origin = event.origin_code.clone().unwrap();
        let (entity, _) = inventory_store::parse_code(&origin).unwrap();
        let asset = repo.read(entity, &origin).unwrap();
        assert_eq!(asset.status(), Some(DECOMMISSIONED_STATUS), "{origin}");
        assert_eq!(event.get("brand"), Some("Genérico"));
        assert_eq!(event.get("type"), entity.schema().default_type);
    }
}

#[test]
fn full_table_rejects_inserts() {
    let dir = tempfile::tempdir().unwrap();
    let store = TabularStore::new(dir.path().join("inventario.xlsx"));
    store.initialize().unwrap();
    let mut config = StoreConfig::default();
    config.scan_limits.set(EntityType::Peripheral, 2);
    let repo = RecordRepository::new(store, config);

    let mouse = Attributes::parse(EntityType::Peripheral, [("type", "Mouse")]).unwrap();
    repo.insert(&mouse).unwrap();
    repo.insert(&mouse).unwrap();
    assert!(matches!(
        repo.insert(&mouse),
        Err(StoreError::TableFull { entity: EntityType::Peripheral, bound: 2 })
    ));
}

#[test]
fn blank_rows_are_skipped_not_reused() {
    let (_dir, repo) = repository();
    repo.store()
        .update(|workbook| {
            let sheet = workbook.sheet_mut("Impresoras y Escáneres").unwrap();
            sheet.set_value_at(1, 0, 1u32);
            sheet.set_value_at(1, 1, "IMP-0001");
            sheet.set_value_at(5, 0, 3u32);
            sheet.set_value_at(5, 1, "IMP-0003");
            Ok(())
        })
        .unwrap();

    let attributes = Attributes::parse(EntityType::Printer, [("brand", "Ricoh")]).unwrap();
    let record = repo.insert(&attributes).unwrap();
    assert_eq!(record.code, "IMP-0004");
    assert_eq!(record.row_number, 7);
}

#[test]
fn records_serialize_with_snake_case_entity() {
    let (_dir, repo) = repository();
    let printer = Attributes::parse(EntityType::Printer, [("brand", "HP")]).unwrap();
    let record = repo.insert(&printer).unwrap();

    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["entity"], "printer");
    assert_eq!(json["code"], "IMP-0001");
    assert_eq!(json["sequence"], 1);
    assert_eq!(json["attributes"]["brand"], "HP");
    assert!(json.get("origin_code").is_none());
    assert!(json.get("derived").is_none());
}

fn zip_parts(path: &std::path::Path) -> BTreeMap<String, Vec<u8>> {
    use std::io::Read;

    let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    let mut parts = BTreeMap::new();
    for idx in 0..archive.len() {
        let mut file = archive.by_index(idx).unwrap();
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).unwrap();
        parts.insert(file.name().to_string(), bytes);
    }
    parts
}

fn write_zip_parts(path: &std::path::Path, parts: &BTreeMap<String, Vec<u8>>) {
    use std::io::Write;

    let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
    let options = zip::write::FileOptions::<()>::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, bytes) in parts {
        zip.start_file(name.as_str(), options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

/// Decorate the computer sheet the way a user editing the file in Excel would:
/// a column width, a styled header, a formula beyond the last column and a
/// list validation.
fn decorate_computer_sheet(path: &std::path::Path) {
    let mut parts = zip_parts(path);
    parts.insert(
        "xl/styles.xml".to_string(),
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="2"><font/><font><b/></font></fonts><fills count="1"><fill/></fills><borders count="1"><border/></borders><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/></cellXfs></styleSheet>"#
            .to_vec(),
    );
    let sheet = parts.get_mut("xl/worksheets/sheet1.xml").unwrap();
    let xml = String::from_utf8(sheet.clone())
        .unwrap()
        .replacen("<sheetData>", r#"<cols><col min="2" max="2" width="20" customWidth="1"/></cols><sheetData>"#, 1)
        .replacen(r#"<c r="A1" "#, r#"<c r="A1" s="1" "#, 1)
        .replacen("</row>", r#"<c r="BK1"><f>COUNTA(B:B)-1</f><v>0</v></c></row>"#, 1)
        .replacen(
            "</worksheet>",
            r#"<dataValidations count="1"><dataValidation type="list" allowBlank="1" sqref="R2:R500"><formula1>"Operativo,Inoperativo"</formula1></dataValidation></dataValidations></worksheet>"#,
            1,
        );
    *sheet = xml.into_bytes();
    write_zip_parts(path, &parts);
}

#[test]
fn inserts_keep_formatting_the_store_does_not_model() {
    let (dir, repo) = repository();
    let path = dir.path().join("inventario.xlsx");
    decorate_computer_sheet(&path);
    let decorated = zip_parts(&path);

    let printer = Attributes::parse(EntityType::Printer, [("brand", "Epson")]).unwrap();
    repo.insert(&printer).unwrap();
    let after_printer = zip_parts(&path);
    for part in ["xl/worksheets/sheet1.xml", "xl/styles.xml"] {
        assert_eq!(after_printer[part], decorated[part], "{part}");
    }

    repo.insert(&computer(&[("type", "Laptop"), ("area", "UCI")])).unwrap();
    let after_computer = zip_parts(&path);
    assert_eq!(after_computer["xl/styles.xml"], decorated["xl/styles.xml"]);
    let sheet = String::from_utf8(after_computer["xl/worksheets/sheet1.xml"].clone()).unwrap();
    assert!(sheet.contains(r#"<col min="2" max="2" width="20" customWidth="1"/>"#));
    assert!(sheet.contains(r#"<c r="A1" s="1" t="s">"#));
    assert!(sheet.contains(r#"<c r="BK1"><f>COUNTA(B:B)-1</f><v>0</v></c>"#));
    assert!(sheet.contains(r#"<dataValidation type="list" allowBlank="1" sqref="R2:R500">"#));

    let workbook = repo.store().load().unwrap();
    let computers = workbook.sheet("Equipos de Cómputo").unwrap();
    assert_eq!(computers.value_at(1, 1), &CellValue::from("EQC-0001"));
    assert_eq!(computers.value_at(0, 62), &CellValue::Number(0.0));
    let printers = repo.list(EntityType::Printer).unwrap();
    assert_eq!(printers.len(), 1);
}

#[test]
fn decommission_marks_the_status_column_not_criticality() {
    let (_dir, repo) = repository();
    let record = repo
        .insert(&computer(&[("criticality", "Alta"), ("operational_status", "Operativo")]))
        .unwrap();
    DecommissionCoordinator::new(&repo)
        .decommission(&record.code, &Attributes::new(EntityType::DecommissionEvent))
        .unwrap();

    let workbook = repo.store().load().unwrap();
    let sheet = workbook.sheet("Equipos de Cómputo").unwrap();
    assert_eq!(sheet.value_at(1, 14), &CellValue::from("Alta"));
    assert_eq!(sheet.value_at(1, 17), &CellValue::from(DECOMMISSIONED_STATUS));

    let events = workbook.sheet("Equipos Dados de Baja").unwrap();
    assert_eq!(events.value_at(1, 0), &CellValue::Number(1.0));
    assert_eq!(events.value_at(1, 1), &CellValue::from("EQC-0001"));
}

#[test]
fn legacy_decommission_layout_is_a_schema_mismatch() {
    let (dir, repo) = repository();
    repo.insert(&computer(&[("type", "Laptop")])).unwrap();
    // Older workbooks have no sequence column: the origin code sits in column A.
    repo.store()
        .update(|workbook| {
            let schema = EntityType::DecommissionEvent.schema();
            let sheet = workbook.sheet_mut(schema.sheet_name).unwrap();
            for (idx, column) in schema.columns.iter().skip(1).enumerate() {
                sheet.set_value_at(0, idx as u32, column.header);
            }
            sheet.set_value_at(0, schema.width() - 1, CellValue::Empty);
            Ok(())
        })
        .unwrap();
    let path = dir.path().join("inventario.xlsx");
    let before = std::fs::read(&path).unwrap();

    let err = DecommissionCoordinator::new(&repo)
        .decommission("EQC-0001", &Attributes::new(EntityType::DecommissionEvent))
        .unwrap_err();
    assert!(
        matches!(err, StoreError::SchemaMismatch { entity: EntityType::DecommissionEvent, .. }),
        "{err}"
    );
    assert_eq!(std::fs::read(&path).unwrap(), before);
}
