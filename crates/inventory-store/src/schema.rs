//! Column layout of every inventory sheet.
//!
//! Each [`EntityType`] owns exactly one [`SheetSchema`]. Repositories, the row
//! locator and the decommission coordinator resolve column positions only
//! through these descriptors.

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status written into an origin row when the asset is retired.
pub const DECOMMISSIONED_STATUS: &str = "DADO DE BAJA";

/// Rows are 0-indexed; row 0 holds the headers.
pub const HEADER_ROW: u32 = 0;
pub const FIRST_DATA_ROW: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    ComputerEquipment,
    Printer,
    Peripheral,
    NetworkEquipment,
    MaintenanceEvent,
    DecommissionEvent,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::ComputerEquipment,
        EntityType::Printer,
        EntityType::Peripheral,
        EntityType::NetworkEquipment,
        EntityType::MaintenanceEvent,
        EntityType::DecommissionEvent,
    ];

    /// Entity types whose records carry a prefixed code and can be decommissioned.
    pub const ASSETS: [EntityType; 4] = [
        EntityType::ComputerEquipment,
        EntityType::Printer,
        EntityType::Peripheral,
        EntityType::NetworkEquipment,
    ];

    pub fn schema(self) -> &'static SheetSchema {
        match self {
            EntityType::ComputerEquipment => &COMPUTER_EQUIPMENT,
            EntityType::Printer => &PRINTER,
            EntityType::Peripheral => &PERIPHERAL,
            EntityType::NetworkEquipment => &NETWORK_EQUIPMENT,
            EntityType::MaintenanceEvent => &MAINTENANCE_EVENT,
            EntityType::DecommissionEvent => &DECOMMISSION_EVENT,
        }
    }

    /// Snake-case name used in configuration files and on the command line.
    pub fn key(self) -> &'static str {
        match self {
            EntityType::ComputerEquipment => "computer_equipment",
            EntityType::Printer => "printer",
            EntityType::Peripheral => "peripheral",
            EntityType::NetworkEquipment => "network_equipment",
            EntityType::MaintenanceEvent => "maintenance_event",
            EntityType::DecommissionEvent => "decommission_event",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<EntityType> {
        EntityType::ASSETS
            .into_iter()
            .find(|entity| entity.schema().prefix == Some(prefix))
    }

    pub fn is_asset(self) -> bool {
        self.schema().prefix.is_some()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownEntityType(pub String);

impl fmt::Display for UnknownEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let known: Vec<&str> = EntityType::ALL.iter().map(|e| e.key()).collect();
        write!(f, "unknown entity type {:?} (expected one of: {})", self.0, known.join(", "))
    }
}

impl std::error::Error for UnknownEntityType {}

impl FromStr for EntityType {
    type Err = UnknownEntityType;

    /// Accepts the snake-case key, its kebab-case spelling, or an asset prefix (`EQC`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        EntityType::ALL
            .into_iter()
            .find(|entity| {
                entity.key() == normalized
                    || entity
                        .schema()
                        .prefix
                        .is_some_and(|p| p.eq_ignore_ascii_case(s.trim()))
            })
            .ok_or_else(|| UnknownEntityType(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnRole {
    /// Numeric identifier; always the first column.
    Sequence,
    /// `<PREFIX>-<NNNN>` code derived from the sequence.
    Code,
    Attribute,
    /// Editable attribute that also receives the decommission marker.
    Status,
    /// Code of the retired asset (decommission events only).
    OriginCode,
    /// Computed by the repository.
    Derived,
}

impl ColumnRole {
    /// Whether callers may supply a value for this column.
    pub fn is_editable(self) -> bool {
        matches!(self, ColumnRole::Attribute | ColumnRole::Status)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Column {
    pub key: &'static str,
    pub header: &'static str,
    pub role: ColumnRole,
}

#[derive(Debug, PartialEq, Eq)]
pub struct SheetSchema {
    pub entity: EntityType,
    pub sheet_name: &'static str,
    pub prefix: Option<&'static str>,
    /// Default number of data rows scanned, overridable through configuration.
    pub default_bound: u32,
    /// Value used for `type` when decommissioning a record whose type is blank.
    pub default_type: Option<&'static str>,
    pub columns: &'static [Column],
}

impl SheetSchema {
    pub fn width(&self) -> u32 {
        self.columns.len() as u32
    }

    /// 0-indexed column holding `key`.
    pub fn column_index(&self, key: &str) -> Option<u32> {
        self.columns
            .iter()
            .position(|column| column.key == key)
            .map(|idx| idx as u32)
    }

    pub fn column(&self, key: &str) -> Option<&'static Column> {
        self.columns.iter().find(|column| column.key == key)
    }

    pub fn sequence_column(&self) -> u32 {
        0
    }

    pub fn code_column(&self) -> Option<u32> {
        self.role_index(ColumnRole::Code)
    }

    /// Column matched by the row locator: the code for assets, the sequence otherwise.
    pub fn key_column(&self) -> u32 {
        self.code_column().unwrap_or(self.sequence_column())
    }

    pub fn status_column(&self) -> Option<u32> {
        self.role_index(ColumnRole::Status)
    }

    pub fn origin_column(&self) -> Option<u32> {
        self.role_index(ColumnRole::OriginCode)
    }

    pub fn editable_columns(&self) -> impl Iterator<Item = (u32, &'static Column)> + '_ {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.role.is_editable())
            .map(|(idx, column)| (idx as u32, column))
    }

    fn role_index(&self, role: ColumnRole) -> Option<u32> {
        self.columns
            .iter()
            .position(|column| column.role == role)
            .map(|idx| idx as u32)
    }
}

const fn col(key: &'static str, header: &'static str, role: ColumnRole) -> Column {
    Column { key, header, role }
}

const fn attr(key: &'static str, header: &'static str) -> Column {
    col(key, header, ColumnRole::Attribute)
}

const SEQUENCE: Column = col("sequence", "N° Consecutivo", ColumnRole::Sequence);
const CODE: Column = col("code", "Código Inventario", ColumnRole::Code);

static COMPUTER_EQUIPMENT_COLUMNS: [Column; 62] = [
    SEQUENCE,
    CODE,
    attr("hostname", "Nombre Equipo"),
    attr("type", "Tipo Equipo"),
    attr("area", "Área / Servicio"),
    attr("location", "Ubicación Específica"),
    attr("custodian", "Responsable / Custodio"),
    attr("process", "Proceso"),
    attr("sihos_usage", "Uso SIHOS"),
    attr("sifax_usage", "Uso SIFAX"),
    attr("basic_office_usage", "Uso Office Básico"),
    attr("specialized_software", "Software Especializado"),
    attr("software_description", "Descripción Software"),
    attr("main_function", "Función Principal"),
    attr("criticality", "Criticidad"),
    attr("confidentiality", "Confidencialidad"),
    attr("usage_schedule", "Horario de Uso"),
    col("operational_status", "Estado Operativo", ColumnRole::Status),
    attr("acquisition_date", "Fecha Adquisición"),
    attr("acquisition_value", "Valor Adquisición"),
    attr("warranty_expiration", "Vencimiento Garantía"),
    attr("technical_notes", "Observaciones Técnicas"),
    attr("antivirus_expiration", "Expiración Antivirus"),
    attr("maintenance_frequency", "Periodicidad Mantenimiento"),
    attr("maintenance_owner", "Responsable Mantenimiento"),
    attr("last_maintenance", "Último Mantenimiento"),
    attr("last_maintenance_type", "Tipo Último Mantenimiento"),
    attr("brand", "Marca"),
    attr("model", "Modelo"),
    attr("serial", "Serial"),
    attr("operating_system", "Sistema Operativo"),
    attr("os_architecture", "Arquitectura SO"),
    attr("processor", "Procesador"),
    attr("ram_gb", "RAM (GB)"),
    attr("storage_gb", "Almacenamiento (GB)"),
    attr("disk_type", "Tipo Disco"),
    attr("web_browser", "Navegador Web"),
    attr("office_version", "Versión Office"),
    attr("office_license", "Licencia Office"),
    attr("teams_usage", "Uso Teams"),
    attr("outlook_usage", "Uso Outlook"),
    attr("windows_license", "Licencia Windows"),
    attr("windows_key", "Clave Windows"),
    attr("windows_license_status", "Estado Licencia Windows"),
    attr("ip_address", "Dirección IP"),
    attr("connection_type", "Tipo Conexión"),
    attr("antivirus", "Antivirus Instalado"),
    attr("last_windows_update", "Última Actualización Windows"),
    attr("windows_update_enabled", "Windows Update Activo"),
    attr("secondary_disk", "Disco Secundario"),
    attr("secondary_disk_type", "Tipo Disco Secundario"),
    attr("secondary_disk_serial", "Serial Disco Secundario"),
    attr("secondary_disk_brand", "Marca Disco Secundario"),
    attr("secondary_disk_model", "Modelo Disco Secundario"),
    attr("switch_port", "Puerto Switch"),
    attr("vlan", "VLAN Asignada"),
    attr("anydesk_id", "ID AnyDesk"),
    attr("other_remote_access", "Otro Acceso Remoto"),
    attr("antivirus_status", "Estado Antivirus"),
    attr("disk_encryption", "Cifrado Disco"),
    attr("local_user_type", "Tipo Usuario Local"),
    col("age_years", "Antigüedad (años)", ColumnRole::Derived),
];

static PRINTER_COLUMNS: [Column; 15] = [
    SEQUENCE,
    CODE,
    attr("assigned_code", "Código Asignado"),
    attr("type", "Tipo"),
    attr("brand", "Marca"),
    attr("model", "Modelo"),
    attr("serial", "Serial"),
    attr("area", "Área / Servicio"),
    attr("location", "Ubicación"),
    attr("function", "Función"),
    attr("ip_address", "Dirección IP"),
    col("status", "Estado", ColumnRole::Status),
    attr("acquisition_date", "Fecha Adquisición"),
    attr("acquisition_value", "Valor Adquisición"),
    attr("notes", "Observaciones"),
];

static PERIPHERAL_COLUMNS: [Column; 11] = [
    SEQUENCE,
    CODE,
    attr("assigned_code", "Código Asignado"),
    attr("type", "Tipo"),
    attr("brand", "Marca"),
    attr("model", "Modelo"),
    attr("serial", "Serial"),
    attr("area", "Área / Servicio"),
    col("status", "Estado", ColumnRole::Status),
    attr("acquisition_date", "Fecha Adquisición"),
    attr("notes", "Observaciones"),
];

static NETWORK_EQUIPMENT_COLUMNS: [Column; 14] = [
    SEQUENCE,
    CODE,
    attr("type", "Tipo"),
    attr("brand", "Marca"),
    attr("model", "Modelo"),
    attr("serial", "Serial"),
    attr("ip_address", "Dirección IP"),
    attr("ports", "Puertos"),
    attr("location", "Ubicación"),
    attr("area", "Área / Servicio"),
    col("status", "Estado", ColumnRole::Status),
    attr("acquisition_date", "Fecha Adquisición"),
    attr("acquisition_value", "Valor Adquisición"),
    attr("notes", "Observaciones"),
];

static MAINTENANCE_EVENT_COLUMNS: [Column; 10] = [
    SEQUENCE,
    attr("equipment_code", "Código Equipo"),
    attr("date", "Fecha"),
    attr("type", "Tipo Mantenimiento"),
    attr("technician", "Técnico"),
    attr("description", "Descripción"),
    attr("parts", "Repuestos"),
    attr("post_status", "Estado Posterior"),
    attr("next_maintenance", "Próximo Mantenimiento"),
    attr("notes", "Observaciones"),
];

static DECOMMISSION_EVENT_COLUMNS: [Column; 11] = [
    SEQUENCE,
    col("origin_code", "Código Equipo", ColumnRole::OriginCode),
    attr("type", "Tipo"),
    attr("brand", "Marca"),
    attr("model", "Modelo"),
    attr("serial", "Serial"),
    attr("date", "Fecha Baja"),
    attr("reason", "Motivo"),
    attr("destination", "Destino Final"),
    attr("responsible", "Responsable"),
    attr("notes", "Observaciones"),
];

static COMPUTER_EQUIPMENT: SheetSchema = SheetSchema {
    entity: EntityType::ComputerEquipment,
    sheet_name: "Equipos de Cómputo",
    prefix: Some("EQC"),
    default_bound: 500,
    default_type: Some("Computador"),
    columns: &COMPUTER_EQUIPMENT_COLUMNS,
};

static PRINTER: SheetSchema = SheetSchema {
    entity: EntityType::Printer,
    sheet_name: "Impresoras y Escáneres",
    prefix: Some("IMP"),
    default_bound: 200,
    default_type: Some("Impresora"),
    columns: &PRINTER_COLUMNS,
};

static PERIPHERAL: SheetSchema = SheetSchema {
    entity: EntityType::Peripheral,
    sheet_name: "Periféricos",
    prefix: Some("PER"),
    default_bound: 200,
    default_type: Some("Periférico"),
    columns: &PERIPHERAL_COLUMNS,
};

static NETWORK_EQUIPMENT: SheetSchema = SheetSchema {
    entity: EntityType::NetworkEquipment,
    sheet_name: "Equipos de Red",
    prefix: Some("RED"),
    default_bound: 100,
    default_type: Some("Equipo de Red"),
    columns: &NETWORK_EQUIPMENT_COLUMNS,
};

static MAINTENANCE_EVENT: SheetSchema = SheetSchema {
    entity: EntityType::MaintenanceEvent,
    sheet_name: "Mantenimientos",
    prefix: None,
    default_bound: 500,
    default_type: None,
    columns: &MAINTENANCE_EVENT_COLUMNS,
};

static DECOMMISSION_EVENT: SheetSchema = SheetSchema {
    entity: EntityType::DecommissionEvent,
    sheet_name: "Equipos Dados de Baja",
    prefix: None,
    default_bound: 200,
    default_type: None,
    columns: &DECOMMISSION_EVENT_COLUMNS,
};
