//! Store configuration loaded from a TOML file.
//!
//! ```toml
//! workbook = "inventario.xlsx"
//! strict_headers = true
//!
//! [scan_limits]
//! computer_equipment = 500
//! printer = 200
//! ```

use std::path::{Path, PathBuf};

use inventory_model::EXCEL_MAX_ROWS;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::EntityType;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("scan limit for {entity} must be between 1 and {max}, got {value}")]
    InvalidScanLimit {
        entity: EntityType,
        value: u32,
        max: u32,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Path of the shared workbook. Relative paths are resolved by the caller.
    pub workbook: Option<PathBuf>,
    /// Treat header drift in a written sheet as an error instead of a warning.
    pub strict_headers: bool,
    pub scan_limits: ScanLimits,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            workbook: None,
            strict_headers: true,
            scan_limits: ScanLimits::default(),
        }
    }
}

/// Per-entity overrides of the number of data rows scanned.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanLimits {
    pub computer_equipment: Option<u32>,
    pub printer: Option<u32>,
    pub peripheral: Option<u32>,
    pub network_equipment: Option<u32>,
    pub maintenance_event: Option<u32>,
    pub decommission_event: Option<u32>,
}

impl ScanLimits {
    fn get(&self, entity: EntityType) -> Option<u32> {
        match entity {
            EntityType::ComputerEquipment => self.computer_equipment,
            EntityType::Printer => self.printer,
            EntityType::Peripheral => self.peripheral,
            EntityType::NetworkEquipment => self.network_equipment,
            EntityType::MaintenanceEvent => self.maintenance_event,
            EntityType::DecommissionEvent => self.decommission_event,
        }
    }

    pub fn set(&mut self, entity: EntityType, bound: u32) {
        let slot = match entity {
            EntityType::ComputerEquipment => &mut self.computer_equipment,
            EntityType::Printer => &mut self.printer,
            EntityType::Peripheral => &mut self.peripheral,
            EntityType::NetworkEquipment => &mut self.network_equipment,
            EntityType::MaintenanceEvent => &mut self.maintenance_event,
            EntityType::DecommissionEvent => &mut self.decommission_event,
        };
        *slot = Some(bound);
    }
}

impl StoreConfig {
    pub fn from_toml_str(source: &str, path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let config: StoreConfig = toml::from_str(source).map_err(|source| ConfigError::Parse {
            path: path.into(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&source, path)?;
        log::debug!("loaded store config from {}", path.display());
        Ok(config)
    }

    /// Number of data rows scanned for `entity`.
    pub fn bound(&self, entity: EntityType) -> u32 {
        self.scan_limits
            .get(entity)
            .unwrap_or(entity.schema().default_bound)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // Row 1 holds headers, so at most `EXCEL_MAX_ROWS - 1` data rows exist.
        let max = EXCEL_MAX_ROWS - 1;
        for entity in EntityType::ALL {
            if let Some(value) = self.scan_limits.get(entity) {
                if value == 0 || value > max {
                    return Err(ConfigError::InvalidScanLimit { entity, value, max });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_uses_defaults() {
        let config = StoreConfig::from_toml_str("", "inventory.toml").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert!(config.strict_headers);
        assert_eq!(config.bound(EntityType::ComputerEquipment), 500);
        assert_eq!(config.bound(EntityType::NetworkEquipment), 100);
    }

    #[test]
    fn overrides_scan_limits() {
        let config = StoreConfig::from_toml_str(
            r#"
workbook = "compartido/inventario.xlsx"
strict_headers = false

[scan_limits]
printer = 50
"#,
            "inventory.toml",
        )
        .unwrap();
        assert_eq!(config.workbook, Some(PathBuf::from("compartido/inventario.xlsx")));
        assert!(!config.strict_headers);
        assert_eq!(config.bound(EntityType::Printer), 50);
        assert_eq!(config.bound(EntityType::Peripheral), 200);
    }

    #[test]
    fn rejects_unknown_keys_and_zero_limits() {
        let err = StoreConfig::from_toml_str("[scan_limits]\nscanner = 3\n", "x.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "{err}");

        let err = StoreConfig::from_toml_str("[scan_limits]\nperipheral = 0\n", "x.toml").unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidScanLimit { entity: EntityType::Peripheral, value: 0, .. }),
            "{err}"
        );
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = StoreConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
