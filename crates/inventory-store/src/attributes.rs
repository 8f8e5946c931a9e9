use std::collections::BTreeMap;

use crate::error::{Result, StoreError};
use crate::schema::{ColumnRole, EntityType};

/// Form values for one entity type, validated against its schema.
///
/// Keys always name an editable column (`Attribute` or `Status`). Values are
/// trimmed; an empty value clears the cell on update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attributes {
    entity: EntityType,
    values: BTreeMap<&'static str, String>,
}

impl Attributes {
    pub fn new(entity: EntityType) -> Self {
        Self {
            entity,
            values: BTreeMap::new(),
        }
    }

    /// Convert a flat form map. Unknown keys, and keys of identity, origin or
    /// derived columns, fail with [`StoreError::SchemaMismatch`].
    pub fn parse<K, V>(entity: EntityType, form: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut attributes = Self::new(entity);
        for (key, value) in form {
            attributes.set(key.as_ref(), value.as_ref())?;
        }
        Ok(attributes)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let schema = self.entity.schema();
        let key = key.trim();
        let Some(column) = schema.column(key) else {
            return Err(StoreError::schema(
                self.entity,
                format!("unknown field {key:?}"),
            ));
        };
        if !column.role.is_editable() {
            let what = match column.role {
                ColumnRole::Sequence | ColumnRole::Code => "is assigned by the store",
                ColumnRole::OriginCode => "is set when decommissioning",
                _ => "is computed",
            };
            return Err(StoreError::schema(
                self.entity,
                format!("field {key:?} {what} and cannot be supplied"),
            ));
        }
        self.values.insert(column.key, value.trim().to_string());
        Ok(())
    }

    /// Set `key` only when it has no non-blank value yet.
    pub(crate) fn set_default(&mut self, key: &'static str, value: &str) {
        let current = self.values.entry(key).or_default();
        if current.is_empty() {
            *current = value.trim().to_string();
        }
    }

    pub fn entity(&self) -> EntityType {
        self.entity
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn trims_values_and_keeps_known_keys() {
        let attributes = Attributes::parse(
            EntityType::ComputerEquipment,
            [("type", " Laptop "), ("area", "UCI"), ("operational_status", "Activo")],
        )
        .unwrap();
        assert_eq!(attributes.get("type"), Some("Laptop"));
        assert_eq!(attributes.len(), 3);
        assert_eq!(
            attributes.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            vec!["area", "operational_status", "type"]
        );
    }

    #[test]
    fn rejects_identity_and_unknown_keys() {
        for key in ["code", "sequence", "age_years", "color"] {
            let err = Attributes::parse(EntityType::ComputerEquipment, [(key, "x")]).unwrap_err();
            assert!(matches!(err, StoreError::SchemaMismatch { .. }), "{key}: {err}");
        }
        let err = Attributes::parse(EntityType::DecommissionEvent, [("origin_code", "EQC-0001")])
            .unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch { .. }));
    }

    #[test]
    fn keys_are_checked_against_their_own_entity() {
        assert!(Attributes::parse(EntityType::Printer, [("function", "Copias")]).is_ok());
        assert!(Attributes::parse(EntityType::Peripheral, [("function", "Copias")]).is_err());
    }

    #[test]
    fn defaults_fill_only_blank_values() {
        let mut attributes = Attributes::parse(EntityType::DecommissionEvent, [("brand", "HP"), ("model", "")]).unwrap();
        attributes.set_default("brand", "Dell");
        attributes.set_default("model", "Latitude");
        attributes.set_default("serial", "SN1");
        assert_eq!(attributes.get("brand"), Some("HP"));
        assert_eq!(attributes.get("model"), Some("Latitude"));
        assert_eq!(attributes.get("serial"), Some("SN1"));
    }
}
