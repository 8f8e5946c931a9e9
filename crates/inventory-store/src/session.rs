//! Create-or-update state of a single entry form.

use crate::attributes::Attributes;
use crate::decommission::DecommissionCoordinator;
use crate::error::{Result, StoreError};
use crate::locator::RowHandle;
use crate::record::Record;
use crate::repository::RecordRepository;
use crate::schema::EntityType;
use crate::sequence::Allocation;

/// Form key carrying the retired asset's code on the decommission form.
pub const ORIGIN_CODE_FIELD: &str = "origin_code";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionMode {
    /// Saving creates a record; `next` is the preview shown to the user.
    New { next: Allocation },
    /// Saving updates the loaded record.
    Update { code: String, handle: RowHandle },
}

/// Editing state of one form for one entity type.
///
/// The session holds no reference to the store; every operation takes the
/// repository explicitly.
#[derive(Clone, Debug)]
pub struct EditSession {
    entity: EntityType,
    mode: SessionMode,
}

impl EditSession {
    pub fn new(repository: &RecordRepository, entity: EntityType) -> Self {
        Self {
            entity,
            mode: SessionMode::New {
                next: repository.preview_allocation(entity),
            },
        }
    }

    pub fn entity(&self) -> EntityType {
        self.entity
    }

    pub fn mode(&self) -> &SessionMode {
        &self.mode
    }

    pub fn is_update(&self) -> bool {
        matches!(self.mode, SessionMode::Update { .. })
    }

    /// Code of the loaded record in UPDATE mode.
    pub fn bound_code(&self) -> Option<&str> {
        match &self.mode {
            SessionMode::Update { code, .. } => Some(code),
            SessionMode::New { .. } => None,
        }
    }

    /// Preview of the next allocation in NEW mode.
    pub fn next_allocation(&self) -> Option<&Allocation> {
        match &self.mode {
            SessionMode::New { next } => Some(next),
            SessionMode::Update { .. } => None,
        }
    }

    /// Switch to UPDATE mode for `code` and return the record for prefill.
    ///
    /// On failure the session is left as it was.
    pub fn load(&mut self, repository: &RecordRepository, code: &str) -> Result<Record> {
        let record = repository.read(self.entity, code)?;
        self.mode = SessionMode::Update {
            code: record.code.clone(),
            handle: RowHandle {
                entity: self.entity,
                row: record.row_number - 1,
            },
        };
        log::debug!("editing {} {}", self.entity, record.code);
        Ok(record)
    }

    /// Persist the form values.
    ///
    /// In NEW mode a record is inserted and the preview advances. In UPDATE
    /// mode the bound record is updated and the session returns to NEW. For the
    /// decommission form a NEW save retires the asset named by
    /// [`ORIGIN_CODE_FIELD`].
    pub fn save<K, V>(
        &mut self,
        repository: &RecordRepository,
        form: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Record>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut origin_code = None;
        let mut fields = Vec::new();
        for (key, value) in form {
            let (key, value) = (key.as_ref().trim(), value.as_ref());
            if self.entity == EntityType::DecommissionEvent && key == ORIGIN_CODE_FIELD {
                origin_code = Some(value.trim().to_string());
            } else {
                fields.push((key.to_string(), value.to_string()));
            }
        }
        let attributes = Attributes::parse(self.entity, fields)?;

        let record = match &self.mode {
            SessionMode::Update { code, .. } => repository.update(code, &attributes)?,
            SessionMode::New { .. } if self.entity == EntityType::DecommissionEvent => {
                let origin = origin_code.unwrap_or_default();
                if origin.is_empty() {
                    return Err(StoreError::InvalidCodeFormat(origin));
                }
                DecommissionCoordinator::new(repository)
                    .decommission(&origin, &attributes)?
                    .record
            }
            SessionMode::New { .. } => repository.insert(&attributes)?,
        };

        self.reset(repository);
        Ok(record)
    }

    /// Leave UPDATE mode without saving.
    pub fn cancel(&mut self, repository: &RecordRepository) {
        self.reset(repository);
    }

    fn reset(&mut self, repository: &RecordRepository) {
        self.mode = SessionMode::New {
            next: repository.preview_allocation(self.entity),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::tabular::TabularStore;
    use pretty_assertions::assert_eq;

    fn repository() -> (tempfile::TempDir, RecordRepository) {
        let dir = tempfile::tempdir().unwrap();
        let store = TabularStore::new(dir.path().join("inventario.xlsx"));
        store.initialize().unwrap();
        (dir, RecordRepository::new(store, StoreConfig::default()))
    }

    #[test]
    fn new_save_advances_preview() {
        let (_dir, repo) = repository();
        let mut session = EditSession::new(&repo, EntityType::Peripheral);
        assert_eq!(session.next_allocation().map(|a| a.code.as_str()), Some("PER-0001"));

        let record = session.save(&repo, [("type", "Teclado")]).unwrap();
        assert_eq!(record.code, "PER-0001");
        assert!(!session.is_update());
        assert_eq!(session.next_allocation().map(|a| a.code.as_str()), Some("PER-0002"));
    }

    #[test]
    fn load_update_and_return_to_new() {
        let (_dir, repo) = repository();
        let mut session = EditSession::new(&repo, EntityType::Peripheral);
        session.save(&repo, [("type", "Teclado"), ("area", "UCI")]).unwrap();

        let loaded = session.load(&repo, "per-0001").unwrap();
        assert_eq!(loaded.get("area"), Some("UCI"));
        assert_eq!(session.bound_code(), Some("PER-0001"));
        assert_eq!(session.next_allocation(), None);

        let updated = session.save(&repo, [("area", "Urgencias")]).unwrap();
        assert_eq!(updated.code, "PER-0001");
        assert_eq!(updated.get("type"), Some("Teclado"));
        assert_eq!(session.bound_code(), None);
        assert_eq!(session.next_allocation().map(|a| a.code.as_str()), Some("PER-0002"));
        assert_eq!(repo.list(EntityType::Peripheral).unwrap().len(), 1);
    }

    #[test]
    fn failed_load_keeps_mode() {
        let (_dir, repo) = repository();
        let mut session = EditSession::new(&repo, EntityType::Printer);
        let before = session.mode().clone();
        assert!(matches!(
            session.load(&repo, "IMP-0042"),
            Err(StoreError::RecordNotFound { .. })
        ));
        assert_eq!(session.mode(), &before);
    }

    #[test]
    fn failed_save_keeps_update_binding() {
        let (_dir, repo) = repository();
        let mut session = EditSession::new(&repo, EntityType::Printer);
        session.save(&repo, [("brand", "HP")]).unwrap();
        session.load(&repo, "IMP-0001").unwrap();

        assert!(session.save(&repo, [("colour", "red")]).is_err());
        assert_eq!(session.bound_code(), Some("IMP-0001"));

        session.cancel(&repo);
        assert!(!session.is_update());
    }

    #[test]
    fn decommission_form_marks_origin() {
        let (_dir, repo) = repository();
        let mut computers = EditSession::new(&repo, EntityType::ComputerEquipment);
        computers.save(&repo, [("type", "Laptop")]).unwrap();

        let mut retire = EditSession::new(&repo, EntityType::DecommissionEvent);
        assert!(matches!(
            retire.save(&repo, [("reason", "Obsoleto")]),
            Err(StoreError::InvalidCodeFormat(_))
        ));

        let record = retire
            .save(&repo, [("origin_code", "EQC-0001"), ("reason", "Obsoleto")])
            .unwrap();
        assert_eq!(record.origin_code.as_deref(), Some("EQC-0001"));
        assert_eq!(record.get("type"), Some("Laptop"));
        assert_eq!(
            repo.read(EntityType::ComputerEquipment, "EQC-0001").unwrap().status(),
            Some("DADO DE BAJA")
        );
    }
}
