//! Atomic replacement of the workbook file.
//!
//! The new package is written to a temp file next to the destination, flushed
//! and synced, then renamed over the destination. A failure at any point before
//! the rename leaves the previous file untouched.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use inventory_model::Workbook;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::writer::{write_workbook_to_writer, WriteError};

#[derive(Debug, Error)]
pub enum AtomicWriteError<E: std::error::Error + 'static> {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("write error: {0}")]
    Writer(#[source] E),
}

/// Error returned by [`save_workbook`].
pub type SaveError = AtomicWriteError<WriteError>;

fn parent_dir_or_dot(path: &Path) -> &Path {
    // `Path::parent` is `Some("")` for bare file names like `inventario.xlsx`.
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Atomically write `dest` through `write_fn`.
///
/// If `write_fn` returns an error the destination file is left untouched and
/// the temp file is removed.
pub fn atomic_write<T, E: std::error::Error + 'static>(
    dest: impl AsRef<Path>,
    write_fn: impl FnOnce(&mut File) -> Result<T, E>,
) -> Result<T, AtomicWriteError<E>> {
    let dest = dest.as_ref();
    let dir = parent_dir_or_dot(dest);
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    let out = write_fn(tmp.as_file_mut()).map_err(AtomicWriteError::Writer)?;

    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;

    // `fs::rename` replaces an existing destination on every supported platform.
    let tmp_path = tmp.into_temp_path();
    fs::rename(&tmp_path, dest)?;

    if let Err(err) = sync_parent_dir(dest) {
        log::debug!("could not sync directory of {}: {err}", dest.display());
    }

    Ok(out)
}

fn sync_parent_dir(path: &Path) -> io::Result<()> {
    let dir = File::open(parent_dir_or_dot(path))?;
    dir.sync_all()
}

/// Serialize `workbook` and atomically replace the file at `path`.
pub fn save_workbook(path: impl AsRef<Path>, workbook: &Workbook) -> Result<(), SaveError> {
    let path = path.as_ref();
    atomic_write(path, |file| write_workbook_to_writer(workbook, file))?;
    log::debug!(
        "saved {} sheet(s) to {}",
        workbook.sheets.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    static CWD_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    struct CwdGuard {
        old: std::path::PathBuf,
    }

    impl CwdGuard {
        fn chdir(path: &Path) -> Self {
            let old = std::env::current_dir().expect("current_dir");
            std::env::set_current_dir(path).expect("set_current_dir");
            Self { old }
        }
    }

    impl Drop for CwdGuard {
        fn drop(&mut self) {
            let _ = std::env::set_current_dir(&self.old);
        }
    }

    #[test]
    fn atomic_write_supports_bare_file_names() {
        let _guard = CWD_LOCK.lock().expect("lock");

        let tmp = tempfile::tempdir().expect("temp dir");
        let _cwd = CwdGuard::chdir(tmp.path());

        atomic_write("inventario.bin", |file| file.write_all(b"hello")).expect("atomic write");
        assert_eq!(
            std::fs::read(tmp.path().join("inventario.bin")).expect("read file"),
            b"hello"
        );
    }

    #[test]
    fn failed_write_does_not_clobber_existing_file() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("inventario.xlsx");
        std::fs::write(&dest, b"sentinel").expect("write sentinel");

        let err = atomic_write(&dest, |file| {
            file.write_all(b"partial")?;
            Err::<(), _>(io::Error::new(io::ErrorKind::Other, "simulated failure"))
        })
        .expect_err("write should fail");
        assert!(matches!(err, AtomicWriteError::Writer(_)));

        assert_eq!(std::fs::read(&dest).expect("read dest"), b"sentinel");
        let files: Vec<_> = std::fs::read_dir(tmp.path())
            .expect("read_dir")
            .map(|e| e.expect("entry").path())
            .collect();
        assert_eq!(files, vec![dest], "temp file should be cleaned up");
    }

    #[test]
    fn save_refuses_empty_workbook_without_touching_destination() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("inventario.xlsx");
        std::fs::write(&dest, b"previous").expect("write previous");

        let err = save_workbook(&dest, &Workbook::new()).expect_err("empty workbook");
        assert!(matches!(err, AtomicWriteError::Writer(WriteError::Invalid(_))));
        assert_eq!(std::fs::read(&dest).expect("read dest"), b"previous");
    }
}
