//! Storage backend for the credential store file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::CorruptPolicy;
use crate::crypto::aead::secure_random;
use crate::error::{Result, StoreError};
use crate::format::{self, FormatError};
use crate::store::StoreDocument;

/// A storage backend for persisting the store document.
///
/// `Storage` reads and writes one JSON file. Every write replaces the whole
/// file atomically; there is no append mode.
#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    /// Creates a new Storage instance with the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns `true` if the storage file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Returns the path to the storage file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Reads and parses the whole document.
    ///
    /// A missing file (or parent directory) is bootstrapped with an empty
    /// document, which is written to disk and returned. An unparseable file
    /// is handled according to `policy`. A document with an unknown schema
    /// version is always rejected.
    ///
    /// # Errors
    ///
    /// Returns `CorruptStore`, `UnsupportedVersion` or an I/O error.
    pub fn read_document(&self, policy: CorruptPolicy) -> Result<StoreDocument> {
        if !self.exists() {
            info!(path = %self.path.display(), "creating empty credential store");
            let document = StoreDocument::new();
            self.write_document(&document)?;
            return Ok(document);
        }

        let data = self.load()?;
        match format::parse(&data) {
            Ok(parsed) => {
                debug!(
                    path = %self.path.display(),
                    records = parsed.document.len(),
                    migrated = parsed.migrated,
                    "read credential store"
                );
                Ok(parsed.document)
            }
            Err(FormatError::UnsupportedVersion(version)) => Err(StoreError::UnsupportedVersion {
                path: self.path.clone(),
                version,
            }),
            Err(FormatError::Malformed(reason)) => match policy {
                CorruptPolicy::Fail => Err(StoreError::CorruptStore {
                    path: self.path.clone(),
                    reason,
                }),
                CorruptPolicy::Reset => {
                    let quarantined = self.quarantine()?;
                    warn!(
                        path = %self.path.display(),
                        quarantined = %quarantined.display(),
                        %reason,
                        "credential store unreadable, starting from an empty store"
                    );
                    let document = StoreDocument::new();
                    self.write_document(&document)?;
                    Ok(document)
                }
            },
        }
    }

    /// Serializes and atomically writes the whole document.
    pub fn write_document(&self, document: &StoreDocument) -> Result<()> {
        let data = format::serialize(document)?;
        self.save(&data)?;
        debug!(
            path = %self.path.display(),
            records = document.len(),
            "wrote credential store"
        );
        Ok(())
    }

    /// Loads the entire storage file into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn load(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(StoreError::io(&self.path))
    }

    /// Saves data to the storage file using atomic write.
    ///
    /// This method ensures crash-safety by:
    /// 1. Writing data to a temporary file with random name
    /// 2. Syncing the temporary file to disk
    /// 3. Atomically replacing the old file with the new one
    /// 4. Syncing the parent directory to ensure the rename is persisted
    ///
    /// If a crash occurs during save, either the old or new file will be present,
    /// never a corrupted partial write.
    ///
    /// Creates parent directories if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, data: &[u8]) -> Result<()> {
        self.save_with(data, |_| Ok(()))
    }

    /// Like [`Storage::save`], running `before_replace` on the fully written
    /// temporary file right before it replaces the target. An error from the
    /// hook aborts the save and leaves the target untouched.
    fn save_with<F>(&self, data: &[u8], before_replace: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let parent = self.parent_dir();
        fs::create_dir_all(parent).map_err(StoreError::io(parent))?;

        let tmp_path = self.random_tmp_path()?;

        // securely create temp file (fail if exists)
        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .map_err(StoreError::io(&tmp_path))?;

        let written = tmp_file
            .write_all(data)
            .and_then(|_| tmp_file.sync_all())
            .map_err(StoreError::io(&tmp_path));
        drop(tmp_file);

        if let Err(e) = written
            .and_then(|_| before_replace(&tmp_path))
            .and_then(|_| self.atomic_replace(&tmp_path))
        {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        self.sync_parent()
    }

    /// Moves an unreadable store file aside as `<name>.corrupt-<millis>.<randomhex>`.
    fn quarantine(&self) -> Result<PathBuf> {
        let target = self.quarantine_path()?;
        fs::rename(&self.path, &target).map_err(StoreError::io(&self.path))?;
        Ok(target)
    }

    /// Random suffix keeps two resets within the same millisecond apart.
    fn quarantine_path(&self) -> Result<PathBuf> {
        let mut buf = [0u8; 8];
        secure_random(&mut buf)?;

        let name = format!(
            "{}.corrupt-{}.{}",
            self.file_name()?,
            Utc::now().timestamp_millis(),
            hex::encode(buf)
        );
        Ok(self.path.with_file_name(name))
    }

    /// Directory holding the store file; `.` for a bare file name.
    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn file_name(&self) -> Result<String> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                StoreError::Configuration(format!(
                    "store path '{}' has no file name",
                    self.path.display()
                ))
            })
    }

    /// Generates a unique temporary file path in the same directory.
    ///
    /// Uses cryptographically secure random bytes to avoid name collisions.
    /// Format: `filename.tmp.<randomhex>`
    fn random_tmp_path(&self) -> Result<PathBuf> {
        let mut buf = [0u8; 8]; // 64 bit entropy
        secure_random(&mut buf)?;

        let tmp_name = format!("{}.tmp.{}", self.file_name()?, hex::encode(buf));

        Ok(self.path.with_file_name(tmp_name))
    }

    /// Atomically replaces the target file with the temporary file.
    ///
    /// Uses Windows `ReplaceFileW` API with `REPLACEFILE_WRITE_THROUGH` flag
    /// to ensure the operation is truly atomic and persisted to disk.
    /// `ReplaceFileW` needs an existing target, so the first write is a rename.
    #[cfg(target_os = "windows")]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

        if !self.path.exists() {
            return fs::rename(tmp_path, &self.path).map_err(StoreError::io(&self.path));
        }

        fn to_wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let target_w = to_wide(self.path.as_os_str());
        let tmp_w = to_wide(tmp_path.as_os_str());

        // SAFETY:
        // - Strings are valid UTF-16 and null-terminated
        // - Pointers remain valid during the call
        // - Windows does not retain the pointers after return
        let result = unsafe {
            ReplaceFileW(
                target_w.as_ptr(),
                tmp_w.as_ptr(),
                std::ptr::null(),
                REPLACEFILE_WRITE_THROUGH,
                std::ptr::null(),
                std::ptr::null(),
            )
        };

        if result == 0 {
            return Err(StoreError::Io {
                path: self.path.clone(),
                source: std::io::Error::last_os_error(),
            });
        }

        Ok(())
    }

    /// Atomically replaces the target file with the temporary file.
    ///
    /// On Unix, `rename()` is atomic when both paths are on the same filesystem.
    #[cfg(not(target_os = "windows"))]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        fs::rename(tmp_path, &self.path).map_err(StoreError::io(&self.path))
    }

    #[cfg(not(target_os = "windows"))]
    fn sync_parent(&self) -> Result<()> {
        let parent = self.parent_dir();
        File::open(parent)
            .and_then(|dir| dir.sync_all())
            .map_err(StoreError::io(parent))
    }

    // directory handles cannot be fsynced on Windows; ReplaceFileW writes through
    #[cfg(target_os = "windows")]
    fn sync_parent(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{NONCE_LEN, SealedSecret, TAG_LEN};
    use crate::store::CredentialRecord;
    use std::fs;
    use tempfile::tempdir;

    fn sample_document() -> StoreDocument {
        let mut doc = StoreDocument::new();
        doc.upsert(CredentialRecord::new(
            "alice".to_string(),
            SealedSecret {
                ciphertext: vec![1, 2, 3],
                nonce: [4u8; NONCE_LEN],
                tag: [5u8; TAG_LEN],
            },
        ));
        doc
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    // --------------------------------------------------
    // RAW LOAD / SAVE
    // --------------------------------------------------

    #[test]
    fn load_returns_written_data() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("users.json"));
        storage.save(b"hello world").unwrap();

        assert_eq!(storage.load().unwrap(), b"hello world");
    }

    #[test]
    fn load_fails_if_file_does_not_exist() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("missing.json"));

        assert!(matches!(storage.load(), Err(StoreError::Io { .. })));
    }

    #[test]
    fn save_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        let storage = Storage::new(path.clone());

        storage.save(b"first").unwrap();
        storage.save(b"second").unwrap();

        assert_eq!(fs::read(path).unwrap(), b"second");
    }

    #[test]
    fn tmp_file_is_removed_after_success() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("users.json"));
        storage.save(b"data").unwrap();

        assert_eq!(dir_entries(dir.path()), ["users.json"]);
    }

    #[test]
    fn parent_directory_is_created() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join(".secure").join("users.json");

        let storage = Storage::new(nested.clone());
        storage.save(b"data").unwrap();

        assert!(nested.exists());
    }

    #[test]
    fn tmp_path_is_a_unique_sibling() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        let storage = Storage::new(path.clone());

        let a = storage.random_tmp_path().unwrap();
        let b = storage.random_tmp_path().unwrap();

        assert_eq!(a.parent(), path.parent());
        assert_ne!(a, path);
        assert_ne!(a, b);
        assert!(
            a.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("users.json.tmp.")
        );
    }

    #[test]
    fn interrupted_save_keeps_previous_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        let storage = Storage::new(path.clone());
        storage.save(b"previous").unwrap();

        let mut staged = None;
        let result = storage.save_with(b"next", |tmp| {
            // the new content is complete in the temp file, target still old
            assert_eq!(fs::read(tmp).unwrap(), b"next");
            assert_eq!(fs::read(&path).unwrap(), b"previous");
            staged = Some(tmp.to_path_buf());
            Err(StoreError::Io {
                path: tmp.to_path_buf(),
                source: std::io::Error::other("simulated crash"),
            })
        });

        assert!(result.is_err());
        assert_eq!(storage.load().unwrap(), b"previous");
        assert!(!staged.unwrap().exists());
        assert_eq!(dir_entries(dir.path()), ["users.json"]);
    }

    #[test]
    fn stray_tmp_file_does_not_affect_reads() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("users.json"));
        let document = sample_document();
        storage.write_document(&document).unwrap();

        // leftover from a writer that died before the rename
        fs::write(dir.path().join("users.json.tmp.deadbeefdeadbeef"), b"{\"vers").unwrap();

        let read = storage.read_document(CorruptPolicy::Fail).unwrap();
        assert_eq!(read, document);
    }

    // --------------------------------------------------
    // DOCUMENT READ / WRITE
    // --------------------------------------------------

    #[test]
    fn missing_store_is_bootstrapped_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".secure").join("users.json");
        let storage = Storage::new(path.clone());

        let document = storage.read_document(CorruptPolicy::Fail).unwrap();

        assert!(document.is_empty());
        assert!(path.exists());
        let on_disk: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(on_disk, serde_json::json!({ "version": 1, "records": [] }));
    }

    #[test]
    fn written_document_reads_back() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("users.json"));
        let document = sample_document();

        storage.write_document(&document).unwrap();

        assert_eq!(storage.read_document(CorruptPolicy::Fail).unwrap(), document);
    }

    #[test]
    fn corrupt_store_fails_by_default_and_is_left_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, b"<<garbage>>").unwrap();
        let storage = Storage::new(path.clone());

        match storage.read_document(CorruptPolicy::Fail) {
            Err(StoreError::CorruptStore { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected CorruptStore, got: {other:?}"),
        }
        assert_eq!(fs::read(&path).unwrap(), b"<<garbage>>");
    }

    #[test]
    fn corrupt_store_reset_quarantines_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, b"<<garbage>>").unwrap();
        let storage = Storage::new(path.clone());

        let document = storage.read_document(CorruptPolicy::Reset).unwrap();
        assert!(document.is_empty());

        let entries = dir_entries(dir.path());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], "users.json");
        assert!(entries[1].starts_with("users.json.corrupt-"));
        assert_eq!(
            fs::read(dir.path().join(&entries[1])).unwrap(),
            b"<<garbage>>"
        );
        assert!(storage.read_document(CorruptPolicy::Fail).unwrap().is_empty());
    }

    #[test]
    fn quarantine_names_are_unique() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("users.json"));

        let a = storage.quarantine_path().unwrap();
        let b = storage.quarantine_path().unwrap();

        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(dir.path()));
        assert!(
            a.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("users.json.corrupt-")
        );
    }

    #[test]
    fn repeated_resets_keep_every_quarantined_copy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        let storage = Storage::new(path.clone());

        fs::write(&path, b"first garbage").unwrap();
        storage.read_document(CorruptPolicy::Reset).unwrap();
        fs::write(&path, b"second garbage").unwrap();
        storage.read_document(CorruptPolicy::Reset).unwrap();

        let mut quarantined: Vec<Vec<u8>> = dir_entries(dir.path())
            .iter()
            .filter(|name| name.starts_with("users.json.corrupt-"))
            .map(|name| fs::read(dir.path().join(name)).unwrap())
            .collect();
        quarantined.sort();

        assert_eq!(
            quarantined,
            [b"first garbage".to_vec(), b"second garbage".to_vec()]
        );
    }

    #[test]
    fn unknown_version_is_rejected_even_with_reset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, br#"{"version": 2, "records": []}"#).unwrap();
        let storage = Storage::new(path.clone());

        assert!(matches!(
            storage.read_document(CorruptPolicy::Reset),
            Err(StoreError::UnsupportedVersion { version: 2, .. })
        ));
        assert_eq!(dir_entries(dir.path()), ["users.json"]);
    }

    #[test]
    fn legacy_array_store_is_migrated_on_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");
        fs::write(
            &path,
            br#"[{"username":"old","ct":"AQID","iv":"BAQEBAQEBAQEBAQE","tag":"BQUFBQUFBQUFBQUFBQUFBQ==","createdAt":"2024-05-01T10:00:00.000Z"}]"#,
        )
        .unwrap();
        let storage = Storage::new(path);

        let document = storage.read_document(CorruptPolicy::Fail).unwrap();
        assert_eq!(document.len(), 1);
        assert_eq!(document.latest().unwrap().username(), "old");
    }
}
