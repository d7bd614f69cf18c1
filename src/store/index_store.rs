//! Named index files in one directory
//!
//! Every write goes through a temporary file:
//! 1. Write `<name>.tmp` -> fsync
//! 2. Atomic rename to `<name>`
//!
//! A reader therefore sees either the old or the new index, never a partial
//! one. Writers are serialised by a mutex so `update` is a consistent
//! read-modify-write.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::format::{parse_index, serialize_index};
use crate::codec::{is_compressed_fragment, CompressedIndex};
use crate::config::StoreFormat;
use crate::error::{FragdexError, Result};
use crate::index::InvertedIndex;

const TMP_SUFFIX: &str = ".tmp";

/// Persistent storage for named inverted indexes
#[derive(Debug)]
pub struct IndexStore {
    dir: PathBuf,
    format: StoreFormat,
    write_lock: Mutex<()>,
}

impl IndexStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open<P: AsRef<Path>>(dir: P, format: StoreFormat) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            format,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> StoreFormat {
        self.format
    }

    /// File path an index name maps to
    pub fn path_of(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(name))
    }

    /// Persist `index` under `name`, replacing any previous contents atomically
    pub fn save(&self, name: &str, index: &InvertedIndex) -> Result<()> {
        let path = self.path_of(name)?;
        let _guard = self.write_lock.lock();
        self.write_atomic(&path, index)?;
        debug!("Saved index '{}' ({} terms)", name, index.term_count());
        Ok(())
    }

    /// Load the index stored under `name`
    pub fn load(&self, name: &str) -> Result<InvertedIndex> {
        let path = self.path_of(name)?;
        read_index_file(&path, name)
    }

    /// Merge `delta` into the stored index as a set union keyed by document id.
    ///
    /// A missing index is created from `delta`. Applying the same delta twice
    /// leaves the stored index unchanged the second time.
    pub fn update(&self, name: &str, delta: &InvertedIndex) -> Result<()> {
        let path = self.path_of(name)?;
        let _guard = self.write_lock.lock();

        let mut index = match read_index_file(&path, name) {
            Ok(index) => index,
            Err(FragdexError::IndexNotFound(_)) => {
                debug!("Index '{}' absent, creating from delta", name);
                InvertedIndex::new()
            }
            Err(e) => return Err(e),
        };
        index.union_with(delta.clone());
        self.write_atomic(&path, &index)?;

        debug!(
            "Updated index '{}' with {} terms ({} total)",
            name,
            delta.term_count(),
            index.term_count()
        );
        Ok(())
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_of(name)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Deleted index '{}'", name);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FragdexError::IndexNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Sorted names of every stored index
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!("Skipping non utf-8 file name in {:?}", self.dir);
                continue;
            };
            if name.ends_with(TMP_SUFFIX) {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.path_of(name)?.is_file())
    }

    /// Size in bytes of the stored file
    pub fn size_of(&self, name: &str) -> Result<u64> {
        let path = self.path_of(name)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FragdexError::IndexNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Move the index file into `target_dir`, keeping its name
    pub fn move_to<P: AsRef<Path>>(&self, name: &str, target_dir: P) -> Result<PathBuf> {
        let _guard = self.write_lock.lock();
        let source = self.existing_path(name)?;
        let target_dir = target_dir.as_ref();
        fs::create_dir_all(target_dir)?;
        let target = target_dir.join(name);

        match fs::rename(&source, &target) {
            Ok(()) => {}
            Err(e) if crosses_devices(&e) => {
                debug!("'{}' crosses file systems, copying instead", name);
                fs::copy(&source, &target)?;
                fs::remove_file(&source)?;
            }
            Err(e) => return Err(e.into()),
        }
        info!("Moved index '{}' to {:?}", name, target_dir);
        Ok(target)
    }

    /// Copy the index file into `target_dir`, keeping its name
    pub fn copy_to<P: AsRef<Path>>(&self, name: &str, target_dir: P) -> Result<PathBuf> {
        let source = self.existing_path(name)?;
        let target_dir = target_dir.as_ref();
        fs::create_dir_all(target_dir)?;
        let target = target_dir.join(name);
        fs::copy(&source, &target)?;
        debug!("Copied index '{}' to {:?}", name, target_dir);
        Ok(target)
    }

    /// Delete every stored index and leftover temporary file
    pub fn clear_all(&self) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        info!("Cleared {} files from {:?}", removed, self.dir);
        Ok(removed)
    }

    fn existing_path(&self, name: &str) -> Result<PathBuf> {
        let path = self.path_of(name)?;
        if !path.is_file() {
            return Err(FragdexError::IndexNotFound(name.to_string()));
        }
        Ok(path)
    }

    /// Caller holds the write lock
    fn write_atomic(&self, path: &Path, index: &InvertedIndex) -> Result<()> {
        let bytes = encode_index_bytes(index, self.format)?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(TMP_SUFFIX);
        let tmp = PathBuf::from(tmp);

        let result = (|| -> io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Decode index bytes in either format; `location` names them in errors
pub fn decode_index_bytes(bytes: &[u8], location: &str) -> Result<InvertedIndex> {
    if is_compressed_fragment(bytes) {
        return CompressedIndex::decode_index(bytes, location);
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|e| FragdexError::corrupt(location, 0, format!("not valid utf-8: {}", e)))?;
    parse_index(text, location)
}

/// Encode an index in the requested format
pub fn encode_index_bytes(index: &InvertedIndex, format: StoreFormat) -> Result<Vec<u8>> {
    match format {
        StoreFormat::Text => Ok(serialize_index(index)?.into_bytes()),
        StoreFormat::Compressed => Ok(CompressedIndex::from_index(index)?.to_bytes()),
    }
}

fn read_index_file(path: &Path, name: &str) -> Result<InvertedIndex> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(FragdexError::IndexNotFound(name.to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    decode_index_bytes(&bytes, name)
}

fn validate_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || name.ends_with(TMP_SUFFIX);
    if invalid {
        return Err(FragdexError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Whether a rename failed only because source and target are on different devices
fn crosses_devices(err: &io::Error) -> bool {
    #[cfg(unix)]
    const EXDEV: i32 = 18;
    #[cfg(windows)]
    const EXDEV: i32 = 17; // ERROR_NOT_SAME_DEVICE
    #[cfg(not(any(unix, windows)))]
    const EXDEV: i32 = -1;
    err.raw_os_error() == Some(EXDEV)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexBuilder;
    use tempfile::TempDir;

    fn sample() -> InvertedIndex {
        let mut builder = IndexBuilder::new();
        builder.add_document("Hello world").unwrap();
        builder.add_document("World of Java").unwrap();
        builder.into_index()
    }

    #[test]
    fn test_save_load_both_formats() {
        for format in [StoreFormat::Text, StoreFormat::Compressed] {
            let dir = TempDir::new().unwrap();
            let store = IndexStore::open(dir.path(), format).unwrap();
            store.save("global", &sample()).unwrap();

            assert_eq!(store.load("global").unwrap(), sample());
            assert!(store.exists("global").unwrap());
            assert!(store.size_of("global").unwrap() > 0);
        }
    }

    #[test]
    fn test_load_detects_format_written_by_other_store() {
        let dir = TempDir::new().unwrap();
        IndexStore::open(dir.path(), StoreFormat::Compressed)
            .unwrap()
            .save("frag", &sample())
            .unwrap();

        let text_store = IndexStore::open(dir.path(), StoreFormat::Text).unwrap();
        assert_eq!(text_store.load("frag").unwrap(), sample());
    }

    #[test]
    fn test_absent_index() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(dir.path(), StoreFormat::Text).unwrap();

        assert!(matches!(store.load("nope"), Err(FragdexError::IndexNotFound(_))));
        assert!(matches!(store.delete("nope"), Err(FragdexError::IndexNotFound(_))));
        assert!(matches!(store.size_of("nope"), Err(FragdexError::IndexNotFound(_))));
        assert!(!store.exists("nope").unwrap());
    }

    #[test]
    fn test_invalid_names() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(dir.path(), StoreFormat::Text).unwrap();
        for name in ["", ".", "..", "a/b", "x.tmp"] {
            assert!(matches!(
                store.save(name, &sample()),
                Err(FragdexError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn test_list_skips_temporary_files() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(dir.path(), StoreFormat::Text).unwrap();
        store.save("b", &sample()).unwrap();
        store.save("a", &sample()).unwrap();
        fs::write(dir.path().join("c.tmp"), b"partial").unwrap();

        assert_eq!(store.list().unwrap(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.clear_all().unwrap(), 3);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_update_creates_missing_index() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(dir.path(), StoreFormat::Text).unwrap();
        store.update("fresh", &sample()).unwrap();
        assert_eq!(store.load("fresh").unwrap(), sample());
    }

    #[test]
    fn test_move_and_copy() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let store = IndexStore::open(dir.path(), StoreFormat::Text).unwrap();
        store.save("idx", &sample()).unwrap();

        let copied = store.copy_to("idx", other.path().join("copy")).unwrap();
        assert!(copied.is_file());
        assert!(store.exists("idx").unwrap());

        let moved = store.move_to("idx", other.path().join("moved")).unwrap();
        assert!(moved.is_file());
        assert!(!store.exists("idx").unwrap());
        assert!(matches!(
            store.copy_to("idx", other.path()),
            Err(FragdexError::IndexNotFound(_))
        ));
        assert!(matches!(
            store.move_to("idx", other.path()),
            Err(FragdexError::IndexNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_rename_is_not_turned_into_a_copy() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let store = IndexStore::open(dir.path(), StoreFormat::Text).unwrap();
        store.save("idx", &sample()).unwrap();

        // A non-empty directory in the way makes rename fail on the same device
        let blocker = other.path().join("idx");
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), b"x").unwrap();

        assert!(matches!(
            store.move_to("idx", other.path()),
            Err(FragdexError::Io(_))
        ));
        assert_eq!(store.load("idx").unwrap(), sample());
        assert!(blocker.join("keep").is_file());
    }

    #[test]
    fn test_only_cross_device_errors_allow_copy_fallback() {
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(!crosses_devices(&denied));
        assert!(!crosses_devices(&io::Error::from(io::ErrorKind::NotFound)));
        #[cfg(unix)]
        assert!(crosses_devices(&io::Error::from_raw_os_error(18)));
    }
}
