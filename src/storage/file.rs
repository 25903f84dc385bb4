//! Filesystem-backed [`BlobStore`]: one file per key, directory-sharded by
//! the key's first two hex characters, atomic write-then-rename.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::codec::CompressionCodec;
use crate::error::{FloridifyError, Result};
use crate::storage::{shard_prefix, BlobLocation, BlobStore, ExpiryPredicate};

#[derive(Debug)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, namespace: &str, key: &str) -> PathBuf {
        self.root.join(namespace).join(shard_prefix(key)).join(key)
    }
}

impl BlobStore for FileBlobStore {
    fn put(&self, namespace: &str, key: &str, bytes: &[u8], encrypted: bool) -> Result<BlobLocation> {
        let final_path = self.path_for(namespace, key);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write-to-temp + rename keeps concurrent readers from ever seeing
        // a partially-written file.
        let tmp_path = final_path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        {
            let mut f = fs::File::create(&tmp_path)?;
            f.write_all(bytes)?;
            f.sync_all()?;
        }
        fs::rename(&tmp_path, &final_path)?;

        Ok(BlobLocation {
            namespace: namespace.to_string(),
            key: key.to_string(),
            size_original: bytes.len() as u64,
            size_compressed: bytes.len() as u64,
            compression_codec: CompressionCodec::None,
            encrypted,
        })
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(namespace, key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FloridifyError::Io(e)),
        }
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        let path = self.path_for(namespace, key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FloridifyError::Io(e)),
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self.path_for(namespace, key).exists())
    }

    fn cleanup_expired(&self, namespace: &str, predicate: &ExpiryPredicate<'_>) -> Result<usize> {
        let ns_dir = self.root.join(namespace);
        if !ns_dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for shard in fs::read_dir(&ns_dir)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                let key = entry.file_name().to_string_lossy().into_owned();
                let modified = entry.metadata()?.modified()?;
                if predicate(namespace, &key, modified) {
                    fs::remove_file(entry.path())?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path()).unwrap();

        store.put("corpus", "abcd1234", b"hello", false).unwrap();
        assert_eq!(store.get("corpus", "abcd1234").unwrap(), Some(b"hello".to_vec()));
        assert!(store.exists("corpus", "abcd1234").unwrap());

        store.delete("corpus", "abcd1234").unwrap();
        assert_eq!(store.get("corpus", "abcd1234").unwrap(), None);
        assert!(!store.exists("corpus", "abcd1234").unwrap());
    }

    #[test]
    fn get_missing_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path()).unwrap();
        assert_eq!(store.get("corpus", "nope").unwrap(), None);
    }

    #[test]
    fn shards_by_first_two_hex_chars() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path()).unwrap();
        store.put("corpus", "ab12cd", b"x", false).unwrap();
        assert!(dir.path().join("corpus").join("ab").join("ab12cd").exists());
    }

    #[test]
    fn put_records_the_encrypted_flag() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path()).unwrap();
        let location = store.put("corpus", "enc1", b"secret", true).unwrap();
        assert!(location.encrypted);
    }

    #[test]
    fn cleanup_expired_removes_matching_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlobStore::new(dir.path()).unwrap();
        store.put("corpus", "aa01", b"x", false).unwrap();
        store.put("corpus", "bb02", b"y", false).unwrap();

        let removed = store
            .cleanup_expired("corpus", &|_ns, key, _modified| key == "aa01")
            .unwrap();

        assert_eq!(removed, 1);
        assert!(!store.exists("corpus", "aa01").unwrap());
        assert!(store.exists("corpus", "bb02").unwrap());
    }
}
