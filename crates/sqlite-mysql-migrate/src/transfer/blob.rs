//! External storage for oversized blob values.
//!
//! Each value lands at `<table>/<column>/<key>` under the blob directory. The
//! key is the row's primary-key value (composite keys joined by `,`), or the
//! 1-based row ordinal for tables without one. A key with a NULL part also
//! carries the ordinal, so every path is unique within a run and concurrent
//! table workers never write the same file.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use tracing::debug;
use uuid::Uuid;

/// One blob value written to an external file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobExternalization {
    pub table: String,
    pub column: String,
    /// Encoded row key, as used in the path.
    pub key: String,
    pub byte_len: usize,
    /// Where the bytes were written.
    pub path: PathBuf,
    /// Path as referenced from the script (absolute or relative to the blob dir).
    pub reference: String,
}

/// Destination for externalized blobs.
pub trait BlobStore: Send + Sync {
    /// Write `bytes` for one row and column.
    fn store(
        &self,
        table: &str,
        column: &str,
        key: &str,
        bytes: &[u8],
    ) -> std::io::Result<BlobExternalization>;
}

/// Blob store backed by a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    relative: bool,
}

impl FsBlobStore {
    /// `root` should be absolute unless `relative` references are wanted.
    pub fn new(root: impl Into<PathBuf>, relative: bool) -> Self {
        Self {
            root: root.into(),
            relative,
        }
    }
}

impl BlobStore for FsBlobStore {
    fn store(
        &self,
        table: &str,
        column: &str,
        key: &str,
        bytes: &[u8],
    ) -> std::io::Result<BlobExternalization> {
        let table_part = encode_component(table);
        let column_part = encode_component(column);
        let dir = self.root.join(&table_part).join(&column_part);
        fs::create_dir_all(&dir)?;

        let path = dir.join(key);
        let tmp = dir.join(format!(".{}.tmp", Uuid::new_v4()));
        let written = fs::File::create(&tmp).and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&tmp, &path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        let relative_ref = format!("{}/{}/{}", table_part, column_part, key);
        let reference = if self.relative {
            relative_ref
        } else {
            path.to_string_lossy().replace('\\', "/")
        };
        debug!("{}.{}: wrote {} bytes to {}", table, column, bytes.len(), path.display());

        Ok(BlobExternalization {
            table: table.to_string(),
            column: column.to_string(),
            key: key.to_string(),
            byte_len: bytes.len(),
            path,
            reference,
        })
    }
}

/// Percent-encode a path component. Bytes outside `[A-Za-z0-9_.-]` become
/// `%XX`; empty and dot-only components are encoded so they never resolve to
/// `.` or `..`.
pub fn encode_component(text: &str) -> String {
    if text.is_empty() {
        return "~empty".to_string();
    }
    let dots_only = text.bytes().all(|b| b == b'.');
    let mut out = String::with_capacity(text.len());
    for b in text.bytes() {
        if !dots_only && (b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-')) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

/// Build the file-name key for a row from its primary-key parts.
///
/// `None` parts are NULL key values and are written as `~null`.
pub fn row_key<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> String {
    parts
        .into_iter()
        .map(|part| match part {
            Some(text) => encode_component(text),
            None => "~null".to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn test_encode_component() {
        assert_eq!(encode_component("photos"), "photos");
        assert_eq!(encode_component("a b/c"), "a%20b%2Fc");
        assert_eq!(encode_component("x,y~z"), "x%2Cy%7Ez");
        assert_eq!(encode_component("é"), "%C3%A9");
        assert_eq!(encode_component(".."), "%2E%2E");
        assert_eq!(encode_component("v1.2"), "v1.2");
        assert_eq!(encode_component(""), "~empty");
    }

    #[test]
    fn test_row_key() {
        assert_eq!(row_key([Some("42")]), "42");
        assert_eq!(row_key([Some("a,b"), None, Some("7")]), "a%2Cb,~null,7");
    }

    #[test]
    fn test_store_absolute() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path(), false);
        let ext = store.store("files", "data", "1", b"payload").unwrap();

        let expected = dir.path().join("files").join("data").join("1");
        assert_eq!(ext.path, expected);
        assert_eq!(fs::read(&expected).unwrap(), b"payload");
        assert_eq!(ext.byte_len, 7);
        assert!(ext.reference.ends_with("files/data/1"));
        assert!(Path::new(&ext.reference).is_absolute());

        // Only the final file remains
        let entries: Vec<_> = fs::read_dir(expected.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_store_relative_and_encoded() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path(), true);
        let ext = store.store("my table", "img", "a%2Cb,~null", &[0, 1, 2]).unwrap();
        assert_eq!(ext.reference, "my%20table/img/a%2Cb,~null");
        assert_eq!(fs::read(ext.path).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_store_failure_reports_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, b"not a directory").unwrap();
        let store = FsBlobStore::new(&blocker, false);
        assert!(store.store("t", "c", "1", b"x").is_err());
    }
}
