use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use simd_r_drive::storage_engine::DataStore;
use simd_r_drive::storage_engine::traits::{DataStoreReader, DataStoreWriter};
use tracing::debug;

use crate::constants::store::{
    BITCODE_PREFIX, META_KEY, RECORD_KEY_PREFIX, RECORD_VERSION, STORE_VERSION,
};
use crate::errors::DatasetError;
use crate::records::RecordFields;

#[derive(Clone, Copy, Debug, bitcode::Encode, bitcode::Decode)]
/// Versioned metadata header stored alongside the packed records.
struct StoreMeta {
    version: u8,
    count: u64,
}

/// Exclusive, append-only sink for packed example records.
///
/// Records receive consecutive ordinals starting at zero. `finish` persists
/// the final count exactly once; dropping an unfinished writer persists it
/// on the failure path too, so the sink is always released.
pub struct RecordWriter {
    store: Option<DataStore>,
    path: PathBuf,
    count: u64,
    finished: bool,
}

impl RecordWriter {
    /// Create (or replace) a record file at `path`.
    pub fn create<P: Into<PathBuf>>(path: P) -> Result<Self, DatasetError> {
        let path = path.into();
        if path.exists() {
            fs::remove_file(&path)?;
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let store = DataStore::open(path.as_path()).map_err(map_store_err)?;
        Ok(Self {
            store: Some(store),
            path,
            count: 0,
            finished: false,
        })
    }

    /// Append one flattened record, returning its assigned ordinal.
    pub fn append(&mut self, fields: &RecordFields) -> Result<u64, DatasetError> {
        let store = self.store.as_ref().ok_or_else(|| {
            DatasetError::Store("record writer already finished".to_string())
        })?;
        let ordinal = self.count;
        let payload = encode_record(fields);
        store
            .write(&record_key(ordinal), payload.as_slice())
            .map_err(map_store_err)?;
        self.count += 1;
        Ok(ordinal)
    }

    /// Number of records appended so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Persist the metadata header and release the sink.
    pub fn finish(&mut self) -> Result<(), DatasetError> {
        if self.finished {
            return Ok(());
        }
        let store = self.store.take().ok_or_else(|| {
            DatasetError::Store("record writer already finished".to_string())
        })?;
        let meta = StoreMeta {
            version: STORE_VERSION,
            count: self.count,
        };
        store
            .write(META_KEY, encode_meta(&meta).as_slice())
            .map_err(map_store_err)?;
        self.finished = true;
        debug!(path = %self.path.display(), count = self.count, "record store finished");
        Ok(())
    }
}

impl Drop for RecordWriter {
    fn drop(&mut self) {
        // Release on the failure path as well; errors here have no receiver.
        let _ = self.finish();
    }
}

/// Shared read handle over a finished record file.
#[derive(Clone)]
pub struct RecordReader {
    store: Arc<DataStore>,
    count: u64,
}

impl std::fmt::Debug for RecordReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordReader")
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

impl RecordReader {
    /// Open a record file written by [`RecordWriter`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let store = DataStore::open(path).map_err(map_store_err)?;
        let meta = match store.read(META_KEY).map_err(map_store_err)? {
            Some(entry) => decode_meta(entry.as_ref())?,
            None => {
                return Err(DatasetError::Store(format!(
                    "'{}' is not a finished record file",
                    path.display()
                )));
            }
        };
        if meta.version != STORE_VERSION {
            return Err(DatasetError::Store(format!(
                "record store version mismatch (expected {}, found {})",
                STORE_VERSION, meta.version
            )));
        }
        Ok(Self {
            store: Arc::new(store),
            count: meta.count,
        })
    }

    /// Number of records in the file.
    pub fn len(&self) -> u64 {
        self.count
    }

    /// True when the file holds no records.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Read the flattened fields of record `ordinal`.
    pub fn read_fields(&self, ordinal: u64) -> Result<RecordFields, DatasetError> {
        let entry = self
            .store
            .read(&record_key(ordinal))
            .map_err(map_store_err)?
            .ok_or_else(|| DatasetError::Store(format!("missing record {ordinal}")))?;
        decode_record(entry.as_ref())
    }
}

fn record_key(ordinal: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(RECORD_KEY_PREFIX.len() + 8);
    key.extend_from_slice(RECORD_KEY_PREFIX);
    key.extend_from_slice(&ordinal.to_le_bytes());
    key
}

fn encode_meta(meta: &StoreMeta) -> Vec<u8> {
    encode_bitcode_payload(&bitcode::encode(meta))
}

fn decode_meta(bytes: &[u8]) -> Result<StoreMeta, DatasetError> {
    let raw = decode_bitcode_payload(bytes)?;
    bitcode::decode(&raw)
        .map_err(|err| DatasetError::Store(format!("corrupt record store metadata: {err}")))
}

fn encode_record(fields: &RecordFields) -> Vec<u8> {
    let payload = encode_bitcode_payload(&bitcode::encode(fields));
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(RECORD_VERSION);
    buf.extend_from_slice(&payload);
    buf
}

fn decode_record(bytes: &[u8]) -> Result<RecordFields, DatasetError> {
    if bytes.first().copied() != Some(RECORD_VERSION) {
        return Err(DatasetError::Store(
            "record payload version mismatch".to_string(),
        ));
    }
    let raw = decode_bitcode_payload(&bytes[1..])?;
    bitcode::decode(&raw).map_err(|err| DatasetError::Store(format!("corrupt record: {err}")))
}

fn encode_bitcode_payload(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + bytes.len());
    out.push(BITCODE_PREFIX);
    out.extend_from_slice(bytes);
    out
}

fn decode_bitcode_payload(bytes: &[u8]) -> Result<Vec<u8>, DatasetError> {
    if bytes.first().copied() != Some(BITCODE_PREFIX) {
        return Err(DatasetError::Store(
            "bitcode payload missing expected prefix".to_string(),
        ));
    }
    Ok(bytes[1..].to_vec())
}

fn map_store_err(err: io::Error) -> DatasetError {
    DatasetError::Store(err.to_string())
}
