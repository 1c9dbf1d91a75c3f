//! Persistence seam for the indicator cache.
//!
//! Layout of [`ParquetStore`]:
//! - `{dir}/{key}.parquet`: the indicator/signal table (atomic .tmp + rename)
//! - `{dir}/{key}.meta.json`: [`EntryMeta`] sidecar
//! - `{dir}/index.json`: keys in recency order, least-recently-used first

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::CacheError;
use crate::domain::Frame;
use crate::fingerprint::{CacheKey, Fingerprint, Watermark};

const INDEX_FILE: &str = "index.json";
const DATE_COLUMN: &str = "date";

/// Metadata record persisted next to every cached table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub key: CacheKey,
    pub ticker: String,
    pub interval: String,
    pub fingerprint: Fingerprint,
    pub watermark: Watermark,
    pub row_count: usize,
    /// Seconds since the Unix epoch, from the cache's clock.
    pub created_at: i64,
    /// Persisted size. Filled in by the store on write.
    #[serde(default)]
    pub size_bytes: u64,
}

/// Backing storage for cached tables and their metadata.
pub trait TableStore: Send {
    /// Persist `frame` under `meta.key`, returning the persisted size in bytes.
    fn write(&mut self, meta: &EntryMeta, frame: &Frame) -> Result<u64, CacheError>;

    /// Read a table. `Ok(None)` when it no longer exists.
    fn read(&self, key: &CacheKey) -> Result<Option<Frame>, CacheError>;

    /// Remove a table and its metadata. Removing an absent entry is not an error.
    fn remove(&mut self, key: &CacheKey) -> Result<(), CacheError>;

    fn exists(&self, key: &CacheKey) -> bool;

    /// Entries in recency order, least-recently-used first.
    fn load_index(&self) -> Result<Vec<EntryMeta>, CacheError>;

    /// Persist the recency order, least-recently-used first.
    fn save_index(&mut self, order: &[CacheKey]) -> Result<(), CacheError>;

    fn clear(&mut self) -> Result<(), CacheError>;
}

// ── Parquet on disk ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ParquetStore {
    dir: PathBuf,
}

impl ParquetStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CacheError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn table_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.parquet"))
    }

    pub fn meta_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.meta.json"))
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    fn read_meta(&self, key: &CacheKey) -> Option<EntryMeta> {
        let content = fs::read_to_string(self.meta_path(key)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Keys with a sidecar on disk, in directory order.
    fn sidecar_keys(&self) -> Result<Vec<CacheKey>, CacheError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| CacheError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let mut keys = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            if let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".meta.json")) {
                keys.push(CacheKey(stem.to_string()));
            }
        }
        Ok(keys)
    }
}

/// Remove a file, treating "already gone" as success.
fn remove_if_present(path: &Path) -> Result<(), CacheError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "cache file already removed");
            Ok(())
        }
        Err(source) => Err(CacheError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|source| CacheError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| {
        let _ = fs::remove_file(&tmp);
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

impl TableStore for ParquetStore {
    fn write(&mut self, meta: &EntryMeta, frame: &Frame) -> Result<u64, CacheError> {
        let path = self.table_path(&meta.key);
        let tmp = path.with_extension("parquet.tmp");

        let mut df = frame_to_dataframe(frame)?;
        let file = fs::File::create(&tmp).map_err(|source| CacheError::Io {
            path: tmp.clone(),
            source,
        })?;
        ParquetWriter::new(file)
            .finish(&mut df)
            .map_err(|e| CacheError::Parquet(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path).map_err(|source| {
            let _ = fs::remove_file(&tmp);
            CacheError::Io {
                path: path.clone(),
                source,
            }
        })?;

        let size_bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let meta = EntryMeta {
            size_bytes,
            ..meta.clone()
        };
        let json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| CacheError::Metadata(format!("serialize meta: {e}")))?;
        write_atomic(&self.meta_path(&meta.key), &json)?;
        Ok(size_bytes)
    }

    fn read(&self, key: &CacheKey) -> Result<Option<Frame>, CacheError> {
        let path = self.table_path(key);
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        let df = ParquetReader::new(file)
            .finish()
            .map_err(|e| CacheError::Parquet(format!("read {}: {e}", path.display())))?;
        dataframe_to_frame(&df).map(Some)
    }

    fn remove(&mut self, key: &CacheKey) -> Result<(), CacheError> {
        let table = remove_if_present(&self.table_path(key));
        let meta = remove_if_present(&self.meta_path(key));
        table.and(meta)
    }

    fn exists(&self, key: &CacheKey) -> bool {
        self.table_path(key).is_file()
    }

    fn load_index(&self) -> Result<Vec<EntryMeta>, CacheError> {
        let ordered: Vec<CacheKey> = match fs::read_to_string(self.index_path()) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                debug!(error = %e, "unreadable cache index, rebuilding from sidecars");
                Vec::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.index_path(),
                    source,
                })
            }
        };

        // Sidecars missing from the index (e.g. a writer crashed before
        // saving it) are treated as least recent, oldest first.
        let listed: HashSet<&CacheKey> = ordered.iter().collect();
        let mut orphans: Vec<EntryMeta> = self
            .sidecar_keys()?
            .into_iter()
            .filter(|k| !listed.contains(k))
            .filter_map(|k| self.read_meta(&k))
            .collect();
        orphans.sort_by_key(|m| (m.created_at, m.key.clone()));

        let mut entries = orphans;
        for key in &ordered {
            if let Some(meta) = self.read_meta(key) {
                entries.push(meta);
            }
        }
        Ok(entries)
    }

    fn save_index(&mut self, order: &[CacheKey]) -> Result<(), CacheError> {
        let json = serde_json::to_vec(order)
            .map_err(|e| CacheError::Metadata(format!("serialize index: {e}")))?;
        write_atomic(&self.index_path(), &json)
    }

    fn clear(&mut self) -> Result<(), CacheError> {
        for key in self.sidecar_keys()? {
            self.remove(&key)?;
        }
        // Tables whose sidecar never landed.
        if let Ok(entries) = fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.ends_with(".parquet") || name.ends_with(".tmp") {
                    remove_if_present(&path)?;
                }
            }
        }
        remove_if_present(&self.index_path())
    }
}

// ── In memory ───────────────────────────────────────────────────────

/// Store that keeps tables in memory. Sizes are estimated from the frame shape.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    tables: HashMap<CacheKey, (EntryMeta, Frame)>,
    order: Vec<CacheKey>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl TableStore for MemoryStore {
    fn write(&mut self, meta: &EntryMeta, frame: &Frame) -> Result<u64, CacheError> {
        let size_bytes = frame.estimated_size_bytes();
        let meta = EntryMeta {
            size_bytes,
            ..meta.clone()
        };
        self.tables.insert(meta.key.clone(), (meta, frame.clone()));
        Ok(size_bytes)
    }

    fn read(&self, key: &CacheKey) -> Result<Option<Frame>, CacheError> {
        Ok(self.tables.get(key).map(|(_, f)| f.clone()))
    }

    fn remove(&mut self, key: &CacheKey) -> Result<(), CacheError> {
        self.tables.remove(key);
        Ok(())
    }

    fn exists(&self, key: &CacheKey) -> bool {
        self.tables.contains_key(key)
    }

    fn load_index(&self) -> Result<Vec<EntryMeta>, CacheError> {
        Ok(self
            .order
            .iter()
            .filter_map(|k| self.tables.get(k).map(|(m, _)| m.clone()))
            .collect())
    }

    fn save_index(&mut self, order: &[CacheKey]) -> Result<(), CacheError> {
        self.order = order.to_vec();
        Ok(())
    }

    fn clear(&mut self) -> Result<(), CacheError> {
        self.tables.clear();
        self.order.clear();
        Ok(())
    }
}

// ── Frame <-> DataFrame ─────────────────────────────────────────────

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Convert a frame to a DataFrame with a `date` column followed by every
/// numeric and boolean column.
pub fn frame_to_dataframe(frame: &Frame) -> Result<DataFrame, CacheError> {
    let epoch = epoch();
    let days: Vec<i32> = frame
        .dates()
        .iter()
        .map(|d| (*d - epoch).num_days() as i32)
        .collect();

    let mut columns = Vec::with_capacity(frame.column_count() + 1);
    columns.push(
        Column::new(DATE_COLUMN.into(), days)
            .cast(&DataType::Date)
            .map_err(|e| CacheError::Parquet(format!("date cast: {e}")))?,
    );
    for (name, values) in frame.value_columns() {
        columns.push(Column::new(name.into(), values.to_vec()));
    }
    for (name, flags) in frame.flag_columns() {
        columns.push(Column::new(name.into(), flags.to_vec()));
    }

    DataFrame::new(columns).map_err(|e| CacheError::Parquet(format!("dataframe creation: {e}")))
}

/// Inverse of [`frame_to_dataframe`]. Boolean columns become flags, every
/// other column is cast to `f64`; nulls read as NaN / false.
pub fn dataframe_to_frame(df: &DataFrame) -> Result<Frame, CacheError> {
    let map_err = |e: PolarsError| CacheError::Parquet(format!("column read: {e}"));

    let date_col = df
        .column(DATE_COLUMN)
        .map_err(map_err)?
        .cast(&DataType::Int32)
        .map_err(map_err)?;
    let date_ca = date_col.as_materialized_series().i32().map_err(map_err)?;
    let epoch = epoch();
    let mut dates = Vec::with_capacity(df.height());
    for (i, days) in date_ca.into_iter().enumerate() {
        let days = days.ok_or_else(|| CacheError::Parquet(format!("null date at row {i}")))?;
        dates.push(epoch + chrono::Duration::days(days as i64));
    }

    let mut frame = Frame::new(dates)?;
    for column in df.get_columns() {
        let name = column.name().as_str();
        if name == DATE_COLUMN {
            continue;
        }
        if column.dtype() == &DataType::Boolean {
            let ca = column.as_materialized_series().bool().map_err(map_err)?;
            let flags: Vec<bool> = ca.into_iter().map(|v| v.unwrap_or(false)).collect();
            frame.insert_flags(name, flags)?;
        } else {
            let cast = column.cast(&DataType::Float64).map_err(map_err)?;
            let ca = cast.as_materialized_series().f64().map_err(map_err)?;
            let values: Vec<f64> = ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
            frame.insert_values(name, values)?;
        }
    }
    Ok(frame)
}
