//! CSV-backed OHLCV store: one `{ticker}_{interval}.csv` file per table with
//! a `date,open,high,low,close,volume` header.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use replaylab_core::data::{DataError, OhlcvStore};
use replaylab_core::domain::{Bar, Frame};
use replaylab_core::fingerprint::Watermark;

#[derive(Debug, Clone)]
pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, ticker: &str, interval: &str) -> PathBuf {
        self.dir.join(format!("{ticker}_{interval}.csv"))
    }

    /// Write `bars` as a table, replacing any existing file.
    pub fn write(&self, ticker: &str, interval: &str, bars: &[Bar]) -> Result<PathBuf, DataError> {
        fs::create_dir_all(&self.dir).map_err(|source| DataError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path(ticker, interval);
        let corrupt = |e: csv::Error| DataError::Corrupt {
            ticker: ticker.to_string(),
            reason: e.to_string(),
        };
        let mut writer = csv::Writer::from_path(&path).map_err(corrupt)?;
        for bar in bars {
            writer.serialize(bar).map_err(corrupt)?;
        }
        writer.flush().map_err(|source| DataError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

impl OhlcvStore for CsvStore {
    fn load(&self, ticker: &str, interval: &str) -> Result<Frame, DataError> {
        let path = self.path(ticker, interval);
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DataError::TickerNotFound {
                    ticker: ticker.to_string(),
                    interval: interval.to_string(),
                })
            }
            Err(source) => return Err(DataError::Io { path, source }),
        };

        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
        let bars = reader
            .deserialize::<Bar>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DataError::Corrupt {
                ticker: ticker.to_string(),
                reason: e.to_string(),
            })?;

        Frame::from_bars(&bars).map_err(|source| DataError::InvalidTable {
            ticker: ticker.to_string(),
            source,
        })
    }

    /// File modification time.
    fn watermark(&self, ticker: &str, interval: &str) -> Option<Watermark> {
        let modified = fs::metadata(self.path(ticker, interval)).ok()?.modified().ok()?;
        Some(Watermark::from_system_time(modified))
    }
}
