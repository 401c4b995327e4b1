//! Append-only event output
//!
//! Events are written as one JSON array per run: `[`, then each record
//! preceded by `,\r\n` except the first, then `]`. Each record is flushed as
//! soon as it is appended so a block's events are on disk before the next
//! block is fetched.

use crate::records::BalanceChangeEvent;
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

const RECORD_SEPARATOR: &[u8] = b",\r\n";

/// Destination for finished events.
pub trait EventSink {
    fn emit(&mut self, event: &BalanceChangeEvent) -> io::Result<()>;
}

impl EventSink for Vec<BalanceChangeEvent> {
    fn emit(&mut self, event: &BalanceChangeEvent) -> io::Result<()> {
        self.push(event.clone());
        Ok(())
    }
}

/// Incremental writer for a JSON array of records.
pub struct JsonArrayWriter<W: Write> {
    out: W,
    records: usize,
}

impl JsonArrayWriter<BufWriter<File>> {
    /// Create `path` (and its parent directory) and open the array.
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Self::open(BufWriter::new(File::create(path)?))
    }

    /// Create a fresh `balance-changes-<UTC timestamp>.json` in `dir`.
    ///
    /// Never reuses an existing file; a name clash gets a `-<n>` suffix.
    pub fn create_in(dir: &Path) -> io::Result<(PathBuf, Self)> {
        fs::create_dir_all(dir)?;
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ").to_string();

        let mut attempt = 0u32;
        loop {
            let name = match attempt {
                0 => format!("balance-changes-{}.json", stamp),
                n => format!("balance-changes-{}-{}.json", stamp, n),
            };
            let path = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    let writer = Self::open(BufWriter::new(file))?;
                    return Ok((path, writer));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e),
            }
        }
    }
}

impl<W: Write> JsonArrayWriter<W> {
    /// Write the opening bracket.
    pub fn open(mut out: W) -> io::Result<Self> {
        out.write_all(b"[")?;
        out.flush()?;
        Ok(Self { out, records: 0 })
    }

    /// Append one record.
    pub fn append<T: Serialize + ?Sized>(&mut self, record: &T) -> io::Result<()> {
        if self.records > 0 {
            self.out.write_all(RECORD_SEPARATOR)?;
        }
        serde_json::to_writer(&mut self.out, record)?;
        self.out.flush()?;
        self.records += 1;
        Ok(())
    }

    /// Number of records appended so far.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Write the closing bracket and hand back the underlying writer.
    pub fn close(mut self) -> io::Result<W> {
        self.out.write_all(b"]")?;
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> EventSink for JsonArrayWriter<W> {
    fn emit(&mut self, event: &BalanceChangeEvent) -> io::Result<()> {
        self.append(event)
    }
}
