use std::{
    fs::{File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use log::{debug, info, warn};

use crate::cmd::RestoreCommand;
use crate::error::{ExportError, Result};
use crate::store::{scan_keys, KeySource, KeyType};

/// Prefix of the bulk export file name.
pub const OUTPUT_PREFIX: &str = "redis-output-";

/// Outcome of a bulk export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub matched: usize,
    pub written: usize,
    pub failed: usize,
}

/// Turns keys from a `KeySource` into restore commands.
pub struct Exporter<'a, S: KeySource + ?Sized> {
    source: &'a mut S,
    output_dir: PathBuf,
}

impl<'a, S: KeySource + ?Sized> Exporter<'a, S> {
    pub fn new(source: &'a mut S, output_dir: impl Into<PathBuf>) -> Self {
        Exporter {
            source,
            output_dir: output_dir.into(),
        }
    }

    /// Builds the restore command for one key.
    pub fn export_key(&mut self, key: &[u8]) -> Result<RestoreCommand> {
        if !self.source.exists(key) {
            return Err(ExportError::KeyNotFound);
        }

        let key_type = self.source.key_type(key)?;
        if let KeyType::Unsupported(name) = key_type {
            return Err(ExportError::UnsupportedType(name));
        }

        let value = self.source.fetch(key, &key_type)?;
        debug!("{}", value.describe(key));
        Ok(RestoreCommand::from_value(key, value))
    }

    /// Exports every key matching `pattern` into a fresh timestamped file.
    ///
    /// Returns `Ok(None)` when nothing matched; no file is created then.
    /// Per-key failures are printed and counted, they never stop the batch.
    pub fn export_pattern(&mut self, pattern: &str) -> Result<Option<ExportSummary>> {
        let started = Local::now();
        let keys = scan_keys(&mut *self.source, pattern)?;
        if keys.is_empty() {
            return Ok(None);
        }
        info!("{} key(s) match {}", keys.len(), pattern);

        let path = output_path(&self.output_dir, started);
        let file = create_output(&path)?;
        let mut summary = ExportSummary {
            path,
            matched: keys.len(),
            written: 0,
            failed: 0,
        };

        self.write_lines(&keys, file, &mut summary);
        info!(
            "wrote {} of {} key(s) to {}",
            summary.written,
            summary.matched,
            summary.path.display()
        );
        Ok(Some(summary))
    }

    /// Exports `keys` one line at a time into `sink`.
    ///
    /// Each line is flushed on its own so a write failure is charged to the
    /// key that caused it; the unwritten bytes are dropped before moving on.
    fn write_lines<W: Write>(&mut self, keys: &[Vec<u8>], sink: W, summary: &mut ExportSummary) {
        let mut out = BufWriter::new(sink);

        for key in keys {
            let line = match self.export_key(key) {
                Ok(cmd) => cmd.to_string(),
                Err(e) => {
                    println!("{}: {}", String::from_utf8_lossy(key), e);
                    summary.failed += 1;
                    continue;
                }
            };

            match writeln!(out, "{}", line).and_then(|()| out.flush()) {
                Ok(()) => summary.written += 1,
                Err(e) => {
                    println!("write  {} error.", line);
                    warn!("write to {} failed: {}", summary.path.display(), e);
                    summary.failed += 1;
                    let (sink, _unwritten) = out.into_parts();
                    out = BufWriter::new(sink);
                }
            }
        }
    }
}

/// Opens a fresh output file, refusing to overwrite an existing one.
pub fn create_output(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

/// `<dir>/redis-output-YYYYMMDD-HHMMSS`
pub fn output_path(dir: &Path, at: DateTime<Local>) -> PathBuf {
    dir.join(format!("{}{}", OUTPUT_PREFIX, at.format("%Y%m%d-%H%M%S")))
}
