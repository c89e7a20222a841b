//! Per-session protocol transcripts.
//!
//! Every line exchanged with an agent process can be mirrored to
//! `{log_dir}/{session_id}.log` for debugging. Diagnostics go through the
//! `log` facade; this is only the raw wire record.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::{Arc, Mutex},
};

/// Format current UTC time as ISO 8601 with milliseconds (e.g. 2026-02-04T10:15:30.123Z).
fn utc_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Thread-safe, append-only transcript. A no-op when no log directory is set.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    file: Arc<Mutex<Option<File>>>,
}

impl Transcript {
    /// Open (or create) `{log_dir}/{log_id}.log`.
    ///
    /// Failing to open the file disables the transcript instead of failing
    /// the session.
    pub fn open(log_dir: Option<&str>, log_id: &str) -> Self {
        let file = log_dir.and_then(|dir| {
            let path = Path::new(dir).join(format!("{}.log", log_id));
            let opened = std::fs::create_dir_all(dir).and_then(|_| {
                OpenOptions::new().create(true).append(true).open(&path)
            });
            match opened {
                Ok(file) => Some(file),
                Err(e) => {
                    log::warn!("Cannot open transcript {}: {}", path.display(), e);
                    None
                }
            }
        });
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.file.lock().map(|f| f.is_some()).unwrap_or(false)
    }

    /// Write a timestamped `[ts] DIRECTION: data` line.
    pub fn line(&self, direction: &str, data: &str) {
        if let Ok(mut guard) = self.file.lock() {
            if let Some(ref mut file) = *guard {
                let _ = writeln!(file, "[{}] {}: {}", utc_timestamp(), direction, data);
                let _ = file.flush();
            }
        }
    }
}
