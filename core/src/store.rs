//! Persistence of the last confirmed code.
//!
//! The backing file holds two labeled text lines (`code:` and `encoder:`).
//! A missing or corrupt file is never an error; it loads as the empty
//! record, and save failures are logged without interrupting the
//! decode/acknowledgment path.

use std::fs;
use std::path::PathBuf;

use log::{info, warn};

/// The most recently confirmed decode.
///
/// Updated only when the acknowledgment correlator confirmed the operation;
/// unconfirmed decodes never reach this record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LastKnownCode {
    pub code: String,
    pub encoder: String,
    pub error: String,
}

impl LastKnownCode {
    pub fn confirmed(code: String, encoder: String) -> Self {
        Self {
            code,
            encoder,
            error: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty() && self.encoder.is_empty()
    }
}

pub struct MemStore {
    path: PathBuf,
}

impl MemStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the stored record; missing or unreadable storage yields the
    /// empty record.
    pub fn load(&self) -> LastKnownCode {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) => {
                info!("no stored code at {}: {err}", self.path.display());
                return LastKnownCode::default();
            }
        };
        let mut record = LastKnownCode::default();
        for line in text.lines() {
            if let Some(code) = line.strip_prefix("code: ") {
                record.code = code.trim().to_string();
            } else if let Some(encoder) = line.strip_prefix("encoder: ") {
                record.encoder = encoder.trim().to_string();
            }
        }
        record
    }

    pub fn save(&self, record: &LastKnownCode) {
        let text = format!("code: {}\nencoder: {}\n", record.code, record.encoder);
        if let Err(err) = fs::write(&self.path, text) {
            warn!(
                "failed to persist last known code to {}: {err}",
                self.path.display()
            );
        }
    }
}
