//! Per-symbol order ledger with atomic file persistence.
//!
//! The ledger is the crash-recovery source of truth: every order the
//! engine places is recorded here before anything else depends on it.
//!
//! # Safety
//! - Saves use the write-to-temp, fsync, rename pattern for durability
//! - A missing, empty or corrupt file degrades to an empty ledger (the
//!   engine must keep operating and re-adopt state from the broker)

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::types::{LedgerOrder, OrderId};

/// Errors surfaced by ledger writes. Reads never error; corruption is
/// logged and treated as an empty ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("failed to serialize ledger for {symbol}: {source}")]
    Serialize {
        symbol: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write ledger file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// On-disk document: one JSON file per symbol.
#[derive(Debug, Serialize, Deserialize)]
struct LedgerDocument {
    symbol: String,
    last_updated: DateTime<Utc>,
    orders: Vec<LedgerOrder>,
    total_orders: usize,
}

/// Owns the backing store for ledger files. No other component reads or
/// writes the files directly.
#[derive(Debug, Clone)]
pub struct OrderLedger {
    dir: PathBuf,
}

impl OrderLedger {
    /// Create a ledger rooted at `dir`. The directory is created on the
    /// first save if it does not exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}_gtt_history.json", symbol.to_uppercase()))
    }

    /// Load all recorded orders for a symbol.
    ///
    /// Absent, empty, unparseable or wrong-shaped files all yield an
    /// empty list; the condition is logged but never propagated, so a
    /// damaged file cannot take the engine down.
    pub fn load(&self, symbol: &str) -> Vec<LedgerOrder> {
        let path = self.file_path(symbol);
        let data = match fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(symbol, "no ledger file found, starting fresh");
                return Vec::new();
            }
            Err(e) => {
                warn!(symbol, path = %path.display(), error = %e, "could not read ledger file, treating as empty");
                return Vec::new();
            }
        };

        if data.trim().is_empty() {
            info!(symbol, "ledger file is empty");
            return Vec::new();
        }

        match serde_json::from_str::<LedgerDocument>(&data) {
            Ok(doc) => {
                info!(symbol, count = doc.orders.len(), "loaded order ledger");
                doc.orders
            }
            Err(e) => {
                warn!(symbol, path = %path.display(), error = %e, "corrupt ledger file, treating as empty");
                Vec::new()
            }
        }
    }

    /// Atomically overwrite the symbol's ledger with `orders`.
    pub fn save(&self, symbol: &str, orders: &[LedgerOrder]) -> Result<(), LedgerError> {
        let path = self.file_path(symbol);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| LedgerError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let doc = LedgerDocument {
            symbol: symbol.to_uppercase(),
            last_updated: Utc::now(),
            orders: orders.to_vec(),
            total_orders: orders.len(),
        };
        let json = serde_json::to_string_pretty(&doc).map_err(|source| LedgerError::Serialize {
            symbol: symbol.to_string(),
            source,
        })?;

        write_atomic(&path, json.as_bytes()).map_err(|source| LedgerError::Io {
            path: path.clone(),
            source,
        })?;

        Ok(())
    }

    /// Replace the entry whose id matches `order`, or append it.
    ///
    /// Unconfirmed entries (no broker id yet) match on side, price,
    /// quantity and placement time so a confirmation can find the row it
    /// belongs to.
    pub fn upsert(&self, orders: &mut Vec<LedgerOrder>, order: LedgerOrder) {
        let existing = orders.iter_mut().find(|o| match (&o.id, &order.id) {
            (Some(a), Some(b)) => a == b,
            _ => {
                o.id.is_none()
                    && o.side == order.side
                    && o.price == order.price
                    && o.quantity == order.quantity
                    && o.placed_at == order.placed_at
            }
        });

        match existing {
            Some(slot) => *slot = order,
            None => orders.push(order),
        }
    }

    /// Remove the symbol's backing file. Used only when the operator
    /// cancels the whole ladder.
    pub fn clear(&self, symbol: &str) -> Result<(), LedgerError> {
        let path = self.file_path(symbol);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(symbol, path = %path.display(), "ledger file cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LedgerError::Io { path, source }),
        }
    }

    /// Find an entry by broker id.
    pub fn find_by_id<'a>(
        &self,
        orders: &'a [LedgerOrder],
        id: &OrderId,
    ) -> Option<&'a LedgerOrder> {
        orders.iter().find(|o| o.id.as_ref() == Some(id))
    }
}

/// Write-to-temp, fsync, rename. POSIX guarantees the rename is atomic
/// on the same filesystem, so a crash leaves either the old file or the
/// new file, never a torn one.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let temp_path = path.with_extension("json.tmp");
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;
    Ok(())
}
