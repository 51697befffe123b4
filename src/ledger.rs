use crate::calc;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub roll: String,
    pub status: String,
    pub date: String,
}

/// In-memory undo stack of recent attendance marks.
///
/// Lives for the lifetime of the process and is never persisted. Popping an
/// entry does not touch the stored student record.
#[derive(Debug, Default)]
pub struct AttendanceLedger {
    entries: Vec<LedgerEntry>,
}

impl AttendanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an entry; a missing date means today.
    pub fn record(&mut self, roll: &str, status: &str, date: Option<&str>) -> LedgerEntry {
        let date = match date {
            Some(d) => d.to_string(),
            None => calc::iso_date(calc::today()),
        };
        let entry = LedgerEntry {
            roll: roll.to_string(),
            status: status.to_string(),
            date,
        };
        self.entries.push(entry.clone());
        tracing::debug!(roll = %entry.roll, date = %entry.date, depth = self.entries.len(), "ledger record");
        entry
    }

    pub fn undo(&mut self) -> Option<LedgerEntry> {
        let popped = self.entries.pop();
        if let Some(e) = &popped {
            tracing::debug!(roll = %e.roll, date = %e.date, "ledger undo");
        }
        popped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
