//! Scripted transaction log.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::ChangeRecord;
use crate::error::{Error, Result};
use crate::session::TxnLog;

enum Step {
    Batch(Vec<ChangeRecord>),
    Fail(Error),
}

/// A fake [`TxnLog`] driven by a script, with a live tail for
/// integration tests.
///
/// Each `read_after` call pops the next scripted step and plays it back
/// verbatim (batches are not filtered, so tests can probe the tailer's
/// own duplicate handling). Once the script is exhausted, reads serve
/// the live tail: records appended via [`push`](Self::push), filtered
/// by the caller's `after` cursor like a real log.
pub struct ScriptedLog {
    script: Mutex<VecDeque<Step>>,
    live: Mutex<Vec<ChangeRecord>>,
    reads: AtomicU64,
    last_after: Mutex<Option<u64>>,
}

impl ScriptedLog {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            live: Mutex::new(Vec::new()),
            reads: AtomicU64::new(0),
            last_after: Mutex::new(None),
        }
    }

    /// Queue a batch to be returned by one `read_after` call, as-is.
    pub fn with_batch(self, batch: Vec<ChangeRecord>) -> Self {
        self.script.lock().push_back(Step::Batch(batch));
        self
    }

    /// Queue an error to be returned by one `read_after` call.
    pub fn with_error(self, error: Error) -> Self {
        self.script.lock().push_back(Step::Fail(error));
        self
    }

    /// Append a record to the live tail.
    pub fn push(&self, record: ChangeRecord) {
        self.live.lock().push(record);
    }

    /// Total `read_after` calls observed.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// The `after` cursor of the most recent read.
    pub fn last_read_after(&self) -> Option<u64> {
        *self.last_after.lock()
    }
}

impl Default for ScriptedLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TxnLog for ScriptedLog {
    async fn read_after(&self, after: u64) -> Result<Vec<ChangeRecord>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        *self.last_after.lock() = Some(after);

        let step = self.script.lock().pop_front();
        match step {
            Some(Step::Batch(batch)) => Ok(batch),
            Some(Step::Fail(error)) => Err(error),
            None => Ok(self
                .live
                .lock()
                .iter()
                .filter(|record| record.revision > after)
                .cloned()
                .collect()),
        }
    }
}
