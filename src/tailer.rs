//! Transaction-log tailer.
//!
//! A single long-lived worker that reads the backing database's
//! append-only transaction log and publishes every change record to the
//! event hub on its `(tenant, collection)` topic. The pool keeps the
//! tailer alive through a [`Runner`](crate::runner::Runner).
//!
//! The revision cursor lives outside the worker future: a restarted
//! worker resumes from the highest revision already emitted in this
//! process and never replays history to existing subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::clock::Clock;
use crate::domain::ChangeRecord;
use crate::error::Result;
use crate::hub::EventHub;
use crate::session::TxnLog;

/// Everything one tailer run needs. Cloning shares the cursor, so
/// successive runs built by the same worker factory continue where the
/// previous run stopped.
#[derive(Clone)]
pub struct TailerContext {
    pub log: Arc<dyn TxnLog>,
    pub hub: Arc<EventHub<ChangeRecord>>,
    pub clock: Arc<dyn Clock>,
    pub cursor: Arc<AtomicU64>,
    pub poll_interval: Duration,
}

/// Tail the transaction log until an error or cancellation.
///
/// Records are published in the exact order observed; within a batch ties
/// are broken by ascending revision. Records at or below the cursor are
/// skipped so a run never duplicates what it already emitted. Any log
/// error propagates to the supervisor, which restarts the worker unless
/// the error is [`PoolClosed`](crate::error::Error::PoolClosed).
pub async fn tail_txn_log(ctx: TailerContext) -> Result<()> {
    debug!(
        resume_after = ctx.cursor.load(Ordering::Acquire),
        "Tailing transaction log"
    );
    loop {
        let after = ctx.cursor.load(Ordering::Acquire);
        let mut batch = ctx.log.read_after(after).await?;

        if batch.is_empty() {
            ctx.clock.sleep(ctx.poll_interval).await;
            continue;
        }

        batch.sort_by_key(|record| record.revision);
        for record in batch {
            if record.revision <= ctx.cursor.load(Ordering::Acquire) {
                trace!(revision = record.revision, "Skipping already-emitted record");
                continue;
            }
            let revision = record.revision;
            ctx.hub.publish(&record.topic(), record);
            ctx.cursor.store(revision, Ordering::Release);
        }
    }
}
