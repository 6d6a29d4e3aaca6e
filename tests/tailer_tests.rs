//! End-to-end change-stream tests: transaction log → tailer → hub →
//! tenant handle watchers, including supervised restart of the tailer.

mod support;

use std::sync::Arc;
use std::time::Duration;

use statepool::config::pool::PoolConfig;
use statepool::pool::PoolOptions;
use statepool::testkit::clock::ManualClock;
use statepool::testkit::domain::change_for;
use statepool::testkit::log::ScriptedLog;
use statepool::testkit::session::FakeSession;
use statepool::{Error, StatePool};

use support::{ctl, settle, t, wait_until};

fn tailed_pool(log: Arc<ScriptedLog>, clock: Arc<ManualClock>) -> StatePool {
    let session = FakeSession::new().with_log(log);
    StatePool::new_with(
        ctl(),
        Box::new(session),
        &PoolConfig::default(),
        PoolOptions {
            handle_factory: None,
            clock,
            start_tailer: true,
        },
    )
    .unwrap()
}

async fn wait_for_idle_tailer(clock: &Arc<ManualClock>) {
    wait_until(|| {
        let clock = clock.clone();
        async move { clock.sleeper_count() >= 1 }
    })
    .await;
}

#[tokio::test]
async fn test_changes_reach_collection_watchers_in_order() {
    let log = Arc::new(ScriptedLog::new());
    let clock = Arc::new(ManualClock::new());
    let pool = tailed_pool(log.clone(), clock.clone());

    let (handle, releaser) = pool.acquire(&t("t1")).unwrap();
    let mut machines = handle.watch_collection("machines");

    // Tailer found the log empty and parked on the poll interval.
    wait_for_idle_tailer(&clock).await;

    for revision in 1..=5 {
        log.push(change_for("t1", "machines", revision));
    }
    clock.advance(Duration::from_millis(100));

    for expected in 1..=5 {
        let record = machines.recv().await.unwrap();
        assert_eq!(record.revision, expected);
    }

    releaser.release();
    pool.close().await.unwrap();
}

#[tokio::test]
async fn test_watchers_see_only_their_collection_and_tenant() {
    let log = Arc::new(ScriptedLog::new());
    let clock = Arc::new(ManualClock::new());
    let pool = tailed_pool(log.clone(), clock.clone());

    let (h1, r1) = pool.acquire(&t("t1")).unwrap();
    let (h2, r2) = pool.acquire(&t("t2")).unwrap();
    let mut t1_machines = h1.watch_collection("machines");
    let mut t2_units = h2.watch_collection("units");

    wait_for_idle_tailer(&clock).await;
    log.push(change_for("t1", "machines", 1));
    log.push(change_for("t2", "units", 2));
    log.push(change_for("t1", "units", 3));
    log.push(change_for("t2", "machines", 4));
    clock.advance(Duration::from_millis(100));

    assert_eq!(t1_machines.recv().await.unwrap().revision, 1);
    assert_eq!(t2_units.recv().await.unwrap().revision, 2);

    r1.release();
    r2.release();
    pool.close().await.unwrap();
}

#[tokio::test]
async fn test_tailer_restart_resumes_without_replay() {
    // One good batch, then a transient failure, then the live tail.
    let log = Arc::new(
        ScriptedLog::new()
            .with_batch(vec![change_for("t1", "machines", 1)])
            .with_error(Error::Session("log stream interrupted".into())),
    );
    let clock = Arc::new(ManualClock::new());
    let pool = tailed_pool(log.clone(), clock.clone());

    // The failure parks the supervisor on its restart delay.
    wait_for_idle_tailer(&clock).await;

    let (handle, releaser) = pool.acquire(&t("t1")).unwrap();
    let mut machines = handle.watch_collection("machines");
    log.push(change_for("t1", "machines", 1));
    log.push(change_for("t1", "machines", 2));
    log.push(change_for("t1", "machines", 3));

    // Restart delay elapses; the new run resumes after revision 1.
    clock.advance(Duration::from_secs(1));

    assert_eq!(machines.recv().await.unwrap().revision, 2);
    assert_eq!(machines.recv().await.unwrap().revision, 3);
    settle().await;
    assert!(machines.try_recv().is_err(), "revision 1 must not be replayed");

    releaser.release();
    pool.close().await.unwrap();
}

#[tokio::test]
async fn test_subscriber_attached_late_sees_only_later_records() {
    let log = Arc::new(ScriptedLog::new());
    let clock = Arc::new(ManualClock::new());
    let pool = tailed_pool(log.clone(), clock.clone());

    wait_for_idle_tailer(&clock).await;
    log.push(change_for("t1", "machines", 1));
    log.push(change_for("t1", "machines", 2));
    clock.advance(Duration::from_millis(100));

    // Records 1 and 2 were emitted with nobody watching.
    wait_until(|| {
        let log = log.clone();
        async move { log.read_count() >= 2 }
    })
    .await;
    wait_for_idle_tailer(&clock).await;

    let (handle, releaser) = pool.acquire(&t("t1")).unwrap();
    let mut machines = handle.watch_collection("machines");
    log.push(change_for("t1", "machines", 3));
    clock.advance(Duration::from_millis(100));

    assert_eq!(machines.recv().await.unwrap().revision, 3);
    settle().await;
    assert!(machines.try_recv().is_err());

    releaser.release();
    pool.close().await.unwrap();
}
