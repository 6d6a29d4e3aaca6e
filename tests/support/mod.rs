#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use statepool::TenantId;

pub fn ctl() -> TenantId {
    TenantId::from("controller")
}

pub fn t(id: &str) -> TenantId {
    TenantId::from(id)
}

/// Let background tasks (hub dispatch, tailer polls) run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

/// Poll `condition` until it holds or a generous deadline passes.
pub async fn wait_until<F, Fut>(condition: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within deadline");
}
