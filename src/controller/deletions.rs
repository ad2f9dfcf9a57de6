use std::collections::BTreeSet;
use std::fmt::Debug;
use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::watcher::Event;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::Result;

/// Names listed by the relist in progress.
#[derive(Debug, Default)]
struct Relist {
    names: BTreeSet<String>,
}

impl Relist {
    /// Feed one watcher event. Returns every listed name once a relist
    /// completes.
    fn observe<K: Resource>(&mut self, event: &Event<K>) -> Option<BTreeSet<String>> {
        match event {
            Event::Init => {
                self.names.clear();
                None
            }
            Event::InitApply(obj) => {
                self.names.insert(obj.name_any());
                None
            }
            Event::InitDone => Some(std::mem::take(&mut self.names)),
            _ => None,
        }
    }
}

async fn until_ok<F, Fut>(retry: Duration, what: &str, call: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    while let Err(e) = call().await {
        warn!(%what, %e, "watch handler failed, retrying");
        tokio::time::sleep(retry).await;
    }
}

/// Watch `api` and run `on_delete` for every deleted object, retrying each
/// failed call after `retry` until it succeeds. Runs forever.
pub async fn run_deletion_watch<K, F, Fut>(api: Api<K>, retry: Duration, on_delete: F)
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
    K::DynamicType: Default,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    run_pruning_watch(api, retry, on_delete, |_| async { Ok(()) }).await;
}

/// [`run_deletion_watch`], and after every completed list or relist also
/// run `on_relist` with the names of all listed objects. Deletes that
/// happened while the watch was desynced produce no `Delete` event, so this
/// is where their records get pruned.
pub async fn run_pruning_watch<K, F, Fut, R, RFut>(
    api: Api<K>,
    retry: Duration,
    on_delete: F,
    on_relist: R,
) where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
    K::DynamicType: Default,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<()>>,
    R: Fn(BTreeSet<String>) -> RFut,
    RFut: Future<Output = Result<()>>,
{
    let mut events = pin!(watcher(api, watcher::Config::default()).default_backoff());
    let mut relist = Relist::default();

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                warn!(%e, "deletion watch error");
                continue;
            }
        };

        if let Some(live) = relist.observe(&event) {
            debug!(count = live.len(), "relist complete, pruning records");
            until_ok(retry, "relist prune", || on_relist(live.clone())).await;
        }

        if let Event::Delete(obj) = event {
            let name = obj.name_any();
            until_ok(retry, &name, || on_delete(obj.clone())).await;
        }
    }
}
