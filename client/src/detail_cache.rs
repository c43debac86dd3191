use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use geodata_shared::dataset::DatasetKind;
use geodata_shared::{DetailRecord, EntityId};

use crate::api::FetchError;
use crate::timers::AliveFlag;

/// Per-entity detail lookups against the backend.
#[allow(async_fn_in_trait)]
pub trait DetailSource {
    async fn fetch_detail(
        &self,
        kind: DatasetKind,
        id: &EntityId,
    ) -> Result<DetailRecord, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Pending,
    Fetched,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetailLookup {
    /// This call performed the fetch.
    Fetched(DetailRecord),
    /// An earlier call already fetched the record; nothing was requested.
    AlreadyFetched,
    /// Another call is fetching the record right now.
    InFlight,
    Failed(FetchError),
    /// The cache was disposed while the fetch was outstanding.
    Discarded,
}

/// Fetch-once bookkeeping for one dataset view. Failed ids may be retried.
pub struct DetailCache<S> {
    kind: DatasetKind,
    source: Rc<S>,
    states: RefCell<HashMap<EntityId, FetchState>>,
    alive: AliveFlag,
}

impl<S: DetailSource> DetailCache<S> {
    pub fn new(kind: DatasetKind, source: Rc<S>) -> Self {
        Self {
            kind,
            source,
            states: RefCell::new(HashMap::new()),
            alive: AliveFlag::new(),
        }
    }

    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    pub fn state_of(&self, id: &EntityId) -> Option<FetchState> {
        self.states.borrow().get(id).copied()
    }

    pub async fn fetch(&self, id: &EntityId) -> DetailLookup {
        if !self.alive.is_alive() {
            return DetailLookup::Discarded;
        }
        match self.state_of(id) {
            Some(FetchState::Fetched) => return DetailLookup::AlreadyFetched,
            Some(FetchState::Pending) => return DetailLookup::InFlight,
            Some(FetchState::Failed) | None => {}
        }
        self.states
            .borrow_mut()
            .insert(id.clone(), FetchState::Pending);

        let result = self.source.fetch_detail(self.kind, id).await;

        if !self.alive.is_alive() {
            log::debug!("{}: dropping late detail for {id}", self.kind);
            return DetailLookup::Discarded;
        }
        match result {
            Ok(detail) => {
                self.states
                    .borrow_mut()
                    .insert(id.clone(), FetchState::Fetched);
                DetailLookup::Fetched(detail)
            }
            Err(e) => {
                log::warn!("{}: detail fetch for {id} failed: {e}", self.kind);
                self.states.borrow_mut().insert(id.clone(), FetchState::Failed);
                DetailLookup::Failed(e)
            }
        }
    }

    /// Forget all state; outstanding fetches resolve to `Discarded`.
    pub fn dispose(&self) {
        self.alive.kill();
        self.states.borrow_mut().clear();
    }
}


#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use futures::executor::{LocalPool, block_on};
    use futures::task::LocalSpawnExt;

    use super::testing::ScriptedSource;
    use super::*;

    fn cache() -> (Rc<ScriptedSource>, Rc<DetailCache<ScriptedSource>>) {
        let source = Rc::new(ScriptedSource::default());
        let cache = Rc::new(DetailCache::new(DatasetKind::AirQuality, source.clone()));
        (source, cache)
    }

    #[test]
    fn second_fetch_does_not_hit_network() {
        let (source, cache) = cache();
        let id = EntityId::Numeric(7);
        assert!(matches!(block_on(cache.fetch(&id)), DetailLookup::Fetched(_)));
        assert_eq!(block_on(cache.fetch(&id)), DetailLookup::AlreadyFetched);
        assert_eq!(source.request_count(), 1);
        assert_eq!(cache.state_of(&id), Some(FetchState::Fetched));
    }

    #[test]
    fn concurrent_fetch_reports_in_flight() {
        let (source, cache) = cache();
        source.gated.set(true);
        let id = EntityId::Numeric(1);
        let mut pool = LocalPool::new();
        let first = Rc::new(RefCell::new(None));
        {
            let cache = cache.clone();
            let id = id.clone();
            let first = first.clone();
            pool.spawner()
                .spawn_local(async move {
                    *first.borrow_mut() = Some(cache.fetch(&id).await);
                })
                .expect("spawn");
        }
        pool.run_until_stalled();
        assert_eq!(cache.state_of(&id), Some(FetchState::Pending));
        assert_eq!(block_on(cache.fetch(&id)), DetailLookup::InFlight);

        source.release();
        pool.run_until_stalled();
        assert!(matches!(*first.borrow(), Some(DetailLookup::Fetched(_))));
        assert_eq!(source.request_count(), 1);
    }

    #[test]
    fn failure_allows_retry() {
        let (source, cache) = cache();
        source.push_err(FetchError::Status(500));
        let id = EntityId::Numeric(3);
        assert_eq!(
            block_on(cache.fetch(&id)),
            DetailLookup::Failed(FetchError::Status(500))
        );
        assert_eq!(cache.state_of(&id), Some(FetchState::Failed));
        assert!(matches!(block_on(cache.fetch(&id)), DetailLookup::Fetched(_)));
        assert_eq!(source.request_count(), 2);
    }

    #[test]
    fn results_after_dispose_are_discarded() {
        let (source, cache) = cache();
        source.gated.set(true);
        let id = EntityId::Code("28079".into());
        let mut pool = LocalPool::new();
        let outcome = Rc::new(RefCell::new(None));
        {
            let cache = cache.clone();
            let id = id.clone();
            let outcome = outcome.clone();
            pool.spawner()
                .spawn_local(async move {
                    *outcome.borrow_mut() = Some(cache.fetch(&id).await);
                })
                .expect("spawn");
        }
        pool.run_until_stalled();
        cache.dispose();
        source.release();
        pool.run_until_stalled();

        assert_eq!(*outcome.borrow(), Some(DetailLookup::Discarded));
        assert_eq!(cache.state_of(&id), None);
        assert_eq!(block_on(cache.fetch(&id)), DetailLookup::Discarded);
    }
}
