use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use futures::FutureExt;

use crate::config::{
    INITIAL_CENTER, INITIAL_ZOOM, MAP_MAX_ZOOM, MAP_MIN_ZOOM, READY_DELAY_MS, RESIZE_DEBOUNCE_MS,
    TILE_ATTRIBUTION, TILE_MAX_ZOOM, TILE_URL,
};
use crate::engine::{
    EventHandler, LayerId, LayerParent, ListenerId, MapEngine, MapError, MapId, MapOptions,
    TileSource, warn_on_err,
};
use crate::timers::Timers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Uninitialized,
    Initializing,
    Ready,
    TearingDown,
}

/// Handles of a ready map, handed to the marker renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceHandles {
    pub map: MapId,
    pub markers: LayerId,
}

struct LiveMap {
    map: MapId,
    markers: LayerId,
    resize: Option<ListenerId>,
}

struct SurfaceInner<E, T> {
    engine: Rc<E>,
    timers: Rc<T>,
    state: Cell<SurfaceState>,
    /// Bumped on every mount and teardown; a mount whose generation moved on
    /// while it waited is stale.
    generation: Cell<u64>,
    resize_seq: Cell<u64>,
    live: RefCell<Option<LiveMap>>,
}

/// Owns at most one live map instance and its marker layer.
pub struct MapSurface<E, T> {
    inner: Rc<SurfaceInner<E, T>>,
}

impl<E, T> Clone for MapSurface<E, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E, T> MapSurface<E, T>
where
    E: MapEngine + 'static,
    T: Timers + 'static,
{
    pub fn new(engine: Rc<E>, timers: Rc<T>) -> Self {
        Self {
            inner: Rc::new(SurfaceInner {
                engine,
                timers,
                state: Cell::new(SurfaceState::Uninitialized),
                generation: Cell::new(0),
                resize_seq: Cell::new(0),
                live: RefCell::new(None),
            }),
        }
    }

    pub fn state(&self) -> SurfaceState {
        self.inner.state.get()
    }

    /// Handles of the live map once it is ready.
    pub fn handles(&self) -> Option<SurfaceHandles> {
        if self.state() != SurfaceState::Ready {
            return None;
        }
        self.inner.live.borrow().as_ref().map(|live| SurfaceHandles {
            map: live.map,
            markers: live.markers,
        })
    }

    /// Build a map inside `container`, replacing any live one. Resolves to
    /// `None` when construction fails or the mount went stale during the
    /// readiness delay.
    pub async fn mount(&self, container: &E::Container) -> Option<SurfaceHandles> {
        self.teardown();
        let generation = self.bump_generation();
        self.inner.state.set(SurfaceState::Initializing);

        let live = match self.construct(container) {
            Ok(live) => live,
            Err(e) => {
                log::error!("map construction failed: {e}");
                self.inner.state.set(SurfaceState::Uninitialized);
                return None;
            }
        };
        let handles = SurfaceHandles {
            map: live.map,
            markers: live.markers,
        };
        *self.inner.live.borrow_mut() = Some(live);

        self.inner.timers.sleep(READY_DELAY_MS).await;

        if self.inner.generation.get() != generation {
            log::debug!("discarding stale map mount");
            return None;
        }
        self.inner.state.set(SurfaceState::Ready);
        log::info!("map ready");
        Some(handles)
    }

    fn construct(&self, container: &E::Container) -> Result<LiveMap, MapError> {
        let engine = &self.inner.engine;
        let map = engine.create_map(
            container,
            &MapOptions {
                center: INITIAL_CENTER,
                zoom: INITIAL_ZOOM,
                min_zoom: MAP_MIN_ZOOM,
                max_zoom: MAP_MAX_ZOOM,
            },
        )?;

        let attach = || -> Result<LiveMap, MapError> {
            engine.add_tile_layer(
                map,
                &TileSource {
                    url_template: TILE_URL,
                    attribution: TILE_ATTRIBUTION,
                    max_zoom: TILE_MAX_ZOOM,
                },
            )?;
            let markers = engine.create_layer_group(map)?;
            let resize = match engine.on_window_resize(self.resize_handler()) {
                Ok(id) => Some(id),
                Err(e) => {
                    log::warn!("resize listener unavailable: {e}");
                    None
                }
            };
            Ok(LiveMap {
                map,
                markers,
                resize,
            })
        };

        attach().inspect_err(|_| warn_on_err("destroy partial map", engine.destroy_map(map)))
    }

    fn resize_handler(&self) -> EventHandler {
        let weak: Weak<SurfaceInner<E, T>> = Rc::downgrade(&self.inner);
        Rc::new(move || {
            let weak = weak.clone();
            async move {
                let (seq, timers) = {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    let seq = inner.resize_seq.get() + 1;
                    inner.resize_seq.set(seq);
                    (seq, inner.timers.clone())
                };
                timers.sleep(RESIZE_DEBOUNCE_MS).await;

                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.resize_seq.get() != seq || inner.state.get() != SurfaceState::Ready {
                    return;
                }
                let map = inner.live.borrow().as_ref().map(|live| live.map);
                if let Some(map) = map {
                    warn_on_err("invalidate size", inner.engine.invalidate_size(map));
                }
            }
            .boxed_local()
        })
    }

    fn bump_generation(&self) -> u64 {
        let next = self.inner.generation.get() + 1;
        self.inner.generation.set(next);
        next
    }

    /// Release the live map. Safe to call repeatedly and in any state; step
    /// failures are logged and skipped.
    pub fn teardown(&self) {
        self.bump_generation();
        self.inner.resize_seq.set(self.inner.resize_seq.get() + 1);
        let live = self.inner.live.borrow_mut().take();
        let Some(live) = live else {
            self.inner.state.set(SurfaceState::Uninitialized);
            return;
        };
        self.inner.state.set(SurfaceState::TearingDown);

        let engine = &self.inner.engine;
        warn_on_err("clear markers", engine.clear_layer(live.markers));
        warn_on_err(
            "detach markers",
            engine.discard_layer(LayerParent::Map(live.map), live.markers),
        );
        if let Some(listener) = live.resize {
            warn_on_err("remove resize listener", engine.remove_listener(listener));
        }
        warn_on_err("destroy map", engine.destroy_map(live.map));

        self.inner.state.set(SurfaceState::Uninitialized);
        log::debug!("map torn down");
    }
}
