//! Seam over the imperative map library. Object handles are opaque typed
//! ids; the engine owns the real library objects behind them.

use std::rc::Rc;

use futures::future::LocalBoxFuture;
use geodata_shared::dataset::ClusterSpec;
use geodata_shared::{ClusterChild, LatLng, LatLngBounds, MarkerPaint, MarkerShape};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("map library error: {0}")]
    Library(String),
    #[error("map object is no longer attached")]
    Detached,
}

/// Where a layer hangs: directly on the map or inside another layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerParent {
    Map(MapId),
    Layer(LayerId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapOptions {
    pub center: LatLng,
    pub zoom: u8,
    pub min_zoom: u8,
    pub max_zoom: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSource {
    pub url_template: &'static str,
    pub attribution: &'static str,
    pub max_zoom: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitOptions {
    pub max_zoom: u8,
    pub animate: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSpec {
    pub position: LatLng,
    pub shape: MarkerShape,
    pub radius: f64,
    pub fill_color: &'static str,
    pub stroke_color: &'static str,
    pub weight: f64,
    pub opacity: f64,
    pub fill_opacity: f64,
    /// Category tag read back by cluster icon factories.
    pub tag: Option<String>,
    pub active: bool,
    /// Content bound when the marker is created.
    pub popup_html: String,
}

impl MarkerSpec {
    pub fn from_paint(position: LatLng, paint: MarkerPaint, popup_html: String) -> Self {
        Self {
            position,
            shape: paint.shape,
            radius: paint.radius,
            fill_color: paint.fill_color,
            stroke_color: paint.stroke_color,
            weight: paint.weight,
            opacity: paint.opacity,
            fill_opacity: paint.fill_opacity,
            tag: paint.tag,
            active: paint.active,
            popup_html,
        }
    }

    pub fn cluster_child(&self) -> ClusterChild {
        ClusterChild {
            tag: self.tag.clone(),
            active: self.active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterIcon {
    pub html: String,
    pub class_name: String,
    pub size_px: u32,
}

pub type EventHandler = Rc<dyn Fn() -> LocalBoxFuture<'static, ()>>;
pub type PopupHandler = Rc<dyn Fn(MarkerId) -> LocalBoxFuture<'static, ()>>;
pub type ClusterIconFactory = Rc<dyn Fn(&[ClusterChild]) -> ClusterIcon>;

/// Operations the surface and renderer need from a map library. Removal
/// operations tolerate objects that are already gone.
pub trait MapEngine {
    type Container;

    fn create_map(&self, container: &Self::Container, options: &MapOptions)
    -> Result<MapId, MapError>;
    fn add_tile_layer(&self, map: MapId, source: &TileSource) -> Result<LayerId, MapError>;
    /// Empty plain layer group, already attached to `map`.
    fn create_layer_group(&self, map: MapId) -> Result<LayerId, MapError>;
    /// Detached cluster group; attach it with [`MapEngine::attach_layer`].
    fn create_cluster_group(
        &self,
        spec: &ClusterSpec,
        icon: ClusterIconFactory,
    ) -> Result<LayerId, MapError>;
    fn add_marker(
        &self,
        layer: LayerId,
        spec: &MarkerSpec,
        on_open: Option<PopupHandler>,
    ) -> Result<MarkerId, MapError>;
    fn attach_layer(&self, parent: LayerParent, child: LayerId) -> Result<(), MapError>;
    fn discard_layer(&self, parent: LayerParent, child: LayerId) -> Result<(), MapError>;
    fn clear_layer(&self, layer: LayerId) -> Result<(), MapError>;
    fn set_popup_content(&self, marker: MarkerId, html: &str) -> Result<(), MapError>;
    fn fit_bounds(
        &self,
        map: MapId,
        bounds: &LatLngBounds,
        options: &FitOptions,
    ) -> Result<(), MapError>;
    fn set_view(&self, map: MapId, center: LatLng, zoom: u8) -> Result<(), MapError>;
    fn invalidate_size(&self, map: MapId) -> Result<(), MapError>;
    fn destroy_map(&self, map: MapId) -> Result<(), MapError>;
    fn on_window_resize(&self, handler: EventHandler) -> Result<ListenerId, MapError>;
    fn remove_listener(&self, listener: ListenerId) -> Result<(), MapError>;
}

/// Log a failed cleanup step and carry on.
pub fn warn_on_err(step: &str, result: Result<(), MapError>) {
    if let Err(e) = result {
        log::warn!("{step} failed: {e}");
    }
}

#[cfg(test)]
pub mod testing {
    use std::cell::RefCell;
    use std::collections::{BTreeMap, HashSet};

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum LayerKind {
        Tiles,
        Group,
        Cluster,
    }

    pub struct LayerRecord {
        pub kind: LayerKind,
        pub parent: Option<LayerParent>,
        pub children: Vec<LayerId>,
        pub markers: Vec<MarkerId>,
        pub icon: Option<ClusterIconFactory>,
    }

    pub struct MarkerRecord {
        pub layer: LayerId,
        pub spec: MarkerSpec,
        pub on_open: Option<PopupHandler>,
        pub content: String,
    }

    #[derive(Debug, Default)]
    pub struct MapRecord {
        pub options: Option<MapOptions>,
        pub fits: Vec<(LatLngBounds, FitOptions)>,
        pub views: Vec<(LatLng, u8)>,
        pub invalidations: usize,
        pub destroyed: bool,
    }

    #[derive(Default)]
    pub struct EngineState {
        next_id: u32,
        pub maps: BTreeMap<MapId, MapRecord>,
        pub layers: BTreeMap<LayerId, LayerRecord>,
        pub markers: BTreeMap<MarkerId, MarkerRecord>,
        pub listeners: BTreeMap<ListenerId, EventHandler>,
        /// Operation names that fail with `MapError::Library`.
        pub failing: HashSet<&'static str>,
        pub calls: Vec<&'static str>,
    }

    impl EngineState {
        fn next(&mut self) -> u32 {
            self.next_id += 1;
            self.next_id
        }

        fn check(&mut self, op: &'static str) -> Result<(), MapError> {
            self.calls.push(op);
            if self.failing.contains(op) {
                Err(MapError::Library(format!("{op} failed")))
            } else {
                Ok(())
            }
        }

        fn drop_layer_contents(&mut self, layer: LayerId) {
            let Some(record) = self.layers.get_mut(&layer) else {
                return;
            };
            let markers = std::mem::take(&mut record.markers);
            let children = std::mem::take(&mut record.children);
            for marker in markers {
                self.markers.remove(&marker);
            }
            for child in children {
                self.drop_layer_contents(child);
                self.layers.remove(&child);
            }
        }

        fn markers_under(&self, layer: LayerId, out: &mut Vec<MarkerId>) {
            let Some(record) = self.layers.get(&layer) else {
                return;
            };
            out.extend(record.markers.iter().copied());
            for child in &record.children {
                self.markers_under(*child, out);
            }
        }
    }

    /// In-memory engine that records state and call history.
    #[derive(Default)]
    pub struct RecordingEngine {
        pub state: RefCell<EngineState>,
    }

    impl RecordingEngine {
        pub fn new() -> Rc<Self> {
            Rc::new(Self::default())
        }

        pub fn fail(&self, op: &'static str) {
            self.state.borrow_mut().failing.insert(op);
        }

        pub fn recover(&self, op: &'static str) {
            self.state.borrow_mut().failing.remove(op);
        }

        pub fn calls(&self, op: &str) -> usize {
            self.state.borrow().calls.iter().filter(|c| **c == op).count()
        }

        pub fn live_maps(&self) -> usize {
            self.state
                .borrow()
                .maps
                .values()
                .filter(|m| !m.destroyed)
                .count()
        }

        pub fn listener_count(&self) -> usize {
            self.state.borrow().listeners.len()
        }

        /// Markers reachable from a layer, descending into nested groups.
        pub fn markers_in(&self, layer: LayerId) -> Vec<MarkerId> {
            let mut out = Vec::new();
            self.state.borrow().markers_under(layer, &mut out);
            out
        }

        pub fn specs_in(&self, layer: LayerId) -> Vec<MarkerSpec> {
            let state = self.state.borrow();
            let mut ids = Vec::new();
            state.markers_under(layer, &mut ids);
            ids.iter()
                .filter_map(|id| state.markers.get(id).map(|m| m.spec.clone()))
                .collect()
        }

        pub fn layer_kind(&self, layer: LayerId) -> Option<LayerKind> {
            self.state.borrow().layers.get(&layer).map(|l| l.kind)
        }

        /// Layer a marker was added to.
        pub fn marker_layer(&self, marker: MarkerId) -> Option<LayerId> {
            self.state.borrow().markers.get(&marker).map(|m| m.layer)
        }

        pub fn marker_count(&self) -> usize {
            self.state.borrow().markers.len()
        }

        pub fn map_options(&self, map: MapId) -> Option<MapOptions> {
            self.state.borrow().maps.get(&map).and_then(|m| m.options)
        }

        pub fn children_of(&self, layer: LayerId) -> Vec<LayerId> {
            self.state
                .borrow()
                .layers
                .get(&layer)
                .map(|l| l.children.clone())
                .unwrap_or_default()
        }

        pub fn popup_content(&self, marker: MarkerId) -> Option<String> {
            self.state
                .borrow()
                .markers
                .get(&marker)
                .map(|m| m.content.clone())
        }

        pub fn fits(&self, map: MapId) -> Vec<(LatLngBounds, FitOptions)> {
            self.state
                .borrow()
                .maps
                .get(&map)
                .map(|m| m.fits.clone())
                .unwrap_or_default()
        }

        pub fn views(&self, map: MapId) -> Vec<(LatLng, u8)> {
            self.state
                .borrow()
                .maps
                .get(&map)
                .map(|m| m.views.clone())
                .unwrap_or_default()
        }

        pub fn invalidations(&self, map: MapId) -> usize {
            self.state
                .borrow()
                .maps
                .get(&map)
                .map_or(0, |m| m.invalidations)
        }

        /// Future of the marker's popup-open handler, as the library would
        /// run it on a click.
        pub fn open_popup(&self, marker: MarkerId) -> Option<LocalBoxFuture<'static, ()>> {
            let handler = self
                .state
                .borrow()
                .markers
                .get(&marker)
                .and_then(|m| m.on_open.clone())?;
            Some(handler(marker))
        }

        pub fn fire_resize(&self) -> Vec<LocalBoxFuture<'static, ()>> {
            let handlers: Vec<EventHandler> =
                self.state.borrow().listeners.values().cloned().collect();
            handlers.iter().map(|h| h()).collect()
        }

        pub fn cluster_icon(&self, cluster: LayerId) -> Option<ClusterIcon> {
            let (factory, children) = {
                let state = self.state.borrow();
                let factory = state.layers.get(&cluster)?.icon.clone()?;
                let mut ids = Vec::new();
                state.markers_under(cluster, &mut ids);
                let children: Vec<ClusterChild> = ids
                    .iter()
                    .filter_map(|id| state.markers.get(id).map(|m| m.spec.cluster_child()))
                    .collect();
                (factory, children)
            };
            Some(factory(&children))
        }
    }

    impl MapEngine for RecordingEngine {
        type Container = &'static str;

        fn create_map(
            &self,
            _container: &Self::Container,
            options: &MapOptions,
        ) -> Result<MapId, MapError> {
            let mut state = self.state.borrow_mut();
            state.check("create_map")?;
            let id = MapId(state.next());
            state.maps.insert(
                id,
                MapRecord {
                    options: Some(*options),
                    ..MapRecord::default()
                },
            );
            Ok(id)
        }

        fn add_tile_layer(&self, map: MapId, _source: &TileSource) -> Result<LayerId, MapError> {
            let mut state = self.state.borrow_mut();
            state.check("add_tile_layer")?;
            if !state.maps.contains_key(&map) {
                return Err(MapError::Detached);
            }
            let id = LayerId(state.next());
            state.layers.insert(
                id,
                LayerRecord {
                    kind: LayerKind::Tiles,
                    parent: Some(LayerParent::Map(map)),
                    children: Vec::new(),
                    markers: Vec::new(),
                    icon: None,
                },
            );
            Ok(id)
        }

        fn create_layer_group(&self, map: MapId) -> Result<LayerId, MapError> {
            let mut state = self.state.borrow_mut();
            state.check("create_layer_group")?;
            let id = LayerId(state.next());
            state.layers.insert(
                id,
                LayerRecord {
                    kind: LayerKind::Group,
                    parent: Some(LayerParent::Map(map)),
                    children: Vec::new(),
                    markers: Vec::new(),
                    icon: None,
                },
            );
            Ok(id)
        }

        fn create_cluster_group(
            &self,
            _spec: &ClusterSpec,
            icon: ClusterIconFactory,
        ) -> Result<LayerId, MapError> {
            let mut state = self.state.borrow_mut();
            state.check("create_cluster_group")?;
            let id = LayerId(state.next());
            state.layers.insert(
                id,
                LayerRecord {
                    kind: LayerKind::Cluster,
                    parent: None,
                    children: Vec::new(),
                    markers: Vec::new(),
                    icon: Some(icon),
                },
            );
            Ok(id)
        }

        fn add_marker(
            &self,
            layer: LayerId,
            spec: &MarkerSpec,
            on_open: Option<PopupHandler>,
        ) -> Result<MarkerId, MapError> {
            let mut state = self.state.borrow_mut();
            state.check("add_marker")?;
            if !state.layers.contains_key(&layer) {
                return Err(MapError::Detached);
            }
            let id = MarkerId(state.next());
            state.markers.insert(
                id,
                MarkerRecord {
                    layer,
                    spec: spec.clone(),
                    on_open,
                    content: spec.popup_html.clone(),
                },
            );
            if let Some(record) = state.layers.get_mut(&layer) {
                record.markers.push(id);
            }
            Ok(id)
        }

        fn attach_layer(&self, parent: LayerParent, child: LayerId) -> Result<(), MapError> {
            let mut state = self.state.borrow_mut();
            state.check("attach_layer")?;
            if !state.layers.contains_key(&child) {
                return Err(MapError::Detached);
            }
            if let LayerParent::Layer(parent_id) = parent {
                let Some(record) = state.layers.get_mut(&parent_id) else {
                    return Err(MapError::Detached);
                };
                if !record.children.contains(&child) {
                    record.children.push(child);
                }
            }
            if let Some(record) = state.layers.get_mut(&child) {
                record.parent = Some(parent);
            }
            Ok(())
        }

        fn discard_layer(&self, parent: LayerParent, child: LayerId) -> Result<(), MapError> {
            let mut state = self.state.borrow_mut();
            state.check("discard_layer")?;
            if let LayerParent::Layer(parent_id) = parent
                && let Some(record) = state.layers.get_mut(&parent_id)
            {
                record.children.retain(|c| *c != child);
            }
            state.drop_layer_contents(child);
            state.layers.remove(&child);
            Ok(())
        }

        fn clear_layer(&self, layer: LayerId) -> Result<(), MapError> {
            let mut state = self.state.borrow_mut();
            state.check("clear_layer")?;
            state.drop_layer_contents(layer);
            Ok(())
        }

        fn set_popup_content(&self, marker: MarkerId, html: &str) -> Result<(), MapError> {
            let mut state = self.state.borrow_mut();
            state.check("set_popup_content")?;
            let Some(record) = state.markers.get_mut(&marker) else {
                return Err(MapError::Detached);
            };
            record.content = html.to_string();
            Ok(())
        }

        fn fit_bounds(
            &self,
            map: MapId,
            bounds: &LatLngBounds,
            options: &FitOptions,
        ) -> Result<(), MapError> {
            let mut state = self.state.borrow_mut();
            state.check("fit_bounds")?;
            let Some(record) = state.maps.get_mut(&map) else {
                return Err(MapError::Detached);
            };
            record.fits.push((*bounds, *options));
            Ok(())
        }

        fn set_view(&self, map: MapId, center: LatLng, zoom: u8) -> Result<(), MapError> {
            let mut state = self.state.borrow_mut();
            state.check("set_view")?;
            let Some(record) = state.maps.get_mut(&map) else {
                return Err(MapError::Detached);
            };
            record.views.push((center, zoom));
            Ok(())
        }

        fn invalidate_size(&self, map: MapId) -> Result<(), MapError> {
            let mut state = self.state.borrow_mut();
            state.check("invalidate_size")?;
            let Some(record) = state.maps.get_mut(&map) else {
                return Err(MapError::Detached);
            };
            record.invalidations += 1;
            Ok(())
        }

        fn destroy_map(&self, map: MapId) -> Result<(), MapError> {
            let mut state = self.state.borrow_mut();
            state.check("destroy_map")?;
            let attached: Vec<LayerId> = state
                .layers
                .iter()
                .filter(|(_, l)| l.parent == Some(LayerParent::Map(map)))
                .map(|(id, _)| *id)
                .collect();
            for layer in attached {
                state.drop_layer_contents(layer);
                state.layers.remove(&layer);
            }
            if let Some(record) = state.maps.get_mut(&map) {
                record.destroyed = true;
            }
            Ok(())
        }

        fn on_window_resize(&self, handler: EventHandler) -> Result<ListenerId, MapError> {
            let mut state = self.state.borrow_mut();
            state.check("on_window_resize")?;
            let id = ListenerId(state.next());
            state.listeners.insert(id, handler);
            Ok(id)
        }

        fn remove_listener(&self, listener: ListenerId) -> Result<(), MapError> {
            let mut state = self.state.borrow_mut();
            state.check("remove_listener")?;
            state.listeners.remove(&listener);
            Ok(())
        }
    }
}
