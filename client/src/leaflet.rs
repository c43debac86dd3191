//! [`MapEngine`] over Leaflet and Leaflet.markercluster, loaded as page
//! globals.

use std::cell::RefCell;
use std::collections::HashMap;

use geodata_shared::dataset::ClusterSpec;
use geodata_shared::{ClusterChild, LatLng, LatLngBounds, MarkerShape};
use serde::Serialize;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use crate::engine::{
    ClusterIconFactory, EventHandler, FitOptions, LayerId, LayerParent, ListenerId, MapEngine,
    MapError, MapId, MapOptions, MarkerId, MarkerSpec, PopupHandler, TileSource,
};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = L, js_name = Map)]
    #[derive(Debug, Clone)]
    type LeafletMap;

    #[wasm_bindgen(catch, js_namespace = L, js_name = map)]
    fn create_map(container: &web_sys::HtmlElement, options: &JsValue)
    -> Result<LeafletMap, JsValue>;

    #[wasm_bindgen(catch, method, js_name = setView)]
    fn set_view(
        this: &LeafletMap,
        center: &JsValue,
        zoom: u8,
        options: &JsValue,
    ) -> Result<(), JsValue>;

    #[wasm_bindgen(catch, method, js_name = fitBounds)]
    fn fit_bounds(this: &LeafletMap, bounds: &JsValue, options: &JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(catch, method, js_name = invalidateSize)]
    fn invalidate_size(this: &LeafletMap, options: &JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(method, js_name = removeLayer)]
    fn remove_map_layer(this: &LeafletMap, layer: &Layer);

    #[wasm_bindgen(method, js_name = off)]
    fn off_all(this: &LeafletMap);

    #[wasm_bindgen(catch, method, js_name = remove)]
    fn remove_map(this: &LeafletMap) -> Result<(), JsValue>;

    #[wasm_bindgen(js_namespace = L, js_name = Layer)]
    #[derive(Debug, Clone)]
    type Layer;

    #[wasm_bindgen(catch, js_namespace = L, js_name = tileLayer)]
    fn tile_layer(url: &str, options: &JsValue) -> Result<Layer, JsValue>;

    #[wasm_bindgen(catch, js_namespace = L, js_name = layerGroup)]
    fn layer_group() -> Result<Layer, JsValue>;

    #[wasm_bindgen(catch, js_namespace = L, js_name = markerClusterGroup)]
    fn marker_cluster_group(options: &JsValue) -> Result<Layer, JsValue>;

    #[wasm_bindgen(catch, js_namespace = L, js_name = circleMarker)]
    fn circle_marker(position: &JsValue, options: &JsValue) -> Result<Layer, JsValue>;

    #[wasm_bindgen(catch, js_namespace = L, js_name = marker)]
    fn icon_marker(position: &JsValue, options: &JsValue) -> Result<Layer, JsValue>;

    #[wasm_bindgen(js_namespace = L, js_name = divIcon)]
    fn div_icon(options: &JsValue) -> JsValue;

    #[wasm_bindgen(method, js_name = addTo)]
    fn add_to_map(this: &Layer, map: &LeafletMap);

    #[wasm_bindgen(catch, method, js_name = addLayer)]
    fn add_child(this: &Layer, child: &Layer) -> Result<(), JsValue>;

    #[wasm_bindgen(method, js_name = removeLayer)]
    fn remove_child(this: &Layer, child: &Layer);

    #[wasm_bindgen(catch, method, js_name = clearLayers)]
    fn clear_layers(this: &Layer) -> Result<(), JsValue>;

    #[wasm_bindgen(method, js_name = bindPopup)]
    fn bind_popup(this: &Layer, content: &str, options: &JsValue);

    #[wasm_bindgen(method, js_name = setPopupContent)]
    fn set_popup_content(this: &Layer, content: &str);

    #[wasm_bindgen(method, js_name = on)]
    fn on_event(this: &Layer, event: &str, handler: &js_sys::Function);

    #[wasm_bindgen(method, js_name = getAllChildMarkers)]
    fn all_child_markers(this: &Layer) -> js_sys::Array;
}

pub fn leaflet_available() -> bool {
    let Some(window) = web_sys::window() else {
        return false;
    };
    js_sys::Reflect::get(&window, &JsValue::from_str("L"))
        .map(|l| !l.is_undefined() && !l.is_null())
        .unwrap_or(false)
}

fn js_error(e: JsValue) -> MapError {
    let message = e
        .as_string()
        .or_else(|| {
            e.dyn_ref::<js_sys::Error>()
                .map(|err| String::from(err.message()))
        })
        .unwrap_or_else(|| format!("{e:?}"));
    MapError::Library(message)
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, MapError> {
    serde_wasm_bindgen::to_value(value).map_err(|e| MapError::Library(e.to_string()))
}

fn lat_lng(point: LatLng) -> JsValue {
    js_sys::Array::of2(&point.lat.into(), &point.lon.into()).into()
}

fn bounds(b: &LatLngBounds) -> JsValue {
    js_sys::Array::of2(
        &lat_lng(LatLng::new(b.south, b.west)),
        &lat_lng(LatLng::new(b.north, b.east)),
    )
    .into()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LeafletMapOptions {
    center: [f64; 2],
    zoom: u8,
    min_zoom: u8,
    max_zoom: u8,
    prefer_canvas: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TileOptions {
    attribution: &'static str,
    max_zoom: u8,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClusterOptions {
    max_cluster_radius: u32,
    disable_clustering_at_zoom: u8,
    spiderfy_on_max_zoom: bool,
    show_coverage_on_hover: bool,
    chunked_loading: bool,
}

/// Marker options. The `geodata*` keys survive in `marker.options` and
/// feed the cluster icon factory.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CircleOptions<'a> {
    radius: f64,
    fill_color: &'a str,
    color: &'a str,
    weight: f64,
    opacity: f64,
    fill_opacity: f64,
    geodata_tag: Option<&'a str>,
    geodata_active: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DivIconOptions {
    html: String,
    class_name: String,
    icon_size: [u32; 2],
    icon_anchor: [u32; 2],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PopupOptions {
    max_width: u32,
    min_width: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ViewOptions {
    max_zoom: Option<u8>,
    animate: bool,
}

fn diamond_html(spec: &MarkerSpec, side: u32) -> String {
    format!(
        "<div style=\"width:{side}px;height:{side}px;background:{fill};\
         border:{weight}px solid {stroke};opacity:{opacity};transform:rotate(45deg)\"></div>",
        fill = spec.fill_color,
        weight = spec.weight,
        stroke = spec.stroke_color,
        opacity = spec.fill_opacity,
    )
}

fn child_of(marker: &JsValue) -> ClusterChild {
    let options = js_sys::Reflect::get(marker, &JsValue::from_str("options"))
        .unwrap_or(JsValue::UNDEFINED);
    let read = |key: &str| {
        js_sys::Reflect::get(&options, &JsValue::from_str(key)).unwrap_or(JsValue::UNDEFINED)
    };
    ClusterChild {
        tag: read("geodataTag").as_string(),
        active: read("geodataActive").as_bool().unwrap_or(true),
    }
}

struct MarkerEntry {
    layer: Layer,
    _on_open: Option<Closure<dyn Fn()>>,
}

struct LayerEntry {
    layer: Layer,
    parent: Option<LayerParent>,
    children: Vec<LayerId>,
    markers: Vec<MarkerId>,
    _icon: Option<Closure<dyn Fn(Layer) -> JsValue>>,
}

struct ResizeListener {
    window: web_sys::Window,
    callback: Closure<dyn Fn()>,
}

#[derive(Default)]
struct Registry {
    next_id: u32,
    maps: HashMap<MapId, LeafletMap>,
    layers: HashMap<LayerId, LayerEntry>,
    markers: HashMap<MarkerId, MarkerEntry>,
    listeners: HashMap<ListenerId, ResizeListener>,
}

impl Registry {
    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_layer(&mut self, layer: Layer, parent: Option<LayerParent>) -> LayerId {
        self.insert_layer_with_icon(layer, parent, None)
    }

    fn insert_layer_with_icon(
        &mut self,
        layer: Layer,
        parent: Option<LayerParent>,
        icon: Option<Closure<dyn Fn(Layer) -> JsValue>>,
    ) -> LayerId {
        let id = LayerId(self.next());
        self.layers.insert(
            id,
            LayerEntry {
                layer,
                parent,
                children: Vec::new(),
                markers: Vec::new(),
                _icon: icon,
            },
        );
        id
    }

    /// Drop registry entries below `layer`, keeping the layer itself.
    fn forget_contents(&mut self, layer: LayerId) {
        let Some(entry) = self.layers.get_mut(&layer) else {
            return;
        };
        let markers = std::mem::take(&mut entry.markers);
        let children = std::mem::take(&mut entry.children);
        for marker in markers {
            self.markers.remove(&marker);
        }
        for child in children {
            self.forget_contents(child);
            self.layers.remove(&child);
        }
    }
}

/// Leaflet objects live in a registry keyed by the engine's typed ids,
/// together with the closures handed to them.
#[derive(Default)]
pub struct LeafletEngine {
    registry: RefCell<Registry>,
}

impl LeafletEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MapEngine for LeafletEngine {
    type Container = web_sys::HtmlElement;

    fn create_map(
        &self,
        container: &Self::Container,
        options: &MapOptions,
    ) -> Result<MapId, MapError> {
        if !leaflet_available() {
            return Err(MapError::Library("Leaflet is not loaded".into()));
        }
        let options = to_js(&LeafletMapOptions {
            center: [options.center.lat, options.center.lon],
            zoom: options.zoom,
            min_zoom: options.min_zoom,
            max_zoom: options.max_zoom,
            prefer_canvas: true,
        })?;
        let map = create_map(container, &options).map_err(js_error)?;
        let mut registry = self.registry.borrow_mut();
        let id = MapId(registry.next());
        registry.maps.insert(id, map);
        Ok(id)
    }

    fn add_tile_layer(&self, map: MapId, source: &TileSource) -> Result<LayerId, MapError> {
        let options = to_js(&TileOptions {
            attribution: source.attribution,
            max_zoom: source.max_zoom,
        })?;
        let tiles = tile_layer(source.url_template, &options).map_err(js_error)?;
        let mut registry = self.registry.borrow_mut();
        let target = registry.maps.get(&map).ok_or(MapError::Detached)?;
        tiles.add_to_map(target);
        Ok(registry.insert_layer(tiles, Some(LayerParent::Map(map))))
    }

    fn create_layer_group(&self, map: MapId) -> Result<LayerId, MapError> {
        let group = layer_group().map_err(js_error)?;
        let mut registry = self.registry.borrow_mut();
        let target = registry.maps.get(&map).ok_or(MapError::Detached)?;
        group.add_to_map(target);
        Ok(registry.insert_layer(group, Some(LayerParent::Map(map))))
    }

    fn create_cluster_group(
        &self,
        spec: &ClusterSpec,
        icon: ClusterIconFactory,
    ) -> Result<LayerId, MapError> {
        let icon_closure = Closure::<dyn Fn(Layer) -> JsValue>::new(move |cluster: Layer| {
            let children: Vec<ClusterChild> =
                cluster.all_child_markers().iter().map(|m| child_of(&m)).collect();
            let icon = icon(&children);
            let options = DivIconOptions {
                html: icon.html,
                class_name: icon.class_name,
                icon_size: [icon.size_px, icon.size_px],
                icon_anchor: [icon.size_px / 2, icon.size_px / 2],
            };
            match serde_wasm_bindgen::to_value(&options) {
                Ok(options) => div_icon(&options),
                Err(e) => {
                    log::warn!("cluster icon options: {e}");
                    JsValue::UNDEFINED
                }
            }
        });

        let options = to_js(&ClusterOptions {
            max_cluster_radius: spec.max_cluster_radius,
            disable_clustering_at_zoom: spec.disable_at_zoom,
            spiderfy_on_max_zoom: true,
            show_coverage_on_hover: false,
            chunked_loading: true,
        })?;
        js_sys::Reflect::set(
            &options,
            &JsValue::from_str("iconCreateFunction"),
            icon_closure.as_ref().unchecked_ref(),
        )
        .map_err(js_error)?;

        let group = marker_cluster_group(&options).map_err(js_error)?;
        let mut registry = self.registry.borrow_mut();
        Ok(registry.insert_layer_with_icon(group, None, Some(icon_closure)))
    }

    fn add_marker(
        &self,
        layer: LayerId,
        spec: &MarkerSpec,
        on_open: Option<PopupHandler>,
    ) -> Result<MarkerId, MapError> {
        let position = lat_lng(spec.position);
        let marker = match spec.shape {
            MarkerShape::Circle => {
                let options = to_js(&CircleOptions {
                    radius: spec.radius,
                    fill_color: spec.fill_color,
                    color: spec.stroke_color,
                    weight: spec.weight,
                    opacity: spec.opacity,
                    fill_opacity: spec.fill_opacity,
                    geodata_tag: spec.tag.as_deref(),
                    geodata_active: spec.active,
                })?;
                circle_marker(&position, &options).map_err(js_error)?
            }
            MarkerShape::Diamond => {
                // a square rotated 45° spans its diagonal
                let side = (spec.radius * 1.5).round().max(4.0) as u32;
                let extent = (f64::from(side) * std::f64::consts::SQRT_2).ceil() as u32;
                let icon = div_icon(&to_js(&DivIconOptions {
                    html: diamond_html(spec, side),
                    class_name: "geo-diamond".into(),
                    icon_size: [extent, extent],
                    icon_anchor: [extent / 2, extent / 2],
                })?);
                let options = js_sys::Object::new();
                let set = |key: &str, value: &JsValue| {
                    js_sys::Reflect::set(&options, &JsValue::from_str(key), value)
                        .map_err(js_error)
                };
                set("icon", &icon)?;
                set("opacity", &JsValue::from_f64(spec.opacity))?;
                set(
                    "geodataTag",
                    &spec.tag.as_deref().map_or(JsValue::UNDEFINED, JsValue::from_str),
                )?;
                set("geodataActive", &JsValue::from_bool(spec.active))?;
                icon_marker(&position, &options).map_err(js_error)?
            }
        };

        marker.bind_popup(
            &spec.popup_html,
            &to_js(&PopupOptions {
                max_width: 320,
                min_width: 220,
            })?,
        );

        let mut registry = self.registry.borrow_mut();
        let id = MarkerId(registry.next());
        let on_open = on_open.map(|handler| {
            let callback = Closure::<dyn Fn()>::new(move || {
                wasm_bindgen_futures::spawn_local(handler(id));
            });
            marker.on_event("popupopen", callback.as_ref().unchecked_ref());
            callback
        });
        let parent = registry.layers.get_mut(&layer).ok_or(MapError::Detached)?;
        parent.layer.add_child(&marker).map_err(js_error)?;
        parent.markers.push(id);
        registry.markers.insert(
            id,
            MarkerEntry {
                layer: marker,
                _on_open: on_open,
            },
        );
        Ok(id)
    }

    fn attach_layer(&self, parent: LayerParent, child: LayerId) -> Result<(), MapError> {
        let mut registry = self.registry.borrow_mut();
        let child_layer = registry
            .layers
            .get(&child)
            .map(|entry| entry.layer.clone())
            .ok_or(MapError::Detached)?;
        match parent {
            LayerParent::Map(map) => {
                let target = registry.maps.get(&map).ok_or(MapError::Detached)?;
                child_layer.add_to_map(target);
            }
            LayerParent::Layer(parent_id) => {
                let entry = registry
                    .layers
                    .get_mut(&parent_id)
                    .ok_or(MapError::Detached)?;
                entry.layer.add_child(&child_layer).map_err(js_error)?;
                if !entry.children.contains(&child) {
                    entry.children.push(child);
                }
            }
        }
        if let Some(entry) = registry.layers.get_mut(&child) {
            entry.parent = Some(parent);
        }
        Ok(())
    }

    fn discard_layer(&self, parent: LayerParent, child: LayerId) -> Result<(), MapError> {
        let mut registry = self.registry.borrow_mut();
        let Some(child_layer) = registry.layers.get(&child).map(|e| e.layer.clone()) else {
            return Ok(());
        };
        match parent {
            LayerParent::Map(map) => {
                if let Some(target) = registry.maps.get(&map) {
                    target.remove_map_layer(&child_layer);
                }
            }
            LayerParent::Layer(parent_id) => {
                if let Some(entry) = registry.layers.get_mut(&parent_id) {
                    entry.layer.remove_child(&child_layer);
                    entry.children.retain(|c| *c != child);
                }
            }
        }
        registry.forget_contents(child);
        registry.layers.remove(&child);
        Ok(())
    }

    fn clear_layer(&self, layer: LayerId) -> Result<(), MapError> {
        let mut registry = self.registry.borrow_mut();
        let Some(entry) = registry.layers.get(&layer) else {
            return Ok(());
        };
        let result = entry.layer.clear_layers().map_err(js_error);
        registry.forget_contents(layer);
        result
    }

    fn set_popup_content(&self, marker: MarkerId, html: &str) -> Result<(), MapError> {
        let registry = self.registry.borrow();
        let entry = registry.markers.get(&marker).ok_or(MapError::Detached)?;
        entry.layer.set_popup_content(html);
        Ok(())
    }

    fn fit_bounds(
        &self,
        map: MapId,
        area: &LatLngBounds,
        options: &FitOptions,
    ) -> Result<(), MapError> {
        let options = to_js(&ViewOptions {
            max_zoom: Some(options.max_zoom),
            animate: options.animate,
        })?;
        let registry = self.registry.borrow();
        let target = registry.maps.get(&map).ok_or(MapError::Detached)?;
        target.fit_bounds(&bounds(area), &options).map_err(js_error)
    }

    fn set_view(&self, map: MapId, center: LatLng, zoom: u8) -> Result<(), MapError> {
        let options = to_js(&ViewOptions {
            max_zoom: None,
            animate: false,
        })?;
        let registry = self.registry.borrow();
        let target = registry.maps.get(&map).ok_or(MapError::Detached)?;
        target
            .set_view(&lat_lng(center), zoom, &options)
            .map_err(js_error)
    }

    fn invalidate_size(&self, map: MapId) -> Result<(), MapError> {
        let registry = self.registry.borrow();
        let target = registry.maps.get(&map).ok_or(MapError::Detached)?;
        target
            .invalidate_size(&JsValue::from_bool(false))
            .map_err(js_error)
    }

    fn destroy_map(&self, map: MapId) -> Result<(), MapError> {
        let mut registry = self.registry.borrow_mut();
        let Some(target) = registry.maps.remove(&map) else {
            return Ok(());
        };
        let attached: Vec<LayerId> = registry
            .layers
            .iter()
            .filter(|(_, entry)| entry.parent == Some(LayerParent::Map(map)))
            .map(|(id, _)| *id)
            .collect();
        for layer in attached {
            registry.forget_contents(layer);
            registry.layers.remove(&layer);
        }
        target.off_all();
        target.remove_map().map_err(js_error)
    }

    fn on_window_resize(&self, handler: EventHandler) -> Result<ListenerId, MapError> {
        let window = web_sys::window().ok_or(MapError::Detached)?;
        let callback = Closure::<dyn Fn()>::new(move || {
            wasm_bindgen_futures::spawn_local(handler());
        });
        window
            .add_event_listener_with_callback("resize", callback.as_ref().unchecked_ref())
            .map_err(js_error)?;
        let mut registry = self.registry.borrow_mut();
        let id = ListenerId(registry.next());
        registry
            .listeners
            .insert(id, ResizeListener { window, callback });
        Ok(id)
    }

    fn remove_listener(&self, listener: ListenerId) -> Result<(), MapError> {
        let Some(entry) = self.registry.borrow_mut().listeners.remove(&listener) else {
            return Ok(());
        };
        entry
            .window
            .remove_event_listener_with_callback("resize", entry.callback.as_ref().unchecked_ref())
            .map_err(js_error)
    }
}
