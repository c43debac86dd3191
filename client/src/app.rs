use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use gloo_storage::Storage;
use leptos::html::Div;
use leptos::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;

use geodata_shared::style::LegendEntry;
use geodata_shared::{DatasetKind, MarkerShape};

use crate::api::{ApiClient, ListQuery, filters_server_side};
use crate::config::SETTINGS_STORAGE_KEY;
use crate::detail_cache::DetailCache;
use crate::export;
use crate::leaflet::LeafletEngine;
use crate::popup::PopupController;
use crate::renderer::{
    LoadId, MarkerBatchRenderer, RenderOptions, RenderOutcome, RenderReport, Snapshot,
};
use crate::surface::{MapSurface, SurfaceHandles};
use crate::timers::{AliveFlag, BrowserTimers};

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
struct Settings {
    dataset: DatasetKind,
    clustering: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dataset: DatasetKind::AirQuality,
            clustering: true,
        }
    }
}

/// Status line under the map.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewStatus {
    Idle,
    Loading(DatasetKind),
    Ready {
        kind: DatasetKind,
        report: RenderReport,
        total: Option<usize>,
        is_mock: bool,
    },
    Failed(String),
}

impl fmt::Display for ViewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewStatus::Idle => Ok(()),
            ViewStatus::Loading(kind) => write!(f, "Loading {}…", kind.title()),
            ViewStatus::Ready {
                kind,
                report,
                total,
                is_mock,
            } => {
                let noun = kind.config().noun;
                write!(f, "{} of {} {noun} on the map", report.rendered, report.received)?;
                if let Some(total) = total.filter(|t| *t > report.received) {
                    write!(f, " ({total} available)")?;
                }
                let excluded = report.invalid_coordinates + report.outside_region;
                if excluded > 0 {
                    write!(f, " · {excluded} without usable coordinates")?;
                }
                if report.truncated > 0 {
                    write!(f, " · capped at {}", kind.config().render_cap)?;
                }
                if *is_mock {
                    write!(f, " · simulated data")?;
                }
                Ok(())
            }
            ViewStatus::Failed(message) => write!(f, "Error: {message}"),
        }
    }
}

type Renderer = MarkerBatchRenderer<LeafletEngine, BrowserTimers, ApiClient>;

/// Everything one mounted dataset view owns.
struct LiveView {
    panel: u64,
    kind: DatasetKind,
    surface: MapSurface<LeafletEngine, BrowserTimers>,
    renderer: Rc<Renderer>,
    popups: Rc<PopupController<LeafletEngine, ApiClient>>,
    api: Rc<ApiClient>,
    handles: Cell<Option<SurfaceHandles>>,
    /// Most recent collection request; older responses are dropped.
    latest_load: Cell<Option<LoadId>>,
    snapshot: RefCell<Option<Snapshot>>,
    alive: AliveFlag,
}

impl LiveView {
    async fn render(&self, options: &RenderOptions) -> Option<RenderReport> {
        let handles = self.handles.get()?;
        let snapshot = self.snapshot.borrow().clone()?;
        let report = self.renderer.rebuild(handles, &snapshot, options).await;
        match report.outcome {
            RenderOutcome::Superseded | RenderOutcome::Cancelled => None,
            RenderOutcome::Completed | RenderOutcome::Empty => Some(report),
        }
    }

    fn release(&self) {
        self.alive.kill();
        self.renderer.dispose();
        self.popups.dispose();
        self.surface.teardown();
        log::debug!("{}: view released", self.kind);
    }
}

thread_local! {
    static LIVE_VIEW: RefCell<Option<Rc<LiveView>>> = const { RefCell::new(None) };
    static NEXT_LOAD: Cell<u64> = const { Cell::new(0) };
}

fn next_load() -> LoadId {
    NEXT_LOAD.with(|n| {
        n.set(n.get() + 1);
        LoadId(n.get())
    })
}

fn current_view() -> Option<Rc<LiveView>> {
    LIVE_VIEW.with(|slot| slot.borrow().clone())
}

fn release_view(panel: Option<u64>) {
    let released = LIVE_VIEW.with(|slot| {
        let mut slot = slot.borrow_mut();
        if panel.is_some_and(|p| slot.as_ref().is_some_and(|v| v.panel != p)) {
            return None;
        }
        slot.take()
    });
    if let Some(view) = released {
        view.release();
    }
}

#[derive(Clone, Copy)]
struct ViewSignals {
    clustering: RwSignal<bool>,
    category: RwSignal<Option<String>>,
    status: RwSignal<ViewStatus>,
}

impl ViewSignals {
    fn options(&self) -> RenderOptions {
        RenderOptions {
            clustering: self.clustering.get_untracked(),
            category: self.category.get_untracked(),
        }
    }
}

fn start_view(panel: u64, kind: DatasetKind, container: web_sys::HtmlElement, signals: ViewSignals) {
    release_view(None);

    let engine = Rc::new(LeafletEngine::new());
    let timers = Rc::new(BrowserTimers);
    let api = Rc::new(ApiClient::from_config());
    let cache = Rc::new(DetailCache::new(kind, api.clone()));
    let popups = PopupController::new(engine.clone(), cache);
    let renderer = Rc::new(MarkerBatchRenderer::new(
        kind.config(),
        engine.clone(),
        timers.clone(),
        popups.clone(),
    ));
    let view = Rc::new(LiveView {
        panel,
        kind,
        surface: MapSurface::new(engine, timers),
        renderer,
        popups,
        api,
        handles: Cell::new(None),
        latest_load: Cell::new(None),
        snapshot: RefCell::new(None),
        alive: AliveFlag::new(),
    });
    LIVE_VIEW.with(|slot| *slot.borrow_mut() = Some(view.clone()));
    signals.status.set(ViewStatus::Loading(kind));

    spawn_local(async move {
        let Some(handles) = view.surface.mount(&container).await else {
            if view.alive.is_alive() {
                signals
                    .status
                    .set(ViewStatus::Failed("the map could not be created".into()));
            }
            return;
        };
        view.handles.set(Some(handles));
        load(view, signals).await;
    });
}

/// Fetch the dataset's first page under the selected category and draw it.
async fn load(view: Rc<LiveView>, signals: ViewSignals) {
    let kind = view.kind;
    let load_id = next_load();
    view.latest_load.set(Some(load_id));
    let query = ListQuery::first_page(kind).with_category(signals.category.get_untracked());

    let result = view.api.fetch_collection(kind, &query).await;
    if !view.alive.is_alive() || view.latest_load.get() != Some(load_id) {
        return;
    }
    let collection = match result {
        Ok(collection) => collection,
        Err(e) => {
            log::error!("{kind}: loading failed: {e}");
            signals.status.set(ViewStatus::Failed(e.to_string()));
            return;
        }
    };
    let total = collection.total;
    let is_mock = collection.is_mock;
    *view.snapshot.borrow_mut() = Some(Snapshot {
        load: load_id,
        records: collection.records.into(),
    });

    if let Some(report) = view.render(&signals.options()).await
        && view.alive.is_alive()
    {
        signals.status.set(ViewStatus::Ready {
            kind,
            report,
            total,
            is_mock,
        });
    }
}

/// Category changed: refetch when the backend filters, otherwise redraw.
fn refilter(signals: ViewSignals) {
    let Some(view) = current_view() else {
        return;
    };
    if view.snapshot.borrow().is_none() {
        return;
    }
    if !filters_server_side(view.kind) {
        rerender(signals);
        return;
    }
    signals.status.set(ViewStatus::Loading(view.kind));
    spawn_local(load(view, signals));
}

fn rerender(signals: ViewSignals) {
    let Some(view) = current_view() else {
        return;
    };
    if view.snapshot.borrow().is_none() {
        return;
    }
    let options = signals.options();
    spawn_local(async move {
        let previous = signals.status.get_untracked();
        if let Some(report) = view.render(&options).await
            && view.alive.is_alive()
        {
            let (total, is_mock) = match previous {
                ViewStatus::Ready { total, is_mock, .. } => (total, is_mock),
                _ => (None, false),
            };
            signals.status.set(ViewStatus::Ready {
                kind: view.kind,
                report,
                total,
                is_mock,
            });
        }
    });
}

fn export_current(category: Option<String>) {
    let Some(view) = current_view() else {
        return;
    };
    let Some(snapshot) = view.snapshot.borrow().clone() else {
        return;
    };
    let today = chrono::Utc::now().date_naive();
    let result = export::prepare(
        view.kind.config(),
        &snapshot.records,
        category.as_deref(),
        today,
    )
    .and_then(|csv| export::download(&csv));
    if let Err(e) = result {
        log::warn!("{}: export failed: {e}", view.kind);
    }
}

/// Root component: dataset tabs, map controls, the map and its status line.
#[component]
pub fn App() -> impl IntoView {
    let saved: Settings = gloo_storage::LocalStorage::get(SETTINGS_STORAGE_KEY).unwrap_or_default();
    let dataset: RwSignal<DatasetKind> = RwSignal::new(saved.dataset);
    let signals = ViewSignals {
        clustering: RwSignal::new(saved.clustering),
        category: RwSignal::new(None),
        status: RwSignal::new(ViewStatus::Idle),
    };

    Effect::new(move || {
        let settings = Settings {
            dataset: dataset.get(),
            clustering: signals.clustering.get(),
        };
        let _ = gloo_storage::LocalStorage::set(SETTINGS_STORAGE_KEY, &settings);
    });

    let select_dataset = move |kind: DatasetKind| {
        if dataset.get_untracked() != kind {
            signals.category.set(None);
            signals.clustering.set(kind.config().clustering);
            dataset.set(kind);
        }
    };

    let on_category = move |e: leptos::ev::Event| {
        let Some(target) = e.target() else {
            return;
        };
        let Ok(select) = target.dyn_into::<web_sys::HtmlSelectElement>() else {
            return;
        };
        let value = select.value();
        signals
            .category
            .set(if value.is_empty() { None } else { Some(value) });
    };

    view! {
        <div style="display: flex; flex-direction: column; height: 100vh; background: #0f1117; color: #e2e0d8; font-family: 'Inter', system-ui, sans-serif;">
            <header style="display: flex; align-items: center; gap: 12px; padding: 8px 12px; border-bottom: 1px solid #282c3e; flex-wrap: wrap;">
                <div style="display: inline-flex; background: #1a1d2a; border: 1px solid #282c3e; border-radius: 4px; overflow: hidden;">
                    {DatasetKind::ALL
                        .iter()
                        .map(|&kind| {
                            view! {
                                <button
                                    style=move || {
                                        let active = dataset.get() == kind;
                                        format!(
                                            "padding: 6px 12px; border: none; background: {}; color: {}; font-size: 0.8rem; cursor: pointer;",
                                            if active { "rgba(59,130,246,0.18)" } else { "transparent" },
                                            if active { "#93c5fd" } else { "#7c829e" },
                                        )
                                    }
                                    on:click=move |_| select_dataset(kind)
                                >
                                    {kind.title()}
                                </button>
                            }
                        })
                        .collect_view()}
                </div>
                <label style="display: inline-flex; align-items: center; gap: 6px; font-size: 0.8rem; color: #9a9590;">
                    <input
                        type="checkbox"
                        prop:checked=move || signals.clustering.get()
                        on:change=move |_| signals.clustering.update(|v| *v = !*v)
                    />
                    "Cluster markers"
                </label>
                {move || {
                    let kind = dataset.get();
                    let choices = kind.config().style.filter_choices();
                    view! {
                        <select
                            on:change=on_category
                            style="background: #1a1d2a; border: 1px solid #282c3e; border-radius: 4px; color: #e2e0d8; font-size: 0.75rem; padding: 4px 6px;"
                        >
                            <option value="" selected=move || signals.category.get().is_none()>
                                "All categories"
                            </option>
                            {choices
                                .into_iter()
                                .map(|(tag, label)| {
                                    view! {
                                        <option
                                            value=tag
                                            selected=move || signals.category.get().as_deref() == Some(tag)
                                        >
                                            {label}
                                        </option>
                                    }
                                })
                                .collect_view()}
                        </select>
                    }
                }}
                <button
                    style="margin-left: auto; padding: 6px 12px; background: #1a1d2a; border: 1px solid #282c3e; border-radius: 4px; color: #e2e0d8; font-size: 0.8rem; cursor: pointer;"
                    on:click=move |_| export_current(signals.category.get_untracked())
                >
                    "Export CSV"
                </button>
            </header>
            {move || view! { <Legend kind=dataset.get() /> }}
            {move || {
                let kind = dataset.get();
                view! { <MapPanel kind=kind signals=signals /> }.into_any()
            }}
            <footer style="padding: 6px 12px; border-top: 1px solid #282c3e; font-size: 0.75rem; color: #9a9590; min-height: 1.5em;">
                {move || signals.status.get().to_string()}
            </footer>
        </div>
    }
}

/// Inline style of one legend swatch; inactive entities show as an
/// outlined diamond like their markers.
fn legend_swatch_style(entry: &LegendEntry) -> String {
    match entry.shape {
        MarkerShape::Circle => format!(
            "width: 12px; height: 12px; border-radius: 50%; background: {};",
            entry.color
        ),
        MarkerShape::Diamond => format!(
            "width: 10px; height: 10px; margin: 1px; transform: rotate(45deg); opacity: 0.85; border: 2px solid {};",
            entry.color
        ),
    }
}

#[component]
fn Legend(kind: DatasetKind) -> impl IntoView {
    let entries = kind.config().style.legend();
    view! {
        <div style="display: flex; flex-wrap: wrap; gap: 12px; padding: 6px 12px; border-bottom: 1px solid #282c3e; font-size: 0.75rem; color: #9a9590;">
            {entries
                .into_iter()
                .map(|entry| {
                    view! {
                        <span style="display: inline-flex; align-items: center; gap: 6px;">
                            <span style={legend_swatch_style(&entry)}></span>
                            {entry.label}
                        </span>
                    }
                })
                .collect_view()}
        </div>
    }
}

thread_local! {
    static NEXT_PANEL: Cell<u64> = const { Cell::new(0) };
}

/// One dataset's map. Recreated whenever the dataset changes.
#[component]
fn MapPanel(kind: DatasetKind, signals: ViewSignals) -> impl IntoView {
    let panel = NEXT_PANEL.with(|n| {
        n.set(n.get() + 1);
        n.get()
    });
    let container = NodeRef::<Div>::new();

    Effect::new(move || {
        let Some(div) = container.get() else {
            return;
        };
        start_view(panel, kind, div.into(), signals);
    });

    Effect::new(move || {
        signals.clustering.track();
        rerender(signals);
    });

    Effect::new(move || {
        signals.category.track();
        refilter(signals);
    });

    on_cleanup(move || release_view(Some(panel)));

    view! {
        <div node_ref=container style="flex: 1; min-height: 400px; width: 100%;"></div>
    }
}
