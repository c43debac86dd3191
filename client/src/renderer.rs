use std::cell::Cell;
use std::rc::Rc;

use geodata_shared::colors::{text_color_on, with_alpha};
use geodata_shared::dataset::DatasetConfig;
use geodata_shared::style::value_extent;
use geodata_shared::{ClusterChild, ClusterSummary, LatLng, LatLngBounds, Record, summarize};

use crate::detail_cache::DetailSource;
use crate::engine::{
    ClusterIcon, ClusterIconFactory, FitOptions, LayerId, LayerParent, MapEngine, MarkerSpec,
    warn_on_err,
};
use crate::popup::{PopupController, escape_html, summary_html};
use crate::surface::SurfaceHandles;
use crate::timers::{AliveFlag, Timers};

/// Identifies one fetched collection. The viewport is fitted once per load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadId(pub u64);

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub load: LoadId,
    pub records: Rc<[Record]>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub clustering: bool,
    /// Only records whose category tag equals this are drawn.
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewFit {
    Bounds(LatLngBounds),
    DefaultView,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderOutcome {
    #[default]
    Completed,
    Empty,
    /// A newer rebuild started before this one finished.
    Superseded,
    /// The renderer was disposed mid-rebuild.
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderReport {
    pub received: usize,
    pub invalid_coordinates: usize,
    pub outside_region: usize,
    pub filtered_out: usize,
    pub truncated: usize,
    pub rendered: usize,
    pub fit: Option<ViewFit>,
    pub outcome: RenderOutcome,
}

pub fn cluster_icon(summary: &ClusterSummary) -> ClusterIcon {
    let px = summary.size.pixels();
    let html = format!(
        "<div title=\"{tooltip}\" style=\"width:{px}px;height:{px}px;line-height:{inner}px;\
         border-radius:50%;background:{bg};border:3px solid {color};color:{text};\
         font-weight:600;text-align:center\"><span style=\"display:inline-block;\
         width:{inner}px;border-radius:50%;background:{color}\">{count}</span></div>",
        tooltip = escape_html(&summary.tooltip),
        inner = px.saturating_sub(6),
        bg = with_alpha(summary.color, 0.35),
        color = summary.color,
        text = text_color_on(summary.color),
        count = summary.count,
    );
    ClusterIcon {
        html,
        class_name: format!("marker-cluster {}", summary.size.css_class()),
        size_px: px,
    }
}

pub fn cluster_icon_factory(config: &'static DatasetConfig) -> ClusterIconFactory {
    Rc::new(move |children: &[ClusterChild]| {
        cluster_icon(&summarize(children, &config.style, &config.cluster))
    })
}

/// Draws one dataset's records onto a ready map in cooperative batches.
pub struct MarkerBatchRenderer<E, T, S> {
    config: &'static DatasetConfig,
    engine: Rc<E>,
    timers: Rc<T>,
    popups: Rc<PopupController<E, S>>,
    generation: Cell<u64>,
    fitted: Cell<Option<LoadId>>,
    cluster: Cell<Option<LayerId>>,
    handles: Cell<Option<SurfaceHandles>>,
    alive: AliveFlag,
}

impl<E, T, S> MarkerBatchRenderer<E, T, S>
where
    E: MapEngine + 'static,
    T: Timers + 'static,
    S: DetailSource + 'static,
{
    pub fn new(
        config: &'static DatasetConfig,
        engine: Rc<E>,
        timers: Rc<T>,
        popups: Rc<PopupController<E, S>>,
    ) -> Self {
        Self {
            config,
            engine,
            timers,
            popups,
            generation: Cell::new(0),
            fitted: Cell::new(None),
            cluster: Cell::new(None),
            handles: Cell::new(None),
            alive: AliveFlag::new(),
        }
    }

    fn clear(&self, handles: SurfaceHandles) {
        if let Some(cluster) = self.cluster.take() {
            warn_on_err(
                "discard cluster group",
                self.engine
                    .discard_layer(LayerParent::Layer(handles.markers), cluster),
            );
        }
        warn_on_err("clear markers", self.engine.clear_layer(handles.markers));
    }

    /// Replace whatever is drawn with `snapshot`.
    pub async fn rebuild(
        &self,
        handles: SurfaceHandles,
        snapshot: &Snapshot,
        options: &RenderOptions,
    ) -> RenderReport {
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        let config = self.config;
        let kind = config.kind;
        let mut report = RenderReport {
            received: snapshot.records.len(),
            ..RenderReport::default()
        };

        if !self.alive.is_alive() {
            report.outcome = RenderOutcome::Cancelled;
            return report;
        }
        self.handles.set(Some(handles));
        self.clear(handles);
        if snapshot.records.is_empty() {
            log::info!("{kind}: nothing to render");
            report.outcome = RenderOutcome::Empty;
            return report;
        }

        let style = &config.style;
        let mut visible: Vec<(LatLng, &Record)> = Vec::with_capacity(snapshot.records.len());
        for record in snapshot.records.iter() {
            let Some(position) = record.position() else {
                report.invalid_coordinates += 1;
                continue;
            };
            if let Some(region) = config.region
                && !region.contains(position)
            {
                report.outside_region += 1;
                continue;
            }
            if let Some(category) = options.category.as_deref()
                && style.category_tag(record).as_deref() != Some(category)
            {
                report.filtered_out += 1;
                continue;
            }
            visible.push((position, record));
        }
        if report.invalid_coordinates > 0 || report.outside_region > 0 {
            log::warn!(
                "{kind}: skipped {} records without coordinates and {} outside the region",
                report.invalid_coordinates,
                report.outside_region
            );
        }
        if visible.len() > config.render_cap {
            report.truncated = visible.len() - config.render_cap;
            log::warn!(
                "{kind}: {} {} exceed the cap of {}; rendering the first {}",
                visible.len(),
                config.noun,
                config.render_cap,
                config.render_cap
            );
            visible.truncate(config.render_cap);
        }
        if visible.is_empty() {
            report.outcome = RenderOutcome::Empty;
            return report;
        }

        let extent = value_extent(visible.iter().map(|(_, record)| *record));
        let own_cluster = if options.clustering {
            match self
                .engine
                .create_cluster_group(&config.cluster, cluster_icon_factory(config))
            {
                Ok(cluster) => {
                    self.cluster.set(Some(cluster));
                    Some(cluster)
                }
                Err(e) => {
                    log::warn!("{kind}: clustering unavailable, drawing plain markers: {e}");
                    None
                }
            }
        } else {
            None
        };
        let target = own_cluster.unwrap_or(handles.markers);

        for (index, batch) in visible.chunks(config.batch_size.max(1)).enumerate() {
            if index > 0 {
                self.timers.sleep(0).await;
                let outcome = if !self.alive.is_alive() {
                    Some(RenderOutcome::Cancelled)
                } else if self.generation.get() != generation {
                    Some(RenderOutcome::Superseded)
                } else {
                    None
                };
                if let Some(outcome) = outcome {
                    if let Some(cluster) = own_cluster {
                        warn_on_err(
                            "discard abandoned cluster group",
                            self.engine
                                .discard_layer(LayerParent::Layer(handles.markers), cluster),
                        );
                    }
                    log::debug!("{kind}: rebuild abandoned after {} markers", report.rendered);
                    report.outcome = outcome;
                    return report;
                }
            }
            for (position, record) in batch {
                let summary = summary_html(record, config);
                let on_open = self.popups.handler_for(record, &summary);
                let spec = MarkerSpec::from_paint(*position, style.paint(record, extent), summary);
                match self.engine.add_marker(target, &spec, on_open) {
                    Ok(_) => report.rendered += 1,
                    Err(e) => log::warn!("{kind}: marker for {} not added: {e}", record.name),
                }
            }
        }

        if let Some(cluster) = own_cluster {
            warn_on_err(
                "attach cluster group",
                self.engine
                    .attach_layer(LayerParent::Layer(handles.markers), cluster),
            );
        }

        if self.fitted.get() != Some(snapshot.load) {
            self.fitted.set(Some(snapshot.load));
            report.fit = Some(self.fit(handles, &visible));
        }
        log::info!("{kind}: rendered {} {}", report.rendered, config.noun);
        report
    }

    fn fit(&self, handles: SurfaceHandles, visible: &[(LatLng, &Record)]) -> ViewFit {
        let config = self.config;
        match LatLngBounds::from_points(visible.iter().map(|(position, _)| *position)) {
            Some(bounds) if !bounds.is_degenerate() => {
                let padded = bounds.pad(config.fit_padding);
                warn_on_err(
                    "fit bounds",
                    self.engine.fit_bounds(
                        handles.map,
                        &padded,
                        &FitOptions {
                            max_zoom: config.fit_max_zoom,
                            animate: false,
                        },
                    ),
                );
                ViewFit::Bounds(padded)
            }
            _ => {
                warn_on_err(
                    "set default view",
                    self.engine
                        .set_view(handles.map, config.default_center, config.default_zoom),
                );
                ViewFit::DefaultView
            }
        }
    }

    /// Stop any rebuild in progress and remove what was drawn.
    pub fn dispose(&self) {
        self.alive.kill();
        if let Some(handles) = self.handles.take() {
            self.clear(handles);
        }
    }
}
