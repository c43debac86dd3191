use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use futures::FutureExt;
use geodata_shared::colors::with_alpha;
use geodata_shared::dataset::DatasetConfig;
use geodata_shared::{DetailRecord, EntityId, Metric, Record};

use crate::detail_cache::{DetailCache, DetailLookup, DetailSource};
use crate::engine::{MapEngine, MarkerId, PopupHandler};
use crate::timers::AliveFlag;

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Integral values print without decimals, others with one.
pub fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

fn metric_text(metric: &Metric) -> String {
    let value = format_value(metric.value);
    match metric.unit.as_deref() {
        Some(unit) => format!("{} {}", value, escape_html(unit)),
        None => value,
    }
}

/// Light popup built synchronously from the list record.
pub fn summary_html(record: &Record, config: &DatasetConfig) -> String {
    let style = &config.style;
    let tag = style.category_tag(record);
    let color = style.color_for_tag(tag.as_deref());
    let label = style.label_for_tag(tag.as_deref());
    let value = record.value.map_or_else(|| "N/A".to_string(), format_value);
    let unit = style.value_unit.map(|u| format!(" {u}")).unwrap_or_default();

    let mut html = String::new();
    let _ = write!(
        html,
        "<div class=\"geo-popup\"><div class=\"geo-popup-head\">\
         <span class=\"geo-popup-swatch\" style=\"background:{color}\"></span>\
         <div><h4>{}</h4>",
        escape_html(&record.name)
    );
    if let Some(subtitle) = &record.subtitle {
        let _ = write!(html, "<p class=\"geo-popup-sub\">{}</p>", escape_html(subtitle));
    }
    let _ = write!(
        html,
        "</div></div><div class=\"geo-popup-value\" style=\"background:{};border:1px solid {color}\">\
         <strong style=\"color:{color}\">{}: {value}{unit}</strong> · {}</div>",
        with_alpha(color, 0.12),
        escape_html(style.value_label),
        escape_html(label)
    );
    if style.tracks_activity && !record.active {
        html.push_str("<p class=\"geo-popup-inactive\">Inactive station</p>");
    }
    if config.endpoints.detail.is_some() && record.id.is_some() {
        html.push_str("<p class=\"geo-popup-hint\">Loading full details on open…</p>");
    }
    html.push_str("</div>");
    html
}

pub fn loading_html() -> String {
    "<div class=\"geo-popup geo-popup-loading\"><span class=\"geo-spinner\"></span> Loading details…</div>"
        .to_string()
}

pub fn detail_html(detail: &DetailRecord, config: &DatasetConfig) -> String {
    let style = &config.style;
    let tag = detail.category.as_deref().map(|raw| {
        style
            .category_tag(&Record {
                category: Some(raw.to_string()),
                ..Record::default()
            })
            .unwrap_or_else(|| raw.to_string())
    });
    let color = style.color_for_tag(tag.as_deref());

    let mut html = String::new();
    let _ = write!(
        html,
        "<div class=\"geo-popup geo-popup-detail\"><div class=\"geo-popup-head\">\
         <span class=\"geo-popup-swatch\" style=\"background:{color}\"></span>\
         <div><h3>{}</h3>",
        escape_html(&detail.name)
    );
    if let Some(subtitle) = &detail.subtitle {
        let _ = write!(html, "<p class=\"geo-popup-sub\">{}</p>", escape_html(subtitle));
    }
    html.push_str("</div></div>");

    if tag.is_some() || detail.headline.is_some() {
        let _ = write!(
            html,
            "<div class=\"geo-popup-value\" style=\"background:{};border:1px solid {color}\">",
            with_alpha(color, 0.12)
        );
        if let Some(tag) = tag.as_deref() {
            let _ = write!(
                html,
                "<strong style=\"color:{color}\">{}</strong>",
                escape_html(style.label_for_tag(Some(tag)))
            );
        }
        if let Some(headline) = &detail.headline {
            let _ = write!(
                html,
                "<div>{}: <strong>{}</strong></div>",
                escape_html(&headline.label),
                metric_text(headline)
            );
        }
        html.push_str("</div>");
    }

    let coords = match (detail.lat, detail.lon) {
        (Some(lat), Some(lon)) => format!("{lat:.4}, {lon:.4}"),
        _ => "N/A".to_string(),
    };
    let _ = write!(
        html,
        "<div class=\"geo-popup-coords\"><strong>Coordinates</strong><br/>{coords}</div>"
    );

    if !detail.breakdown.is_empty() {
        html.push_str("<ul class=\"geo-popup-breakdown\">");
        for metric in &detail.breakdown {
            let _ = write!(
                html,
                "<li><span>{}</span><strong>{}</strong></li>",
                escape_html(&metric.label),
                metric_text(metric)
            );
        }
        html.push_str("</ul>");
    }

    if !detail.tags.is_empty() {
        html.push_str("<div class=\"geo-popup-tags\">");
        for tag in &detail.tags {
            let _ = write!(html, "<span class=\"badge\">{}</span>", escape_html(tag));
        }
        html.push_str("</div>");
    }

    if let Some(recommendation) = &detail.recommendation {
        let _ = write!(
            html,
            "<div class=\"geo-popup-note\" style=\"border-left:3px solid {color}\">\
             <strong>Recommendation</strong><div>{}</div></div>",
            escape_html(recommendation)
        );
    }

    let mut footer = Vec::new();
    if detail.is_mock {
        footer.push("Simulated data".to_string());
    } else if let Some(source) = &detail.source {
        footer.push(format!("Source: {}", escape_html(source)));
    }
    if let Some(updated) = detail.updated_at {
        footer.push(format!("Updated {}", updated.format("%Y-%m-%d %H:%M UTC")));
    }
    if !footer.is_empty() {
        let _ = write!(
            html,
            "<div class=\"geo-popup-footer\">{}</div>",
            footer.join(" · ")
        );
    }
    html.push_str("</div>");
    html
}

/// Summary content with an inline notice appended.
pub fn error_html(summary: &str) -> String {
    format!("{summary}<p class=\"geo-popup-error\">Could not load details</p>")
}

/// Immutable snapshot taken when the marker is registered.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupContext {
    pub id: Option<EntityId>,
    pub summary_html: String,
}

/// Swaps popup content as details resolve.
pub struct PopupController<E, S> {
    engine: Rc<E>,
    cache: Rc<DetailCache<S>>,
    config: &'static DatasetConfig,
    resolved: RefCell<HashMap<EntityId, Rc<DetailRecord>>>,
    alive: AliveFlag,
}

impl<E, S> PopupController<E, S>
where
    E: MapEngine + 'static,
    S: DetailSource + 'static,
{
    pub fn new(engine: Rc<E>, cache: Rc<DetailCache<S>>) -> Rc<Self> {
        let config = cache.kind().config();
        Rc::new(Self {
            engine,
            cache,
            config,
            resolved: RefCell::new(HashMap::new()),
            alive: AliveFlag::new(),
        })
    }

    /// Popup-open handler for `record`, or `None` when it has nothing to
    /// fetch.
    pub fn handler_for(self: &Rc<Self>, record: &Record, summary_html: &str) -> Option<PopupHandler> {
        self.config.endpoints.detail?;
        let context = Rc::new(PopupContext {
            id: Some(record.id.clone()?),
            summary_html: summary_html.to_string(),
        });
        let weak = Rc::downgrade(self);
        Some(Rc::new(move |marker: MarkerId| {
            let weak = weak.clone();
            let context = context.clone();
            async move {
                if let Some(controller) = weak.upgrade() {
                    controller.open(marker, context).await;
                }
            }
            .boxed_local()
        }))
    }

    fn show(&self, marker: MarkerId, html: &str) {
        if let Err(e) = self.engine.set_popup_content(marker, html) {
            log::debug!("popup content not applied: {e}");
        }
    }

    pub async fn open(&self, marker: MarkerId, context: Rc<PopupContext>) {
        let Some(id) = context.id.as_ref() else {
            return;
        };
        let resolved = self.resolved.borrow().get(id).cloned();
        if let Some(detail) = resolved {
            self.show(marker, &detail_html(&detail, self.config));
            return;
        }

        self.show(marker, &loading_html());
        let lookup = self.cache.fetch(id).await;
        if !self.alive.is_alive() {
            return;
        }
        match lookup {
            DetailLookup::Fetched(detail) => {
                let detail = Rc::new(detail);
                self.resolved
                    .borrow_mut()
                    .insert(id.clone(), detail.clone());
                self.show(marker, &detail_html(&detail, self.config));
            }
            DetailLookup::AlreadyFetched | DetailLookup::InFlight => {
                let resolved = self.resolved.borrow().get(id).cloned();
                match resolved {
                    Some(detail) => self.show(marker, &detail_html(&detail, self.config)),
                    None => self.show(marker, &context.summary_html),
                }
            }
            DetailLookup::Failed(_) => self.show(marker, &error_html(&context.summary_html)),
            DetailLookup::Discarded => {}
        }
    }

    pub fn dispose(&self) {
        self.alive.kill();
        self.resolved.borrow_mut().clear();
        self.cache.dispose();
    }
}
