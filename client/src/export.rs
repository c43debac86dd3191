use chrono::NaiveDate;
use geodata_shared::Record;
use geodata_shared::csv::{export_file_name, export_rows, to_csv};
use geodata_shared::dataset::DatasetConfig;
use wasm_bindgen::{JsCast, JsValue};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExportError {
    #[error("nothing to export")]
    Empty,
    #[error("browser API failed: {0}")]
    Browser(String),
}

impl From<JsValue> for ExportError {
    fn from(e: JsValue) -> Self {
        ExportError::Browser(format!("{e:?}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    pub file_name: String,
    pub body: String,
    pub rows: usize,
}

/// Records currently shown under `category`, in input order.
pub fn visible_records<'a>(
    config: &DatasetConfig,
    records: &'a [Record],
    category: Option<&str>,
) -> Vec<&'a Record> {
    records
        .iter()
        .filter(|record| {
            category.is_none_or(|c| config.style.category_tag(record).as_deref() == Some(c))
        })
        .collect()
}

pub fn prepare(
    config: &DatasetConfig,
    records: &[Record],
    category: Option<&str>,
    today: NaiveDate,
) -> Result<CsvExport, ExportError> {
    let visible: Vec<Record> = visible_records(config, records, category)
        .into_iter()
        .cloned()
        .collect();
    if visible.is_empty() {
        return Err(ExportError::Empty);
    }
    let rows = export_rows(config, &visible);
    Ok(CsvExport {
        file_name: export_file_name(config.export_slug, today),
        body: to_csv(&rows),
        rows: rows.len(),
    })
}

/// Hand `export` to the browser as a file download.
pub fn download(export: &CsvExport) -> Result<(), ExportError> {
    let window = web_sys::window().ok_or_else(|| ExportError::Browser("no window".into()))?;
    let document = window
        .document()
        .ok_or_else(|| ExportError::Browser("no document".into()))?;
    let body = document
        .body()
        .ok_or_else(|| ExportError::Browser("no body".into()))?;

    let parts = js_sys::Array::of1(&JsValue::from_str(&export.body));
    let options = web_sys::BlobPropertyBag::new();
    options.set_type("text/csv;charset=utf-8;");
    let blob = web_sys::Blob::new_with_str_sequence_and_options(&parts, &options)?;
    let url = web_sys::Url::create_object_url_with_blob(&blob)?;

    let anchor: web_sys::HtmlAnchorElement = document
        .create_element("a")?
        .dyn_into()
        .map_err(JsValue::from)?;
    anchor.set_href(&url);
    anchor.set_download(&export.file_name);
    anchor.style().set_property("visibility", "hidden")?;
    body.append_child(&anchor)?;
    anchor.click();
    anchor.remove();
    web_sys::Url::revoke_object_url(&url)?;
    log::info!("exported {} rows to {}", export.rows, export.file_name);
    Ok(())
}
