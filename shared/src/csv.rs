use chrono::NaiveDate;
use serde_json::{Map, Number, Value};

use crate::dataset::{DatasetConfig, ExportField};
use crate::record::Record;

/// Render rows as CSV. The header is the first row's keys in insertion
/// order; later rows are written in their own key order. Strings containing
/// a comma are wrapped in double quotes and nothing else is escaped.
pub fn to_csv(rows: &[Map<String, Value>]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        first
            .keys()
            .map(|k| quote_if_comma(k))
            .collect::<Vec<_>>()
            .join(","),
    );
    for row in rows {
        lines.push(row.values().map(cell).collect::<Vec<_>>().join(","));
    }
    lines.join("\n")
}

fn quote_if_comma(s: &str) -> String {
    if s.contains(',') {
        format!("\"{s}\"")
    } else {
        s.to_string()
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_if_comma(s),
        other => quote_if_comma(&other.to_string()),
    }
}

/// `{slug}_{YYYY-MM-DD}.csv`
pub fn export_file_name(slug: &str, date: NaiveDate) -> String {
    format!("{slug}_{}.csv", date.format("%Y-%m-%d"))
}

fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

/// Build export rows for `records` using the dataset's column table.
pub fn export_rows(config: &DatasetConfig, records: &[Record]) -> Vec<Map<String, Value>> {
    let missing = || Value::String(config.export_missing.to_string());
    records
        .iter()
        .map(|record| {
            let mut row = Map::new();
            for column in config.export_columns {
                let value = match column.field {
                    ExportField::Id => record
                        .id
                        .as_ref()
                        .map_or_else(missing, |id| Value::String(id.to_string())),
                    ExportField::Name => Value::String(record.name.clone()),
                    ExportField::Subtitle => record
                        .subtitle
                        .clone()
                        .map_or_else(missing, Value::String),
                    ExportField::Status => Value::String(
                        if record.active { "Activa" } else { "Inactiva" }.to_string(),
                    ),
                    ExportField::Value => record.value.map_or_else(missing, number),
                    ExportField::Category => {
                        let tag = config.style.category_tag(record);
                        tag.map_or_else(missing, Value::String)
                    }
                    ExportField::CategoryLabel => {
                        let tag = config.style.category_tag(record);
                        Value::String(config.style.label_for_tag(tag.as_deref()).to_string())
                    }
                    ExportField::Lat => record.lat.map_or(Value::Null, number),
                    ExportField::Lon => record.lon.map_or(Value::Null, number),
                };
                row.insert(column.header.to_string(), value);
            }
            row
        })
        .collect()
}
