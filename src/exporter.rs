//! CSV and JSON text for download, and the matching importers.
//!
//! Output text is handed to the host's download trigger; nothing here touches
//! the filesystem. CSV goes through the `csv` crate in both directions, so
//! cells containing commas, quotes or newlines survive a round trip.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::app_response::AppResponse;
use crate::field_value::FieldKind;
use crate::local_db_model::Record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Header text.
    pub label: String,
    /// Record field, dotted paths allowed.
    pub field: String,
    /// Used when importing to type the cell.
    #[serde(default)]
    pub kind: FieldKind,
}

impl Column {
    pub fn new(label: &str, field: &str) -> Self {
        Column {
            label: label.to_string(),
            field: field.to_string(),
            kind: FieldKind::Auto,
        }
    }

    pub fn typed(label: &str, field: &str, kind: FieldKind) -> Self {
        Column {
            label: label.to_string(),
            field: field.to_string(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportFormat {
    Csv,
    Json,
}

/// Header row of labels, then one row per record.
pub fn to_csv<'a, T, I>(records: I, columns: &[Column]) -> Result<String, AppResponse>
where
    T: Record + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(columns.iter().map(|c| c.label.as_str()))?;
    for record in records {
        writer.write_record(columns.iter().map(|c| record.field(&c.field).display_text()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppResponse::SerializationError(format!("Failed to flush CSV output: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| AppResponse::SerializationError(format!("CSV output is not UTF-8: {e}")))
}

/// Pretty-printed JSON array of the records.
pub fn to_json<'a, T, I>(records: I) -> Result<String, AppResponse>
where
    T: Record + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let records: Vec<&T> = records.into_iter().collect();
    Ok(serde_json::to_string_pretty(&records)?)
}

/// Parses an uploaded CSV file.
///
/// Headers are matched to columns by label (case-insensitive) or by field
/// name; unknown headers are ignored. With no columns, every header becomes a
/// text field of the same name. The whole file is rejected on the first bad
/// row, with the row number in the message.
pub fn from_csv<T: Record>(text: &str, columns: &[Column]) -> Result<Vec<T>, AppResponse> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let inferred: Vec<Column>;
    let columns = if columns.is_empty() {
        inferred = headers.iter().map(|h| Column::new(h, h)).collect();
        &inferred[..]
    } else {
        columns
    };

    let mapping: Vec<Option<&Column>> = headers
        .iter()
        .map(|header| {
            columns
                .iter()
                .find(|c| c.label.eq_ignore_ascii_case(header) || c.field == header)
        })
        .collect();

    if !mapping.iter().flatten().any(|c| c.field == "id") {
        return Err(AppResponse::ValidationError(
            "CSV file has no column mapped to 'id'".to_string(),
        ));
    }

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        // Header is line 1.
        let line = index + 2;
        let row = row.map_err(|e| AppResponse::SerializationError(format!("Row {line}: {e}")))?;

        let mut object = Map::new();
        for (cell, column) in row.iter().zip(&mapping) {
            let Some(column) = column else { continue };
            let value = cell_value(cell, column.kind).map_err(|msg| {
                AppResponse::SerializationError(format!("Row {line}, column '{}': {msg}", column.label))
            })?;
            insert_path(&mut object, &column.field, value);
        }

        let record: T = serde_json::from_value(JsonValue::Object(object))
            .map_err(|e| AppResponse::SerializationError(format!("Row {line}: {e}")))?;
        if record.id().trim().is_empty() {
            return Err(AppResponse::ValidationError(format!("Row {line}: empty id")));
        }
        records.push(record);
    }
    Ok(records)
}

/// Parses a JSON export: a bare array, or an object with a `records` array.
pub fn from_json<T: Record>(text: &str) -> Result<Vec<T>, AppResponse> {
    let value: JsonValue = serde_json::from_str(text)?;
    let items = match value {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut object) => match object.remove("records") {
            Some(JsonValue::Array(items)) => items,
            _ => {
                return Err(AppResponse::SerializationError(
                    "Expected a JSON array or an object with a 'records' array".to_string(),
                ))
            }
        },
        _ => {
            return Err(AppResponse::SerializationError(
                "Expected a JSON array of records".to_string(),
            ))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<T>(item)
                .map_err(|e| AppResponse::SerializationError(format!("Record {index}: {e}")))
        })
        .collect()
}

pub fn parse_import<T: Record>(
    format: ImportFormat,
    text: &str,
    columns: &[Column],
) -> Result<Vec<T>, AppResponse> {
    match format {
        ImportFormat::Csv => from_csv(text, columns),
        ImportFormat::Json => from_json(text),
    }
}

fn cell_value(cell: &str, kind: FieldKind) -> Result<JsonValue, String> {
    if cell.is_empty() {
        return Ok(match kind {
            FieldKind::List => JsonValue::Array(Vec::new()),
            _ => JsonValue::Null,
        });
    }
    match kind {
        FieldKind::Number => {
            let number = cell.trim();
            if let Ok(int) = number.parse::<i64>() {
                return Ok(JsonValue::from(int));
            }
            number
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(JsonValue::Number)
                .ok_or_else(|| format!("'{cell}' is not a number"))
        }
        FieldKind::Bool => match cell.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(JsonValue::Bool(true)),
            "false" | "no" | "0" => Ok(JsonValue::Bool(false)),
            _ => Err(format!("'{cell}' is not a boolean")),
        },
        FieldKind::List => Ok(JsonValue::Array(
            cell.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| JsonValue::String(s.to_string()))
                .collect(),
        )),
        FieldKind::Auto | FieldKind::Text | FieldKind::Date => Ok(JsonValue::String(cell.to_string())),
    }
}

fn insert_path(object: &mut Map<String, JsonValue>, path: &str, value: JsonValue) {
    match path.split_once('.') {
        None => {
            object.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = object
                .entry(head.to_string())
                .or_insert_with(|| JsonValue::Object(Map::new()));
            if !child.is_object() {
                *child = JsonValue::Object(Map::new());
            }
            if let JsonValue::Object(child) = child {
                insert_path(child, rest, value);
            }
        }
    }
}
