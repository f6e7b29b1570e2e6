use rusqlite::types::Value as SqlValue;
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn text(name: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        kind: ColumnKind::Text,
    }
}

const fn integer(name: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        kind: ColumnKind::Integer,
    }
}

const fn boolean(name: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        kind: ColumnKind::Boolean,
    }
}

/// Every `pokemon` column an upsert may set. Key columns, `id` and `captured_at` are excluded.
pub const WRITABLE_COLUMNS: &[ColumnSpec] = &[
    text("species_name"),
    integer("dex_number"),
    text("form_name"),
    text("nickname"),
    integer("level"),
    text("nature"),
    text("ability"),
    boolean("is_shiny"),
    text("gender"),
    text("held_item"),
    text("mark"),
    integer("iv_hp"),
    integer("iv_atk"),
    integer("iv_def"),
    integer("iv_spatk"),
    integer("iv_spdef"),
    integer("iv_speed"),
    integer("ev_hp"),
    integer("ev_atk"),
    integer("ev_def"),
    integer("ev_spatk"),
    integer("ev_spdef"),
    integer("ev_speed"),
    text("move1"),
    text("move2"),
    text("move3"),
    text("move4"),
    text("original_trainer"),
    text("trainer_id"),
    text("game_of_origin"),
    text("ball_type"),
    text("date_caught"),
    integer("met_at_level"),
    text("met_at_location"),
    text("box_screenshot_path"),
    text("detail_screenshot_path"),
    text("detail_screenshot2_path"),
    text("sprite_path"),
    text("parsed_at"),
    text("raw_json"),
];

/// Columns an extraction response may never fill. Screenshot paths and parse metadata are set
/// by the pipeline itself, never by model output.
pub const PROVENANCE_COLUMNS: &[&str] = &[
    "box_screenshot_path",
    "detail_screenshot_path",
    "detail_screenshot2_path",
    "sprite_path",
    "parsed_at",
    "raw_json",
];

pub fn writable_column(name: &str) -> Option<&'static ColumnSpec> {
    WRITABLE_COLUMNS.iter().find(|column| column.name == name)
}

pub fn extracted_column(name: &str) -> Option<&'static ColumnSpec> {
    if PROVENANCE_COLUMNS.contains(&name) {
        return None;
    }
    writable_column(name)
}

/// Converts one extracted JSON value into the column's storage type.
///
/// Returns `None` for nulls and for values that cannot be represented in the column, so the
/// caller can leave the stored value untouched.
pub fn coerce_json(kind: ColumnKind, value: &JsonValue) -> Option<SqlValue> {
    match (kind, value) {
        (_, JsonValue::Null) => None,
        (_, JsonValue::Array(_) | JsonValue::Object(_)) => None,

        (ColumnKind::Text, JsonValue::String(text)) => Some(SqlValue::Text(text.clone())),
        (ColumnKind::Text, JsonValue::Number(number)) => Some(SqlValue::Text(number.to_string())),
        (ColumnKind::Text, JsonValue::Bool(flag)) => Some(SqlValue::Text(flag.to_string())),

        (ColumnKind::Integer, JsonValue::Number(number)) => number
            .as_i64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|value| value.is_finite())
                    .map(|value| value.round() as i64)
            })
            .map(SqlValue::Integer),
        (ColumnKind::Integer, JsonValue::String(text)) => {
            text.trim().parse::<i64>().ok().map(SqlValue::Integer)
        }
        (ColumnKind::Integer, JsonValue::Bool(flag)) => Some(SqlValue::Integer(i64::from(*flag))),

        (ColumnKind::Boolean, JsonValue::Bool(flag)) => Some(SqlValue::Integer(i64::from(*flag))),
        (ColumnKind::Boolean, JsonValue::Number(number)) => match number.as_i64() {
            Some(0) => Some(SqlValue::Integer(0)),
            Some(1) => Some(SqlValue::Integer(1)),
            _ => None,
        },
        (ColumnKind::Boolean, JsonValue::String(text)) => {
            match text.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(SqlValue::Integer(1)),
                "false" | "no" | "0" => Some(SqlValue::Integer(0)),
                _ => None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn writable_column_rejects_key_and_unknown_names() {
        assert!(writable_column("species_name").is_some());
        assert!(writable_column("box_number").is_none());
        assert!(writable_column("id").is_none());
        assert!(writable_column("species_name; DROP TABLE pokemon").is_none());
    }

    #[test]
    fn extracted_column_excludes_provenance() {
        assert!(extracted_column("level").is_some());
        assert!(extracted_column("parsed_at").is_none());
        assert!(extracted_column("detail_screenshot_path").is_none());
    }

    #[test]
    fn coerce_json_maps_values_to_column_kinds() {
        assert_eq!(
            coerce_json(ColumnKind::Text, &json!(12345)),
            Some(SqlValue::Text("12345".to_string()))
        );
        assert_eq!(
            coerce_json(ColumnKind::Integer, &json!("50")),
            Some(SqlValue::Integer(50))
        );
        assert_eq!(
            coerce_json(ColumnKind::Integer, &json!(31.0)),
            Some(SqlValue::Integer(31))
        );
        assert_eq!(
            coerce_json(ColumnKind::Boolean, &json!(true)),
            Some(SqlValue::Integer(1))
        );
        assert_eq!(coerce_json(ColumnKind::Integer, &json!("lv 50")), None);
        assert_eq!(coerce_json(ColumnKind::Text, &JsonValue::Null), None);
        assert_eq!(coerce_json(ColumnKind::Text, &json!(["a"])), None);
    }
}
