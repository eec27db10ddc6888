// src/feed/sources/mod.rs
//! Per-source record mapping. Every raw record of a known kind maps to
//! exactly one `ActivityItem`; only non-object payloads are rejected.

pub mod fault;
pub mod maintenance;
pub mod shift_handoff;
pub mod stock_movement;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::feed::error::FeedError;
use crate::feed::types::{timestamp_from_value, ActivityItem, Scope, SourceKind};

pub fn map_record(kind: SourceKind, id: &str, data: &Value) -> Result<ActivityItem, FeedError> {
    let Some(fields) = data.as_object() else {
        return Err(FeedError::Mapping {
            source_kind: kind,
            id: id.to_string(),
            reason: format!("expected a JSON object, got {}", json_type(data)),
        });
    };

    let item = match kind {
        SourceKind::StockMovement => stock_movement::map(id, fields),
        SourceKind::ShiftHandoff => shift_handoff::map(id, fields),
        SourceKind::Fault => fault::map(id, fields),
        SourceKind::ElectricalMaintenance | SourceKind::MechanicalMaintenance => {
            maintenance::map(kind, id, fields)
        }
    };
    Ok(item)
}

/// Tenant a raw record belongs to, if it says.
pub fn tenant_of(data: &Value) -> Option<String> {
    data.as_object().and_then(|m| text_field(m, "company_id"))
}

/// Non-empty, trimmed text. Numeric ids are rendered as strings.
pub(crate) fn text_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| t.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First present, non-null time field wins.
pub(crate) fn time_field(fields: &Map<String, Value>, keys: &[&str]) -> DateTime<Utc> {
    let v = keys
        .iter()
        .filter_map(|k| fields.get(*k))
        .find(|v| !v.is_null());
    timestamp_from_value(v)
}

pub(crate) fn scope_from(fields: &Map<String, Value>, actor_key: Option<&str>) -> Option<Scope> {
    let scope = Scope {
        site_id: text_field(fields, "site_id"),
        plant_id: text_field(fields, "plant_id"),
        actor_id: actor_key.and_then(|k| text_field(fields, k)),
    };
    (!scope.is_empty()).then_some(scope)
}

/// Copies the listed keys, when present and non-null, into item attributes.
pub(crate) fn attributes_from(
    fields: &Map<String, Value>,
    keys: &[&str],
) -> std::collections::BTreeMap<String, Value> {
    keys.iter()
        .filter_map(|k| {
            fields
                .get(*k)
                .filter(|v| !v.is_null())
                .map(|v| (k.to_string(), v.clone()))
        })
        .collect()
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
