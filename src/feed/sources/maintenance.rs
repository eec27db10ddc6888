// src/feed/sources/maintenance.rs
//! Electrical and mechanical maintenance share one record layout.

use serde_json::{Map, Value};

use super::{scope_from, text_field, time_field};
use crate::feed::types::{ActivityItem, SourceKind};

pub fn map(kind: SourceKind, id: &str, fields: &Map<String, Value>) -> ActivityItem {
    let title = match kind {
        SourceKind::MechanicalMaintenance => "Mechanical Maintenance Record",
        _ => "Electrical Maintenance Record",
    };

    ActivityItem {
        id: id.to_string(),
        source_kind: kind,
        title: title.to_string(),
        description: text_field(fields, "note").or_else(|| text_field(fields, "task_name")),
        occurred_at: time_field(fields, kind.time_fields()),
        scope: scope_from(fields, None),
        attributes: Default::default(),
    }
}
