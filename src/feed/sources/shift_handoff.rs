// src/feed/sources/shift_handoff.rs
use serde_json::{Map, Value};

use super::{scope_from, text_field, time_field};
use crate::feed::types::{ActivityItem, SourceKind};

pub fn map(id: &str, fields: &Map<String, Value>) -> ActivityItem {
    let title = if text_field(fields, "status").as_deref() == Some("urgent") {
        "Urgent Shift Handoff"
    } else {
        "Shift Handoff"
    };

    ActivityItem {
        id: id.to_string(),
        source_kind: SourceKind::ShiftHandoff,
        title: title.to_string(),
        description: text_field(fields, "note"),
        occurred_at: time_field(fields, SourceKind::ShiftHandoff.time_fields()),
        // the guard who wrote the hand-off is the actor
        scope: scope_from(fields, Some("guard_id")),
        attributes: Default::default(),
    }
}
