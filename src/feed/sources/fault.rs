// src/feed/sources/fault.rs
use serde_json::{Map, Value};

use super::{attributes_from, scope_from, text_field, time_field};
use crate::feed::types::{ActivityItem, SourceKind};

pub fn map(id: &str, fields: &Map<String, Value>) -> ActivityItem {
    ActivityItem {
        id: id.to_string(),
        source_kind: SourceKind::Fault,
        title: text_field(fields, "title").unwrap_or_else(|| "New Fault Report".to_string()),
        description: text_field(fields, "note"),
        occurred_at: time_field(fields, SourceKind::Fault.time_fields()),
        scope: scope_from(fields, None),
        attributes: attributes_from(fields, &["priority"]),
    }
}
