// src/feed/sources/stock_movement.rs
use serde_json::{Map, Value};

use super::{attributes_from, scope_from, text_field, time_field};
use crate::feed::types::{ActivityItem, SourceKind};

pub fn map(id: &str, fields: &Map<String, Value>) -> ActivityItem {
    let title = match text_field(fields, "movement_type").as_deref() {
        Some("out") => "Stock Out",
        Some("transfer") => "Stock Transfer",
        _ => "Stock In",
    };

    ActivityItem {
        id: id.to_string(),
        source_kind: SourceKind::StockMovement,
        title: title.to_string(),
        description: text_field(fields, "note"),
        occurred_at: time_field(fields, SourceKind::StockMovement.time_fields()),
        scope: scope_from(fields, None),
        attributes: attributes_from(fields, &["stock_id"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn movement_type_drives_title() {
        let out = json!({ "movement_type": "out", "stock_id": "s-9", "site_id": "S1" });
        let item = map("m1", out.as_object().unwrap());
        assert_eq!(item.title, "Stock Out");
        assert_eq!(item.attributes.get("stock_id"), Some(&json!("s-9")));
        assert_eq!(item.site_id(), Some("S1"));

        let tr = json!({ "movement_type": "transfer" });
        assert_eq!(map("m2", tr.as_object().unwrap()).title, "Stock Transfer");

        let unknown = json!({ "movement_type": "adjust" });
        assert_eq!(map("m3", unknown.as_object().unwrap()).title, "Stock In");
    }

    #[test]
    fn falls_back_to_created_at() {
        let rec = json!({ "moved_at": null, "created_at": "2025-05-01T08:00:00Z" });
        let item = map("m4", rec.as_object().unwrap());
        assert_eq!(item.occurred_at.to_rfc3339(), "2025-05-01T08:00:00+00:00");
    }
}
