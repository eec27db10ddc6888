// src/feed/types.rs
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// The five categorized origins of activity records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    StockMovement,
    ShiftHandoff,
    Fault,
    ElectricalMaintenance,
    MechanicalMaintenance,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::StockMovement,
        SourceKind::ShiftHandoff,
        SourceKind::Fault,
        SourceKind::ElectricalMaintenance,
        SourceKind::MechanicalMaintenance,
    ];

    /// Stable slug, also the prefix of the rendered composite key.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::StockMovement => "stock-movement",
            SourceKind::ShiftHandoff => "shift-handoff",
            SourceKind::Fault => "fault",
            SourceKind::ElectricalMaintenance => "electrical-maintenance",
            SourceKind::MechanicalMaintenance => "mechanical-maintenance",
        }
    }

    /// Backend collection holding the raw records of this kind.
    pub fn collection(&self) -> &'static str {
        match self {
            SourceKind::StockMovement => "stock_movements",
            SourceKind::ShiftHandoff => "shift_handoffs",
            SourceKind::Fault => "faults",
            SourceKind::ElectricalMaintenance => "electrical_maintenance",
            SourceKind::MechanicalMaintenance => "mechanical_maintenance",
        }
    }

    /// Time field the source orders its window by.
    pub fn order_field(&self) -> &'static str {
        self.time_fields()[0]
    }

    /// Fields `occurred_at` is read from, first present non-null wins.
    pub fn time_fields(&self) -> &'static [&'static str] {
        match self {
            SourceKind::StockMovement => &["moved_at", "created_at", "recorded_at"],
            SourceKind::Fault => &["created_at", "reported_at"],
            SourceKind::ShiftHandoff
            | SourceKind::ElectricalMaintenance
            | SourceKind::MechanicalMaintenance => &["created_at", "date"],
        }
    }

    /// Accepts either the slug or the collection name.
    pub fn parse(s: &str) -> Option<SourceKind> {
        let s = s.trim();
        SourceKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s) || k.collection().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization dimensions carried by an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
}

impl Scope {
    pub fn is_empty(&self) -> bool {
        self.site_id.is_none() && self.plant_id.is_none() && self.actor_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityItem {
    pub id: String,
    pub source_kind: SourceKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
    /// Source-specific extras (stock id, fault priority, ...). Never used for ordering.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

impl ActivityItem {
    pub fn key(&self) -> CompositeKey {
        CompositeKey::new(self.source_kind, self.id.clone())
    }

    pub fn site_id(&self) -> Option<&str> {
        self.scope.as_ref().and_then(|s| s.site_id.as_deref())
    }

    pub fn plant_id(&self) -> Option<&str> {
        self.scope.as_ref().and_then(|s| s.plant_id.as_deref())
    }
}

/// Merge identity: `(source_kind, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    pub kind: SourceKind,
    pub id: String,
}

impl CompositeKey {
    pub fn new(kind: SourceKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind.as_str(), self.id)
    }
}

/// Lenient timestamp conversion: RFC 3339 string, Unix millis, or a
/// `{seconds, nanos}` object. Anything else maps to the Unix epoch.
pub fn timestamp_from_value(v: Option<&Value>) -> DateTime<Utc> {
    parse_timestamp(v).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn parse_timestamp(v: Option<&Value>) -> Option<DateTime<Utc>> {
    match v? {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => {
            let ms = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            Utc.timestamp_millis_opt(ms).single()
        }
        Value::Object(map) => {
            let secs = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = map
                .get("nanos")
                .or_else(|| map.get("nanoseconds"))
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            Utc.timestamp_opt(secs, u32::try_from(nanos).unwrap_or(0)).single()
        }
        _ => None,
    }
}
