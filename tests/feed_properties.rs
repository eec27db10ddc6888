// tests/feed_properties.rs
//
// Property checks over the pure parts: merge, ordering, filter-then-cap.

use activity_feed::feed::aggregator::AggregatorCore;
use activity_feed::feed::visibility;
use activity_feed::{ActivityItem, Role, Scope, SourceKind, Viewer, VisibilityPolicy};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

const SITES: [&str; 3] = ["S1", "S2", "S3"];

fn arb_item() -> impl Strategy<Value = ActivityItem> {
    (
        0usize..5,
        0u8..12,
        0i64..20,
        proptest::option::of(0usize..3),
        "[a-z]{1,6}",
    )
        .prop_map(|(kind, id, secs, site, title)| ActivityItem {
            id: format!("r{id}"),
            source_kind: SourceKind::ALL[kind],
            title,
            description: None,
            occurred_at: Utc.timestamp_opt(secs, 0).unwrap(),
            scope: site.map(|s| Scope {
                site_id: Some(SITES[s].to_string()),
                ..Scope::default()
            }),
            attributes: Default::default(),
        })
}

proptest! {
    #[test]
    fn merged_state_has_unique_keys_and_last_write_wins(items in proptest::collection::vec(arb_item(), 0..80)) {
        let mut agg = AggregatorCore::new(50);
        let mut expected: HashMap<String, ActivityItem> = HashMap::new();
        for it in &items {
            agg.upsert(it.clone());
            expected.insert(it.key().to_string(), it.clone());
        }

        let snap = agg.snapshot();
        let unique: HashSet<String> = snap.iter().map(|i| i.key().to_string()).collect();
        prop_assert_eq!(unique.len(), snap.len());
        prop_assert_eq!(snap.len(), expected.len());
        for it in &snap {
            prop_assert_eq!(Some(it), expected.get(&it.key().to_string()));
        }
    }

    #[test]
    fn snapshot_is_sorted_desc_with_key_tiebreak(items in proptest::collection::vec(arb_item(), 0..80)) {
        let mut agg = AggregatorCore::new(50);
        for it in items {
            agg.upsert(it);
        }
        let snap = agg.snapshot();
        for w in snap.windows(2) {
            let (a, b) = (&w[0], &w[1]);
            prop_assert!(a.occurred_at >= b.occurred_at);
            if a.occurred_at == b.occurred_at {
                prop_assert!(a.key().to_string() < b.key().to_string());
            }
        }
        prop_assert_eq!(snap.clone(), agg.snapshot());
    }

    #[test]
    fn state_bounded_by_per_source_cap(cap in 1usize..6, items in proptest::collection::vec(arb_item(), 0..120)) {
        let mut agg = AggregatorCore::new(cap);
        for it in items {
            agg.upsert(it);
            prop_assert!(agg.len() <= cap * SourceKind::ALL.len());
            for kind in SourceKind::ALL {
                prop_assert!(agg.len_of(kind) <= cap);
            }
        }
    }

    #[test]
    fn restricted_viewer_never_sees_other_sites(
        items in proptest::collection::vec(arb_item(), 0..60),
        limit in 1usize..20,
    ) {
        let mut agg = AggregatorCore::new(50);
        for it in items {
            agg.upsert(it);
        }
        let viewer = Viewer::new(Role::Technician).with_sites(["S1"]);
        let policy = VisibilityPolicy::default();

        let snapshot = agg.snapshot();
        let filtered = visibility::apply(&snapshot, &viewer, &policy);
        let delivered = visibility::visible_window(&snapshot, &viewer, &policy, limit);

        prop_assert!(delivered.len() <= limit);
        prop_assert!(delivered.len() <= filtered.len());
        prop_assert!(delivered.iter().all(|i| i.site_id() == Some("S1")));
        prop_assert_eq!(&delivered[..], &filtered[..delivered.len()]);
    }
}
