use proptest::prelude::*;
use tinypress::codec::resize::fit_within;
use tinypress::pipeline::entry::CompressedImage;
use tinypress::pipeline::store::QueueStore;
use tinypress::{
    CompressionFormat, EntryStatus, HandleProvider, HandleRegistry, ImageInfo, ImageSource,
};

#[derive(Debug, Clone)]
enum Op {
    Append(usize),
    StartNext,
    CompleteRunning(usize),
    FailRunning,
    RequeueAll,
    Edit(usize),
    Revert(usize),
    Retry(usize),
    Select(usize),
    Clear,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1usize..=3).prop_map(Op::Append),
        4 => Just(Op::StartNext),
        3 => (1usize..=64).prop_map(Op::CompleteRunning),
        1 => Just(Op::FailRunning),
        1 => Just(Op::RequeueAll),
        1 => (0usize..8).prop_map(Op::Edit),
        1 => (0usize..8).prop_map(Op::Revert),
        1 => (0usize..8).prop_map(Op::Retry),
        1 => (0usize..8).prop_map(Op::Select),
        1 => Just(Op::Clear),
    ]
}

fn source(registry: &HandleRegistry, name: &str) -> ImageSource {
    let info = ImageInfo::new(name, "image/png", 8, 8, vec![0u8; 64]);
    ImageSource::allocate(info, registry).unwrap()
}

fn running(store: &QueueStore) -> Option<tinypress::EntryId> {
    store
        .entries()
        .iter()
        .find(|e| e.status() == EntryStatus::Processing)
        .map(|e| e.id())
}

/// Handles that should be live given what the store holds.
fn expected_live(store: &QueueStore) -> usize {
    store
        .entries()
        .iter()
        .map(|e| 1 + usize::from(e.has_edit()) + usize::from(e.result().is_some()))
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_store_invariants_hold(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let registry = HandleRegistry::new();
        let mut store = QueueStore::new();
        let mut appended = 0usize;

        for op in ops {
            match op {
                Op::Append(n) => {
                    let sources = (0..n)
                        .map(|i| source(&registry, &format!("{}.png", appended + i)))
                        .collect();
                    appended += n;
                    store.append(sources);
                }
                Op::StartNext => {
                    if running(&store).is_none() {
                        if let Some(id) = store.next_queued() {
                            prop_assert!(store.start(id).is_some());
                        }
                    }
                }
                Op::CompleteRunning(size) => {
                    if let Some(id) = running(&store) {
                        let handle = registry.create(&vec![1u8; size], "image/webp").unwrap();
                        let result = CompressedImage::new(vec![1u8; size], CompressionFormat::WebP, handle);
                        prop_assert!(store.complete(id, result));
                    }
                }
                Op::FailRunning => {
                    if let Some(id) = running(&store) {
                        prop_assert!(store.fail(id, "boom".to_string()));
                    }
                }
                Op::RequeueAll => {
                    store.requeue_all();
                    prop_assert!(store
                        .entries()
                        .iter()
                        .all(|e| e.status() == EntryStatus::Queued && e.result().is_none()));
                }
                Op::Edit(i) => {
                    if let Some(id) = store.entries().get(i).map(|e| e.id()) {
                        let busy = store.is_processing(id);
                        let edited = source(&registry, "edit.png");
                        prop_assert_eq!(store.reset_source(id, edited).is_err(), busy);
                    }
                }
                Op::Revert(i) => {
                    if let Some(id) = store.entries().get(i).map(|e| e.id()) {
                        let _ = store.revert_edit(id);
                    }
                }
                Op::Retry(i) => {
                    if let Some(id) = store.entries().get(i).map(|e| e.id()) {
                        let was_error = store.get(id).unwrap().status() == EntryStatus::Error;
                        prop_assert_eq!(store.retry(id).unwrap(), was_error);
                    }
                }
                Op::Select(i) => {
                    if let Some(id) = store.entries().get(i).map(|e| e.id()) {
                        prop_assert!(store.set_active(id));
                        prop_assert_eq!(store.active_id(), Some(id));
                    }
                }
                Op::Clear => {
                    drop(store.clear());
                }
            }

            // displaced handles stay live until handed out, then go at once
            let parked = store.take_retired();
            prop_assert_eq!(registry.stats().live, expected_live(&store) + parked.len());
            drop(parked);

            // at most one processing
            let processing = store
                .entries()
                .iter()
                .filter(|e| e.status() == EntryStatus::Processing)
                .count();
            prop_assert!(processing <= 1);

            // results and reasons only in their own states
            for entry in store.entries() {
                prop_assert_eq!(entry.result().is_some(), entry.status() == EntryStatus::Done);
                prop_assert_eq!(
                    entry.failure_reason().is_some(),
                    entry.status() == EntryStatus::Error
                );
            }

            // selection always points at an entry, or none when empty
            match store.active_id() {
                Some(id) => prop_assert!(store.get(id).is_some()),
                None => prop_assert!(store.is_empty()),
            }

            // no leaked or double-released handles
            let stats = registry.stats();
            prop_assert_eq!(stats.live, expected_live(&store));
            prop_assert_eq!((stats.created - stats.released) as usize, stats.live);
        }

        drop(store);
        let stats = registry.stats();
        prop_assert_eq!(stats.live, 0);
        prop_assert_eq!(stats.created, stats.released);
    }

    #[test]
    fn prop_fit_within_never_grows(
        w in 1u32..=10_000,
        h in 1u32..=10_000,
        max_w in prop::option::of(0u32..=5_000),
        max_h in prop::option::of(0u32..=5_000),
    ) {
        let (out_w, out_h) = fit_within(w, h, max_w, max_h);
        prop_assert!(out_w >= 1 && out_h >= 1);
        prop_assert!(out_w <= w && out_h <= h);
        if let Some(mw) = max_w.filter(|m| *m > 0) {
            if mw < w && max_h.filter(|m| *m > 0).is_none() {
                prop_assert_eq!(out_w, mw);
            }
        }
        if let Some(mh) = max_h.filter(|m| *m > 0) {
            prop_assert!(out_h <= mh.max(1));
        }
    }

    #[test]
    fn prop_fit_within_without_bounds_is_identity(w in 1u32..=10_000, h in 1u32..=10_000) {
        prop_assert_eq!(fit_within(w, h, None, None), (w, h));
        prop_assert_eq!(fit_within(w, h, Some(0), Some(0)), (w, h));
        prop_assert_eq!(fit_within(w, h, Some(w), Some(h)), (w, h));
    }

    #[test]
    fn prop_fit_within_keeps_aspect(w in 16u32..=8_000, h in 16u32..=8_000, max_w in 8u32..=4_000) {
        let (out_w, out_h) = fit_within(w, h, Some(max_w), None);
        if max_w < w {
            let expected = (f64::from(h) * f64::from(max_w) / f64::from(w)).round().max(1.0);
            prop_assert!((f64::from(out_h) - expected).abs() <= 1.0);
        }
    }
}
