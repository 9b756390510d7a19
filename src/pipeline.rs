// 🔄 Feed Pipeline - Raw items → events in the history store
//
// One batch run:
//   1. prime      store names → directory, sweep provisional records
//   2. prepare    normalize text, parse timestamps (bad items skipped)
//   3. dedup      identical items once
//   4. order      total order (see OrderingStrategy)
//   5. per item   classify → resolve → reconcile → append
//   6. sweep      names learned during the run may settle more records
//
// Nothing here touches the disk; the caller loads and saves the store.

use crate::classifier::StatusClassifier;
use crate::config::Config;
use crate::deduplication::dedup_items;
use crate::entities::{NameDirectory, StatusEvent};
use crate::ordering::OrderingStrategy;
use crate::parser::{PreparedItem, RawItem};
use crate::reconciliation::{ReconciliationEngine, ReconciliationOutcome};
use crate::resolver::EntityResolver;
use crate::store::HistoryStore;
use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

// ============================================================================
// RUN REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub items_seen: usize,
    pub duplicate_items: usize,

    /// Items without a usable publication timestamp
    pub skipped_items: usize,

    /// Items the classifier found nothing in
    pub no_signal: usize,

    /// Classified items that named no known location
    pub unresolved: usize,

    pub events_appended: usize,
    pub duplicate_events: usize,
    pub promotions: usize,
    pub merges: usize,
}

impl RunReport {
    fn record_outcome(&mut self, outcome: &ReconciliationOutcome) {
        match outcome {
            ReconciliationOutcome::Promoted { .. } => self.promotions += 1,
            ReconciliationOutcome::Merged { .. } => self.merges += 1,
            ReconciliationOutcome::Unchanged => {}
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} items ({} duplicate, {} skipped, {} without signal, {} unresolved): \
             {} events appended, {} duplicate events, {} promoted, {} merged",
            self.items_seen,
            self.duplicate_items,
            self.skipped_items,
            self.no_signal,
            self.unresolved,
            self.events_appended,
            self.duplicate_events,
            self.promotions,
            self.merges
        )
    }
}

// ============================================================================
// FEED PROCESSOR
// ============================================================================

pub struct FeedProcessor {
    classifier: StatusClassifier,
    resolver: EntityResolver,
    reconciler: ReconciliationEngine,
    ordering: OrderingStrategy,
    assume_utc_for_naive: bool,
}

impl FeedProcessor {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(FeedProcessor {
            classifier: StatusClassifier::new(config.proximity_window)?,
            resolver: EntityResolver::new(),
            reconciler: ReconciliationEngine::new(),
            ordering: config.ordering,
            assume_utc_for_naive: config.assume_utc_for_naive,
        })
    }

    /// Builder pattern: override ordering strategy
    pub fn with_ordering(mut self, ordering: OrderingStrategy) -> Self {
        self.ordering = ordering;
        self
    }

    /// Teach the directory every stored name, then settle provisional
    /// records whose code is now known
    pub fn prime(&self, store: &mut HistoryStore, directory: &mut NameDirectory) -> Vec<ReconciliationOutcome> {
        let learned = store.prime_directory(directory);
        debug!(learned, directory_size = directory.len(), "directory primed from store");
        self.reconciler.sweep(store, directory)
    }

    /// Run one batch of raw items against the store
    pub fn process(
        &self,
        store: &mut HistoryStore,
        directory: &mut NameDirectory,
        items: &[RawItem],
    ) -> RunReport {
        let mut report = RunReport {
            items_seen: items.len(),
            ..RunReport::default()
        };

        for outcome in self.prime(store, directory) {
            report.record_outcome(&outcome);
        }

        let prepared = self.prepare(items, &mut report);
        let (mut prepared, duplicates) = dedup_items(prepared);
        report.duplicate_items = duplicates;
        self.ordering.sort(&mut prepared);

        for item in &prepared {
            self.process_item(store, directory, item, &mut report);
        }

        for outcome in self.reconciler.sweep(store, directory) {
            report.record_outcome(&outcome);
        }

        info!(
            items = report.items_seen,
            appended = report.events_appended,
            records = store.len(),
            "batch processed"
        );
        report
    }

    fn prepare(&self, items: &[RawItem], report: &mut RunReport) -> Vec<PreparedItem> {
        let mut prepared = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            match item.prepare(self.assume_utc_for_naive) {
                Ok(p) => prepared.push(p),
                Err(e) => {
                    warn!(index, error = %e, "skipping item");
                    report.skipped_items += 1;
                }
            }
        }

        prepared
    }

    fn process_item(
        &self,
        store: &mut HistoryStore,
        directory: &mut NameDirectory,
        item: &PreparedItem,
        report: &mut RunReport,
    ) {
        let classification = match self.classifier.classify_detailed(&item.text) {
            Some(c) => c,
            None => {
                debug!(published = %item.published, "no signal");
                report.no_signal += 1;
                return;
            }
        };

        let candidates = self.resolver.resolve(&item.text, directory);
        if candidates.is_empty() {
            debug!(
                published = %item.published,
                rule = %classification.rule_id,
                "signal without known location"
            );
            report.unresolved += 1;
            return;
        }

        let event =
            StatusEvent::new(item.published, classification.status).with_sequence(item.sequence);

        for candidate in &candidates {
            let outcome = self.reconciler.reconcile(store, candidate);
            report.record_outcome(&outcome);

            if store.append_event(&candidate.key, &candidate.name, event) {
                debug!(
                    key = %candidate.key,
                    status = %event.status,
                    at = %event.timestamp,
                    rule = %classification.rule_id,
                    "event appended"
                );
                report.events_appended += 1;
            } else {
                report.duplicate_events += 1;
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deduplication::DuplicatePolicy;
    use crate::entities::{EntityKey, Status, MIN_STEM_LEN};
    use crate::temporal::reconstruct_periods_now;
    use chrono::Duration;

    fn processor() -> FeedProcessor {
        FeedProcessor::new(&Config::default()).unwrap()
    }

    fn example_directory() -> NameDirectory {
        let mut directory = NameDirectory::new(MIN_STEM_LEN);
        directory.learn("Example City", Some("EXAM"));
        directory
    }

    fn scenario_items() -> Vec<RawItem> {
        vec![
            RawItem::from_text(
                "Example City (EXAM): temporary restriction introduced",
                "2024-01-01T00:00:00Z",
            ),
            RawItem::from_text("restriction at Example City lifted", "2024-01-02T00:00:00Z"),
        ]
    }

    #[test]
    fn test_example_city_scenario() {
        let mut store = HistoryStore::new();
        let mut directory = example_directory();

        let report = processor().process(&mut store, &mut directory, &scenario_items());

        assert_eq!(report.events_appended, 2);
        assert_eq!(store.len(), 1);

        let record = store.get(&EntityKey::canonical("EXAM")).unwrap();
        assert_eq!(record.event_count(), 2);
        assert_eq!(record.events[0].status, Status::Closed);
        assert_eq!(record.current_status, Status::Open);

        let periods = reconstruct_periods_now(&record.events);
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].duration, Duration::hours(24));
    }

    #[test]
    fn test_out_of_order_input() {
        let mut store = HistoryStore::new();
        let mut directory = example_directory();
        let mut items = scenario_items();
        items.reverse();

        processor().process(&mut store, &mut directory, &items);

        let record = store.get(&EntityKey::canonical("EXAM")).unwrap();
        assert_eq!(record.current_status, Status::Open);
        assert_eq!(reconstruct_periods_now(&record.events)[0].duration, Duration::hours(24));
    }

    #[test]
    fn test_reprocessing_is_idempotent() {
        let processor = processor();
        let mut store = HistoryStore::new();
        let mut directory = example_directory();

        processor.process(&mut store, &mut directory, &scenario_items());
        let after_first = store.clone();

        let report = processor.process(&mut store, &mut directory, &scenario_items());

        assert_eq!(store, after_first);
        assert_eq!(report.events_appended, 0);
        assert_eq!(report.duplicate_events, 2);
    }

    #[test]
    fn test_accumulate_policy_keeps_repeats() {
        let processor = processor();
        let mut store = HistoryStore::new().with_duplicate_policy(DuplicatePolicy::Accumulate);
        let mut directory = example_directory();

        processor.process(&mut store, &mut directory, &scenario_items());
        processor.process(&mut store, &mut directory, &scenario_items());

        let record = store.get(&EntityKey::canonical("EXAM")).unwrap();
        assert_eq!(record.event_count(), 4);

        // Repeats are confirmations, not new periods
        let periods = reconstruct_periods_now(&record.events);
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].duration, Duration::hours(24));
    }

    #[test]
    fn test_provisional_record_merged_across_runs() {
        let processor = processor();
        let mut store = HistoryStore::new();
        let mut directory = NameDirectory::new(MIN_STEM_LEN);
        directory.learn("Example City", None);

        // Run 1: name only → provisional
        processor.process(
            &mut store,
            &mut directory,
            &[RawItem::from_text(
                "Temporary restriction introduced at Example City",
                "2024-01-01T00:00:00Z",
            )],
        );
        assert!(store.contains(&EntityKey::provisional_for("Example City")));

        // Run 2: the code shows up
        let report = processor.process(
            &mut store,
            &mut directory,
            &[RawItem::from_text(
                "Example City (EXAM): restriction lifted",
                "2024-01-01T12:00:00Z",
            )],
        );

        assert_eq!(report.promotions, 1);
        assert_eq!(store.len(), 1);
        assert!(!store.contains(&EntityKey::provisional_for("Example City")));

        let record = store.get(&EntityKey::canonical("EXAM")).unwrap();
        assert_eq!(record.event_count(), 2);
        assert_eq!(record.current_status, Status::Open);
    }

    #[test]
    fn test_store_names_prime_fresh_directory() {
        let processor = processor();
        let mut store = HistoryStore::new();
        store.append_event(
            &EntityKey::canonical("EXAM"),
            "Example City",
            StatusEvent::closed("2024-01-01T00:00:00Z".parse().unwrap()),
        );

        // Directory of a new run knows nothing about Example City
        let mut directory = NameDirectory::new(MIN_STEM_LEN);
        processor.process(
            &mut store,
            &mut directory,
            &[RawItem::from_text("restriction at Example City lifted", "2024-01-02T00:00:00Z")],
        );

        assert_eq!(store.len(), 1);
        let record = store.get(&EntityKey::canonical("EXAM")).unwrap();
        assert_eq!(record.current_status, Status::Open);
    }

    #[test]
    fn test_bad_items_are_counted_not_fatal() {
        let mut store = HistoryStore::new();
        let mut directory = example_directory();

        let items = vec![
            RawItem::from_text("Example City (EXAM): temporary restriction introduced", "yesterday"),
            RawItem::default(),
            RawItem::from_text("Weather at Example City is fine", "2024-01-01T00:00:00Z"),
            RawItem::from_text("Temporary restriction introduced somewhere", "2024-01-01T00:00:00Z"),
            RawItem::from_text("restriction at Example City lifted", "2024-01-02T00:00:00Z"),
            RawItem::from_text("restriction at Example City lifted", "2024-01-02T00:00:00Z"),
        ];

        let report = processor().process(&mut store, &mut directory, &items);

        assert_eq!(report.items_seen, 6);
        assert_eq!(report.skipped_items, 2);
        assert_eq!(report.no_signal, 1);
        assert_eq!(report.unresolved, 1);
        assert_eq!(report.duplicate_items, 1);
        assert_eq!(report.events_appended, 1);
        assert!(!report.summary().is_empty());
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut store = HistoryStore::new();
        let mut directory = NameDirectory::default();

        let report = processor().process(&mut store, &mut directory, &[]);

        assert_eq!(report, RunReport::default());
        assert!(store.is_empty());
    }

    #[test]
    fn test_sequence_ordering_resolves_equal_timestamps() {
        let processor = processor().with_ordering(OrderingStrategy::SequenceThenPublished);
        let mut store = HistoryStore::new().with_duplicate_policy(DuplicatePolicy::Accumulate);
        let mut directory = example_directory();

        // Same coarse timestamp; message ids give the real order
        let items = vec![
            RawItem::from_text("restriction at Example City lifted", "2024-01-01")
                .with_link("https://t.me/channel/11"),
            RawItem::from_text("Example City (EXAM): temporary restriction introduced", "2024-01-01")
                .with_link("https://t.me/channel/10"),
        ];

        processor.process(&mut store, &mut directory, &items);

        let record = store.get(&EntityKey::canonical("EXAM")).unwrap();
        assert_eq!(record.events[0].status, Status::Closed);
        assert_eq!(record.current_status, Status::Open);
    }

    #[test]
    fn test_sequence_ordering_governs_the_log() {
        let processor = processor().with_ordering(OrderingStrategy::SequenceThenPublished);
        let mut store = HistoryStore::new().with_log_order(OrderingStrategy::SequenceThenPublished);
        let mut directory = example_directory();

        // The later message carries an older stamp
        let items = vec![
            RawItem::from_text(
                "Example City (EXAM): temporary restriction introduced",
                "2024-01-02T00:00:00Z",
            )
            .with_link("https://t.me/channel/10"),
            RawItem::from_text("restriction at Example City lifted", "2024-01-01T00:00:00Z")
                .with_link("https://t.me/channel/11"),
        ];

        processor.process(&mut store, &mut directory, &items);

        let record = store.get(&EntityKey::canonical("EXAM")).unwrap();
        let statuses: Vec<_> = record.events.iter().map(|e| e.status).collect();
        assert_eq!(statuses, vec![Status::Closed, Status::Open]);
        assert_eq!(record.events[1].sequence, Some(11));
        assert_eq!(record.current_status, Status::Open);

        // A reopening stamped before the closure yields an empty period
        let periods = reconstruct_periods_now(&record.events);
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].duration, Duration::zero());
    }
}
