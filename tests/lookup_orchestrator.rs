// tests/lookup_orchestrator.rs
//
// Orchestrator behaviour against scripted in-process sources:
// ordering, short-circuit, failure isolation, timeouts, supersede.

use std::sync::Arc;
use std::time::Duration;

use processed_or_not::lookup::{LookupOrchestrator, LookupOutcome};
use processed_or_not::product::NormalizedProduct;
use processed_or_not::progress::{MemoryProgressStore, ProgressHub, ProgressTracker};
use processed_or_not::query::{QueryKind, SearchQuery};
use processed_or_not::sources::{Behavior, DynSource, StaticSource};

const TIMEOUT: Duration = Duration::from_millis(200);

fn tracker() -> ProgressTracker {
    ProgressTracker::new(
        Arc::new(MemoryProgressStore::default()),
        Arc::new(ProgressHub::new(32)),
    )
}

fn product(name: &str) -> NormalizedProduct {
    NormalizedProduct {
        name: name.to_string(),
        ..Default::default()
    }
}

fn orchestrator(sources: &[Arc<StaticSource>]) -> (LookupOrchestrator, ProgressTracker) {
    let t = tracker();
    let dyn_sources: Vec<DynSource> = sources.iter().map(|s| s.clone() as DynSource).collect();
    (LookupOrchestrator::new(dyn_sources, t.clone(), TIMEOUT), t)
}

fn barcode(code: &str) -> SearchQuery {
    SearchQuery::parse(code).expect("valid barcode")
}

#[tokio::test]
async fn first_match_short_circuits_remaining_sources() {
    let a = Arc::new(StaticSource::failing("A", "connection refused"));
    let b = Arc::new(StaticSource::found("B", product("from B")));
    let c = Arc::new(StaticSource::found("C", product("from C")));
    let (orch, t) = orchestrator(&[a.clone(), b.clone(), c.clone()]);

    let q = barcode("12345678");
    let run = t.reset(q.key()).await;
    let outcome = orch.run(&q, run).await;

    match &outcome {
        LookupOutcome::Found { product, source, tried } => {
            assert_eq!(product.name, "from B");
            assert_eq!(source, "B");
            assert_eq!(tried, &vec!["A".to_string(), "B".to_string()]);
        }
        other => panic!("expected Found, got {other:?}"),
    }
    assert_eq!(c.calls(), 0, "C must never be invoked");

    let entry = t.get(q.key()).await.expect("entry present");
    assert_eq!(entry.completed_sources, vec!["A", "B"]);
    assert_eq!(entry.total_sources, 3);
    assert!(entry.found);
    assert!(entry.is_complete);
    assert_eq!(entry.current_source, "");
}

#[tokio::test]
async fn all_sources_failing_reports_every_error() {
    let a = Arc::new(StaticSource::failing("A", "boom a"));
    let b = Arc::new(StaticSource::failing("B", "boom b"));
    let (orch, t) = orchestrator(&[a, b]);

    let q = barcode("12345678");
    let run = t.reset(q.key()).await;
    let outcome = orch.run(&q, run).await;

    assert!(!outcome.is_found());
    let messages: Vec<(&str, &str)> = outcome
        .errors()
        .iter()
        .map(|e| (e.source.as_str(), e.message.as_str()))
        .collect();
    assert_eq!(messages, vec![("A", "boom a"), ("B", "boom b")]);

    let entry = t.get(q.key()).await.unwrap();
    assert_eq!(entry.completed_sources, vec!["A", "B"]);
    assert!(!entry.found);
    assert!(entry.is_complete);
    assert!(entry.error.is_none(), "exhaustion is not an abnormal end");
}

#[tokio::test]
async fn example_barcode_resolves_on_first_source() {
    let off = Arc::new(StaticSource::found(
        "OpenFoodFacts",
        NormalizedProduct {
            name: "Hak Chili sin carne schotel".into(),
            brand: Some("Hak".into()),
            barcode: Some("8720600618161".into()),
            ..Default::default()
        },
    ));
    let usda = Arc::new(StaticSource::found("USDA", product("never")));
    let ean = Arc::new(StaticSource::found("EAN-Search", product("never")));
    let (orch, t) = orchestrator(&[off.clone(), usda.clone(), ean.clone()]);

    let q = barcode("8720600618161");
    let run = t.reset(q.key()).await;
    let outcome = orch.run(&q, run).await;

    assert_eq!(outcome.source(), Some("OpenFoodFacts"));
    let entry = t.get("8720600618161").await.unwrap();
    assert_eq!(entry.completed_sources, vec!["OpenFoodFacts"]);
    assert!(entry.found && entry.is_complete);
    assert_eq!(off.calls(), 1);
    assert_eq!(usda.calls(), 0);
    assert_eq!(ean.calls(), 0);
}

#[tokio::test]
async fn completed_count_matches_sources_invoked() {
    // For n sources where the k-th (1-based) matches, exactly k are completed;
    // with no match, all n are.
    for n in 1..=4usize {
        for k in 0..=n {
            let sources: Vec<Arc<StaticSource>> = (1..=n)
                .map(|i| {
                    let name = format!("S{i}");
                    if i == k {
                        Arc::new(StaticSource::found(name, product("hit")))
                    } else {
                        Arc::new(StaticSource::not_found(name))
                    }
                })
                .collect();
            let (orch, t) = orchestrator(&sources);
            let q = barcode("12345678");
            let run = t.reset(q.key()).await;
            orch.run(&q, run).await;

            let entry = t.get(q.key()).await.unwrap();
            let expected = if k == 0 { n } else { k };
            assert_eq!(entry.completed_sources.len(), expected, "n={n} k={k}");
            assert!(entry.completed_sources.len() <= entry.total_sources);
            assert_eq!(entry.found, k != 0);
            let invoked: usize = sources.iter().map(|s| s.calls()).sum();
            assert_eq!(invoked, expected);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn hanging_source_times_out_and_search_continues() {
    let slow = Arc::new(StaticSource::new("Slow", Behavior::Hang));
    let b = Arc::new(StaticSource::found("B", product("from B")));
    let (orch, t) = orchestrator(&[slow, b]);

    let q = barcode("12345678");
    let run = t.reset(q.key()).await;
    let outcome = orch.run(&q, run).await;

    assert_eq!(outcome.source(), Some("B"));
    let entry = t.get(q.key()).await.unwrap();
    assert_eq!(entry.completed_sources, vec!["Slow", "B"]);
}

#[tokio::test(start_paused = true)]
async fn timeout_error_is_recorded() {
    let slow = Arc::new(StaticSource::new("Slow", Behavior::Hang));
    let (orch, t) = orchestrator(&[slow]);

    let q = barcode("12345678");
    let run = t.reset(q.key()).await;
    let outcome = orch.run(&q, run).await;

    assert_eq!(outcome.errors().len(), 1);
    assert!(outcome.errors()[0].message.contains("timed out"));
}

#[tokio::test]
async fn panicking_source_is_contained() {
    let bad = Arc::new(StaticSource::new("Bad", Behavior::Panic));
    let good = Arc::new(StaticSource::found("Good", product("ok")));
    let (orch, t) = orchestrator(&[bad, good]);

    let q = barcode("12345678");
    let run = t.reset(q.key()).await;
    let outcome = orch.run(&q, run).await;

    assert_eq!(outcome.source(), Some("Good"));
    let entry = t.get(q.key()).await.unwrap();
    assert_eq!(entry.completed_sources, vec!["Bad", "Good"]);
}

#[tokio::test]
async fn unusable_product_counts_as_miss() {
    let empty = Arc::new(StaticSource::found("Empty", NormalizedProduct::default()));
    let good = Arc::new(StaticSource::found("Good", product("ok")));
    let (orch, t) = orchestrator(&[empty, good]);

    let q = barcode("12345678");
    let run = t.reset(q.key()).await;
    assert_eq!(orch.run(&q, run).await.source(), Some("Good"));
}

#[tokio::test]
async fn sources_not_supporting_the_query_kind_are_skipped() {
    let upc = Arc::new(StaticSource::found("BarcodeOnly", product("x")).only(QueryKind::Barcode));
    let text = Arc::new(StaticSource::not_found("TextDb"));
    let (orch, t) = orchestrator(&[upc.clone(), text]);

    let q = SearchQuery::parse("oat milk").unwrap();
    assert_eq!(orch.total_for(&q), 1);
    let run = t.reset(q.key()).await;
    let outcome = orch.run(&q, run).await;

    assert!(!outcome.is_found());
    assert_eq!(upc.calls(), 0);
    let entry = t.get("oat milk").await.unwrap();
    assert_eq!(entry.total_sources, 1);
    assert_eq!(entry.completed_sources, vec!["TextDb"]);
}

#[tokio::test]
async fn no_applicable_sources_completes_with_error() {
    let upc = Arc::new(StaticSource::not_found("BarcodeOnly").only(QueryKind::Barcode));
    let (orch, t) = orchestrator(&[upc]);

    let q = SearchQuery::parse("oat milk").unwrap();
    let run = t.reset(q.key()).await;
    let outcome = orch.run(&q, run).await;

    assert!(outcome.tried().is_empty());
    let entry = t.get("oat milk").await.unwrap();
    assert!(entry.is_complete);
    assert!(!entry.found);
    assert!(entry.error.is_some());
}

#[tokio::test(start_paused = true)]
async fn newer_search_supersedes_running_one() {
    let a = Arc::new(StaticSource::not_found("A").with_delay(Duration::from_millis(50)));
    let b = Arc::new(StaticSource::found("B", product("from B")));
    let (orch, t) = orchestrator(&[a.clone(), b.clone()]);
    let orch = Arc::new(orch);

    let q = barcode("12345678");
    let first = t.reset(q.key()).await;
    let task = {
        let orch = orch.clone();
        let q = q.clone();
        tokio::spawn(async move { orch.run(&q, first).await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = t.reset(q.key()).await;

    let outcome = task.await.unwrap();
    assert!(matches!(outcome, LookupOutcome::Superseded { .. }));
    assert_eq!(b.calls(), 0, "superseded run must stop before the next source");

    // The fresh run's idle state was not touched by the stale one.
    let entry = t.get(q.key()).await.unwrap();
    assert_eq!(entry.run, second);
    assert!(entry.completed_sources.is_empty());
    assert!(!entry.is_complete);
}

#[tokio::test(start_paused = true)]
async fn entry_expiring_mid_run_keeps_its_total() {
    let t = ProgressTracker::new(
        Arc::new(MemoryProgressStore::with_ttl(Duration::from_secs(1))),
        Arc::new(ProgressHub::new(32)),
    );
    let a = Arc::new(StaticSource::not_found("A").with_delay(Duration::from_secs(2)));
    let b = Arc::new(StaticSource::found("B", product("from B")));
    let sources: Vec<DynSource> = vec![a, b];
    let orch = LookupOrchestrator::new(sources, t.clone(), Duration::from_secs(5));

    let q = barcode("12345678");
    let run = t.reset(q.key()).await;
    assert_eq!(orch.run(&q, run).await.source(), Some("B"));

    let entry = t.get(q.key()).await.unwrap();
    assert_eq!(entry.run, run);
    assert_eq!(entry.total_sources, 2);
    assert_eq!(entry.completed_sources, vec!["A", "B"]);
    assert!(entry.completed_sources.len() <= entry.total_sources);
    assert!(entry.found && entry.is_complete);
}
