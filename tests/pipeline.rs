use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde_json::json;

use bulkpipe::batch::{Batch, Batcher};
use bulkpipe::classify::SummaryKey;
use bulkpipe::config::IngestConfig;
use bulkpipe::error::{Error, Result};
use bulkpipe::pipeline::chain::PipeExt;
use bulkpipe::pipeline::runtime::Runtime;
use bulkpipe::sink::{BulkItem, BulkResponse, BulkSink};
use bulkpipe::Document;

mod common;
use common::{body_doc_count, body_ids, doc, ok_response, test_config, MockBulk, RunState};

async fn run_ingest(docs: Vec<Document>, config: IngestConfig, mock: MockBulk) -> (RunState, Result<()>) {
    let state = RunState::new(config);

    let pipe = common::VecSource::new(docs)
        .pipe::<Batch, _>(Batcher::new(state.config.batch_size, state.tracker.clone()))
        .pipe::<(), _>(BulkSink::new(
            mock,
            state.config.clone(),
            state.tracker.clone(),
            state.summary.clone(),
        ));

    let rt = Runtime::new().buffer(8);
    let (tx, _rx, _cancel, handle) = rt.spawn(pipe);

    tx.send(()).await.expect("start send failed");
    drop(tx);

    let result = match handle.await {
        Ok(res) => res,
        Err(err) => Err(err.into()),
    };
    (state, result)
}

fn numbered_docs(n: usize) -> Vec<Document> {
    (0..n).map(|i| doc(json!({ "n": i }))).collect()
}

#[tokio::test]
async fn clean_run_acknowledges_every_batch_and_completes_once() {
    let mock = MockBulk::all_ok();
    let calls = mock.calls.clone();
    let config = test_config().batch_size(500);

    let (state, result) = run_ingest(numbered_docs(1300), config, mock).await;

    result.expect("pipeline");
    let bodies = calls.lock().expect("mutex poisoned").clone();
    assert_eq!(bodies.len(), 3);

    let mut doc_counts: Vec<usize> = bodies.iter().map(|b| body_doc_count(b)).collect();
    // acknowledgment order across batches is not guaranteed
    doc_counts.sort_unstable();
    assert_eq!(doc_counts, vec![300, 500, 500]);

    assert_eq!(state.tracker.produced_count(), 3);
    assert_eq!(state.tracker.acknowledged_count(), 3);
    assert!(state.tracker.is_complete());
    assert!(!state.tracker.try_complete());
    assert_eq!(state.summary.total(), 0);
}

#[tokio::test]
async fn identical_documents_get_identical_identifiers_and_conflicts_become_skips() {
    // the canonical duplicate scenario: [{a:1},{a:1}], create mode, one batch
    let mock = MockBulk::new(|_, body| {
        let ids = body_ids(body);
        assert_eq!(ids.len(), 2);
        Ok(BulkResponse {
            errors: true,
            items: vec![
                BulkItem::ok("create", 201),
                BulkItem::failed("create", 409, "version_conflict_engine_exception", None),
            ],
        })
    });
    let calls = mock.calls.clone();
    let config = test_config().batch_size(2).verbose(true);

    let docs = vec![doc(json!({ "a": 1 })), doc(json!({ "a": 1 }))];
    let (state, result) = run_ingest(docs, config, mock).await;

    result.expect("pipeline");
    let bodies = calls.lock().expect("mutex poisoned").clone();
    assert_eq!(bodies.len(), 1, "two documents, batch size two: one bulk call");

    let ids = body_ids(&bodies[0]);
    assert_eq!(ids[0], ids[1], "equal content must hash to equal ids");

    assert_eq!(state.summary.count(SummaryKey::Skipped), 1);
    assert_eq!(state.summary.total(), 1, "one skip, zero genuine errors");
    assert!(state.tracker.is_complete());
}

#[tokio::test]
async fn reingesting_a_document_set_yields_skips_equal_to_duplicates() {
    // stateful mock: remembers every id it has accepted, conflicts on repeats
    let seen: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    let mock = MockBulk::new(move |_, body| {
        let mut seen = seen.lock().expect("mutex poisoned");
        let items = body_ids(body)
            .into_iter()
            .map(|id| {
                if seen.insert(id) {
                    BulkItem::ok("create", 201)
                } else {
                    BulkItem::failed("create", 409, "version_conflict_engine_exception", None)
                }
            })
            .collect();
        Ok(BulkResponse {
            errors: true,
            items,
        })
    });
    let config = test_config().batch_size(4).verbose(true);

    // six documents, two of them repeats of earlier content
    let docs = vec![
        doc(json!({ "n": 1 })),
        doc(json!({ "n": 2 })),
        doc(json!({ "n": 1 })),
        doc(json!({ "n": 3 })),
        doc(json!({ "n": 2 })),
        doc(json!({ "n": 4 })),
    ];
    let (state, result) = run_ingest(docs, config, mock).await;

    result.expect("pipeline");
    assert_eq!(state.summary.count(SummaryKey::Skipped), 2);
    assert_eq!(state.summary.total(), 2, "skips only, no error statuses");
    assert!(state.tracker.is_complete());
}

#[tokio::test]
async fn transport_failure_still_acknowledges_the_batch() {
    let mock = MockBulk::new(|call, body| {
        if call == 1 {
            Err(Error::pipeline("connection reset"))
        } else {
            Ok(ok_response(body))
        }
    });
    let config = test_config().batch_size(2);

    let (state, result) = run_ingest(numbered_docs(6), config, mock).await;

    result.expect("a failed bulk call must not fail the run");
    assert_eq!(state.tracker.produced_count(), 3);
    assert_eq!(state.tracker.acknowledged_count(), 3, "failed batch still acknowledged");
    assert!(state.tracker.is_complete(), "completion must not hang");
    assert_eq!(state.summary.count(SummaryKey::Transport), 1);
}

#[tokio::test]
async fn missing_id_field_aborts_the_stream() {
    let mock = MockBulk::all_ok();
    let config = test_config().batch_size(2).upsert("user");

    let docs = vec![
        doc(json!({ "user": "ada", "n": 1 })),
        doc(json!({ "n": 2 })), // no user field
    ];
    let (state, result) = run_ingest(docs, config, mock).await;

    let err = result.unwrap_err();
    assert!(matches!(err, Error::MissingIdField { ref field } if field == "user"));
    assert!(
        !state.tracker.is_complete(),
        "an aborted run must not emit the completion summary"
    );
}

#[tokio::test]
async fn upsert_run_sends_update_actions() {
    let mock = MockBulk::new(|_, body| {
        let first_line = body.lines().next().expect("body has lines");
        let action: serde_json::Value = serde_json::from_str(first_line).expect("action json");
        assert!(action.get("update").is_some());
        Ok(BulkResponse {
            errors: false,
            items: vec![BulkItem::ok("update", 200)],
        })
    });
    let config = test_config().batch_size(1).upsert("user");

    let (state, result) = run_ingest(vec![doc(json!({ "user": "ada" }))], config, mock).await;

    result.expect("pipeline");
    assert!(state.tracker.is_complete());
}

#[tokio::test]
async fn empty_input_completes_with_zero_batches() {
    let mock = MockBulk::all_ok();
    let calls = mock.calls.clone();
    let config = test_config();

    let (state, result) = run_ingest(Vec::new(), config, mock).await;

    result.expect("pipeline");
    assert!(calls.lock().expect("mutex poisoned").is_empty());
    assert_eq!(state.tracker.produced_count(), 0);
    assert!(state.tracker.is_complete());
}

#[tokio::test]
async fn every_bulk_body_carries_two_lines_per_document() {
    let mock = MockBulk::all_ok();
    let calls = mock.calls.clone();
    let config = test_config().batch_size(3);

    let (_, result) = run_ingest(numbered_docs(7), config, mock).await;

    result.expect("pipeline");
    for body in calls.lock().expect("mutex poisoned").iter() {
        assert_eq!(body.lines().count() % 2, 0);
        assert!(body.ends_with('\n'));
    }
}
