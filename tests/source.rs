use std::io::Write;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use serde_json::json;
use tempfile::NamedTempFile;

use bulkpipe::decode::JsonDecoder;
use bulkpipe::error::{Error, Result};
use bulkpipe::pipeline::chain::PipeExt;
use bulkpipe::pipeline::runtime::Runtime;
use bulkpipe::source::FsSource;
use bulkpipe::Document;

mod common;
use common::CollectSink;

fn temp_file_with(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}

async fn read_chunks(source: FsSource) -> Result<Vec<Bytes>> {
    let collected = Arc::new(Mutex::new(Vec::<Bytes>::new()));
    let sink = CollectSink::new(collected.clone());

    let pipe = source.pipe::<(), _>(sink);

    let rt = Runtime::new().buffer(8);
    let (tx, _rx, _cancel, handle) = rt.spawn(pipe);

    tx.send(()).await.expect("start send failed");
    drop(tx);

    handle.await??;
    let out = collected.lock().expect("mutex poisoned").clone();
    Ok(out)
}

async fn decode_file(source: FsSource) -> Result<Vec<Document>> {
    let collected = Arc::new(Mutex::new(Vec::<Document>::new()));
    let sink = CollectSink::new(collected.clone());

    let pipe = source.pipe::<Document, _>(JsonDecoder::new()).pipe::<(), _>(sink);

    let rt = Runtime::new().buffer(8);
    let (tx, _rx, _cancel, handle) = rt.spawn(pipe);

    tx.send(()).await.expect("start send failed");
    drop(tx);

    handle.await??;
    let docs = collected.lock().expect("mutex poisoned").clone();
    Ok(docs)
}

#[tokio::test]
async fn reads_a_file_as_bounded_chunks() -> Result<()> {
    let content = r#"[{"n":0},{"n":1},{"n":2}]"#;
    let file = temp_file_with(content);

    let source = FsSource::new(file.path().to_string_lossy()).read_chunk_bytes(5);
    let chunks = read_chunks(source).await?;

    assert!(chunks.iter().all(|c| c.len() <= 5));
    let roundtrip: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
    assert_eq!(roundtrip, content.as_bytes());
    Ok(())
}

#[tokio::test]
async fn documents_decode_across_read_chunk_boundaries() -> Result<()> {
    let content = r#"[{"name":"alpha","n":1},{"name":"beta","n":2},{"name":"gamma","n":3}]"#;
    let file = temp_file_with(content);

    // a 7-byte read chunk guarantees every value spans several reads
    let source = FsSource::new(file.path().to_string_lossy()).read_chunk_bytes(7);
    let docs = decode_file(source).await?;

    assert_eq!(docs.len(), 3);
    assert_eq!(docs[0]["name"], json!("alpha"));
    assert_eq!(docs[1]["name"], json!("beta"));
    assert_eq!(docs[2]["n"], json!(3));
    Ok(())
}

#[tokio::test]
async fn ndjson_file_streams_one_document_per_line() -> Result<()> {
    let file = temp_file_with("{\"a\":1}\n{\"a\":2}\n{\"a\":3}\n");

    let source = FsSource::new(file.path().to_string_lossy()).read_chunk_bytes(4);
    let docs = decode_file(source).await?;

    assert_eq!(docs.len(), 3);
    assert_eq!(docs[2]["a"], json!(3));
    Ok(())
}

#[tokio::test]
async fn empty_file_yields_no_documents() -> Result<()> {
    let file = temp_file_with("");

    let source = FsSource::new(file.path().to_string_lossy());
    let docs = decode_file(source).await?;

    assert!(docs.is_empty());
    Ok(())
}

#[tokio::test]
async fn missing_file_surfaces_an_io_error() {
    let source = FsSource::new("/definitely/not/here/events.json");

    let err = decode_file(source).await.unwrap_err();

    assert!(matches!(err, Error::Io(_)));
}
