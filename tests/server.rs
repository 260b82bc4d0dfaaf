//! HTTP API tests against a real server on a free local port.

mod common;

use common::{docx, open_engine, pptx, test_config, ScriptedGenerator};
use ragdrop::engine::Engine;
use ragdrop::server::run_server;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

async fn start(tmp: &TempDir) -> (String, Arc<Engine>) {
    let port = find_free_port();
    let mut config = test_config(tmp);
    config.server.bind = format!("127.0.0.1:{}", port);
    let engine = open_engine(config, Arc::new(ScriptedGenerator::default()));

    let server_engine = Arc::clone(&engine);
    tokio::spawn(async move {
        run_server(server_engine).await.ok();
    });
    wait_for_server(port).await;
    (format!("http://127.0.0.1:{}", port), engine)
}

fn file_form(name: &str, bytes: Vec<u8>) -> Form {
    Form::new().part("file", Part::bytes(bytes).file_name(name.to_string()))
}

#[tokio::test]
async fn test_root_and_test_endpoints() {
    let tmp = TempDir::new().unwrap();
    let (base, _engine) = start(&tmp).await;
    let client = reqwest::Client::new();

    let body: Value = client.get(&base).send().await.unwrap().json().await.unwrap();
    assert_eq!(body["message"], "Welcome to the ragdrop API!");

    let body: Value = client
        .get(format!("{}/api/test", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["message"], "Hello from the ragdrop API!");

    let body: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_upload_then_chat_and_list() {
    let tmp = TempDir::new().unwrap();
    let (base, engine) = start(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/upload", base))
        .multipart(file_form(
            "Team Handbook.docx",
            docx(&["vacation policy allows twenty days"]),
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["filename"], "Team_Handbook.docx");
    assert_eq!(body["format"], "docx");
    assert_eq!(body["chunks"], 1);
    assert_eq!(body["message"], "File processed with 1 chunks stored");
    assert!(engine.watch_dir().join("Team_Handbook.docx").exists());

    let resp = client
        .post(format!("{}/api/chat", base))
        .json(&json!({ "query": "vacation policy", "history": [3, 4] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["response"], "scripted answer");
    assert_eq!(body["history"], json!([3, 4, 1]));
    let contexts = body["contexts"].as_array().unwrap();
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0]["source"], "Team_Handbook.docx");
    assert_eq!(contexts[0]["chunk_id"], "Team_Handbook.docx-chunk-0");
    assert!(contexts[0]["similarity"].is_number());
    assert!(body["augmentedQuery"]
        .as_str()
        .unwrap()
        .contains("Document 1 (Source: Team_Handbook.docx):"));

    let body: Value = client
        .get(format!("{}/api/list-documents", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["indexed_documents"], json!(["Team_Handbook.docx"]));
    let folder = body["folder_documents"].as_array().unwrap();
    assert_eq!(folder.len(), 1);
    assert_eq!(folder[0]["filename"], "Team_Handbook.docx");
    assert_eq!(folder[0]["indexed"], true);
    assert!(folder[0]["size"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_chat_on_empty_index_falls_back() {
    let tmp = TempDir::new().unwrap();
    let (base, _engine) = start(&tmp).await;
    let body: Value = reqwest::Client::new()
        .post(format!("{}/api/chat", base))
        .json(&json!({ "query": "anything there?" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["augmentedQuery"], "answer this query: anything there?");
    assert_eq!(body["contexts"], json!([]));
}

#[tokio::test]
async fn test_upload_rejects_unsupported_extension() {
    let tmp = TempDir::new().unwrap();
    let (base, engine) = start(&tmp).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/upload", base))
        .multipart(file_form("notes.txt", b"plain text".to_vec()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unsupported_format");
    assert!(!engine.watch_dir().join("notes.txt").exists());
}

#[tokio::test]
async fn test_upload_without_file_part_is_bad_request() {
    let tmp = TempDir::new().unwrap();
    let (base, _engine) = start(&tmp).await;
    let form = Form::new().text("other", "value");
    let resp = reqwest::Client::new()
        .post(format!("{}/api/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(body["error"]["message"], "No file part");
}

#[tokio::test]
async fn test_upload_of_corrupt_document_is_bad_request() {
    let tmp = TempDir::new().unwrap();
    let (base, engine) = start(&tmp).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/upload", base))
        .multipart(file_form("broken.pptx", b"not a zip archive".to_vec()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(engine.store().is_empty());
}

#[tokio::test]
async fn test_empty_query_is_bad_request() {
    let tmp = TempDir::new().unwrap();
    let (base, _engine) = start(&tmp).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/chat", base))
        .json(&json!({ "query": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "query must not be empty");
}

#[tokio::test]
async fn test_reindex_all_counts_folder_documents() {
    let tmp = TempDir::new().unwrap();
    let (base, engine) = start(&tmp).await;
    std::fs::write(
        engine.watch_dir().join("deck.pptx"),
        pptx(&[&["intro"], &["roadmap"]]),
    )
    .unwrap();
    std::fs::write(engine.watch_dir().join("memo.docx"), docx(&["memo"])).unwrap();
    std::fs::write(engine.watch_dir().join("skip.md"), "# not a document").unwrap();

    let resp = reqwest::Client::new()
        .post(format!("{}/api/reindex-all", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["files_processed"], 2);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Reindexed 2 documents from "));
    assert_eq!(engine.store().sources().unwrap().len(), 2);
}
