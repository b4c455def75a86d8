//! POST /api/upload のHTTPレベルのテスト

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use wall_crypto::Cid;
use wall_types::{ErrorResponse, UploadResponse, UPLOAD_PATH};

use crate::endpoints::test_helpers::*;
use crate::error::GatewayError;
use crate::session::{SessionCell, StorageSession};

fn file_form(filename: &str, content: &[u8]) -> Form {
    Form::new().part(
        "file",
        Part::bytes(content.to_vec()).file_name(filename.to_string()),
    )
}

async fn post_form(base: &str, form: Form) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{base}{UPLOAD_PATH}"))
        .multipart(form)
        .send()
        .await
        .unwrap()
}

/// 正常系: CIDが返り、一時ファイルは残らない
#[tokio::test]
async fn test_upload_returns_cid() {
    let dir = tempfile::tempdir().unwrap();
    let (state, uploads) = test_state(dir.path(), StubOutcome::Ok);
    let base = start_gateway(state).await;

    let content = b"hello upload wall";
    let response = post_form(&base, file_form("hello.txt", content)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: UploadResponse = response.json().await.unwrap();
    assert!(body.is_valid());
    assert_eq!(body.cid, Cid::of(content).to_string());
    assert_eq!(uploads.load(Ordering::SeqCst), 1);
    assert_eq!(leftover_files(dir.path()), 0);
}

/// 10バイトの hello.txt は内容から決まるCIDを返す
#[tokio::test]
async fn test_ten_byte_text_file() {
    let dir = tempfile::tempdir().unwrap();
    let (state, uploads) = test_state(dir.path(), StubOutcome::Ok);
    let base = start_gateway(state).await;

    let response = post_form(&base, file_form("hello.txt", b"0123456789")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: UploadResponse = response.json().await.unwrap();
    assert!(body.ok);
    assert!(body.cid.starts_with("bafkrei"));
    assert_eq!(body.cid, Cid::of(b"0123456789").to_string());
    assert_eq!(uploads.load(Ordering::SeqCst), 1);
    assert_eq!(leftover_files(dir.path()), 0);
}

/// 同じ内容は同じCIDになる
#[tokio::test]
async fn test_same_content_same_cid() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _) = test_state(dir.path(), StubOutcome::Ok);
    let base = start_gateway(state).await;

    let first: UploadResponse = post_form(&base, file_form("a.bin", b"same bytes"))
        .await
        .json()
        .await
        .unwrap();
    let second: UploadResponse = post_form(&base, file_form("b.bin", b"same bytes"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(first.cid, second.cid);
}

/// 空ファイルもアップロードできる
#[tokio::test]
async fn test_empty_file_upload() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _) = test_state(dir.path(), StubOutcome::Ok);
    let base = start_gateway(state).await;

    let body: UploadResponse = post_form(&base, file_form("empty.txt", b""))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body.cid, "bafkreihdwdcefgh4dqkjv67uzcmw7ojee6xedzdetojuzjevtenxquvyku");
}

/// ファイルパートが無ければストレージに触れず400
#[tokio::test]
async fn test_missing_file_is_rejected_without_storage() {
    let dir = tempfile::tempdir().unwrap();
    let (state, uploads) = test_state(dir.path(), StubOutcome::Ok);
    let base = start_gateway(state.clone()).await;

    let forms = [
        Form::new().text("note", "no file here"),
        Form::new().part(
            "document",
            Part::bytes(b"wrong field".to_vec()).file_name("doc.txt"),
        ),
        Form::new().part("file", Part::bytes(b"no filename".to_vec())),
    ];
    for form in forms {
        let response = post_form(&base, form).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = response.json().await.unwrap();
        assert!(!body.ok);
        assert_eq!(body.error, "No file uploaded");
    }

    assert_eq!(uploads.load(Ordering::SeqCst), 0);
    assert!(!state.sessions.is_ready());
    assert_eq!(leftover_files(dir.path()), 0);
}

#[tokio::test]
async fn test_non_multipart_request_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (state, uploads) = test_state(dir.path(), StubOutcome::Ok);
    let base = start_gateway(state).await;

    let response = reqwest::Client::new()
        .post(format!("{base}{UPLOAD_PATH}"))
        .json(&serde_json::json!({ "file": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json().await.unwrap();
    assert_eq!(body.error, "No file uploaded");
    assert_eq!(uploads.load(Ordering::SeqCst), 0);
}

/// ストレージのエラーメッセージはそのまま500で返る
#[tokio::test]
async fn test_storage_failure_returns_message() {
    let dir = tempfile::tempdir().unwrap();
    let (state, uploads) = test_state(dir.path(), StubOutcome::Fail("space not authorized"));
    let base = start_gateway(state).await;

    let response = post_form(&base, file_form("hello.txt", b"hello")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorResponse = response.json().await.unwrap();
    assert!(!body.ok);
    assert_eq!(body.error, "space not authorized");
    assert_eq!(uploads.load(Ordering::SeqCst), 1);
    assert_eq!(leftover_files(dir.path()), 0);
}

/// 一時ファイルを作れなければ500。ストレージには触れない
#[tokio::test]
async fn test_staging_io_failure_returns_500() {
    let dir = tempfile::tempdir().unwrap();
    let credentials = test_credentials();
    let uploads = Arc::new(AtomicUsize::new(0));
    let sessions = stub_sessions(&credentials, StubOutcome::Ok, &uploads);
    let missing = dir.path().join("missing");
    let state = state_with_sessions(&missing, &credentials, sessions, TEST_MAX_UPLOAD_SIZE);
    let base = start_gateway(state.clone()).await;

    let response = post_form(&base, file_form("hello.txt", b"hello")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorResponse = response.json().await.unwrap();
    assert!(!body.ok);
    assert!(body.error.starts_with("local I/O error"), "{}", body.error);

    assert_eq!(uploads.load(Ordering::SeqCst), 0);
    assert!(!state.sessions.is_ready());
    assert!(!missing.exists());
    assert_eq!(leftover_files(dir.path()), 0);
}

/// 成功・413・ファイル無し・ストレージ失敗が混在しても一時ファイルは残らない
#[tokio::test]
async fn test_mixed_outcomes_leave_no_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let credentials = test_credentials();
    let uploads = Arc::new(AtomicUsize::new(0));
    let healthy = state_with_sessions(
        dir.path(),
        &credentials,
        stub_sessions(&credentials, StubOutcome::Ok, &uploads),
        16,
    );
    let (failing, _) = test_state(dir.path(), StubOutcome::Fail("space not authorized"));
    let healthy = start_gateway(healthy).await;
    let failing = start_gateway(failing).await;

    let statuses = [
        post_form(&healthy, file_form("a.txt", b"first")).await.status(),
        post_form(&healthy, file_form("big.bin", &[1u8; 1024])).await.status(),
        post_form(&healthy, Form::new().text("note", "no file")).await.status(),
        post_form(&failing, file_form("b.txt", b"second")).await.status(),
        post_form(&healthy, file_form("c.txt", b"third")).await.status(),
    ];
    assert_eq!(
        statuses,
        [
            StatusCode::OK,
            StatusCode::PAYLOAD_TOO_LARGE,
            StatusCode::BAD_REQUEST,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::OK,
        ]
    );
    assert_eq!(uploads.load(Ordering::SeqCst), 2);
    assert_eq!(leftover_files(dir.path()), 0);
}

/// サイズ上限を超えた時点で413。セッションは構築されない
#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let credentials = test_credentials();
    let inits = Arc::new(AtomicUsize::new(0));
    let sessions = {
        let inits = inits.clone();
        SessionCell::new(move || {
            inits.fetch_add(1, Ordering::SeqCst);
            async { Err::<StorageSession, _>(GatewayError::Config("unused".to_string())) }
        })
    };
    let state = state_with_sessions(dir.path(), &credentials, sessions, 16);
    let base = start_gateway(state).await;

    let response = post_form(&base, file_form("big.bin", &[7u8; 1024])).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: ErrorResponse = response.json().await.unwrap();
    assert!(body.error.contains("maximum upload size"));
    assert_eq!(inits.load(Ordering::SeqCst), 0);
    assert_eq!(leftover_files(dir.path()), 0);
}

/// 同時リクエストでもセッションの構築は一度だけで、各リクエストは独立した一時ファイルを使う
#[tokio::test]
async fn test_concurrent_uploads_share_one_session() {
    let dir = tempfile::tempdir().unwrap();
    let credentials = test_credentials();
    let uploads = Arc::new(AtomicUsize::new(0));
    let inits = Arc::new(AtomicUsize::new(0));
    let sessions = {
        let credentials = credentials.clone();
        let uploads = uploads.clone();
        let inits = inits.clone();
        SessionCell::new(move || {
            inits.fetch_add(1, Ordering::SeqCst);
            let credentials = credentials.clone();
            let client = StubStorageClient::new(
                credentials.signer.did().clone(),
                StubOutcome::Ok,
                uploads.clone(),
            );
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                StorageSession::establish(&credentials, Box::new(client)).await
            }
        })
    };
    let state = state_with_sessions(dir.path(), &credentials, sessions, TEST_MAX_UPLOAD_SIZE);
    let base = start_gateway(state).await;

    let requests = (0..8u8).map(|i| {
        let base = base.clone();
        tokio::spawn(async move {
            let content = vec![i; 64];
            let response = post_form(&base, file_form(&format!("f{i}.bin"), &content)).await;
            assert_eq!(response.status(), StatusCode::OK);
            let body: UploadResponse = response.json().await.unwrap();
            assert_eq!(body.cid, Cid::of(&content).to_string());
        })
    });
    for request in requests.collect::<Vec<_>>() {
        request.await.unwrap();
    }

    assert_eq!(inits.load(Ordering::SeqCst), 1);
    assert_eq!(uploads.load(Ordering::SeqCst), 8);
    assert_eq!(leftover_files(dir.path()), 0);
}

/// セッション構築の失敗は保持されず、次のリクエストで再試行される
#[tokio::test]
async fn test_session_failure_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let credentials = test_credentials();
    let uploads = Arc::new(AtomicUsize::new(0));
    let attempts = Arc::new(AtomicUsize::new(0));
    let sessions = {
        let credentials = credentials.clone();
        let uploads = uploads.clone();
        let attempts = attempts.clone();
        SessionCell::new(move || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            let credentials = credentials.clone();
            let client = StubStorageClient::new(
                credentials.signer.did().clone(),
                StubOutcome::Ok,
                uploads.clone(),
            );
            async move {
                if attempt == 0 {
                    return Err(GatewayError::Config("storage unavailable".to_string()));
                }
                StorageSession::establish(&credentials, Box::new(client)).await
            }
        })
    };
    let state = state_with_sessions(dir.path(), &credentials, sessions, TEST_MAX_UPLOAD_SIZE);
    let base = start_gateway(state.clone()).await;

    let response = post_form(&base, file_form("hello.txt", b"hello")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorResponse = response.json().await.unwrap();
    assert_eq!(body.error, "configuration error: storage unavailable");
    assert!(!state.sessions.is_ready());

    let response = post_form(&base, file_form("hello.txt", b"hello")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.sessions.is_ready());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(uploads.load(Ordering::SeqCst), 1);
    assert_eq!(leftover_files(dir.path()), 0);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _) = test_state(dir.path(), StubOutcome::Ok);
    let base = start_gateway(state).await;

    let response = reqwest::Client::new()
        .post(format!("{base}{UPLOAD_PATH}"))
        .header("Origin", "http://localhost:5173")
        .multipart(file_form("hello.txt", b"hello"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
