use super::*;
use std::{
    env, fs,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
};

const MIB: usize = 1024 * 1024;

fn png_file(size: usize) -> ImageFile {
    ImageFile::new("cat.png", Some("image/png".to_string()), vec![7u8; size])
}

#[test]
fn rejects_files_over_ten_mebibytes() {
    let err = select_image(png_file(15 * MIB)).expect_err("must reject");
    assert_eq!(
        err,
        ValidationError::TooLarge {
            size: (15 * MIB) as u64,
            limit: MAX_IMAGE_BYTES,
        }
    );
}

#[test]
fn size_limit_applies_whatever_the_declared_type() {
    let file = ImageFile::new("notes.txt", Some("text/plain".to_string()), vec![0u8; 15 * MIB]);
    assert!(matches!(
        select_image(file),
        Err(ValidationError::TooLarge { .. })
    ));
}

#[test]
fn accepts_five_mebibyte_png() {
    let pending = select_image(png_file(5 * MIB)).expect("accepted");
    assert_eq!(pending.bytes().len(), 5 * MIB);
    assert_eq!(pending.media_type(), "image/png");
    assert_eq!(pending.preview().size_bytes, (5 * MIB) as u64);
    assert_eq!(pending.preview().attachment_id, pending.id());
}

#[test]
fn accepts_exactly_the_limit() {
    assert!(select_image(png_file(MAX_IMAGE_BYTES as usize)).is_ok());
}

#[test]
fn rejects_non_image_and_undeclared_types() {
    let pdf = ImageFile::new("doc.pdf", Some("application/pdf".to_string()), vec![1, 2, 3]);
    assert_eq!(
        select_image(pdf).expect_err("must reject"),
        ValidationError::UnsupportedType {
            media_type: Some("application/pdf".to_string()),
        }
    );

    let unknown = ImageFile::new("blob", None, vec![1, 2, 3]);
    assert!(matches!(
        select_image(unknown),
        Err(ValidationError::UnsupportedType { media_type: None })
    ));

    let bare = ImageFile::new("x", Some("image/".to_string()), vec![1]);
    assert!(select_image(bare).is_err());
}

#[test]
fn preview_is_a_data_url_of_the_bytes() {
    let file = ImageFile::new("dot.gif", Some("Image/GIF".to_string()), b"GIF89a".to_vec());
    let pending = select_image(file).expect("accepted");
    assert_eq!(pending.media_type(), "image/gif");
    assert_eq!(
        pending.preview().data_url,
        format!("data:image/gif;base64,{}", STANDARD.encode(b"GIF89a"))
    );
}

#[tokio::test]
async fn reads_file_and_guesses_media_type_from_extension() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = env::temp_dir().join(format!("chat_client_attachment_test_{suffix}"));
    fs::create_dir_all(&temp_root).expect("temp root");
    let path = temp_root.join("photo.jpg");
    fs::write(&path, b"jpeg-bytes").expect("write");

    let file = ImageFile::read(&path).await.expect("read");
    assert_eq!(file.file_name, "photo.jpg");
    assert_eq!(file.media_type.as_deref(), Some("image/jpeg"));
    assert_eq!(file.bytes, b"jpeg-bytes");

    fs::remove_dir_all(temp_root).expect("cleanup");
}

#[tokio::test]
async fn reading_a_missing_file_fails() {
    let path = env::temp_dir().join("chat_client_attachment_test_missing/none.png");
    assert!(ImageFile::read(&path).await.is_err());
}

#[derive(Debug)]
struct ReceivedUpload {
    field_name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

#[derive(Clone)]
struct UploadServerState {
    tx: Arc<Mutex<Option<oneshot::Sender<ReceivedUpload>>>>,
}

async fn accept_upload(
    State(state): State<UploadServerState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, StatusCode> {
    let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    else {
        return Err(StatusCode::BAD_REQUEST);
    };
    let field_name = field.name().unwrap_or_default().to_string();
    let file_name = field.file_name().map(str::to_string);
    let content_type = field.content_type().map(str::to_string);
    let bytes = field
        .bytes()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
        .to_vec();

    let url = format!("/uploads/{}", file_name.clone().unwrap_or_default());
    if let Some(tx) = state.tx.lock().await.take() {
        let _ = tx.send(ReceivedUpload {
            field_name,
            file_name,
            content_type,
            bytes,
        });
    }
    Ok(Json(json!({ "imageUrl": url })))
}

async fn reject_upload() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn garbled_upload() -> &'static str {
    "definitely not json"
}

async fn empty_url_upload() -> Json<Value> {
    Json(json!({ "imageUrl": "" }))
}

async fn spawn_upload_server() -> anyhow::Result<(String, oneshot::Receiver<ReceivedUpload>)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (tx, rx) = oneshot::channel();
    let state = UploadServerState {
        tx: Arc::new(Mutex::new(Some(tx))),
    };
    let app = Router::new()
        .route("/upload", post(accept_upload))
        .route("/reject", post(reject_upload))
        .route("/garbled", post(garbled_upload))
        .route("/empty", post(empty_url_upload))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), rx))
}

fn endpoint(server_url: &str, path: &str) -> HttpUploadEndpoint {
    HttpUploadEndpoint::new(Url::parse(&format!("{server_url}{path}")).expect("url"))
}

#[tokio::test]
async fn uploads_image_as_single_multipart_field() {
    let (server_url, received_rx) = spawn_upload_server().await.expect("spawn server");
    let pending = select_image(png_file(1024)).expect("accepted");

    let url = endpoint(&server_url, "/upload")
        .upload(&pending)
        .await
        .expect("upload");
    assert_eq!(url, "/uploads/cat.png");

    let received = received_rx.await.expect("received");
    assert_eq!(received.field_name, UPLOAD_FIELD_NAME);
    assert_eq!(received.file_name.as_deref(), Some("cat.png"));
    assert_eq!(received.content_type.as_deref(), Some("image/png"));
    assert_eq!(received.bytes, vec![7u8; 1024]);
}

#[tokio::test]
async fn non_success_status_is_rejected() {
    let (server_url, _received_rx) = spawn_upload_server().await.expect("spawn server");
    let pending = select_image(png_file(16)).expect("accepted");

    let err = endpoint(&server_url, "/reject")
        .upload(&pending)
        .await
        .expect_err("must fail");
    assert_eq!(err, UploadError::Rejected { status: 500 });
}

#[tokio::test]
async fn malformed_bodies_are_upload_errors() {
    let (server_url, _received_rx) = spawn_upload_server().await.expect("spawn server");
    let pending = select_image(png_file(16)).expect("accepted");

    for path in ["/garbled", "/empty"] {
        let err = endpoint(&server_url, path)
            .upload(&pending)
            .await
            .expect_err("must fail");
        assert!(
            matches!(err, UploadError::MalformedResponse(_)),
            "unexpected error for {path}: {err}"
        );
    }
}

#[tokio::test]
async fn unreachable_endpoint_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let pending = select_image(png_file(16)).expect("accepted");
    let err = endpoint(&format!("http://{addr}"), "/upload")
        .upload(&pending)
        .await
        .expect_err("must fail");
    assert!(matches!(err, UploadError::Network(_)), "unexpected: {err}");
}
