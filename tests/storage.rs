//! Blob store tests against a local stand-in for Google's endpoints

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Form, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use docket_gateway::{BlobStore, Error, GcsBlobStore};

const TEST_KEY: &str = include_str!("fixtures/service_account_key.pem");
const TEST_PUBLIC_KEY: &str = include_str!("fixtures/service_account_pub.pem");
const CLIENT_EMAIL: &str = "docket@docket-test.iam.gserviceaccount.com";

#[derive(Debug, Deserialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
}

struct Upload {
    bucket: String,
    name: String,
    authorization: String,
    body: Vec<u8>,
}

/// Token and upload endpoints recording what they receive
struct FakeGoogle {
    expires_in: i64,
    reject_tokens: bool,
    exchanges: Mutex<Vec<Claims>>,
    uploads: Mutex<Vec<Upload>>,
}

impl FakeGoogle {
    fn new(expires_in: i64) -> Self {
        Self {
            expires_in,
            reject_tokens: false,
            exchanges: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }
}

async fn token(
    State(google): State<Arc<FakeGoogle>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if google.reject_tokens {
        return (StatusCode::UNAUTHORIZED, "invalid_grant").into_response();
    }

    assert_eq!(form["grant_type"], "urn:ietf:params:oauth:grant-type:jwt-bearer");

    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_aud = false;
    let key = DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY.as_bytes()).unwrap();
    let data = jsonwebtoken::decode::<Claims>(&form["assertion"], &key, &validation).unwrap();

    let issued = {
        let mut exchanges = google.exchanges.lock().unwrap();
        exchanges.push(data.claims);
        exchanges.len()
    };

    Json(serde_json::json!({
        "access_token": format!("token-{issued}"),
        "expires_in": google.expires_in,
        "token_type": "Bearer",
    }))
    .into_response()
}

async fn upload(
    State(google): State<Arc<FakeGoogle>>,
    Path(bucket): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<serde_json::Value> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    google.uploads.lock().unwrap().push(Upload {
        bucket,
        name: query["name"].clone(),
        authorization,
        body: body.to_vec(),
    });

    Json(serde_json::json!({ "name": query["name"] }))
}

async fn serve(google: Arc<FakeGoogle>) -> SocketAddr {
    let app = Router::new()
        .route("/token", post(token))
        .route("/upload/b/{bucket}/o", post(upload))
        .with_state(google);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Store pointed at the local server, with a key file naming its token endpoint
fn store(addr: SocketAddr, dir: &tempfile::TempDir) -> GcsBlobStore {
    let path = dir.path().join("firebase.json");
    let key_file = serde_json::json!({
        "type": "service_account",
        "client_email": CLIENT_EMAIL,
        "private_key": TEST_KEY,
        "token_uri": format!("http://{addr}/token"),
    });
    std::fs::write(&path, key_file.to_string()).unwrap();

    GcsBlobStore::new("docket-test.appspot.com".to_string(), &path, Duration::from_secs(5))
        .unwrap()
        .with_endpoints(&format!("http://{addr}/upload"), &format!("http://{addr}"))
}

#[tokio::test]
async fn test_upload_uses_cached_service_account_token() {
    let google = Arc::new(FakeGoogle::new(3600));
    let addr = serve(google.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let store = store(addr, &dir);

    let url = store
        .put("documents/pan_SM1.jpeg", b"jpeg".to_vec(), "image/jpeg")
        .await
        .unwrap();
    store
        .put("documents/pan_SM2.jpeg", b"jpeg".to_vec(), "image/jpeg")
        .await
        .unwrap();

    assert_eq!(
        url,
        format!("http://{addr}/docket-test.appspot.com/documents/pan_SM1.jpeg")
    );

    let exchanges = google.exchanges.lock().unwrap();
    assert_eq!(exchanges.len(), 1);
    assert_eq!(exchanges[0].iss, CLIENT_EMAIL);
    assert!(exchanges[0].scope.contains("devstorage"));
    assert_eq!(exchanges[0].aud, format!("http://{addr}/token"));

    let uploads = google.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[0].bucket, "docket-test.appspot.com");
    assert_eq!(uploads[0].name, "documents/pan_SM1.jpeg");
    assert_eq!(uploads[0].body, b"jpeg");
    assert!(uploads.iter().all(|u| u.authorization == "Bearer token-1"));
}

#[tokio::test]
async fn test_token_near_expiry_is_refreshed() {
    let google = Arc::new(FakeGoogle::new(60));
    let addr = serve(google.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let store = store(addr, &dir);

    for name in ["documents/a.png", "documents/b.png"] {
        store.put(name, b"png".to_vec(), "image/png").await.unwrap();
    }

    assert_eq!(google.exchanges.lock().unwrap().len(), 2);
    let uploads = google.uploads.lock().unwrap();
    assert_eq!(uploads[1].authorization, "Bearer token-2");
}

#[tokio::test]
async fn test_rejected_token_fails_the_upload() {
    let google = Arc::new(FakeGoogle {
        reject_tokens: true,
        ..FakeGoogle::new(3600)
    });
    let addr = serve(google.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let store = store(addr, &dir);

    let err = store
        .put("documents/pan_SM1.jpeg", b"jpeg".to_vec(), "image/jpeg")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::BlobStore(_)));
    assert!(google.uploads.lock().unwrap().is_empty());
}
