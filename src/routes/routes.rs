//! Defines routes for the chunked upload API.
//!
//! ## Structure
//! - **Upload lifecycle**
//!   - `POST /upload/init` - start an upload session
//!   - `PUT  /upload/chunk/{upload_id}/{chunk_index}` - stream one chunk's bytes
//!   - `POST /upload/chunk/{upload_id}/{chunk_index}/complete` - record a chunk
//!   - `POST /upload/complete/{upload_id}` - merge and finalize
//!   - `POST /upload/abort/{upload_id}` - abandon and clean up
//!   - `GET  /upload/{upload_id}` - progress
//!
//! - **Downloads**
//!   - `GET /files/{file_id}/download-url` - issue a signed link
//!   - `GET /local-download/{handle}` - serve a signed link

use crate::{
    handlers::{
        download_handlers::{download_url, local_download},
        health_handlers::{healthz, readyz},
        upload_handlers::{
            abort_upload, complete_chunk, finalize_upload, init_upload, put_chunk, upload_status,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build the router for every endpoint. Handlers share `AppState`.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // upload lifecycle
        .route("/upload/init", post(init_upload))
        .route("/upload/chunk/{upload_id}/{chunk_index}", put(put_chunk))
        .route(
            "/upload/chunk/{upload_id}/{chunk_index}/complete",
            post(complete_chunk),
        )
        .route("/upload/complete/{upload_id}", post(finalize_upload))
        .route("/upload/abort/{upload_id}", post(abort_upload))
        .route("/upload/{upload_id}", get(upload_status))
        // downloads
        .route("/files/{file_id}/download-url", get(download_url))
        .route("/local-download/{handle}", get(local_download))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db,
        services::{
            download_service::DownloadService,
            file_catalog::SqliteFileCatalog,
            session_store::SqliteSessionStore,
            signed_url::SignedUrlIssuer,
            storage_service::{LocalStorage, StorageBackend},
            upload_service::UploadService,
        },
    };
    use axum::{
        body::{Body, to_bytes},
        http::{HeaderName, Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::{Value, json};
    use std::{sync::Arc, time::Duration};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const USER: &str = "x-user-id";

    async fn app() -> (TempDir, Router) {
        let dir = TempDir::new().unwrap();
        let pool = db::connect_file(&dir.path().join("meta.db"), 4)
            .await
            .unwrap();
        db::run_migrations(&pool).await.unwrap();
        let db = Arc::new(pool);

        let storage_dir = dir.path().join("objects");
        tokio::fs::create_dir_all(&storage_dir).await.unwrap();
        let signer = Arc::new(SignedUrlIssuer::new(b"router-secret", "http://test").unwrap());
        let storage: Arc<dyn StorageBackend> =
            Arc::new(LocalStorage::new(storage_dir.clone(), signer.clone()));
        let files = Arc::new(SqliteFileCatalog::new(db.clone()));

        let state = AppState {
            uploads: UploadService::new(
                Arc::new(SqliteSessionStore::new(db.clone())),
                files.clone(),
                storage.clone(),
                4,
            ),
            downloads: DownloadService::new(files, storage.clone(), Duration::from_secs(60)),
            storage,
            signer,
            db,
            storage_dir,
            identity_header: HeaderName::from_static(USER),
        };
        (dir, routes().with_state(state))
    }

    async fn send(app: &Router, method: Method, uri: &str, user: Option<&str>, body: Body) -> Response {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            req = req.header(USER, user);
        }
        if is_json_route(uri) {
            req = req.header("content-type", "application/json");
        }
        app.clone().oneshot(req.body(body).unwrap()).await.unwrap()
    }

    fn is_json_route(uri: &str) -> bool {
        uri == "/upload/init"
    }

    async fn json_body(res: Response) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn init(app: &Router, user: &str, size: u64) -> String {
        let body = json!({ "name": "notes.txt", "size": size }).to_string();
        let res = send(app, Method::POST, "/upload/init", Some(user), Body::from(body)).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let json = json_body(res).await;
        assert_eq!(json["chunkSize"], 4);
        json["uploadId"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn full_upload_and_signed_download() {
        let (_dir, app) = app().await;
        let id = init(&app, "alice", 10).await;

        for (index, data) in [(1, "5678"), (0, "1234"), (2, "90")] {
            let uri = format!("/upload/chunk/{id}/{index}");
            let res = send(&app, Method::PUT, &uri, Some("alice"), Body::from(data)).await;
            assert_eq!(res.status(), StatusCode::OK);

            let uri = format!("/upload/chunk/{id}/{index}/complete");
            let res = send(&app, Method::POST, &uri, Some("alice"), Body::empty()).await;
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(json_body(res).await["duplicate"], false);
        }

        let uri = format!("/upload/chunk/{id}/0/complete");
        let res = send(&app, Method::POST, &uri, Some("alice"), Body::empty()).await;
        assert_eq!(json_body(res).await["duplicate"], true);

        let res = send(&app, Method::GET, &format!("/upload/{id}"), Some("alice"), Body::empty()).await;
        let progress = json_body(res).await;
        assert_eq!(progress["completedCount"], 3);
        assert_eq!(progress["status"], "UPLOADING");

        let uri = format!("/upload/complete/{id}");
        let res = send(&app, Method::POST, &uri, Some("alice"), Body::empty()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let file = json_body(res).await;
        assert_eq!(file["size"], 10);

        let uri = format!("/files/{id}/download-url");
        let res = send(&app, Method::GET, &uri, Some("bob"), Body::empty()).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = send(&app, Method::GET, &uri, Some("alice"), Body::empty()).await;
        let url = json_body(res).await["url"].as_str().unwrap().to_string();
        let path = url.strip_prefix("http://test").unwrap().to_string();

        let res = send(&app, Method::GET, &path, None, Body::empty()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()["content-disposition"],
            "attachment; filename=\"notes.txt\""
        );
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"1234567890");

        let tampered = path.replace("signature=", "signature=x");
        let res = send(&app, Method::GET, &tampered, None, Body::empty()).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn errors_map_to_status_codes() {
        let (_dir, app) = app().await;

        let body = Body::from(json!({ "name": "a", "size": 1 }).to_string());
        let res = send(&app, Method::POST, "/upload/init", None, body).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let body = Body::from(json!({ "name": "a", "size": 0 }).to_string());
        let res = send(&app, Method::POST, "/upload/init", Some("alice"), body).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["status"], 400);

        let id = init(&app, "alice", 8).await;

        let uri = format!("/upload/complete/{id}");
        let res = send(&app, Method::POST, &uri, Some("alice"), Body::empty()).await;
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let uri = format!("/upload/chunk/{id}/5");
        let res = send(&app, Method::PUT, &uri, Some("alice"), Body::from("xxxx")).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let uri = format!("/upload/chunk/{id}/0");
        let res = send(&app, Method::PUT, &uri, Some("alice"), Body::from(vec![0u8; 64 * 1024])).await;
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let uri = format!("/upload/abort/{id}");
        let res = send(&app, Method::POST, &uri, Some("alice"), Body::empty()).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);

        let uri = format!("/upload/chunk/{id}/0/complete");
        let res = send(&app, Method::POST, &uri, Some("alice"), Body::empty()).await;
        assert_eq!(res.status(), StatusCode::CONFLICT);

        let res = send(&app, Method::GET, "/files/missing/download-url", Some("alice"), Body::empty()).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = send(&app, Method::GET, "/local-download/abc", None, Body::empty()).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn health_and_readiness() {
        let (_dir, app) = app().await;
        let res = send(&app, Method::GET, "/healthz", None, Body::empty()).await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = send(&app, Method::GET, "/readyz", None, Body::empty()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let json = json_body(res).await;
        assert_eq!(json["checks"]["sqlite"]["ok"], true);
        assert_eq!(json["checks"]["disk"]["ok"], true);
    }
}
