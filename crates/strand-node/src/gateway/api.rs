use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use strand_shared::{ContentPath, Part, PhotoList, ProtocolError};
use strand_store::ObjectError;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::gateway::auth::{constant_time_eq, GatewayAuth};
use crate::gateway::error::GatewayError;
use crate::error::NodeError;
use crate::node::Node;

/// Header alternative to the `?token=` query parameter.
pub const TOKEN_HEADER: &str = "x-gateway-token";

const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Clone)]
pub struct GatewayState {
    pub node: Arc<Node>,
    pub auth: GatewayAuth,
    /// Bearer secret for the control routes.
    pub password: Arc<str>,
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tokens/:cid", post(issue_token))
        .route("/threads/:name/photos", get(list_photos))
        .route("/:cid/:part", get(read_part))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Raw block endpoint. Serves stored (still encrypted) bytes only.
pub fn build_blocks_router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/blocks/:cid", get(read_block))
        .layer(TraceLayer::new_for_http())
        .with_state(node)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    peer_id: String,
}

#[derive(Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

#[derive(Deserialize)]
struct PageQuery {
    offset: Option<String>,
    limit: Option<usize>,
}

async fn health_check(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        peer_id: state.node.peer_id().to_string(),
    })
}

async fn issue_token(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path(cid): Path<String>,
) -> Result<Json<TokenResponse>, GatewayError> {
    verify_password(&headers, &state.password)?;
    // Only content this node has indexed gets a token.
    state.node.load_photo_and_thread(&cid)?;

    let token = state.auth.issue(&cid).await;
    Ok(Json(TokenResponse { token }))
}

async fn list_photos(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<PhotoList>, GatewayError> {
    verify_password(&headers, &state.password)?;
    let list = state.node.get_photos(
        page.offset.as_deref().unwrap_or(""),
        page.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        &name,
    )?;
    Ok(Json(list))
}

async fn read_part(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path((cid, part)): Path<(String, String)>,
    Query(query): Query<TokenQuery>,
) -> Result<Response, GatewayError> {
    let presented = query
        .token
        .or_else(|| {
            headers
                .get(TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        })
        .ok_or(GatewayError::Unauthorized)?;

    if !state.auth.verify(&cid, &presented).await {
        return Err(GatewayError::Unauthorized);
    }

    let part: Part = part
        .parse()
        .map_err(|e: ProtocolError| GatewayError::BadRequest(e.to_string()))?;
    let path = ContentPath::new(cid.as_str(), part);

    let bytes = state.node.get_file(&path.to_string(), None).await?;
    let content_type = match part {
        Part::Photo | Part::Thumb => state.node.get_metadata(&cid)?.content_type,
        Part::Meta => "application/json".to_string(),
        Part::Last | Part::Caption => "text/plain; charset=utf-8".to_string(),
    };

    let mut response = bytes.into_response();
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    Ok(response)
}

async fn read_block(State(node): State<Arc<Node>>, Path(cid): Path<String>) -> Result<Vec<u8>, GatewayError> {
    match node.get_block(&cid).await {
        Ok(Some(bytes)) => Ok(bytes),
        Ok(None) => Err(GatewayError::NotFound(cid)),
        Err(NodeError::Object(ObjectError::InvalidId(id))) => {
            Err(GatewayError::BadRequest(format!("invalid content id {id}")))
        }
        Err(e) => Err(e.into()),
    }
}

fn verify_password(headers: &HeaderMap, expected: &str) -> Result<(), GatewayError> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let presented = auth.strip_prefix("Bearer ").unwrap_or(auth);
    if !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
        return Err(GatewayError::Unauthorized);
    }
    Ok(())
}

pub async fn serve(state: GatewayState, addr: SocketAddr, shutdown: CancellationToken) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting gateway");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

pub async fn serve_blocks(node: Arc<Node>, addr: SocketAddr, shutdown: CancellationToken) -> anyhow::Result<()> {
    let app = build_blocks_router(node);

    info!(addr = %addr, "Starting block endpoint");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use strand_net::MemoryHub;
    use strand_shared::constants::DEFAULT_THREAD_NAME;
    use strand_store::{MemoryObjectStore, ObjectStore, ThreadRegistry};
    use tower::ServiceExt;

    use crate::node::{NewPhoto, NodeOptions};

    const PASSWORD: &str = "hunter2";

    async fn setup() -> (GatewayState, String) {
        let node = Arc::new(
            Node::new(
                Arc::new(ThreadRegistry::open_in_memory().unwrap()),
                Arc::new(MemoryObjectStore::new()),
                Arc::new(MemoryHub::new().connect("gw")),
                NodeOptions::default(),
            )
            .unwrap(),
        );
        let cid = node
            .add_photo_data(
                NewPhoto {
                    photo: b"png-bytes".to_vec(),
                    thumb: b"thumb-bytes".to_vec(),
                    name: "cat".into(),
                    ext: ".png".into(),
                    created: Utc::now(),
                    caption: Some("meow".into()),
                },
                DEFAULT_THREAD_NAME,
            )
            .await
            .unwrap();

        let state = GatewayState {
            node,
            auth: GatewayAuth::new(Duration::from_secs(60)),
            password: Arc::from(PASSWORD),
        };
        (state, cid)
    }

    async fn body_bytes(resp: Response) -> Vec<u8> {
        to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    async fn issue(app: &Router, cid: &str) -> String {
        let resp = app
            .clone()
            .oneshot(
                Request::post(format!("/tokens/{cid}"))
                    .header("authorization", format!("Bearer {PASSWORD}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: TokenResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        body.token
    }

    async fn get(app: &Router, uri: String) -> Response {
        app.clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_token_gates_decrypted_content() {
        let (state, cid) = setup().await;
        let app = build_router(state);

        let resp = get(&app, format!("/{cid}/photo")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let token = issue(&app, &cid).await;

        let resp = get(&app, format!("/{cid}/photo?token={token}")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(body_bytes(resp).await, b"png-bytes");

        let resp = app
            .clone()
            .oneshot(
                Request::get(format!("/{cid}/caption"))
                    .header(TOKEN_HEADER, &token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_bytes(resp).await, b"meow");
    }

    #[tokio::test]
    async fn test_reissue_invalidates_old_token() {
        let (state, cid) = setup().await;
        let app = build_router(state);

        let old = issue(&app, &cid).await;
        let new = issue(&app, &cid).await;

        let resp = get(&app, format!("/{cid}/thumb?token={old}")).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let resp = get(&app, format!("/{cid}/thumb?token={new}")).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_part_is_bad_request() {
        let (state, cid) = setup().await;
        let app = build_router(state);
        let token = issue(&app, &cid).await;

        let resp = get(&app, format!("/{cid}/secret?token={token}")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_foreign_key_content_is_bad_request() {
        let (state, existing) = setup().await;
        let node = state.node.clone();
        let thread = node.thread(DEFAULT_THREAD_NAME).unwrap();

        // Indexed under this thread but sealed with some other key.
        let metadata = node.get_metadata(&existing).unwrap();
        let cid = crate::bundle::write_bundle(
            node.objects().as_ref(),
            &strand_shared::crypto::generate_symmetric_key(),
            crate::bundle::BundleParts {
                photo: b"foreign-bytes",
                thumb: b"foreign-thumb",
                metadata: &metadata,
                caption: None,
                prev_id: "",
            },
        )
        .await
        .unwrap();
        node.registry()
            .index_update(&strand_store::UpdateRecord {
                content_id: cid.clone(),
                prev_id: String::new(),
                thread_id: thread.id().to_string(),
                metadata,
                caption: None,
                is_local: false,
                indexed_at: Utc::now(),
            })
            .unwrap();

        let app = build_router(state);
        let token = issue(&app, &cid).await;

        let resp = get(&app, format!("/{cid}/photo?token={token}")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_bytes(resp).await;
        assert!(!body.windows(b"foreign-bytes".len()).any(|w| w == b"foreign-bytes"));
        let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(error["error"].is_string());
    }

    #[tokio::test]
    async fn test_control_routes_need_password() {
        let (state, cid) = setup().await;
        let app = build_router(state);

        let resp = app
            .clone()
            .oneshot(
                Request::post(format!("/tokens/{cid}"))
                    .header("authorization", "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .clone()
            .oneshot(
                Request::get(format!("/threads/{DEFAULT_THREAD_NAME}/photos"))
                    .header("authorization", format!("Bearer {PASSWORD}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let list: PhotoList = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(list.hashes, vec![cid]);
    }

    #[tokio::test]
    async fn test_token_for_unknown_content_is_not_found() {
        let (state, _) = setup().await;
        let app = build_router(state);

        let resp = app
            .oneshot(
                Request::post("/tokens/unknown")
                    .header("authorization", format!("Bearer {PASSWORD}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_block_endpoint_serves_raw_bytes() {
        let (state, cid) = setup().await;
        let raw = state.node.objects().get(&cid).await.unwrap();
        let app = build_blocks_router(state.node.clone());

        let resp = get(&app, format!("/blocks/{cid}")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_bytes(resp).await, raw);

        let missing = strand_store::objects::content_id(b"nothing");
        let resp = get(&app, format!("/blocks/{missing}")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
