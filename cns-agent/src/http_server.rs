//! HTTP API for the CNI plugin and the cluster controller.
//!
//! Every route is served both unprefixed and under `/v0.2`. Handlers always
//! answer `200 OK` with a JSON body carrying the `Response` envelope; the
//! envelope's return code is mirrored in the `Response-Return-Code` header
//! and recorded in the request latency histogram.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, MatchedPath, Query, Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post, MethodRouter},
    Router,
};
use cns_types::{
    ConfigureContainerNetworkingRequest, CreateNetworkContainerRequest,
    CreateNetworkContainerResponse, DeleteNetworkContainerRequest, DeleteNetworkContainerResponse,
    GetAllNetworkContainersResponse, GetHomeAzResponse, GetNetworkContainerRequest,
    GetNetworkContainerResponse, IPConfigRequest, IPConfigResponse, IPConfigState,
    NmAgentSupportedApisRequest, NmAgentSupportedApisResponse, NumOfCPUCoresResponse,
    PostNetworkContainersRequest, PostNetworkContainersResponse, PublishNetworkContainerRequest,
    PublishNetworkContainerResponse, ResponseCode, SetOrchestratorTypeRequest,
    UnpublishNetworkContainerRequest, UnpublishNetworkContainerResponse,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::service::{
    failure, GetHTTPServiceDataResponse, GetIPAddressStatusResponse, GetPodContextResponse,
    RestService,
};

/// Lowercase form of [`cns_types::RETURN_CODE_HEADER`].
pub const RETURN_CODE: HeaderName = HeaderName::from_static("response-return-code");

/// Prefix of the versioned copy of every route.
pub const API_VERSION_PREFIX: &str = "/v0.2";

/// Shared state for HTTP handlers
pub struct AppState {
    pub service: Arc<RestService>,
}

// ============================================================================
// Envelope plumbing
// ============================================================================

/// A response body carrying the `Response` envelope.
trait Envelope: Serialize + Default {
    fn envelope(&self) -> &cns_types::Response;
    fn from_envelope(response: cns_types::Response) -> Self;
}

impl Envelope for cns_types::Response {
    fn envelope(&self) -> &cns_types::Response {
        self
    }

    fn from_envelope(response: cns_types::Response) -> Self {
        response
    }
}

macro_rules! envelope {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Envelope for $ty {
                fn envelope(&self) -> &cns_types::Response {
                    &self.response
                }

                #[allow(clippy::needless_update)]
                fn from_envelope(response: cns_types::Response) -> Self {
                    Self { response, ..Default::default() }
                }
            }
        )+
    };
}

envelope!(
    IPConfigResponse,
    CreateNetworkContainerResponse,
    DeleteNetworkContainerResponse,
    GetNetworkContainerResponse,
    GetAllNetworkContainersResponse,
    PostNetworkContainersResponse,
    PublishNetworkContainerResponse,
    UnpublishNetworkContainerResponse,
    NmAgentSupportedApisResponse,
    GetHomeAzResponse,
    NumOfCPUCoresResponse,
    GetIPAddressStatusResponse,
    GetPodContextResponse,
    GetHTTPServiceDataResponse,
);

fn reply<T: Envelope>(body: T) -> Response {
    let code = body.envelope().return_code;
    let mut response = Json(body).into_response();
    if let Ok(value) = HeaderValue::from_str(&code.as_i32().to_string()) {
        response.headers_mut().insert(RETURN_CODE, value);
    }
    response
}

/// Decode the body and run `f`, answering `InvalidParameter` on a bad body.
async fn handle<Req, Resp, F, Fut>(payload: Result<Json<Req>, JsonRejection>, f: F) -> Response
where
    F: FnOnce(Req) -> Fut,
    Fut: Future<Output = Resp>,
    Resp: Envelope,
{
    match payload {
        Ok(Json(req)) => reply(f(req).await),
        Err(rejection) => reply(Resp::from_envelope(failure(
            ResponseCode::InvalidParameter,
            format!("Failed to decode request: {}", rejection.body_text()),
        ))),
    }
}

async fn unsupported_verb(method: Method) -> Response {
    reply(failure(
        ResponseCode::UnsupportedVerb,
        format!("{} is not supported on this path", method),
    ))
}

/// Records the latency of every request, labelled by route and return code.
async fn record_latency(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let response = next.run(req).await;

    let code = response
        .headers()
        .get(&RETURN_CODE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i32>().ok())
        .and_then(|v| ResponseCode::try_from(v).ok())
        .map(|c| c.as_str())
        .unwrap_or("none");
    state.service.metrics().observe_http(&path, code, start.elapsed());
    response
}

// ============================================================================
// Router
// ============================================================================

fn only(route: MethodRouter<Arc<AppState>>) -> MethodRouter<Arc<AppState>> {
    route.fallback(unsupported_verb)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // IPAM
        .route("/requestipconfig", only(post(request_ip_config)))
        .route("/releaseipconfig", only(post(release_ip_config)))
        // Orchestrator and NCs
        .route("/setorchestratortype", only(post(set_orchestrator_type)))
        .route("/createorupdatenetworkcontainer", only(post(create_or_update_network_container)))
        .route("/deletenetworkcontainer", only(post(delete_network_container)))
        .route(
            "/getnetworkcontainerbyorchestratorcontext",
            only(post(get_network_container_by_orchestrator_context)),
        )
        .route(
            "/networkcontainers",
            only(get(get_all_network_containers).post(post_network_containers)),
        )
        .route("/publishnetworkcontainer", only(post(publish_network_container)))
        .route("/unpublishnetworkcontainer", only(post(unpublish_network_container)))
        // Node
        .route("/nmagentsupportedapis", only(post(nmagent_supported_apis)))
        .route("/gethomeaz", only(get(get_home_az)))
        .route("/numberofcpucores", only(get(number_of_cpu_cores)))
        // Container networking
        .route("/network/attachcontainertonetwork", only(post(attach_container_to_network)))
        .route("/network/detachcontainerfromnetwork", only(post(detach_container_from_network)))
        // Debug
        .route("/debug/ipaddresses", only(get(debug_ip_addresses)))
        .route("/debug/podcontext", only(get(debug_pod_context)))
        .route("/debug/restdata", only(get(debug_rest_data)))
}

/// Build the application router with all routes
pub fn build_router(service: Arc<RestService>) -> Router {
    let state = Arc::new(AppState { service });

    Router::new()
        .merge(api_routes())
        .nest(API_VERSION_PREFIX, api_routes())
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn_with_state(state.clone(), record_latency))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `addr` until `cancel` fires.
pub async fn run_http_server(
    addr: SocketAddr,
    service: Arc<RestService>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let app = build_router(service);

    info!(address = %addr, "Starting CNS HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("CNS HTTP server stopped");
    Ok(())
}

// ============================================================================
// IPAM handlers
// ============================================================================

/// POST /requestipconfig
async fn request_ip_config(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IPConfigRequest>, JsonRejection>,
) -> Response {
    handle(payload, |req| async move { state.service.request_ip_config(req).await }).await
}

/// POST /releaseipconfig
async fn release_ip_config(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IPConfigRequest>, JsonRejection>,
) -> Response {
    handle(payload, |req| async move { state.service.release_ip_config(req).await }).await
}

// ============================================================================
// NC handlers
// ============================================================================

async fn set_orchestrator_type(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SetOrchestratorTypeRequest>, JsonRejection>,
) -> Response {
    handle(payload, |req| async move { state.service.set_orchestrator_type(req).await }).await
}

async fn create_or_update_network_container(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateNetworkContainerRequest>, JsonRejection>,
) -> Response {
    handle(payload, |req| async move {
        state.service.create_or_update_network_container(req).await
    })
    .await
}

async fn delete_network_container(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DeleteNetworkContainerRequest>, JsonRejection>,
) -> Response {
    handle(payload, |req| async move { state.service.delete_network_container(req).await }).await
}

async fn get_network_container_by_orchestrator_context(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GetNetworkContainerRequest>, JsonRejection>,
) -> Response {
    handle(payload, |req| async move {
        state
            .service
            .get_network_container_by_orchestrator_context(req)
            .await
    })
    .await
}

/// GET /networkcontainers
async fn get_all_network_containers(State(state): State<Arc<AppState>>) -> Response {
    reply(state.service.get_all_network_containers().await)
}

/// POST /networkcontainers
async fn post_network_containers(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PostNetworkContainersRequest>, JsonRejection>,
) -> Response {
    handle(payload, |req| async move { state.service.post_network_containers(req).await }).await
}

async fn publish_network_container(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PublishNetworkContainerRequest>, JsonRejection>,
) -> Response {
    handle(payload, |req| async move { state.service.publish_network_container(req).await }).await
}

async fn unpublish_network_container(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UnpublishNetworkContainerRequest>, JsonRejection>,
) -> Response {
    handle(payload, |req| async move {
        state.service.unpublish_network_container(req).await
    })
    .await
}

// ============================================================================
// Node handlers
// ============================================================================

async fn nmagent_supported_apis(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NmAgentSupportedApisRequest>, JsonRejection>,
) -> Response {
    handle(payload, |req| async move { state.service.nmagent_supported_apis(req).await }).await
}

/// GET /gethomeaz
async fn get_home_az(State(state): State<Arc<AppState>>) -> Response {
    reply(state.service.get_home_az().await)
}

/// GET /numberofcpucores
async fn number_of_cpu_cores(State(state): State<Arc<AppState>>) -> Response {
    reply(state.service.number_of_cpu_cores())
}

async fn attach_container_to_network(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ConfigureContainerNetworkingRequest>, JsonRejection>,
) -> Response {
    handle(payload, |req| async move {
        state.service.attach_container_to_network(req).await
    })
    .await
}

async fn detach_container_from_network(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ConfigureContainerNetworkingRequest>, JsonRejection>,
) -> Response {
    handle(payload, |req| async move {
        state.service.detach_container_from_network(req).await
    })
    .await
}

// ============================================================================
// Debug handlers
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct IpAddressesQuery {
    /// Comma separated states; empty means all.
    #[serde(rename = "ipConfigStateFilter", default)]
    ip_config_state_filter: String,
}

/// GET /debug/ipaddresses?ipConfigStateFilter=Available,Assigned
async fn debug_ip_addresses(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IpAddressesQuery>,
) -> Response {
    let filter: Result<Vec<IPConfigState>, String> = query
        .ip_config_state_filter
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect();

    match filter {
        Ok(filter) => reply(state.service.ip_addresses(&filter).await),
        Err(e) => reply(GetIPAddressStatusResponse::from_envelope(failure(
            ResponseCode::InvalidParameter,
            e,
        ))),
    }
}

async fn debug_pod_context(State(state): State<Arc<AppState>>) -> Response {
    reply(state.service.pod_context().await)
}

async fn debug_rest_data(State(state): State<Arc<AppState>>) -> Response {
    reply(state.service.rest_data().await)
}

/// GET /metrics - Prometheus text exposition
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.service.metrics().gather_text() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
