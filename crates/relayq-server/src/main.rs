//! RelayQ Server - Message Broker HTTP Server
//!
//! This is the main entry point for the RelayQ message broker. It exposes
//! the AMQP-shaped declare/bind/publish/receive surface over HTTP.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use relayq_core::{Broker, Publisher};
use relayq_types::{Binding, Error, Exchange, ExchangeKind, Message, QueueInfo, QueueStats};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

// ==================== App State ====================

/// Shared application state
#[derive(Clone)]
struct AppState {
    broker: Arc<Broker>,
    publisher: Arc<Publisher>,
}

// ==================== Request/Response Types ====================

/// Declare exchange request
#[derive(Debug, Deserialize, ToSchema)]
struct DeclareExchangeRequest {
    /// Name of the exchange to declare
    name: String,
    /// Routing kind ("fanout" or "direct")
    kind: ExchangeKind,
    /// Durability flag (accepted, inert in-memory)
    #[serde(default)]
    durable: bool,
}

/// Declare queue request
#[derive(Debug, Deserialize, ToSchema)]
struct DeclareQueueRequest {
    /// Name of the queue to declare
    name: String,
    /// Exclusivity flag (accepted, inert single-process)
    #[serde(default)]
    exclusive: bool,
}

/// Bind queue to exchange request
#[derive(Debug, Deserialize, ToSchema)]
struct BindRequest {
    /// Source exchange name
    exchange: String,
    /// Target queue name
    queue: String,
    /// Binding key (ignored by fanout exchanges)
    #[serde(default)]
    binding_key: String,
}

/// Publish message request.
///
/// Omitting the routing key publishes at "info" severity; omitting the
/// body sends "hello".
#[derive(Debug, Deserialize, ToSchema)]
struct PublishRequest {
    /// Routing key ("severity" in the logging demo)
    #[serde(default = "default_routing_key")]
    routing_key: String,
    /// Message body content
    #[serde(default = "default_body")]
    body: String,
    /// Content type (defaults to "text/plain")
    #[serde(default)]
    content_type: Option<String>,
}

fn default_routing_key() -> String {
    "info".to_string()
}

fn default_body() -> String {
    "hello".to_string()
}

/// Publish response
#[derive(Debug, Serialize, ToSchema)]
struct PublishResponse {
    /// ID of the published message
    message_id: String,
}

/// Receive query parameters
#[derive(Debug, Deserialize, ToSchema)]
struct ReceiveQuery {
    /// Maximum number of messages to receive (default: 1)
    #[serde(default = "default_max_messages")]
    max: usize,
}

fn default_max_messages() -> usize {
    1
}

/// Message response (for API)
#[derive(Debug, Serialize, ToSchema)]
struct MessageResponse {
    /// Unique message ID
    id: String,
    /// Content type
    content_type: String,
    /// Message body content
    body: String,
    /// Creation timestamp
    created_at: String,
}

impl From<Message> for MessageResponse {
    fn from(msg: Message) -> Self {
        Self {
            id: msg.id.to_string(),
            content_type: msg.content_type.clone(),
            body: msg.body_as_str().unwrap_or("").to_string(),
            created_at: msg.created_at.to_rfc3339(),
        }
    }
}

/// API Error response
#[derive(Debug, Serialize, ToSchema)]
struct ApiErrorBody {
    /// Error message
    error: String,
    /// Error code
    code: String,
}

/// Health check response
#[derive(Debug, Serialize, ToSchema)]
struct HealthResponse {
    /// Health status
    status: String,
    /// Server version
    version: String,
    /// Messages dropped because no binding matched
    unroutable_count: u64,
}

// ==================== Error Handling ====================

/// Wrapper for RelayQ errors to implement IntoResponse
struct AppError(Error);

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self.0 {
            Error::ExchangeNotFound(_) => (StatusCode::NOT_FOUND, "EXCHANGE_NOT_FOUND"),
            Error::QueueNotFound(_) => (StatusCode::NOT_FOUND, "QUEUE_NOT_FOUND"),
            Error::ExchangeKindConflict { .. } => (StatusCode::CONFLICT, "EXCHANGE_KIND_CONFLICT"),
            Error::ConsumerAlreadyAttached(_) => {
                (StatusCode::CONFLICT, "CONSUMER_ALREADY_ATTACHED")
            }
            Error::PublishTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "PUBLISH_TIMEOUT"),
            Error::InvalidMessage(_) => (StatusCode::BAD_REQUEST, "INVALID_MESSAGE"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(ApiErrorBody {
            error: self.0.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

// ==================== OpenAPI Documentation ====================

#[derive(OpenApi)]
#[openapi(
    info(
        title = "RelayQ API",
        version = "0.1.0",
        description = "RelayQ - In-Memory Routing Message Broker API",
        license(name = "MIT OR Apache-2.0"),
        contact(name = "RelayQ Team", url = "https://github.com/relayq/relayq")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    paths(
        health,
        list_exchanges,
        declare_exchange,
        list_queues,
        declare_queue,
        get_queue_stats,
        list_bindings,
        bind_queue,
        publish_message,
        receive_messages,
    ),
    components(
        schemas(
            HealthResponse,
            Exchange,
            ExchangeKind,
            Binding,
            QueueInfo,
            QueueStats,
            DeclareExchangeRequest,
            DeclareQueueRequest,
            BindRequest,
            PublishRequest,
            PublishResponse,
            MessageResponse,
            ReceiveQuery,
            ApiErrorBody,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "topology", description = "Exchange, queue, and binding declarations"),
        (name = "messages", description = "Message operations endpoints")
    )
)]
struct ApiDoc;

// ==================== Handlers ====================

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is healthy", body = HealthResponse)
    )
)]
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        unroutable_count: state.broker.unroutable_count(),
    })
}

/// List all declared exchanges
#[utoipa::path(
    get,
    path = "/api/v1/exchanges",
    tag = "topology",
    responses(
        (status = 200, description = "List of all exchanges", body = Vec<Exchange>)
    )
)]
async fn list_exchanges(State(state): State<AppState>) -> Json<Vec<Exchange>> {
    Json(state.broker.list_exchanges())
}

/// Declare an exchange (idempotent)
#[utoipa::path(
    post,
    path = "/api/v1/exchanges",
    tag = "topology",
    request_body = DeclareExchangeRequest,
    responses(
        (status = 201, description = "Exchange declared", body = Exchange),
        (status = 409, description = "Exchange exists with a different kind", body = ApiErrorBody)
    )
)]
async fn declare_exchange(
    State(state): State<AppState>,
    Json(req): Json<DeclareExchangeRequest>,
) -> Result<(StatusCode, Json<Exchange>), AppError> {
    let exchange = state
        .broker
        .declare_exchange(req.name, req.kind, req.durable)?;
    Ok((StatusCode::CREATED, Json(exchange)))
}

/// List all declared queues
#[utoipa::path(
    get,
    path = "/api/v1/queues",
    tag = "topology",
    responses(
        (status = 200, description = "List of all queues", body = Vec<QueueInfo>)
    )
)]
async fn list_queues(State(state): State<AppState>) -> Json<Vec<QueueInfo>> {
    Json(state.broker.list_queues())
}

/// Declare a queue (idempotent)
#[utoipa::path(
    post,
    path = "/api/v1/queues",
    tag = "topology",
    request_body = DeclareQueueRequest,
    responses(
        (status = 201, description = "Queue declared", body = QueueInfo)
    )
)]
async fn declare_queue(
    State(state): State<AppState>,
    Json(req): Json<DeclareQueueRequest>,
) -> Result<(StatusCode, Json<QueueInfo>), AppError> {
    let queue = state.broker.declare_queue(req.name, req.exclusive)?;
    Ok((StatusCode::CREATED, Json(queue.info().clone())))
}

/// Get queue statistics
#[utoipa::path(
    get,
    path = "/api/v1/queues/{name}/stats",
    tag = "topology",
    params(
        ("name" = String, Path, description = "Queue name")
    ),
    responses(
        (status = 200, description = "Queue statistics", body = QueueStats),
        (status = 404, description = "Queue not found", body = ApiErrorBody)
    )
)]
async fn get_queue_stats(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<QueueStats>, AppError> {
    let stats = state.broker.queue_stats(&name)?;
    Ok(Json(stats))
}

/// List all declared bindings
#[utoipa::path(
    get,
    path = "/api/v1/bindings",
    tag = "topology",
    responses(
        (status = 200, description = "List of all bindings", body = Vec<Binding>)
    )
)]
async fn list_bindings(State(state): State<AppState>) -> Json<Vec<Binding>> {
    Json(state.broker.list_bindings())
}

/// Bind a queue to an exchange (idempotent)
#[utoipa::path(
    post,
    path = "/api/v1/bindings",
    tag = "topology",
    request_body = BindRequest,
    responses(
        (status = 204, description = "Binding declared"),
        (status = 404, description = "Exchange or queue not found", body = ApiErrorBody)
    )
)]
async fn bind_queue(
    State(state): State<AppState>,
    Json(req): Json<BindRequest>,
) -> Result<StatusCode, AppError> {
    state.broker.bind(req.queue, req.exchange, req.binding_key)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Publish a message to an exchange
#[utoipa::path(
    post,
    path = "/api/v1/exchanges/{name}/messages",
    tag = "messages",
    params(
        ("name" = String, Path, description = "Exchange name")
    ),
    request_body = PublishRequest,
    responses(
        (status = 201, description = "Message published", body = PublishResponse),
        (status = 404, description = "Exchange not found", body = ApiErrorBody),
        (status = 504, description = "Publish deadline exceeded", body = ApiErrorBody)
    )
)]
async fn publish_message(
    State(state): State<AppState>,
    Path(exchange): Path<String>,
    Json(req): Json<PublishRequest>,
) -> Result<(StatusCode, Json<PublishResponse>), AppError> {
    let mut message = Message::new(req.body);
    if let Some(ct) = req.content_type {
        message = message.with_content_type(ct);
    }

    let message_id = state
        .publisher
        .publish_message(&exchange, &req.routing_key, message)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(PublishResponse {
            message_id: message_id.to_string(),
        }),
    ))
}

/// Receive messages from a queue.
///
/// Removal is the acknowledgment (auto-ack): a message returned here is
/// gone from the queue even if the caller discards the response.
#[utoipa::path(
    get,
    path = "/api/v1/queues/{name}/messages",
    tag = "messages",
    params(
        ("name" = String, Path, description = "Queue name"),
        ("max" = Option<usize>, Query, description = "Maximum messages to receive")
    ),
    responses(
        (status = 200, description = "Messages received", body = Vec<MessageResponse>),
        (status = 404, description = "Queue not found", body = ApiErrorBody)
    )
)]
async fn receive_messages(
    State(state): State<AppState>,
    Path(queue_name): Path<String>,
    Query(query): Query<ReceiveQuery>,
) -> Result<Json<Vec<MessageResponse>>, AppError> {
    let queue = state.broker.queue(&queue_name)?;
    let mut responses = Vec::with_capacity(query.max);
    while responses.len() < query.max {
        match queue.try_dequeue() {
            Some(message) => responses.push(MessageResponse::from(message)),
            None => break,
        }
    }
    Ok(Json(responses))
}

// ==================== Router ====================

fn create_router(state: AppState) -> Router {
    Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Health
        .route("/health", get(health))
        // Topology
        .route(
            "/api/v1/exchanges",
            get(list_exchanges).post(declare_exchange),
        )
        .route("/api/v1/queues", get(list_queues).post(declare_queue))
        .route("/api/v1/queues/:name/stats", get(get_queue_stats))
        .route("/api/v1/bindings", get(list_bindings).post(bind_queue))
        // Messages
        .route("/api/v1/exchanges/:name/messages", post(publish_message))
        .route("/api/v1/queues/:name/messages", get(receive_messages))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ==================== Main ====================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relayq=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Create the broker context and its publisher
    let broker = Arc::new(Broker::new());
    let publisher = Arc::new(Publisher::new(Arc::clone(&broker)));

    // Create app state
    let state = AppState { broker, publisher };

    // Create router
    let app = create_router(state);

    // Start server
    let addr = "127.0.0.1:3000";
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("RelayQ server listening on {}", addr);
    info!("Swagger UI: http://localhost:3000/swagger-ui/");
    info!("Health check: http://localhost:3000/health");

    axum::serve(listener, app).await?;

    Ok(())
}
