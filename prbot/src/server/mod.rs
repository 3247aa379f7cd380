//! Webhook server: HTTP intake, signature verification and routing.

mod external;

pub use external::create_access_token;

use crate::{
    context::Context, database::store::RepositoryStore, event_processor::EventProcessor, Error,
    Result,
};
use futures::future;
use github::{Webhook, DELIVERY_ID_HEADER, EVENT_TYPE_HEADER, SIGNATURE_HEADER};
use hyper::{
    body,
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::AddrStream,
    service::{make_service_fn, service_fn},
    Body, Method, Request, Response, Server as HyperServer, StatusCode,
};
use log::{error, info};
use std::{net::SocketAddr, sync::Arc};

#[derive(Clone)]
pub struct Server {
    ctx: Arc<Context>,
}

impl Server {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        // The closure inside `make_service_fn` is run for each connection,
        // creating a 'service' to handle requests for that specific
        // connection.
        let make_service = make_service_fn(|_socket: &AddrStream| {
            let server = self.clone();

            future::ok::<_, Error>(service_fn(move |request| {
                let server = server.clone();
                server.route(request)
            }))
        });

        info!("listening on http://{}", addr);
        HyperServer::bind(&addr).serve(make_service).await?;

        Ok(())
    }

    async fn route(self, request: Request<Body>) -> Result<Response<Body>> {
        let response = match (request.method(), request.uri().path()) {
            (&Method::GET, "/") => json_response(
                StatusCode::OK,
                serde_json::json!({"message": "Welcome on prbot!"}),
            ),
            (&Method::GET, "/health") => self.health().await,
            (&Method::POST, "/webhook") => self.webhook(request).await,
            (&Method::POST, "/external/set-qa-status") => {
                external::set_qa_status(self.ctx.as_ref(), request).await
            }
            _ => json_response(
                StatusCode::NOT_FOUND,
                serde_json::json!({"error": "Not found"}),
            ),
        };

        match response {
            Ok(response) => Ok(response),
            Err(err) => {
                error!("error while handling request: {:?}", err);
                json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({"error": "Internal server error"}),
                )
            }
        }
    }

    async fn health(&self) -> Result<Response<Body>> {
        let database = self.ctx.repository_store.all().await.is_ok();
        let lock = self.ctx.lock.ping().await.unwrap_or(false);

        json_response(
            StatusCode::OK,
            serde_json::json!({"database": database, "lock": lock}),
        )
    }

    async fn webhook(&self, request: Request<Body>) -> Result<Response<Body>> {
        let webhook = match webhook_from_request(request).await? {
            Ok(webhook) => webhook,
            Err(detail) => {
                return json_response(
                    StatusCode::PRECONDITION_FAILED,
                    serde_json::json!({ "error": detail }),
                )
            }
        };

        if !webhook.check_signature(Some(self.ctx.config.github_webhook_secret.as_bytes())) {
            return json_response(
                StatusCode::PRECONDITION_FAILED,
                serde_json::json!({
                    "error": "Body signature does not match the X-Hub-Signature-256 header"
                }),
            );
        }

        let event = match webhook.to_event() {
            Ok(event) => event,
            Err(err) => {
                return json_response(
                    StatusCode::BAD_REQUEST,
                    serde_json::json!({"error": format!("Invalid payload: {}", err)}),
                )
            }
        };

        info!(
            "received webhook: event = `{}`, delivery = {}",
            webhook.event_type.name(),
            webhook.delivery_id
        );
        EventProcessor::new(self.ctx.as_ref()).process_event(event).await?;

        json_response(StatusCode::OK, serde_json::json!({"message": "OK"}))
    }
}

/// Extract and validate the webhook envelope. An `Err(detail)` in the inner
/// result is a precondition failure (412), while transport errors bubble.
async fn webhook_from_request(
    request: Request<Body>,
) -> Result<std::result::Result<Webhook, String>> {
    let event_type = match request
        .headers()
        .get(EVENT_TYPE_HEADER)
        .and_then(|h| HeaderValue::to_str(h).ok())
    {
        None => return Ok(Err(format!("Missing {} header", EVENT_TYPE_HEADER))),
        Some(value) => match value.parse() {
            Ok(event_type) => event_type,
            Err(_) => return Ok(Err(format!("Unsupported {} header", EVENT_TYPE_HEADER))),
        },
    };

    let signature = match request
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|h| HeaderValue::to_str(h).ok())
    {
        None => return Ok(Err(format!("Missing {} header", SIGNATURE_HEADER))),
        Some(signature) => Some(signature.to_owned()),
    };

    let delivery_id = request
        .headers()
        .get(DELIVERY_ID_HEADER)
        .and_then(|h| HeaderValue::to_str(h).ok())
        .unwrap_or_default()
        .to_owned();

    let body = body::to_bytes(request.into_body()).await?.to_vec();

    Ok(Ok(Webhook {
        event_type,
        delivery_id,
        signature,
        body,
    }))
}

fn json_response(status: StatusCode, payload: serde_json::Value) -> Result<Response<Body>> {
    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))?)
}

/// Run the webhook server from the configured bind address.
pub async fn run_serve(ctx: Arc<Context>) -> Result<()> {
    let ip: std::net::IpAddr = ctx
        .config
        .server_ip
        .parse()
        .map_err(|_| Error::from(format!("invalid server ip `{}`", ctx.config.server_ip)))?;
    let addr = SocketAddr::new(ip, ctx.config.server_port);

    Server::new(ctx).serve(addr).await
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::database::store::PullRequestStore;
    use crate::models::{PullRequest, Repository, RepositoryPath};
    use crate::test_support::{test_context, upstream_pull_request};

    fn webhook_request(
        secret: Option<&[u8]>,
        event_type: &str,
        body: serde_json::Value,
    ) -> Request<Body> {
        let body = body.to_string();
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/webhook")
            .header(EVENT_TYPE_HEADER, event_type)
            .header(DELIVERY_ID_HEADER, "delivery-1");

        if let Some(secret) = secret {
            let signature = format!("sha256={}", Webhook::sign(secret, body.as_bytes()));
            builder = builder.header(SIGNATURE_HEADER, signature);
        }

        builder.body(Body::from(body)).unwrap()
    }

    fn ping_payload() -> serde_json::Value {
        serde_json::json!({"zen": "Keep it logically awesome.", "hook_id": 1})
    }

    async fn server() -> (Server, crate::test_support::TestContext) {
        let (ctx, fixtures) = test_context();
        (Server::new(Arc::new(ctx)), fixtures)
    }

    #[tokio::test]
    async fn index_route_greets() {
        let (server, _fixtures) = server().await;

        let request = Request::builder()
            .method(Method::GET)
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let response = server.route(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_route_reports_dependencies() {
        let (server, _fixtures) = server().await;

        let request = Request::builder()
            .method(Method::GET)
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = server.route(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body::to_bytes(response.into_body()).await.unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload["database"], true);
        assert_eq!(payload["lock"], true);
    }

    #[tokio::test]
    async fn valid_signature_is_accepted() {
        let (server, _fixtures) = server().await;

        let request = webhook_request(Some(b"test-secret"), "ping", ping_payload());
        let response = server.route(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_with_412() {
        let (server, _fixtures) = server().await;

        let request = webhook_request(Some(b"wrong-secret"), "ping", ping_payload());
        let response = server.route(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn missing_signature_is_rejected_with_412() {
        let (server, _fixtures) = server().await;

        let request = webhook_request(None, "ping", ping_payload());
        let response = server.route(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn unsupported_event_is_rejected_with_412() {
        let (server, _fixtures) = server().await;

        let request = webhook_request(Some(b"test-secret"), "workflow_run", ping_payload());
        let response = server.route(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn comment_webhook_runs_commands() {
        let (server, fixtures) = server().await;

        {
            let ctx = &server.ctx;
            ctx.repository_store
                .create(Repository::new("owner", "name"))
                .await
                .unwrap();
            ctx.pull_request_store
                .create(PullRequest::new(RepositoryPath::new("owner", "name"), 1))
                .await
                .unwrap();
        }
        fixtures
            .api
            .set_pull_request(upstream_pull_request("foo", "feature", "main"));

        let payload = serde_json::json!({
            "action": "created",
            "issue": {"number": 1, "title": "t", "user": {"login": "foo"}},
            "comment": {"id": 42, "user": {"login": "foo"}, "body": "bot ping"},
            "repository": {
                "name": "name",
                "full_name": "owner/name",
                "owner": {"login": "owner"}
            },
            "sender": {"login": "foo"}
        });

        let request = webhook_request(Some(b"test-secret"), "issue_comment", payload);
        let response = server.route(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(fixtures.api.created_comments().len(), 1);
        assert!(fixtures.api.created_comments()[0].contains("Pong!"));
    }
}
