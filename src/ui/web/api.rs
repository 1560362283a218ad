use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Extension},
    routing::{delete, get, patch, post},
    Json, Router,
};
use clap::Parser;
use serde::de::DeserializeOwned;
use std::{net::SocketAddr, sync::Arc};
use tracing::info;

use super::response::*;
use crate::service::{ServiceError, Wgcfg};

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse<T: DeserializeOwned>(body: Result<Bytes, BytesRejection>) -> Result<T, ApiError> {
    let body = body.map_err(|e| ApiError::BadRequest(format!("Failed to read request body: {e}")))?;
    serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON: {e}")))
}

fn found(id: u32, found: bool) -> Result<(), ApiError> {
    if found {
        Ok(())
    } else {
        Err(ServiceError::NotFound(id).into())
    }
}

async fn add_client(
    Extension(service): Extension<Arc<Wgcfg>>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<NewClientResponse> {
    let payload: NewClient = parse(body)?;
    let client = service.add(payload.id, payload.tg_id).await?;

    Ok(Json(NewClientResponse {
        id: client.id,
        client,
    }))
}

async fn delete_client(
    Extension(service): Extension<Arc<Wgcfg>>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Status> {
    let ClientId { id } = parse(body)?;
    found(id, service.delete(id).await?)?;

    Ok(Json(Status {
        status: "Client deleted",
    }))
}

async fn all_clients(Extension(service): Extension<Arc<Wgcfg>>) -> Json<Clients> {
    Json(Clients {
        clients: service.list_all().await,
    })
}

async fn activate_client(
    Extension(service): Extension<Arc<Wgcfg>>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Status> {
    let ClientId { id } = parse(body)?;
    found(id, service.activate(id).await?)?;

    Ok(Json(Status {
        status: "Client activated",
    }))
}

async fn stop_client(
    Extension(service): Extension<Arc<Wgcfg>>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Status> {
    let ClientId { id } = parse(body)?;
    found(id, service.stop(id).await?)?;

    Ok(Json(Status {
        status: "Client stopped",
    }))
}

async fn start_server(Extension(service): Extension<Arc<Wgcfg>>) -> ApiResult<Status> {
    service.bootstrap().await?;

    Ok(Json(Status {
        status: "Server started",
    }))
}

async fn drop_server(Extension(service): Extension<Arc<Wgcfg>>) -> ApiResult<Status> {
    service.teardown().await?;

    Ok(Json(Status {
        status: "Server dropped",
    }))
}

async fn send_config(
    Extension(service): Extension<Arc<Wgcfg>>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Status> {
    let ClientId { id } = parse(body)?;
    service.send_config(id).await?;

    Ok(Json(Status {
        status: "Config sent",
    }))
}

async fn traffic(Extension(service): Extension<Arc<Wgcfg>>) -> ApiResult<Traffic> {
    Ok(Json(Traffic {
        traffic: service.collect_traffic().await?,
    }))
}

#[derive(Debug, Parser)]
pub struct Config {
    #[clap(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080", value_parser)]
    listen_addr: SocketAddr,
}

pub fn router(service: Wgcfg) -> Router {
    Router::new()
        .route("/addClient", post(add_client))
        .route("/deleteClient", delete(delete_client))
        .route("/getAllClients", get(all_clients))
        .route("/activateClient", patch(activate_client))
        .route("/stopClient", patch(stop_client))
        .route("/startServer", post(start_server))
        .route("/dropServer", post(drop_server))
        .route("/sendConfig", post(send_config))
        .route("/getTraffic", get(traffic))
        .layer(Extension(Arc::new(service)))
}

pub async fn start(
    config: Config,
    service: Wgcfg,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "API server started");

    axum::serve(listener, router(service)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::router;
    use crate::service::testing;

    async fn call(app: &axum::Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        };
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();

        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn client_lifecycle_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _, _) = testing::service(dir.path(), Default::default());
        let app = router(service);

        let (status, body) = call(&app, Method::POST, "/addClient", Some(json!({"id": 5}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "not_bootstrapped");

        let (status, body) = call(&app, Method::POST, "/startServer", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "Server started"}));

        let (status, body) = call(&app, Method::POST, "/addClient", Some(json!({"id": 5}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 5);
        assert_eq!(body["client"]["address_client"], "10.0.0.5/24");
        assert_eq!(body["client"]["status"], true);

        let (status, body) = call(&app, Method::GET, "/getAllClients", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["clients"], "Client 5 status active address 10.0.0.5/24\n");

        let (status, body) = call(&app, Method::PATCH, "/stopClient", Some(json!({"id": 5}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "Client stopped"}));

        let (status, body) =
            call(&app, Method::PATCH, "/activateClient", Some(json!({"id": 5}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "Client activated"}));

        let (status, body) =
            call(&app, Method::DELETE, "/deleteClient", Some(json!({"id": 5}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "Client deleted"}));

        let (status, body) = call(&app, Method::PATCH, "/stopClient", Some(json!({"id": 5}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
    }

    #[tokio::test]
    async fn wrong_method_is_405() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _, _) = testing::service(dir.path(), Default::default());
        let app = router(service);

        for (method, uri) in [
            (Method::GET, "/addClient"),
            (Method::POST, "/deleteClient"),
            (Method::POST, "/getAllClients"),
            (Method::POST, "/activateClient"),
            (Method::GET, "/stopClient"),
            (Method::GET, "/startServer"),
        ] {
            let (status, _) = call(&app, method, uri, None).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{uri}");
        }
    }

    #[tokio::test]
    async fn malformed_body_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let (service, host, _) = testing::service(dir.path(), Default::default());
        let app = router(service);

        for body in [json!("nope"), json!({"id": "five"}), json!({}), json!({"id": -1})] {
            let (status, value) = call(&app, Method::POST, "/addClient", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(value["kind"], "bad_request");
        }

        let (status, _) = call(&app, Method::PATCH, "/stopClient", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(host.calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_id_and_missing_chat() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _, delivery) = testing::bootstrapped(dir.path()).await;
        let app = router(service);

        let (status, body) = call(&app, Method::POST, "/addClient", Some(json!({"id": 1}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_id");

        call(&app, Method::POST, "/addClient", Some(json!({"id": 3}))).await;
        let (status, body) = call(&app, Method::POST, "/sendConfig", Some(json!({"id": 3}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "no_chat");

        call(&app, Method::POST, "/addClient", Some(json!({"id": 4, "tg_id": 99}))).await;
        let (status, body) = call(&app, Method::POST, "/sendConfig", Some(json!({"id": 4}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "Config sent"}));
        assert_eq!(delivery.sent.lock().unwrap()[0].0, 99);
    }

    #[tokio::test]
    async fn host_failure_is_500_with_kind() {
        let dir = tempfile::tempdir().unwrap();
        let (service, host, _) = testing::bootstrapped(dir.path()).await;
        host.fail_on("systemctl restart");
        let app = router(service);

        let (status, body) = call(&app, Method::POST, "/addClient", Some(json!({"id": 7}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["kind"], "host_command");
        assert!(body["error"].as_str().unwrap().contains("systemctl restart"));
    }

    #[tokio::test]
    async fn traffic_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let (service, host, _) = testing::service(dir.path(), Default::default());
        host.set_show_output("peer: ABC\n  transfer: 3.48 MiB received, 33.46 MiB sent\n");
        let app = router(service);

        let (status, body) = call(&app, Method::GET, "/getTraffic", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"traffic": {"ABC": {"traffic_rx": 3649044, "traffic_tx": 35085352}}})
        );
    }

    #[tokio::test]
    async fn drop_server_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _, _) = testing::bootstrapped(dir.path()).await;
        let app = router(service);
        call(&app, Method::POST, "/addClient", Some(json!({"id": 2}))).await;

        let (status, body) = call(&app, Method::POST, "/dropServer", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "Server dropped"}));

        let (_, body) = call(&app, Method::GET, "/getAllClients", None).await;
        assert_eq!(body["clients"], "");
    }
}
