use std::collections::HashMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    service::ServiceError,
    state::{Client, PeerTraffic},
};

#[derive(Deserialize)]
pub struct ClientId {
    pub id: u32,
}

#[derive(Deserialize)]
pub struct NewClient {
    pub id: u32,
    #[serde(default)]
    pub tg_id: Option<i64>,
}

#[derive(Serialize)]
pub struct NewClientResponse {
    pub client: Client,
    pub id: u32,
}

#[derive(Serialize)]
pub struct Status {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct Clients {
    pub clients: String,
}

#[derive(Serialize)]
pub struct Traffic {
    pub traffic: HashMap<String, PeerTraffic>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    kind: &'a str,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Service(ServiceError),
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self::Service(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, kind) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "bad_request"),
            ApiError::Service(e) => {
                let status = match &e {
                    ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
                    ServiceError::InvalidId(_) | ServiceError::NoChat(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    ServiceError::NotBootstrapped | ServiceError::PeersRegistered(_) => {
                        StatusCode::CONFLICT
                    }
                    _ => {
                        tracing::error!(error = %e, "request failed");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.to_string(), e.kind())
            }
        };

        (status, Json(ErrorBody { error, kind })).into_response()
    }
}
