pub mod messages;
pub mod passthrough;
pub mod translate;

use crate::server::{AppState, ProxyBody};
use bridge_core::MESSAGES_PATH;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;

pub async fn route(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<ProxyBody>, hyper::Error> {
    match (req.method(), req.uri().path()) {
        (&Method::POST, MESSAGES_PATH) => messages::handle(req, state).await,
        _ => {
            let mut not_found = Response::new(empty_body());
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Ok(not_found)
        }
    }
}

fn empty_body() -> ProxyBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}
