use actix_web::{
    Error, ResponseError,
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    http::Method,
    middleware::Next,
};

use super::actor::Actor;
use crate::errors::AppError;

/// Middleware function that rejects mutations without a valid actor header.
/// Reads stay open to any caller the gateway lets through.
pub async fn require_actor(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let mutating = matches!(*req.method(), Method::POST | Method::PUT | Method::DELETE);

    if mutating && Actor::from_request_head(req.request()).is_none() {
        log::warn!("Rejected {} {} without actor", req.method(), req.path());
        let response = AppError::MissingActor.error_response();
        return Ok(req.into_response(response).map_into_right_body());
    }

    next.call(req).await.map(|res| res.map_into_left_body())
}

