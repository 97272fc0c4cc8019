use actix_web::{FromRequest, HttpRequest, dev::Payload};
use std::future::{Ready, ready};

use crate::errors::AppError;

/// Header carrying the caller's user id, set by the authenticating gateway.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Identity of the caller. The engine trusts the gateway and does not authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub i64);

impl Actor {
    pub fn id(self) -> i64 {
        self.0
    }

    /// Parse the actor from request headers. Ids must be positive.
    pub fn from_request_head(req: &HttpRequest) -> Option<Actor> {
        req.headers()
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(Actor)
    }
}

impl FromRequest for Actor {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Actor::from_request_head(req).ok_or(AppError::MissingActor))
    }
}
