use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use std::convert::Infallible;
use std::net::SocketAddr;

use crate::models::Operator;

const OPERATOR_HEADER: &str = "x-operator";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Extractor for the operator identity attached to a request.
///
/// The name comes from `X-Operator` (default "unknown"); the address from the
/// first `X-Forwarded-For` hop, else the peer address.
#[async_trait::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Operator {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let name = header(OPERATOR_HEADER).unwrap_or_else(|| "unknown".to_string());
        let ip = header(FORWARDED_FOR_HEADER)
            .and_then(|v| v.split(',').next().map(|hop| hop.trim().to_string()))
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Operator::new(name, ip))
    }
}
