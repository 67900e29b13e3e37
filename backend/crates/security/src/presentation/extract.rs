//! Request Extractors

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts, OriginalUri};
use axum::http::request::Parts;
use platform::client::RequestContext;

use crate::presentation::handlers::SecurityAppState;

/// Client context of the current request
///
/// Uses the connection address when the server runs with connect info, and
/// the full URI even inside nested routers.
#[derive(Debug, Clone)]
pub struct Client(pub RequestContext);

impl<R, L, C> FromRequestParts<SecurityAppState<R, L, C>> for Client
where
    R: Send + Sync,
    L: Send + Sync,
    C: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SecurityAppState<R, L, C>,
    ) -> Result<Self, Self::Rejection> {
        let direct_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip());
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map(|original| &original.0)
            .unwrap_or(&parts.uri);

        Ok(Client(RequestContext::from_parts(
            &parts.headers,
            uri,
            direct_ip,
            state.config.trust_proxy,
        )))
    }
}
