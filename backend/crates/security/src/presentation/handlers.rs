//! HTTP Handlers

use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::{StatusCode, header};
use axum::response::{AppendHeaders, ErrorResponse, Html, IntoResponse};
use axum::Json;
use platform::client::RequestContext;
use platform::password::{ClearTextPassword, PasswordHasher};
use platform::rate_limit::RateLimitStore;

use crate::application::config::SecurityConfig;
use crate::application::{
    CheckSessionUseCase, CsrfGuard, SecurityOrchestrator, SessionStore, SignInInput,
    SignInUseCase, SignOutUseCase, Throttler,
};
use crate::domain::form::FormFields;
use crate::domain::repository::{CredentialRepository, SessionRepository};
use crate::error::{SecurityError, SecurityResult};
use crate::presentation::dto::{SessionStatusResponse, SignInResponse};
use crate::presentation::extract::Client;

/// Handler result; errors may carry headers besides the error body
pub type HandlerResult<T> = Result<T, ErrorResponse>;

/// Shared state for security handlers
pub struct SecurityAppState<R, L, C> {
    pub sessions: Arc<R>,
    pub rate_limits: Arc<L>,
    pub credentials: Arc<C>,
    pub hasher: Arc<PasswordHasher>,
    pub config: Arc<SecurityConfig>,
}

impl<R, L, C> Clone for SecurityAppState<R, L, C> {
    fn clone(&self) -> Self {
        Self {
            sessions: self.sessions.clone(),
            rate_limits: self.rate_limits.clone(),
            credentials: self.credentials.clone(),
            hasher: self.hasher.clone(),
            config: self.config.clone(),
        }
    }
}

impl<R, L, C> SecurityAppState<R, L, C> {
    /// Validate the configuration and build the password hasher
    pub fn new(
        sessions: Arc<R>,
        rate_limits: Arc<L>,
        credentials: Arc<C>,
        config: SecurityConfig,
    ) -> SecurityResult<Self> {
        config.validate()?;
        let hasher = PasswordHasher::new(config.hasher)?;
        Ok(Self {
            sessions,
            rate_limits,
            credentials,
            hasher: Arc::new(hasher),
            config: Arc::new(config),
        })
    }
}

// ============================================================================
// Login Form
// ============================================================================

/// GET /login
pub async fn login_form<R, L, C>(
    State(state): State<SecurityAppState<R, L, C>>,
    Client(ctx): Client,
) -> HandlerResult<impl IntoResponse>
where
    R: SessionRepository + Send + Sync + 'static,
    L: RateLimitStore + Send + Sync + 'static,
    C: CredentialRepository + Send + Sync + 'static,
{
    let mut gate = open_gate(&state, ctx).await?;

    let token = gate.issue_csrf_token()?;
    let field = gate.csrf().render_field(&token);
    gate.apply_security_headers(false)?;

    let headers = gate.finish().await?;
    Ok((headers, Html(render_form(&field, LOGIN_INPUTS, "Sign in"))))
}

// ============================================================================
// Sign In
// ============================================================================

/// POST /login
pub async fn sign_in<R, L, C>(
    State(state): State<SecurityAppState<R, L, C>>,
    Client(ctx): Client,
    Form(fields): Form<FormFields>,
) -> HandlerResult<impl IntoResponse>
where
    R: SessionRepository + Send + Sync + 'static,
    L: RateLimitStore + Send + Sync + 'static,
    C: CredentialRepository + Send + Sync + 'static,
{
    let mut gate = open_gate(&state, ctx).await?;
    gate.request_pre_run(&fields).await?;

    let input = SignInInput {
        user_name: required(&fields, "user_name")?.to_string(),
        password: ClearTextPassword::new(required(&fields, "password")?),
    };

    let use_case = SignInUseCase::new(
        state.credentials.clone(),
        state.hasher.clone(),
        state.config.logged_in_key.clone(),
    );
    let output = use_case.execute(gate.session_mut(), input).await?;

    gate.apply_security_headers(true)?;
    let headers = gate.finish().await?;

    Ok((
        headers,
        Json(SignInResponse {
            user_name: output.user_name,
        }),
    ))
}

// ============================================================================
// Sign Out
// ============================================================================

/// GET /logout
pub async fn logout_form<R, L, C>(
    State(state): State<SecurityAppState<R, L, C>>,
    Client(ctx): Client,
) -> HandlerResult<impl IntoResponse>
where
    R: SessionRepository + Send + Sync + 'static,
    L: RateLimitStore + Send + Sync + 'static,
    C: CredentialRepository + Send + Sync + 'static,
{
    let mut gate = open_gate(&state, ctx).await?;

    let token = gate.issue_csrf_token()?;
    let field = gate.csrf().render_field(&token);
    gate.apply_security_headers(false)?;

    let headers = gate.finish().await?;
    Ok((headers, Html(render_form(&field, "", "Sign out"))))
}

/// POST /logout
pub async fn sign_out<R, L, C>(
    State(state): State<SecurityAppState<R, L, C>>,
    Client(ctx): Client,
    Form(fields): Form<FormFields>,
) -> HandlerResult<impl IntoResponse>
where
    R: SessionRepository + Send + Sync + 'static,
    L: RateLimitStore + Send + Sync + 'static,
    C: CredentialRepository + Send + Sync + 'static,
{
    let mut gate = open_gate(&state, ctx).await?;
    gate.request_pre_run(&fields).await?;

    SignOutUseCase::new().execute(gate.session_mut()).await?;

    let headers = gate.finish().await?;
    Ok((StatusCode::NO_CONTENT, headers))
}

// ============================================================================
// Session Status
// ============================================================================

/// GET /status
pub async fn session_status<R, L, C>(
    State(state): State<SecurityAppState<R, L, C>>,
    Client(ctx): Client,
) -> HandlerResult<impl IntoResponse>
where
    R: SessionRepository + Send + Sync + 'static,
    L: RateLimitStore + Send + Sync + 'static,
    C: CredentialRepository + Send + Sync + 'static,
{
    let mut gate = open_gate(&state, ctx).await?;

    let use_case = CheckSessionUseCase::new(state.config.logged_in_key.clone());
    let logged_in = use_case.logged_in(gate.session())?;
    gate.apply_security_headers(true)?;

    let headers = gate.finish().await?;
    Ok((headers, Json(SessionStatusResponse { logged_in })))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Open the session and assemble the per-request gate
///
/// A session destroyed on a fingerprint mismatch still sends its expiry
/// cookie with the error.
async fn open_gate<R, L, C>(
    state: &SecurityAppState<R, L, C>,
    ctx: RequestContext,
) -> HandlerResult<SecurityOrchestrator<R, L>>
where
    R: SessionRepository + Send + Sync + 'static,
    L: RateLimitStore + Send + Sync + 'static,
{
    let config = &state.config;
    config.session.validate()?;
    let session = SessionStore::new(state.sessions.clone(), config.session.clone(), ctx.clone());
    let throttler = Throttler::for_client(
        state.rate_limits.clone(),
        config.rate_limit.clone(),
        &ctx,
        config.throttle_namespace.clone(),
    );

    let mut gate = SecurityOrchestrator::new(
        session,
        CsrfGuard::new(config.csrf.clone()),
        throttler,
        config.logged_in_key.clone(),
    );
    gate.enforce_session_security_config(
        config.session.cookie.same_site,
        config.session.cookie.secure,
    );

    if let Err(err) = gate.session_mut().start().await {
        let cookies = gate.session_mut().drain_cookies();
        let set_cookies = AppendHeaders(
            cookies
                .into_iter()
                .map(|cookie| (header::SET_COOKIE, cookie)),
        );
        return Err((set_cookies, err).into());
    }
    Ok(gate)
}

fn required<'a>(fields: &'a FormFields, name: &str) -> SecurityResult<&'a str> {
    fields
        .get(name)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| SecurityError::InvalidInput(format!("{name} is required")))
}

const LOGIN_INPUTS: &str = r#"<input type="text" name="user_name" autocomplete="username">
<input type="password" name="password" autocomplete="current-password">
"#;

/// Minimal HTML form; without an action it posts back to the URI its token is bound to
fn render_form(csrf_field: &str, inputs: &str, submit: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<body>
<form method="post">
{csrf_field}
{inputs}<button type="submit">{submit}</button>
</form>
</body>
</html>
"#
    )
}
