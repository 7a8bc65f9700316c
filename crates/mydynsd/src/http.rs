// # HTTP Surface
//
// Thin axum layer over `mydyns_core::DynDns`. Both routes accept any
// method and read form parameters from the query string and, when present,
// an urlencoded body (the body wins on conflicts).
//
// - `/token`: Basic auth + `hostname` → `<token>\n`
// - `/update`: `token`, `myip`/`address`, `check` → `accepted\n` or `<ip>\n`
//
// ## Status Codes
//
// | Error                                       | Status |
// |---------------------------------------------|--------|
// | Authentication, Authorization, InvalidToken | 403    |
// | InvalidInput                                | 400    |
// | Backpressure                                | 418    |
// | anything else                               | 500    |

use axum::extract::{ConnectInfo, Form, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mydyns_core::{BasicAuth, DynDns, Error, UpdateOutcome, UpdateRequest};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

type Params = HashMap<String, String>;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    service: Arc<DynDns>,
    proxy_header: HeaderName,
}

impl AppState {
    pub fn new(service: Arc<DynDns>, proxy_header: &str) -> anyhow::Result<Self> {
        let proxy_header = HeaderName::try_from(proxy_header)
            .map_err(|e| anyhow::anyhow!("Invalid proxy header '{}': {}", proxy_header, e))?;
        Ok(Self {
            service,
            proxy_header,
        })
    }
}

/// Build the router with tracing and a per-request deadline
pub fn router(state: AppState, timeout: Duration) -> Router {
    Router::new()
        .route("/token", any(issue_token))
        .route("/update", any(apply_update))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Core error carried to the client as status + message
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Authentication(_) | Error::Authorization(_) | Error::InvalidToken(_) => {
                StatusCode::FORBIDDEN
            }
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::Backpressure(_) => StatusCode::IM_A_TEAPOT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            debug!("Request rejected ({}): {}", status, self.0);
        }

        (status, format!("{}\n", self.0)).into_response()
    }
}

async fn issue_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<Params>,
    form: Option<Form<Params>>,
) -> Result<String, ApiError> {
    let params = merge(query, form);
    let credentials = basic_auth(&headers);
    let auth = credentials.as_ref().map(|(user, password)| BasicAuth {
        user: user.as_str(),
        password: password.as_str(),
    });

    let token = state
        .service
        .issue_token(auth, params.get("hostname").map(String::as_str))
        .await?;

    Ok(format!("{}\n", token))
}

async fn apply_update(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<Params>,
    form: Option<Form<Params>>,
) -> Result<String, ApiError> {
    let params = merge(query, form);
    let forwarded = headers
        .get(&state.proxy_header)
        .and_then(|value| value.to_str().ok());

    let outcome = state
        .service
        .apply_update(UpdateRequest {
            token: params.get("token").map(String::as_str),
            myip: params.get("myip").map(String::as_str),
            address: params.get("address").map(String::as_str),
            check: params.contains_key("check"),
            remote: peer.ip(),
            forwarded,
        })
        .await?;

    Ok(match outcome {
        UpdateOutcome::Accepted { .. } => "accepted\n".to_string(),
        UpdateOutcome::Checked(ip) => format!("{}\n", ip),
    })
}

fn merge(query: Params, form: Option<Form<Params>>) -> Params {
    let mut params = query;
    if let Some(Form(body)) = form {
        params.extend(body);
    }
    params
}

/// Decode `Authorization: Basic base64(user:password)`
fn basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}
