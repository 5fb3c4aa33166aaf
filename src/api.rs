//! Request routing for the navigation endpoints.
//!
//! Transport-agnostic: a request is a method, a path and an optional JSON
//! body; the answer is a status code plus a JSON body. Routes may be
//! prefixed with `/api`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::engine::Navigator;
use crate::error::{ErrorKind, NavError};
use crate::model::{Pilot, SystemId};
use crate::store::WorldStore;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub username: String,
    pub target_sector_number: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarpRequest {
    pub username: String,
    pub target_system_id: SystemId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveResponse {
    pub success: bool,
    pub current_sector: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarpResponse {
    pub success: bool,
    pub current_system: SystemId,
    pub current_sector: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    ListSystems,
    GetPilot { username: String },
    Move(MoveRequest),
    Warp(WarpRequest),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteError {
    BadRequest(String),
    UnknownRoute(String),
    MethodNotAllowed { method: String, path: String },
}

impl RouteError {
    pub fn status(&self) -> u16 {
        match self {
            RouteError::BadRequest(_) => 400,
            RouteError::UnknownRoute(_) => 404,
            RouteError::MethodNotAllowed { .. } => 405,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            RouteError::BadRequest(_) => "bad_request",
            RouteError::UnknownRoute(_) => "unknown_route",
            RouteError::MethodNotAllowed { .. } => "method_not_allowed",
        }
    }
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            RouteError::UnknownRoute(path) => write!(f, "No route for {}", path),
            RouteError::MethodNotAllowed { method, path } => {
                write!(f, "Method {} not allowed on {}", method, path)
            }
        }
    }
}

impl std::error::Error for RouteError {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok<T: Serialize>(body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self { status: 200, body },
            Err(e) => Self::failure(500, &e.to_string(), "serialization", false),
        }
    }

    fn failure(status: u16, error: &str, kind: &str, retryable: bool) -> Self {
        Self {
            status,
            body: json!({
                "success": false,
                "error": error,
                "kind": kind,
                "retryable": retryable,
            }),
        }
    }

    fn from_nav_error(err: &NavError) -> Self {
        let kind = err.kind();
        Self::failure(status_for(kind), &err.to_string(), kind.as_str(), err.is_retryable())
    }

    fn from_route_error(err: &RouteError) -> Self {
        Self::failure(err.status(), &err.to_string(), err.kind(), false)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub fn status_for(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::NotFound => 404,
        ErrorKind::InvalidTarget | ErrorKind::InsufficientTurns => 400,
        ErrorKind::Conflict => 409,
        ErrorKind::Timeout => 503,
        ErrorKind::IntegrityFault | ErrorKind::StoreUnavailable => 500,
    }
}

/// Resolve a method and path (plus body for POST routes) into a [`Request`]
pub fn route(method: &str, path: &str, body: Option<&str>) -> Result<Request, RouteError> {
    let method = method.to_ascii_uppercase();
    let path = path.split('?').next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    let trimmed = match trimmed.strip_prefix("/api") {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => trimmed,
    };

    let segments: Vec<&str> = trimmed.split('/').skip(1).collect();
    let expected = match segments.as_slice() {
        ["systems"] | ["player", _] => "GET",
        ["move"] | ["warp"] => "POST",
        _ => return Err(RouteError::UnknownRoute(path.to_string())),
    };
    if method != expected {
        return Err(RouteError::MethodNotAllowed {
            method,
            path: path.to_string(),
        });
    }

    match segments.as_slice() {
        ["systems"] => Ok(Request::ListSystems),
        ["player", username] => {
            // Path segments are matched as-is; percent-escapes are not decoded
            if !Pilot::is_valid_username(username) {
                return Err(RouteError::BadRequest(format!(
                    "username {:?} is not URL-safe",
                    username
                )));
            }
            Ok(Request::GetPilot {
                username: username.to_string(),
            })
        }
        ["move"] => Ok(Request::Move(parse_body(body)?)),
        ["warp"] => Ok(Request::Warp(parse_body(body)?)),
        _ => Err(RouteError::UnknownRoute(path.to_string())),
    }
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: Option<&str>) -> Result<T, RouteError> {
    let body = body.ok_or_else(|| RouteError::BadRequest("missing request body".to_string()))?;
    serde_json::from_str(body).map_err(|e| RouteError::BadRequest(e.to_string()))
}

/// Run a routed request against the engine
pub fn handle<S: WorldStore + ?Sized>(nav: &Navigator<S>, request: Request) -> ApiResponse {
    let result = match request {
        Request::ListSystems => nav.list_systems().map(|systems| ApiResponse::ok(&systems)),
        Request::GetPilot { username } => nav
            .pilot_view(&username)
            .map(|view| ApiResponse::ok(&view)),
        Request::Move(req) => nav
            .move_pilot(&req.username, req.target_sector_number)
            .map(|arrival| {
                ApiResponse::ok(&MoveResponse {
                    success: true,
                    current_sector: arrival.sector_number,
                })
            }),
        Request::Warp(req) => nav
            .warp_pilot(&req.username, req.target_system_id)
            .map(|arrival| {
                ApiResponse::ok(&WarpResponse {
                    success: true,
                    current_system: arrival.system_id,
                    current_sector: arrival.sector_number,
                })
            }),
    };

    result.unwrap_or_else(|err| ApiResponse::from_nav_error(&err))
}

/// [`route`] then [`handle`]; routing failures become error responses too
pub fn dispatch<S: WorldStore + ?Sized>(
    nav: &Navigator<S>,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> ApiResponse {
    match route(method, path, body) {
        Ok(request) => handle(nav, request),
        Err(err) => {
            log::info!("Rejected {} {}: {}", method, path, err);
            ApiResponse::from_route_error(&err)
        }
    }
}
