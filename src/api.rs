//! HTTP surface over [`SessionManager`].
//!
//! Every endpoint speaks JSON. Failures are `{"error": "..."}` with the
//! status derived from the error's [`ErrorKind`].

use http_body_util::BodyExt;
use hyper::{
    Method, Request, Response, StatusCode,
    body::Incoming,
    header::{CONTENT_TYPE, HeaderValue},
};
use log::{error, info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use url::form_urlencoded;
use uuid::Uuid;

use crate::domains::merge::NewPullRequest;
use crate::domains::sessions::SessionManager;
use crate::errors::{ErrorKind, SandboxError};

const SESSIONS_PREFIX: &str = "/api/sessions/";
const REMOTES_PREFIX: &str = "/api/remotes/";
const PULL_REQUESTS_PREFIX: &str = "/api/pull-requests/";

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CreateSessionBody {
    session_id: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommandBody {
    session_id: String,
    command: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteFileBody {
    session_id: String,
    path: String,
    content: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRemoteBody {
    session_id: String,
    name: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct MergePullRequestBody {
    id: u64,
    remote_name: String,
}

pub async fn handle_request(
    req: Request<Incoming>,
    manager: Arc<SessionManager>,
) -> Result<Response<String>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = parse_query(req.uri().query());

    match (&method, path.as_str()) {
        (&Method::GET, "/api/health") => Ok(json_ok(&json!({ "status": "ok" }))),
        (&Method::POST, "/api/sessions") => create_session(req, &manager).await,
        (&Method::GET, "/api/sessions") => Ok(json_ok(&manager.list_sessions().await)),
        (&Method::DELETE, path) if path.starts_with(SESSIONS_PREFIX) => {
            let id = extract_tail(path, SESSIONS_PREFIX);
            Ok(respond(
                StatusCode::OK,
                manager
                    .delete_session(&id)
                    .await
                    .map(|()| json!({ "deleted": id })),
            ))
        }
        (&Method::POST, "/api/command") => run_command(req, &manager).await,
        (&Method::GET, "/api/workspace/tree") => {
            let session = required_param(&query, "session");
            Ok(match session {
                Ok(id) => respond(StatusCode::OK, manager.workspace_tree(id).await),
                Err(err) => error_response(&err),
            })
        }
        (&Method::GET, "/api/workspace/file") => {
            let params = required_param(&query, "session")
                .and_then(|id| required_param(&query, "path").map(|path| (id, path)));
            Ok(match params {
                Ok((id, file)) => respond(
                    StatusCode::OK,
                    manager
                        .read_file(id, file)
                        .await
                        .map(|content| json!({ "path": file, "content": content })),
                ),
                Err(err) => error_response(&err),
            })
        }
        (&Method::PUT, "/api/workspace/file") => write_file(req, &manager).await,
        (&Method::GET, "/api/remotes") => Ok(respond(StatusCode::OK, manager.list_remotes().await)),
        (&Method::POST, "/api/remotes") => create_remote(req, &manager).await,
        (&Method::DELETE, path) if path.starts_with(REMOTES_PREFIX) => {
            let name = extract_tail(path, REMOTES_PREFIX);
            Ok(respond(
                StatusCode::OK,
                manager
                    .remove_remote(&name)
                    .await
                    .map(|dropped| json!({ "removed": name, "pullRequestsRemoved": dropped })),
            ))
        }
        (&Method::GET, "/api/pull-requests") => {
            let remote = query.get("remote").map(String::as_str);
            Ok(json_ok(&manager.list_pull_requests(remote)))
        }
        (&Method::POST, "/api/pull-requests") => create_pull_request(req, &manager).await,
        (&Method::POST, "/api/pull-requests/merge") => merge_pull_request(req, &manager).await,
        (&Method::POST, path) if path.starts_with(PULL_REQUESTS_PREFIX) && path.ends_with("/close") => {
            Ok(match extract_pull_request_id(path, "/close") {
                Ok(id) => respond(StatusCode::OK, manager.close_pull_request(id).await),
                Err(err) => error_response(&err),
            })
        }
        (&Method::GET, path) if path.starts_with(PULL_REQUESTS_PREFIX) => {
            Ok(match extract_pull_request_id(path, "") {
                Ok(id) => respond(StatusCode::OK, manager.get_pull_request(id)),
                Err(err) => error_response(&err),
            })
        }
        _ => Ok(not_found_response()),
    }
}

async fn create_session(
    req: Request<Incoming>,
    manager: &SessionManager,
) -> Result<Response<String>, hyper::Error> {
    let body_bytes = req.into_body().collect().await?.to_bytes();
    let body: CreateSessionBody = if body_bytes.iter().all(u8::is_ascii_whitespace) {
        CreateSessionBody::default()
    } else {
        match serde_json::from_slice(&body_bytes) {
            Ok(body) => body,
            Err(e) => return Ok(invalid_json(e)),
        }
    };
    let session_id = body
        .session_id
        .unwrap_or_else(|| format!("session-{}", Uuid::new_v4()));
    Ok(respond(
        StatusCode::CREATED,
        manager.create_session(&session_id).await,
    ))
}

async fn run_command(
    req: Request<Incoming>,
    manager: &SessionManager,
) -> Result<Response<String>, hyper::Error> {
    let body: CommandBody = match read_json(req).await? {
        Ok(body) => body,
        Err(response) => return Ok(response),
    };
    let result = manager
        .execute(&body.session_id, &body.command)
        .await
        .map(|output| json!({ "output": output }));
    if let Err(err) = &result
        && err.kind() == ErrorKind::Library
    {
        error!(
            "Command '{}' failed in session {}: {err}",
            body.command, body.session_id
        );
    }
    Ok(respond(StatusCode::OK, result))
}

async fn write_file(
    req: Request<Incoming>,
    manager: &SessionManager,
) -> Result<Response<String>, hyper::Error> {
    let body: WriteFileBody = match read_json(req).await? {
        Ok(body) => body,
        Err(response) => return Ok(response),
    };
    Ok(respond(
        StatusCode::OK,
        manager
            .write_file(&body.session_id, &body.path, body.content)
            .await
            .map(|()| json!({ "path": body.path })),
    ))
}

async fn create_remote(
    req: Request<Incoming>,
    manager: &SessionManager,
) -> Result<Response<String>, hyper::Error> {
    let body: CreateRemoteBody = match read_json(req).await? {
        Ok(body) => body,
        Err(response) => return Ok(response),
    };
    Ok(respond(
        StatusCode::CREATED,
        manager
            .create_bare_repository(&body.session_id, &body.name)
            .await,
    ))
}

async fn create_pull_request(
    req: Request<Incoming>,
    manager: &SessionManager,
) -> Result<Response<String>, hyper::Error> {
    let body: NewPullRequest = match read_json(req).await? {
        Ok(body) => body,
        Err(response) => return Ok(response),
    };
    let result = manager.create_pull_request(body).await;
    if let Ok(pr) = &result {
        info!("Created pull request #{} via API", pr.id);
    }
    Ok(respond(StatusCode::CREATED, result))
}

async fn merge_pull_request(
    req: Request<Incoming>,
    manager: &SessionManager,
) -> Result<Response<String>, hyper::Error> {
    let body: MergePullRequestBody = match read_json(req).await? {
        Ok(body) => body,
        Err(response) => return Ok(response),
    };
    Ok(respond(
        StatusCode::OK,
        manager.merge_pull_request(body.id, &body.remote_name).await,
    ))
}

/// Reads and decodes a JSON body. The inner `Err` is a ready-made 400.
async fn read_json<T: DeserializeOwned>(
    req: Request<Incoming>,
) -> Result<Result<T, Response<String>>, hyper::Error> {
    let body_bytes = req.into_body().collect().await?.to_bytes();
    Ok(serde_json::from_slice(&body_bytes).map_err(invalid_json))
}

fn invalid_json(e: serde_json::Error) -> Response<String> {
    warn!("Rejected request body: {e}");
    json_error_response(StatusCode::BAD_REQUEST, format!("Invalid JSON: {e}"))
}

fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    form_urlencoded::parse(query.unwrap_or("").as_bytes())
        .into_owned()
        .collect()
}

fn required_param<'a>(
    query: &'a HashMap<String, String>,
    name: &str,
) -> Result<&'a str, SandboxError> {
    query
        .get(name)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| SandboxError::invalid_input(name, format!("Missing '{name}' parameter")))
}

fn extract_tail(path: &str, prefix: &str) -> String {
    let tail = &path[prefix.len()..];
    urlencoding::decode(tail)
        .unwrap_or(std::borrow::Cow::Borrowed(tail))
        .to_string()
}

fn extract_pull_request_id(path: &str, suffix: &str) -> Result<u64, SandboxError> {
    let raw = path
        .strip_prefix(PULL_REQUESTS_PREFIX)
        .and_then(|rest| rest.strip_suffix(suffix))
        .unwrap_or_default();
    raw.parse()
        .map_err(|_| SandboxError::invalid_input("id", format!("Invalid pull request id '{raw}'")))
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::UserInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::StateConflict => StatusCode::CONFLICT,
        ErrorKind::Library => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, SandboxError>) -> Response<String> {
    match result {
        Ok(value) => json_response(status, to_json(&value)),
        Err(err) => error_response(&err),
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        error!("Failed to serialize response: {e}");
        "{}".to_string()
    })
}

fn json_ok<T: Serialize>(value: &T) -> Response<String> {
    json_response(StatusCode::OK, to_json(value))
}

fn error_response(err: &SandboxError) -> Response<String> {
    json_error_response(status_for(err.kind()), err.to_string())
}

fn not_found_response() -> Response<String> {
    json_error_response(StatusCode::NOT_FOUND, "Not Found".to_string())
}

fn json_response(status: StatusCode, json: String) -> Response<String> {
    let mut response = Response::new(json);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn json_error_response(status: StatusCode, message: String) -> Response<String> {
    let body = json!({ "error": message }).to_string();
    json_response(status, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_http_statuses() {
        let cases = [
            (SandboxError::UnknownCommand { name: "x".into() }, 400),
            (
                SandboxError::SessionNotFound {
                    session_id: "s".into(),
                },
                404,
            ),
            (SandboxError::PullRequestNotOpen { id: 1, state: "MERGED".into() }, 409),
            (SandboxError::git("merge", "boom"), 500),
            (SandboxError::Cancelled, 503),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(err.kind()).as_u16(), status, "{err}");
        }
    }

    #[test]
    fn error_body_carries_the_message() {
        let response = error_response(&SandboxError::RemoteNotFound {
            name: "origin".into(),
        });
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_str(response.body()).unwrap();
        assert!(body["error"].as_str().unwrap().contains("origin"));
    }

    #[test]
    fn path_segments_are_url_decoded() {
        assert_eq!(extract_tail("/api/sessions/a%20b", SESSIONS_PREFIX), "a b");
        assert_eq!(
            extract_pull_request_id("/api/pull-requests/12/close", "/close").unwrap(),
            12
        );
        assert!(extract_pull_request_id("/api/pull-requests/abc", "").is_err());
    }

    #[test]
    fn close_route_without_an_id_is_a_bad_request() {
        let err = extract_pull_request_id("/api/pull-requests/close", "/close").unwrap_err();
        assert_eq!(status_for(err.kind()), StatusCode::BAD_REQUEST);
        assert!(extract_pull_request_id("/api/pull-requests//close", "/close").is_err());
        assert!(extract_pull_request_id("/api/pull-requests/", "").is_err());
    }

    #[test]
    fn query_parameters_are_required_and_non_empty() {
        let query = parse_query(Some("session=s1&path="));
        assert_eq!(required_param(&query, "session").unwrap(), "s1");
        assert!(required_param(&query, "path").is_err());
        assert!(required_param(&query, "missing").is_err());
    }
}
