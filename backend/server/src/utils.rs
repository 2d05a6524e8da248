use axum::http::{
    HeaderMap,
    header::{HOST, USER_AGENT},
};

/// Set by the authenticating reverse proxy once the identity provider session checks out.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub fn viewer(headers: &HeaderMap) -> Option<String> {
    header(headers, USER_ID_HEADER).map(str::to_string)
}

pub fn user_agent(headers: &HeaderMap) -> String {
    header(headers, USER_AGENT.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Scheme and host as seen by the client, `None` without a Host header.
pub fn request_origin(headers: &HeaderMap) -> Option<String> {
    let host = header(headers, HOST.as_str())?;
    let proto = header(headers, FORWARDED_PROTO_HEADER)
        .and_then(|proto| proto.split(',').next())
        .map(str::trim)
        .unwrap_or("http");

    Some(format!("{proto}://{host}"))
}

pub fn blank(query: Option<&str>) -> bool {
    query.is_none_or(|query| query.trim().is_empty())
}
