//! Sending rendered pages and error pages.

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use indexmap::IndexMap;
use tracing::warn;

use armonia::ResponseHead;

/// Weak ETag of a page body.
pub fn etag(body: &str) -> String {
    format!("W/\"{}\"", blake3::hash(body.as_bytes()).to_hex())
}

/// Send `html` as a document: `text/html`, `no-cache`, weak ETag, and a 304
/// when the client already holds this exact body.
///
/// `server_headers` (the dev server's configured headers) are applied first,
/// then whatever render code put on `head`.
pub fn send_html(
    request_headers: &HeaderMap,
    html: String,
    head: &ResponseHead,
    server_headers: &IndexMap<String, String>,
) -> Response {
    let tag = etag(&html);
    let not_modified = request_headers
        .get(IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == tag);

    let mut response = if not_modified {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NOT_MODIFIED;
        response
    } else {
        let mut response = Response::new(Body::from(html));
        *response.status_mut() = StatusCode::from_u16(head.status).unwrap_or(StatusCode::OK);
        response
    };

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if let Ok(value) = HeaderValue::from_str(&tag) {
        headers.insert(ETAG, value);
    }

    for (name, value) in server_headers.iter().chain(head.headers.iter()) {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "skipping invalid response header"),
        }
    }

    response
}

/// A 500 page describing `error` and its causes.
///
/// # Security
///
/// Error text comes from user code and is HTML-escaped.
pub fn error_page(error: &(dyn std::error::Error + 'static)) -> Response {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str("\n  caused by: ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    let body = format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>SSR error</title></head>\n\
         <body><h1>Server render failed</h1><pre>{}</pre></body>\n</html>\n",
        html_escape(&message)
    );

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

/// HTML-escape a string before it goes into the error page.
///
/// Escapes `&`, `<`, `>`, `"` and `'`.
fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
