//! Request compilation
//!
//! Turns a caller's [`Request`] into the [`CompiledRequest`] every engine
//! sends byte-for-byte. Compiling never modifies the request, so the same
//! one can be recompiled for each redirect hop and retry.

use crate::config::Config;
use crate::cookies::{format_cookie_header, CookieJar};
use crate::error::{Error, Result};
use crate::http::Headers;
use crate::request::{Body, CompiledRequest, Request};
use crate::retry::AttemptId;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use url::form_urlencoded;

/// Compile `request` for one attempt
///
/// `jar` supplies stored cookies for the target URL; explicit cookies on
/// the request win over same-named jar cookies without touching the jar.
pub fn compile_request(
    request: &Request,
    config: &Config,
    jar: Option<&CookieJar>,
    attempt: AttemptId,
) -> Result<CompiledRequest> {
    let mut headers = compile_headers(request, config);
    let url = compile_url(&request.url, &request.params);
    let parsed_url = url::Url::parse(&url)?;
    let data = compile_data(request, &mut headers)?;

    let method = match &request.method {
        Some(method) => method.to_ascii_uppercase(),
        None if data.is_some() => "POST".to_string(),
        None => "GET".to_string(),
    };

    match &data {
        Some(body) => {
            headers.setdefault("Content-Length", body.len().to_string());
        }
        None if method != "GET" && method != "HEAD" => {
            headers.setdefault("Content-Length", "0");
        }
        None => {}
    }

    let mut cookies = match jar {
        Some(jar) if config.cookies_enabled => jar.cookies_for(&parsed_url),
        _ => Vec::new(),
    };
    cookies.retain(|(name, _)| !request.cookies.iter().any(|(n, _)| n == name));
    cookies.extend(request.cookies.iter().cloned());
    if !cookies.is_empty() {
        headers.add("Cookie", format_cookie_header(&cookies));
    }

    Ok(CompiledRequest {
        url,
        method,
        headers,
        data,
        num_retries: attempt.attempt,
        attempt_token: attempt.token,
    })
}

fn compile_headers(request: &Request, config: &Config) -> Headers {
    let mut headers = request.headers.clone();
    for name in config.headers.keys() {
        if !headers.contains(name) {
            for value in config.headers.get_all(name) {
                headers.add(name, value);
            }
        }
    }
    headers.setdefault("Accept", "*/*");
    if let Some(user_agent) = config.user_agent.as_deref().filter(|ua| !ua.is_empty()) {
        headers.setdefault("User-Agent", user_agent);
    }
    if let Some((user, password)) = &request.auth {
        let token = BASE64.encode(format!("{}:{}", user, password));
        headers.setdefault("Authorization", format!("Basic {}", token));
    }
    headers
}

/// Append `params` to `url` as a UTF-8 query string
///
/// Trailing `?` and `&` are stripped first, so compiling twice gives the
/// same URL.
pub fn compile_url(url: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }
    let base = url.trim_end_matches(['?', '&']);
    let separator = if base.contains('?') { '&' } else { '?' };
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    format!("{}{}{}", base, separator, query)
}

fn compile_data(request: &Request, headers: &mut Headers) -> Result<Option<Bytes>> {
    match (&request.data, &request.json) {
        (Some(_), Some(_)) => Err(Error::InvalidRequest(
            "a request cannot have both data and json set".to_string(),
        )),
        (None, Some(json)) => {
            headers.setdefault("Content-Type", "application/json");
            Ok(Some(Bytes::from(serde_json::to_vec(json)?)))
        }
        (Some(body), None) => {
            let bytes = match body {
                Body::Bytes(bytes) => bytes.clone(),
                Body::Text(text) => Bytes::from(text.clone().into_bytes()),
                Body::Form(fields) => {
                    headers.setdefault("Content-Type", "application/x-www-form-urlencoded");
                    let encoded = form_urlencoded::Serializer::new(String::new())
                        .extend_pairs(fields)
                        .finish();
                    Bytes::from(encoded.into_bytes())
                }
                Body::File(path) => Bytes::from(std::fs::read(path)?),
            };
            Ok(Some(bytes))
        }
        (None, None) => Ok(None),
    }
}
