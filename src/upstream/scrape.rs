//! Pattern extraction against upstream markup.
//!
//! The upstream service publishes no API; the token lives in inline script
//! on its button pages and the session in a `PHPSESSID` cookie. Everything
//! that depends on that markup is kept in this module.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::ConversionToken;
use crate::ConvertError;

static RE_SESSION_COOKIE: Lazy<Regex> = Lazy::new(|| Regex::new(r"PHPSESSID=([^;]+)").unwrap());

static RE_TOKEN_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"'token_id':\s*'([^']+)'").unwrap());

static RE_TOKEN_VALID_TO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'token_validto':\s*'([^']+)'").unwrap());

/// Find the session id among `Set-Cookie` header values
pub fn session_id<'a>(set_cookie: impl IntoIterator<Item = &'a str>) -> Option<String> {
    set_cookie
        .into_iter()
        .find_map(|cookie| RE_SESSION_COOKIE.captures(cookie))
        .map(|caps| caps[1].trim().to_string())
        .filter(|id| !id.is_empty())
}

pub fn token_id(html: &str) -> Option<String> {
    capture(&RE_TOKEN_ID, html)
}

pub fn token_valid_to(html: &str) -> Option<String> {
    capture(&RE_TOKEN_VALID_TO, html)
}

fn capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack).map(|caps| caps[1].to_string())
}

/// Build a token from the cookie and page body, naming every missing field
pub fn extract_token<'a>(
    set_cookie: impl IntoIterator<Item = &'a str>,
    html: &str,
) -> Result<ConversionToken, ConvertError> {
    let session_id = session_id(set_cookie);
    let token_id = token_id(html);
    let valid_to = token_valid_to(html);

    match (session_id, token_id, valid_to) {
        (Some(session_id), Some(token_id), Some(valid_to)) => Ok(ConversionToken {
            session_id,
            token_id,
            valid_to,
        }),
        (session_id, token_id, valid_to) => {
            let missing: Vec<&str> = [
                (session_id.is_none(), "session cookie"),
                (token_id.is_none(), "token_id"),
                (valid_to.is_none(), "token_validto"),
            ]
            .into_iter()
            .filter_map(|(absent, name)| absent.then_some(name))
            .collect();

            Err(ConvertError::TokenExtraction(format!(
                "missing {}",
                missing.join(", ")
            )))
        }
    }
}

/// Job id from a submission body; upstream sends either a string or a number
pub fn job_id(body: &Value) -> Option<String> {
    match body.get("jobid")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
