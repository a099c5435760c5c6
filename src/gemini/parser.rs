// Gemini web payload builder and response parser
// Author: kelexine (https://github.com/kelexine)

use super::backend::{Candidate, ChatMetadata, ModelOutput, WebImage};
use crate::error::{ProxyError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

static AT_TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(?:SNlM0e|thykhd)":"([^"]+)""#).expect("valid at-token regex"));

static BUILD_LABEL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""cfb2h":"([^"]+)""#).expect("valid build label regex"));

static SESSION_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""FdrFJe":"([^"]+)""#).expect("valid session id regex"));

/// Tokens scraped from the Gemini app page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    /// XSRF token sent as the `at` form field.
    pub at_token: String,
    /// Build label (`bl` query parameter).
    pub build_label: String,
    /// Frontend session id (`f.sid` query parameter).
    pub session_id: String,
}

/// Pulls the XSRF token, build label and session id out of the app HTML.
///
/// Returns `None` when the access token is absent, which is what Gemini
/// serves to a signed-out (expired) session.
pub fn extract_session_tokens(html: &str) -> Option<SessionTokens> {
    let capture = |re: &Regex| re.captures(html).map(|c| c[1].to_string());

    Some(SessionTokens {
        at_token: capture(&AT_TOKEN_PATTERN)?,
        build_label: capture(&BUILD_LABEL_PATTERN).unwrap_or_default(),
        session_id: capture(&SESSION_ID_PATTERN).unwrap_or_default(),
    })
}

/// Builds the `f.req` form value: `[null, "<inner json>"]`.
///
/// The inner array carries the prompt at `[0]` and the conversation ids
/// `[cid, rid, rcid]` at `[2]`; a fresh conversation sends nulls.
pub fn build_freq(prompt: &str, metadata: &ChatMetadata) -> String {
    let inner = json!([
        [prompt, 0, null, null, null, null, 0],
        ["en"],
        [
            metadata.conversation_id,
            metadata.response_id,
            metadata.choice_id
        ],
    ]);

    let inner_json = serde_json::to_string(&inner).unwrap_or_default();
    serde_json::to_string(&json!([null, inner_json])).unwrap_or_default()
}

fn at<'a>(value: &'a Value, path: &[usize]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, &i| v.get(i))
}

fn str_at(value: &Value, path: &[usize]) -> Option<String> {
    at(value, path).and_then(Value::as_str).map(str::to_string)
}

/// Yields the decoded inner payload of every `wrb.fr` entry in the body.
fn payload_frames(body: &str) -> impl Iterator<Item = Value> + '_ {
    body.lines()
        .map(str::trim)
        .filter(|line| line.starts_with('['))
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .flat_map(|outer| {
            // A line is either a list of entries or a single entry.
            let entries: Vec<Value> = match outer.get(0) {
                Some(Value::Array(_)) => outer.as_array().cloned().unwrap_or_default(),
                _ => vec![outer],
            };
            entries
        })
        .filter(|entry| entry.get(0).and_then(Value::as_str) == Some("wrb.fr"))
        .filter_map(|entry| {
            entry
                .get(2)
                .and_then(Value::as_str)
                .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        })
}

fn parse_images(candidate: &Value) -> Vec<WebImage> {
    at(candidate, &[12, 1])
        .and_then(Value::as_array)
        .map(|images| {
            images
                .iter()
                .filter_map(|img| {
                    Some(WebImage {
                        url: str_at(img, &[0, 0, 0])?,
                        title: str_at(img, &[7, 0]).unwrap_or_else(|| "[Image]".to_string()),
                        alt: str_at(img, &[0, 4]).unwrap_or_default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_candidate(value: &Value) -> Option<Candidate> {
    let text = str_at(value, &[1, 0])?;
    Some(Candidate {
        rcid: str_at(value, &[0]).unwrap_or_default(),
        text,
        thoughts: str_at(value, &[37, 0, 0]).filter(|t| !t.is_empty()),
        images: parse_images(value),
    })
}

fn parse_frame(inner: &Value) -> Option<ModelOutput> {
    let candidates: Vec<Candidate> = at(inner, &[4])?
        .as_array()?
        .iter()
        .filter_map(parse_candidate)
        .collect();

    if candidates.is_empty() {
        return None;
    }

    Some(ModelOutput {
        metadata: ChatMetadata {
            conversation_id: str_at(inner, &[1, 0]),
            response_id: str_at(inner, &[1, 1]),
            choice_id: None,
        },
        candidates,
        chosen: 0,
    })
}

/// Parses a StreamGenerate body into candidates.
///
/// The body is a sequence of length-prefixed JSON frames; later frames repeat
/// earlier text, so the frame with the longest first candidate wins.
pub fn parse_response(body: &str) -> Result<ModelOutput> {
    payload_frames(body)
        .filter_map(|inner| parse_frame(&inner))
        .max_by_key(|output| output.text().len())
        .ok_or_else(|| {
            ProxyError::Upstream(format!(
                "No candidates in Gemini response ({} bytes)",
                body.len()
            ))
        })
}
