//! Transcript recovery from loosely-structured service responses.
//!
//! The same endpoint family returns at least three structurally different
//! payloads: chat-message responses, file-job result documents and ad hoc
//! ASR shapes. A ranked set of shape parsers is tried first; a recursive
//! walk over all string leaves is the explicit last resort, filtered by a
//! static metadata blocklist so ids, statuses and timestamps never leak
//! into a transcript.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Keys that directly hold transcript text, in priority order.
const DIRECT_TEXT_KEYS: [&str; 4] = ["text", "transcript", "transcription", "content"];

/// Keys under which ASR responses nest their per-segment payloads.
const COLLECTION_KEYS: [&str; 5] = [
    "results",
    "sentences",
    "segments",
    "paragraphs",
    "transcriptions",
];

/// Metadata keys whose string values are never transcript text.
const IGNORED_KEYS: [&str; 6] = [
    "task_id",
    "task_status",
    "status",
    "code",
    "message",
    "request_id",
];

const IGNORED_SUFFIXES: [&str; 5] = ["_time", "_timestamp", "_url", "_id", "_status"];

const IGNORED_PREFIXES: [&str; 6] = ["start_", "end_", "begin_", "finish_", "create_", "update_"];

static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2}(\.\d+)?$").expect("valid regex")
});

/// Recover transcript text from a response document.
///
/// Never fails; returns an empty string when nothing usable is found, which
/// callers treat as failure. Plain-text documents pass through unchanged.
pub fn extract_text(document: &Value) -> String {
    let parsers = [chat_message_text, file_job_text, generic_asr_text];
    for parse in parsers {
        if let Some(text) = parse(document) {
            return text;
        }
    }

    let mut parts = Vec::new();
    collect_strings(document, None, &mut parts);
    parts.join("\n").trim().to_string()
}

/// Shape (a): chat-message response, text under `output.choices[0].message
/// .content`, the content being either a string or a list of fragments.
fn chat_message_text(document: &Value) -> Option<String> {
    let content = document
        .get("output")?
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?;

    let text = match content {
        Value::String(text) => text.clone(),
        Value::Array(fragments) => fragments
            .iter()
            .filter_map(|fragment| fragment.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .concat(),
        _ => return None,
    };

    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Shape (b): file-job result document carrying a `transcripts` collection
/// of objects each holding a `text` field.
fn file_job_text(document: &Value) -> Option<String> {
    let transcripts = document.get("transcripts")?.as_array()?;
    let parts: Vec<&str> = transcripts
        .iter()
        .filter_map(|item| item.get("text").and_then(Value::as_str))
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect();

    (!parts.is_empty()).then(|| parts.join("\n"))
}

/// Shape (c): generic ASR response with ad hoc nesting under collection
/// keys such as `results`, `sentences`, `segments`, `paragraphs`.
fn generic_asr_text(document: &Value) -> Option<String> {
    let output = document.get("output").unwrap_or(document);
    let object = output.as_object()?;

    if let Some(text) = direct_text(output) {
        return Some(text);
    }

    for key in COLLECTION_KEYS {
        let Some(node) = object.get(key) else { continue };
        let items: Vec<&Value> = match node {
            Value::Array(list) => list.iter().collect(),
            other => vec![other],
        };

        let mut parts = Vec::new();
        for item in items {
            if let Some(text) = direct_text(item) {
                parts.push(text);
                continue;
            }
            for nested in ["sentences", "segments", "paragraphs"] {
                let Some(entries) = item.get(nested).and_then(Value::as_array) else {
                    continue;
                };
                parts.extend(entries.iter().filter_map(direct_text));
            }
        }

        if !parts.is_empty() {
            return Some(parts.join("\n"));
        }
    }

    None
}

/// Text held directly by a node: a clean string, or the first matching
/// direct-text key of an object.
fn direct_text(node: &Value) -> Option<String> {
    match node {
        Value::String(text) => {
            let text = text.trim();
            (!text.is_empty() && !looks_like_timestamp(text)).then(|| text.to_string())
        }
        Value::Object(map) => DIRECT_TEXT_KEYS.iter().find_map(|key| {
            map.get(*key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|text| !text.is_empty() && !looks_like_timestamp(text))
                .map(str::to_string)
        }),
        _ => None,
    }
}

/// Last resort: depth-first walk collecting every string leaf that is not
/// an ISO-8601 timestamp and was not reached through a blocklisted key.
fn collect_strings(node: &Value, key_hint: Option<&str>, out: &mut Vec<String>) {
    match node {
        Value::String(text) => {
            if key_hint.map_or(false, is_ignored_key) {
                return;
            }
            let text = text.trim();
            if !text.is_empty() && !looks_like_timestamp(text) {
                out.push(text.to_string());
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_strings(item, None, out);
            }
        }
        Value::Object(map) => {
            for (key, value) in map {
                if DIRECT_TEXT_KEYS.contains(&key.as_str()) {
                    if let Some(text) = value.as_str() {
                        let text = text.trim();
                        if !text.is_empty() && !looks_like_timestamp(text) {
                            out.push(text.to_string());
                        }
                        continue;
                    }
                }
                if is_ignored_key(key) {
                    continue;
                }
                collect_strings(value, Some(key), out);
            }
        }
        _ => {}
    }
}

fn is_ignored_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    IGNORED_KEYS.contains(&key.as_str())
        || IGNORED_SUFFIXES.iter().any(|suffix| key.ends_with(suffix))
        || IGNORED_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
}

fn looks_like_timestamp(value: &str) -> bool {
    TIMESTAMP_RE.is_match(value)
}
