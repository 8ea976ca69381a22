//! Recovery of a JSON holdings payload from free-form generative text.
//!
//! The model is asked to answer with a fenced ```` ```json ```` block, but
//! nothing guarantees it does. Candidates are tried in priority order:
//!
//! 1. the interior of a fence labeled `json`;
//! 2. the interior of any fence;
//! 3. the whole text.
//!
//! Only the first candidate found is decoded. If it does not decode, the
//! extraction fails; there is no fallback to a weaker candidate and no
//! silent empty result.

use miette::Diagnostic;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::HoldingRecord;

const FENCE: &str = "```";

/// Availability label used when the model omits one.
pub const UNKNOWN_AVAILABILITY: &str = "Unknown";

/// Wrapper keys accepted when the model returns an object instead of an array.
const WRAPPER_KEYS: [&str; 3] = ["holdings", "libraries", "results"];

/// Errors from holdings extraction. All of them mean the payload was
/// malformed, as opposed to the inference call itself failing.
#[derive(Debug, Error, Diagnostic)]
pub enum ExtractError {
    #[error("the reply contained no payload")]
    #[diagnostic(code(scout::extract::no_payload))]
    NoPayload,

    #[error("{source_kind} is not valid JSON: {message}")]
    #[diagnostic(
        code(scout::extract::invalid_json),
        help("The model did not follow the requested format. Ask again.")
    )]
    InvalidJson {
        source_kind: PayloadSource,
        message: String,
    },

    #[error("expected an array of holdings, found {found}")]
    #[diagnostic(code(scout::extract::unexpected_shape))]
    UnexpectedShape { found: &'static str },

    #[error("holding #{position} is unusable: {reason}")]
    #[diagnostic(code(scout::extract::invalid_record))]
    InvalidRecord { position: usize, reason: String },
}

pub type ExtractResult<T> = std::result::Result<T, ExtractError>;

/// Where the decoded candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSource {
    JsonFence,
    AnyFence,
    WholeText,
}

impl std::fmt::Display for PayloadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::JsonFence => "the json block",
            Self::AnyFence => "the fenced block",
            Self::WholeText => "the reply",
        })
    }
}

/// A fenced block: its label (possibly empty) and interior.
#[derive(Debug, PartialEq, Eq)]
struct Fence<'a> {
    label: &'a str,
    body: &'a str,
}

/// All fenced blocks in order. An unclosed final fence runs to the end.
fn fences(text: &str) -> Vec<Fence<'_>> {
    let mut out = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find(FENCE) {
        let after = rest[open + FENCE.len()..].trim_start_matches([' ', '\t']);
        let label_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(after.len());
        let label = &after[..label_len];
        let inner = &after[label_len..];

        match inner.find(FENCE) {
            Some(close) => {
                out.push(Fence {
                    label,
                    body: &inner[..close],
                });
                rest = &inner[close + FENCE.len()..];
            }
            None => {
                out.push(Fence { label, body: inner });
                break;
            }
        }
    }
    out
}

/// Choose the candidate payload string.
pub fn select_candidate(raw: &str) -> (PayloadSource, &str) {
    let blocks = fences(raw);
    if let Some(block) = blocks.iter().find(|b| b.label.eq_ignore_ascii_case("json")) {
        return (PayloadSource::JsonFence, block.body.trim());
    }
    if let Some(block) = blocks.first() {
        return (PayloadSource::AnyFence, block.body.trim());
    }
    (PayloadSource::WholeText, raw.trim())
}

/// Extract holdings from a generative reply.
pub fn extract(raw: &str) -> ExtractResult<Vec<HoldingRecord>> {
    let (source_kind, candidate) = select_candidate(raw);
    if candidate.is_empty() {
        return Err(ExtractError::NoPayload);
    }
    tracing::debug!(%source_kind, len = candidate.len(), "decoding holdings payload");

    let value: Value =
        serde_json::from_str(candidate).map_err(|e| ExtractError::InvalidJson {
            source_kind,
            message: e.to_string(),
        })?;

    unwrap_items(value)?
        .into_iter()
        .enumerate()
        .map(|(i, item)| project(i + 1, item))
        .collect()
}

/// Accept a bare array, an object wrapping one, or a single holding object.
fn unwrap_items(value: Value) -> ExtractResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => {
            for key in WRAPPER_KEYS {
                if matches!(obj.get(key), Some(Value::Array(_))) {
                    if let Some(Value::Array(items)) = obj.remove(key) {
                        return Ok(items);
                    }
                }
            }
            if obj.contains_key("library") {
                Ok(vec![Value::Object(obj)])
            } else {
                Err(ExtractError::UnexpectedShape { found: "an object" })
            }
        }
        Value::Null => Err(ExtractError::UnexpectedShape { found: "null" }),
        Value::Bool(_) => Err(ExtractError::UnexpectedShape { found: "a boolean" }),
        Value::Number(_) => Err(ExtractError::UnexpectedShape { found: "a number" }),
        Value::String(_) => Err(ExtractError::UnexpectedShape { found: "a string" }),
    }
}

/// Read the first non-blank value among `keys`. Numbers are stringified.
fn field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Project a loosely-typed item into a [`HoldingRecord`].
fn project(position: usize, item: Value) -> ExtractResult<HoldingRecord> {
    let Value::Object(obj) = item else {
        return Err(ExtractError::InvalidRecord {
            position,
            reason: "not an object".into(),
        });
    };

    let library = field(&obj, &["library", "libraryName", "library_name", "name"]).ok_or_else(
        || ExtractError::InvalidRecord {
            position,
            reason: "missing library name".into(),
        },
    )?;

    Ok(HoldingRecord {
        library,
        address: field(&obj, &["address"]).unwrap_or_default(),
        call_number: field(&obj, &["callNumber", "call_number", "callnumber"]).unwrap_or_default(),
        availability: field(&obj, &["availability", "status"])
            .unwrap_or_else(|| UNKNOWN_AVAILABILITY.into()),
        directions: field(
            &obj,
            &["directions", "indoorDirections", "indoor_directions", "location"],
        )
        .unwrap_or_default(),
        website: field(&obj, &["website", "url", "link"]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE: &str = r#"[{"library":"X","address":"1 Main St","callNumber":"813.54 HER","availability":"Available","directions":"Second floor, fiction","website":"https://x.example"}]"#;

    #[test]
    fn json_fence_inside_prose() {
        let raw = format!("prefix ```json\n{ONE}\n``` suffix");
        let holdings = extract(&raw).unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].library, "X");
        assert_eq!(holdings[0].call_number, "813.54 HER");
        assert_eq!(holdings[0].website.as_deref(), Some("https://x.example"));
    }

    #[test]
    fn bare_json_without_fence() {
        let holdings = extract(ONE).unwrap();
        assert_eq!(holdings[0].availability, "Available");
    }

    #[test]
    fn neither_fenced_nor_json_is_malformed() {
        let err = extract("Sorry, I could not find any libraries.").unwrap_err();
        assert!(matches!(
            err,
            ExtractError::InvalidJson {
                source_kind: PayloadSource::WholeText,
                ..
            }
        ));
    }

    #[test]
    fn json_label_beats_earlier_fence() {
        let raw = format!("```text\nnotes here\n```\nand\n```JSON\n{ONE}\n```");
        let (kind, candidate) = select_candidate(&raw);
        assert_eq!(kind, PayloadSource::JsonFence);
        assert_eq!(candidate, ONE);
    }

    #[test]
    fn unlabeled_fence_is_used() {
        let raw = format!("Here you go:\n```\n{ONE}\n```");
        assert_eq!(select_candidate(&raw).0, PayloadSource::AnyFence);
        assert_eq!(extract(&raw).unwrap().len(), 1);
    }

    #[test]
    fn bad_fence_does_not_fall_back_to_whole_text() {
        // The fenced interior is chosen and is invalid; the bare array after
        // it must not be used instead.
        let raw = format!("```json\nnot json\n```\n{ONE}");
        assert!(matches!(
            extract(&raw),
            Err(ExtractError::InvalidJson {
                source_kind: PayloadSource::JsonFence,
                ..
            })
        ));
    }

    #[test]
    fn unclosed_fence_runs_to_end() {
        let raw = format!("```json\n{ONE}\n");
        assert_eq!(extract(&raw).unwrap().len(), 1);
    }

    #[test]
    fn single_line_fence() {
        let raw = format!("```json {ONE} ```");
        assert_eq!(extract(&raw).unwrap()[0].library, "X");
    }

    #[test]
    fn empty_array_is_zero_holdings() {
        assert!(extract("```json\n[]\n```").unwrap().is_empty());
    }

    #[test]
    fn empty_reply_is_malformed() {
        assert!(matches!(extract("   "), Err(ExtractError::NoPayload)));
        assert!(matches!(extract("```json\n```"), Err(ExtractError::NoPayload)));
    }

    #[test]
    fn optional_fields_default_explicitly() {
        let holdings = extract(r#"[{"library":"Y","website":"  "}]"#).unwrap();
        let h = &holdings[0];
        assert_eq!(h.address, "");
        assert_eq!(h.availability, UNKNOWN_AVAILABILITY);
        assert_eq!(h.website, None);
    }

    #[test]
    fn snake_case_and_numeric_fields() {
        let holdings =
            extract(r#"[{"library":"Z","call_number":823.914,"indoor_directions":"Basement"}]"#)
                .unwrap();
        assert_eq!(holdings[0].call_number, "823.914");
        assert_eq!(holdings[0].directions, "Basement");
    }

    #[test]
    fn wrapped_array_and_single_object() {
        let wrapped = format!(r#"{{"holdings": {ONE}}}"#);
        assert_eq!(extract(&wrapped).unwrap().len(), 1);
        assert_eq!(extract(r#"{"library":"Solo"}"#).unwrap()[0].library, "Solo");
        assert!(matches!(
            extract(r#"{"answer":"none"}"#),
            Err(ExtractError::UnexpectedShape { .. })
        ));
    }

    #[test]
    fn record_without_library_is_malformed() {
        let err = extract(r#"[{"library":"A"},{"address":"somewhere"}]"#).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidRecord { position: 2, .. }));
        assert!(matches!(
            extract(r#"["A"]"#),
            Err(ExtractError::InvalidRecord { position: 1, .. })
        ));
    }

    #[test]
    fn free_text_availability_is_kept() {
        let holdings = extract(r#"[{"library":"A","availability":"On hold (2 in queue)"}]"#).unwrap();
        assert_eq!(holdings[0].availability, "On hold (2 in queue)");
    }
}
