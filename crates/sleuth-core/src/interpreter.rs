//! Splits raw model text into free-form reasoning and one structured decision.
//!
//! Extraction order:
//!
//! 1. The first fenced block (```` ```json { ... } ``` ````, tag optional).
//! 2. Otherwise the widest `{...}` span, first `{` to last `}`, if it parses.
//! 3. Otherwise the longest string-aware balanced `{...}` span.
//!
//! Everything before the matched span is the reasoning. Any structural
//! problem is reported as a single `SleuthError::MalformedResponse`.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use sleuth_contracts::{
    decision::{Action, Decision, FinalAnswer},
    error::{SleuthError, SleuthResult},
};

static FENCED_BLOCK_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)```(?:json)?\s*(\{.*?\})\s*```").ok());

/// A successfully interpreted model response.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    /// Text preceding the structured block, trimmed. `None` when empty.
    pub reasoning: Option<String>,
    pub decision: Decision,
}

/// Stateless parser for model output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseInterpreter;

impl ResponseInterpreter {
    pub fn new() -> Self {
        Self
    }

    pub fn interpret(&self, raw: &str) -> SleuthResult<Interpretation> {
        let (start, block) = locate_block(raw)
            .ok_or_else(|| malformed("response did not contain a JSON block", raw))?;

        let reasoning = Some(raw[..start].trim())
            .filter(|text| !text.is_empty())
            .map(str::to_string);

        let value: Value = serde_json::from_str(block)
            .map_err(|e| malformed(format!("invalid JSON in response block: {e}"), block))?;
        let object = value
            .as_object()
            .ok_or_else(|| malformed("response block is not a JSON object", block))?;

        let decision = match object.get("type").and_then(Value::as_str) {
            Some("action") => Decision::Action(parse_action(object, block)?),
            Some("final_answer") => Decision::FinalAnswer(parse_final_answer(object, block)?),
            Some(other) => {
                return Err(malformed(
                    format!("unknown decision type '{other}'"),
                    block,
                ))
            }
            None => return Err(malformed("missing or non-string 'type' field", block)),
        };

        debug!(kind = decision.kind(), has_reasoning = reasoning.is_some(), "response interpreted");
        Ok(Interpretation { reasoning, decision })
    }
}

// ── Block location ───────────────────────────────────────────────────────────

/// Return the byte offset where the block's enclosing span starts (used to
/// cut the reasoning) and the JSON text itself.
fn locate_block(raw: &str) -> Option<(usize, &str)> {
    if let Some(re) = FENCED_BLOCK_RE.as_ref() {
        if let Some(caps) = re.captures(raw) {
            if let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) {
                return Some((whole.start(), body.as_str().trim()));
            }
        }
    }

    let first = raw.find('{')?;
    let last = raw.rfind('}')?;
    if last > first {
        let widest = &raw[first..=last];
        if serde_json::from_str::<Value>(widest).is_ok() {
            return Some((first, widest));
        }
    }

    longest_balanced_span(raw).map(|(start, end)| (start, &raw[start..end]))
}

/// Longest top-level `{...}` span, ignoring braces inside JSON strings.
fn longest_balanced_span(raw: &str) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    let mut depth = 0usize;
    let mut open_at = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in raw.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' if depth > 0 => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    open_at = i;
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    let end = i + 1;
                    if best.map_or(true, |(s, e)| end - open_at > e - s) {
                        best = Some((open_at, end));
                    }
                }
            }
            _ => {}
        }
    }
    best
}

// ── Shape validation ─────────────────────────────────────────────────────────

fn parse_action(object: &Map<String, Value>, block: &str) -> SleuthResult<Action> {
    // The documented shape nests the action; a flat `tool` key is also accepted.
    let body = match object.get("action") {
        Some(Value::Object(inner)) => inner,
        Some(_) => return Err(malformed("'action' must be an object", block)),
        None if object.contains_key("tool") => object,
        None => return Err(malformed("missing 'action' object", block)),
    };

    let tool = body
        .get("tool")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| malformed("action requires a non-empty 'tool' string", block))?;

    let parameters = match body.get("parameters") {
        None => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return Err(malformed("'parameters' must be an object", block)),
    };

    Ok(Action {
        tool: tool.to_string(),
        parameters,
        reasoning: string_field(body, &["reasoning"]).unwrap_or_default(),
        expected_result: string_field(body, &["expected_result", "expectedResult"])
            .unwrap_or_default(),
    })
}

fn parse_final_answer(object: &Map<String, Value>, block: &str) -> SleuthResult<FinalAnswer> {
    let body = match object.get("final_answer") {
        Some(Value::Object(inner)) => inner,
        _ => object,
    };

    let main_response = string_field(body, &["main_response", "mainResponse"])
        .ok_or_else(|| malformed("final answer requires a 'main_response' string", block))?;
    let reasoning = string_field(body, &["reasoning"])
        .ok_or_else(|| malformed("final answer requires a 'reasoning' string", block))?;
    let confidence = body
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| malformed("final answer requires a numeric 'confidence'", block))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(malformed(
            format!("confidence {confidence} is outside [0, 1]"),
            block,
        ));
    }

    Ok(FinalAnswer {
        main_response,
        confidence,
        reasoning,
        next_steps: string_list(body, &["next_steps", "nextSteps"], block)?,
        analyzed_components: string_list(
            body,
            &["analyzed_components", "analyzedComponents"],
            block,
        )?,
    })
}

fn string_field(body: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| body.get(*key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn string_list(body: &Map<String, Value>, keys: &[&str], block: &str) -> SleuthResult<Vec<String>> {
    match keys.iter().find_map(|key| body.get(*key)) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()),
        Some(_) => Err(malformed(format!("'{}' must be a list", keys[0]), block)),
    }
}

fn malformed(reason: impl Into<String>, raw: &str) -> SleuthError {
    SleuthError::MalformedResponse {
        reason: reason.into(),
        raw: raw.to_string(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
