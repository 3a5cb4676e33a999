//! Structured (JSON object) generation.
//!
//! Providers stream JSON text a few tokens at a time. `parse_partial_object`
//! turns an incomplete buffer into the most complete valid object it can,
//! and `generate_object` folds the resulting sequence of partial objects
//! down to the last one the caller accepts.

use futures::StreamExt;
use hivemind_core::AppResult;
use serde_json::Value;

use crate::client::{LlmClient, LlmRequest};

/// Parse a possibly truncated JSON object.
///
/// Leading prose or code fences before the first `{` are skipped, text after
/// the closing brace is ignored, an unterminated string is closed and open
/// objects/arrays are closed in order. A trailing member that still cannot be
/// parsed (for example a key without its value) is dropped.
pub fn parse_partial_object(buffer: &str) -> Option<Value> {
    let start = buffer.find('{')?;
    let mut candidate = &buffer[start..];

    loop {
        if let Some(value) = close_and_parse(candidate) {
            return Some(value);
        }
        let cut = last_cut_point(candidate)?;
        candidate = &candidate[..cut];
    }
}

fn close_and_parse(text: &str) -> Option<Value> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut end = text.len();

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
                if stack.is_empty() {
                    end = i + 1;
                    break;
                }
            }
            _ => {}
        }
    }

    let mut repaired = text[..end].to_string();
    if in_string {
        if escaped {
            repaired.pop();
        }
        repaired.push('"');
    }

    let trimmed_len = repaired.trim_end().len();
    repaired.truncate(trimmed_len);
    if repaired.ends_with(',') {
        repaired.pop();
    }

    while let Some(closer) = stack.pop() {
        repaired.push(closer);
    }

    serde_json::from_str::<Value>(&repaired)
        .ok()
        .filter(Value::is_object)
}

/// Byte offset to truncate at so the last, incomplete member is removed.
fn last_cut_point(text: &str) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;
    let mut cut = None;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            ',' => cut = Some(i),
            '{' | '[' => cut = Some(i + 1),
            _ => {}
        }
    }

    cut.filter(|&c| c < text.len())
}

/// Fold a structured-object stream down to its last accepted value.
///
/// `accept` maps a partial object to the caller's type, returning `None`
/// while required fields are still missing. Only the final accepted value is
/// returned; intermediate values are discarded. `Ok(None)` means the provider
/// never produced an acceptable object.
pub async fn generate_object<T, F>(
    client: &dyn LlmClient,
    request: &LlmRequest,
    accept: F,
) -> AppResult<Option<T>>
where
    F: Fn(&Value) -> Option<T>,
{
    let mut objects = client.stream_object(request).await?;
    let mut last = None;

    while let Some(item) = objects.next().await {
        let value = item?;
        if let Some(accepted) = accept(&value) {
            last = Some(accepted);
        }
    }

    Ok(last)
}
