//! Rendering tool invocations for chat.

use serde_json::Value;

const MAX_DETAIL_CHARS: usize = 200;

/// Render a tool call as a short chat line: `🔧 NAME` plus its most telling
/// argument.
pub fn format_tool_call(name: &str, input: &Value) -> String {
    let header = format!("🔧 {}", name.to_uppercase());

    let detail = match name {
        "Bash" => string_field(input, "command"),
        "Read" | "Write" | "Edit" | "MultiEdit" | "NotebookEdit" => {
            string_field(input, "file_path").or_else(|| string_field(input, "notebook_path"))
        }
        "Grep" | "Glob" => string_field(input, "pattern"),
        "WebFetch" => string_field(input, "url"),
        "WebSearch" => string_field(input, "query"),
        "Task" => string_field(input, "description"),
        _ => None,
    }
    .or_else(|| compact_json(input));

    match detail {
        Some(detail) => format!("{header}\n{}", truncate(&detail, MAX_DETAIL_CHARS)),
        None => header,
    }
}

fn string_field(input: &Value, key: &str) -> Option<String> {
    input
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn compact_json(input: &Value) -> Option<String> {
    match input {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        other => Some(other.to_string()),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push('…');
    cut
}
