use serde_json::{Map, Value};

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

pub(crate) fn json_value_to_form_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(raw) => raw.to_string(),
        Value::Number(raw) => raw.to_string(),
        Value::String(raw) => raw.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().map(|existing| existing == trimmed).unwrap_or(false) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn push_unique_warning(warnings: &mut Vec<String>, message: String) {
    if message.trim().is_empty() {
        return;
    }
    if warnings.iter().any(|existing| existing == &message) {
        return;
    }
    warnings.push(message);
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{error_chain_text, json_value_to_form_text, push_unique_warning, truncate_text};

    #[test]
    fn error_chain_text_preserves_nested_contexts() {
        let err = anyhow::anyhow!("connection reset").context("images/edits request failed");
        assert_eq!(
            error_chain_text(&err, 200),
            "images/edits request failed | caused by: connection reset"
        );
    }

    #[test]
    fn truncate_and_warnings() {
        assert_eq!(truncate_text("abcdef", 3), "abc…");
        assert_eq!(truncate_text("abc", 3), "abc");
        let mut warnings = Vec::new();
        push_unique_warning(&mut warnings, "same".to_string());
        push_unique_warning(&mut warnings, "same".to_string());
        push_unique_warning(&mut warnings, "  ".to_string());
        assert_eq!(warnings, vec!["same"]);
    }

    #[test]
    fn form_text_for_scalars() {
        assert_eq!(json_value_to_form_text(&json!(3)), "3");
        assert_eq!(json_value_to_form_text(&json!("url")), "url");
        assert_eq!(json_value_to_form_text(&json!(true)), "true");
    }
}
