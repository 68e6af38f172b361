use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, ENTRY_COMMANDS, NO_ARG_COMMANDS, RAW_ARG_COMMANDS, SET_COMMAND,
    SINGLE_PATH_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            command_args: BTreeMap::new(),
        }
    }

    fn arg(mut self, key: &str, value: Value) -> Self {
        self.command_args.insert(key.to_string(), value);
        self
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn split_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    let parts = split_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

fn index_value(raw: Option<&String>) -> Value {
    raw.and_then(|value| value.parse::<u64>().ok())
        .map(|value| Value::Number(value.into()))
        .unwrap_or(Value::Null)
}

/// `<entry> [image] [path]`; the image index is only taken when it parses
/// as a number, so `/download 3 out.png` works too.
fn parse_entry_args(intent: Intent, arg: &str) -> Intent {
    let parts = split_args(arg);
    let mut rest = parts.iter().skip(1).peekable();
    let image_given = rest
        .peek()
        .map(|value| value.parse::<u64>().is_ok())
        .unwrap_or(false);
    let image = if image_given {
        index_value(rest.next())
    } else {
        Value::Null
    };
    let path = rest
        .map(String::as_str)
        .collect::<Vec<&str>>()
        .join(" ");
    intent
        .arg("entry", index_value(parts.first()))
        .arg("image", image)
        .arg(
            "path",
            if path.is_empty() {
                Value::Null
            } else {
                Value::String(path)
            },
        )
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(action) = find_action(&command, RAW_ARG_COMMANDS) {
                let key = match action {
                    "set_mode" => "mode",
                    "use_topic" => "index",
                    _ => "model",
                };
                return Intent::new(action, text).arg(key, Value::String(arg.to_string()));
            }

            if command == SET_COMMAND.command {
                let (field, value) = match arg.split_once(char::is_whitespace) {
                    Some((field, value)) => (field.trim(), value.trim()),
                    None => (arg, ""),
                };
                let value = value
                    .strip_prefix('"')
                    .and_then(|inner| inner.strip_suffix('"'))
                    .unwrap_or(value);
                return Intent::new(SET_COMMAND.action, text)
                    .arg("field", Value::String(field.to_string()))
                    .arg("value", Value::String(value.to_string()));
            }

            if let Some(action) = find_action(&command, SINGLE_PATH_COMMANDS) {
                return Intent::new(action, text)
                    .arg("path", Value::String(parse_single_path_arg(arg)));
            }

            if let Some(action) = find_action(&command, ENTRY_COMMANDS) {
                return parse_entry_args(Intent::new(action, text), arg);
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            return Intent::new("unknown", text)
                .arg("command", Value::String(command))
                .arg("arg", Value::String(arg.to_string()));
        }
    }

    let mut intent = Intent::new("prompt", text);
    intent.prompt = Some(raw_trimmed.to_string());
    intent
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_intent;

    #[test]
    fn plain_text_is_a_prompt() {
        let intent = parse_intent("  a red ball on grass ");
        assert_eq!(intent.action, "prompt");
        assert_eq!(intent.prompt.as_deref(), Some("a red ball on grass"));
        assert_eq!(parse_intent("   ").action, "noop");
    }

    #[test]
    fn parse_mode_model_and_topic() {
        let mode = parse_intent("/mode Edit");
        assert_eq!(mode.action, "set_mode");
        assert_eq!(mode.command_args["mode"], json!("Edit"));

        let model = parse_intent("/model gpt-image-1");
        assert_eq!(model.action, "set_model");
        assert_eq!(model.command_args["model"], json!("gpt-image-1"));

        let topic = parse_intent("/topic 2");
        assert_eq!(topic.action, "use_topic");
        assert_eq!(topic.command_args["index"], json!("2"));
    }

    #[test]
    fn parse_set_option_keeps_value_spaces() {
        let intent = parse_intent("/set user \"team alpha\"");
        assert_eq!(intent.action, "set_option");
        assert_eq!(intent.command_args["field"], json!("user"));
        assert_eq!(intent.command_args["value"], json!("team alpha"));

        let bare = parse_intent("/set quality");
        assert_eq!(bare.command_args["field"], json!("quality"));
        assert_eq!(bare.command_args["value"], json!(""));
    }

    #[test]
    fn parse_path_commands_with_quotes() {
        let image = parse_intent("/image \"/tmp/my photo.png\"");
        assert_eq!(image.action, "attach_image");
        assert_eq!(image.command_args["path"], json!("/tmp/my photo.png"));

        let draw = parse_intent("/draw strokes.json");
        assert_eq!(draw.action, "draw_mask");
        assert_eq!(draw.command_args["path"], json!("strokes.json"));
    }

    #[test]
    fn parse_entry_commands() {
        let regenerate = parse_intent("/regenerate 3");
        assert_eq!(regenerate.action, "regenerate");
        assert_eq!(regenerate.command_args["entry"], json!(3));
        assert_eq!(regenerate.command_args["image"], json!(null));

        let download = parse_intent("/download 5 1 \"out dir/pic.png\"");
        assert_eq!(download.command_args["entry"], json!(5));
        assert_eq!(download.command_args["image"], json!(1));
        assert_eq!(download.command_args["path"], json!("out dir/pic.png"));

        let download_no_image = parse_intent("/download 5 pic.png");
        assert_eq!(download_no_image.command_args["image"], json!(null));
        assert_eq!(download_no_image.command_args["path"], json!("pic.png"));

        let bad = parse_intent("/expand first");
        assert_eq!(bad.action, "expand");
        assert_eq!(bad.command_args["entry"], json!(null));
    }

    #[test]
    fn parse_no_arg_commands() {
        assert_eq!(parse_intent("/submit").action, "submit");
        assert_eq!(parse_intent("/close").action, "close_expanded");
        assert_eq!(parse_intent("/exit").action, "quit");
    }

    #[test]
    fn parse_unknown_command() {
        let intent = parse_intent("/magic foo bar");
        assert_eq!(intent.action, "unknown");
        assert_eq!(intent.command_args["command"], json!("magic"));
        assert_eq!(intent.command_args["arg"], json!("foo bar"));
    }
}
