use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::command_registry::{
    CommandSpec, ADJUST_COMMAND, ASPECT_COMMAND, MULTI_PATH_COMMANDS, NO_ARG_COMMANDS,
    SELECT_COMMAND, SINGLE_PATH_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub settings_update: BTreeMap<String, Value>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            settings_update: BTreeMap::new(),
            command_args: BTreeMap::new(),
        }
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_args(arg: &str) -> Vec<String> {
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
    let parts = parse_path_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

/// `brightness=150 contrast=90` -> `{"brightness": "150", "contrast": "90"}`.
/// Tokens without `=` are collected under `invalid`.
fn parse_assignments(arg: &str) -> (Map<String, Value>, Vec<String>) {
    let mut assignments = Map::new();
    let mut invalid = Vec::new();
    for token in arg
        .split(|ch: char| ch.is_whitespace() || ch == ',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        match token.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                assignments.insert(
                    key.trim().to_ascii_lowercase(),
                    Value::String(value.trim().to_string()),
                );
            }
            _ => invalid.push(token.to_string()),
        }
    }
    (assignments, invalid)
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
            let remainder = &slash_tail[command_len..];
            let arg = if remainder.is_empty() {
                ""
            } else {
                remainder.trim()
            };

            if command == ASPECT_COMMAND.command {
                let mut intent = Intent::new(ASPECT_COMMAND.action, text);
                intent
                    .settings_update
                    .insert("aspect_ratio".to_string(), Value::String(arg.to_string()));
                return intent;
            }

            if command == ADJUST_COMMAND.command {
                let (assignments, invalid) = parse_assignments(arg);
                let mut intent = Intent::new(ADJUST_COMMAND.action, text);
                intent
                    .command_args
                    .insert("filters".to_string(), Value::Object(assignments));
                intent.command_args.insert(
                    "invalid".to_string(),
                    Value::Array(invalid.into_iter().map(Value::String).collect()),
                );
                return intent;
            }

            if command == SELECT_COMMAND.command {
                let mut intent = Intent::new(SELECT_COMMAND.action, text);
                let index = arg
                    .parse::<u64>()
                    .map(|value| Value::Number(value.into()))
                    .unwrap_or(Value::Null);
                intent.command_args.insert("index".to_string(), index);
                return intent;
            }

            if let Some(action) = find_action(&command, SINGLE_PATH_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent.command_args.insert(
                    "path".to_string(),
                    Value::String(parse_single_path_arg(arg)),
                );
                return intent;
            }

            if let Some(action) = find_action(&command, MULTI_PATH_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent.command_args.insert(
                    "paths".to_string(),
                    Value::Array(
                        parse_path_args(arg)
                            .into_iter()
                            .map(Value::String)
                            .collect(),
                    ),
                );
                return intent;
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            let mut intent = Intent::new("unknown", text);
            intent
                .command_args
                .insert("command".to_string(), Value::String(command));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return intent;
        }
    }

    let mut intent = Intent::new("generate", text);
    intent.prompt = Some(text.to_string());
    intent
}
