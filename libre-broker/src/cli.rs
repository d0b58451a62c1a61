//! Argument handling and lookups for `libre-fetch`.

use std::fmt;

use libre_core::{extract_video_id, ConfigError};
use serde_json::Value;
use tracing::warn;

use crate::services::VideoServices;

pub const USAGE: &str =
    "usage: libre-fetch [--config <path>] <segments|branding|replacement> <video-id|embed-url>...";

/// Which lookup to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Segments,
    Branding,
    Replacement,
}

impl Command {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "segments" => Some(Self::Segments),
            "branding" => Some(Self::Branding),
            "replacement" => Some(Self::Replacement),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Segments => "segments",
            Self::Branding => "branding",
            Self::Replacement => "replacement",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: Command,
    /// Arguments as given; may be ids or embed URLs.
    pub targets: Vec<String>,
}

impl Invocation {
    /// Parse arguments (without the program name). `--config <path>` is
    /// skipped here; config loading reads it separately.
    pub fn parse<I, S>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut positional = Vec::new();
        let mut args = args.into_iter().map(Into::into);
        while let Some(arg) = args.next() {
            if arg == "--config" {
                if args.next().is_none() {
                    return Err(usage_error("--config", "expects a path"));
                }
                continue;
            }
            positional.push(arg);
        }

        let mut positional = positional.into_iter();
        let command = match positional.next() {
            Some(name) => Command::parse(&name)
                .ok_or_else(|| usage_error("command", &format!("unknown command `{name}`")))?,
            None => return Err(usage_error("command", "missing")),
        };
        let targets: Vec<String> = positional.collect();
        if targets.is_empty() {
            return Err(usage_error("video-id", "at least one is required"));
        }
        Ok(Self { command, targets })
    }
}

fn usage_error(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: format!("{reason}\n{USAGE}"),
    }
}

/// Run `command` for one target. Unrecognised targets are skipped with a
/// warning and yield `None`.
pub async fn lookup(services: &VideoServices, command: Command, target: &str) -> Option<Value> {
    let Some(video_id) = extract_video_id(target) else {
        warn!(target = %target, "Not a video id or embed URL");
        return None;
    };
    match command {
        Command::Segments => services
            .skip_segments(video_id)
            .await
            .and_then(|segments| serde_json::to_value(segments).ok()),
        Command::Branding => services.branding(video_id).await,
        Command::Replacement => services
            .replacement(video_id)
            .await
            .and_then(|replacement| serde_json::to_value(replacement).ok()),
    }
}

/// One output line: `{"video": ..., "<command>": <result or null>}`.
pub fn render(command: Command, target: &str, result: Option<Value>) -> String {
    let mut line = serde_json::Map::new();
    line.insert("video".to_string(), Value::from(target));
    line.insert(command.to_string(), result.unwrap_or(Value::Null));
    Value::Object(line).to_string()
}
