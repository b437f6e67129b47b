//! Code block transclusion.
//!
//! The agent writes files as fenced code blocks whose first line names the
//! file:
//!
//! ````text
//! ```python
//! # app/main.py
//! print("hi")
//! ```
//! ````
//!
//! [`render_message`] swaps each such block for a compact inline token
//! carrying `{filename, content}` as base64-encoded JSON, and, while a message
//! is still streaming, swaps an unclosed trailing block for a loading token.
//! [`segments`] splits rendered markup back into its pieces for display.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

pub const FILE_UPDATE_OPEN: &str = "<file-update>";
pub const FILE_UPDATE_CLOSE: &str = "</file-update>";
pub const FILE_LOADING_TOKEN: &str = "<file-loading>...</file-loading>";

const FENCE: &str = "```";

/// A fenced block whose first line is a filename marker: `# name` or
/// `// name`, `/* name */`, or `<!-- name -->`.
static TAGGED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"```[\w.]+\n(?:[#/]+ (\S+)|[/*]+ (\S+) \*/|<!-- (\S+) -->)\n([\s\S]+?)```",
    )
    .expect("tagged block pattern is valid")
});

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<file-update>([^<]*)</file-update>|<file-loading>\.\.\.</file-loading>")
        .expect("token pattern is valid")
});

/// Errors decoding a file-update token.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("token is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("token payload is not a file update: {0}")]
    Payload(#[from] serde_json::Error),
}

/// One file written by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpdate {
    pub filename: String,
    pub content: String,
}

impl FileUpdate {
    pub fn new(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }

    /// Base64 of the JSON payload; contains no markup-significant characters.
    pub fn encode(&self) -> String {
        // Serializing two strings cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        STANDARD.encode(json)
    }

    /// Inverse of [`FileUpdate::encode`].
    pub fn decode(payload: &str) -> Result<Self, TranscodeError> {
        let bytes = STANDARD.decode(payload.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// The full inline token.
    pub fn token(&self) -> String {
        format!("{FILE_UPDATE_OPEN}{}{FILE_UPDATE_CLOSE}", self.encode())
    }
}

/// Transcode one message body for display.
///
/// Pure: the output depends only on `text` and `partial`, so it is safe to
/// call on every render of a growing message.
pub fn render_message(text: &str, partial: bool) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut out = TAGGED_BLOCK
        .replace_all(text, |caps: &Captures<'_>| {
            let filename = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            let content = caps.get(4).map(|m| m.as_str()).unwrap_or_default();
            FileUpdate::new(filename, content).token()
        })
        .into_owned();

    if partial {
        if let Some(start) = unclosed_fence(&out) {
            out.truncate(start);
            out.push_str(FILE_LOADING_TOKEN);
        }
    }

    out
}

/// Byte offset of a trailing opening fence with no closing fence after it.
/// Only backticks at the start of a line count as fences.
fn unclosed_fence(text: &str) -> Option<usize> {
    let mut open = None;
    let fences = text
        .match_indices(FENCE)
        .map(|(index, _)| index)
        .filter(|&index| index == 0 || text.as_bytes()[index - 1] == b'\n');
    for index in fences {
        open = match open {
            None => Some(index),
            Some(_) => None,
        };
    }
    open
}

/// A piece of rendered message markup.
#[derive(Debug)]
pub enum Segment<'a> {
    Markdown(&'a str),
    FileUpdate(FileUpdate),
    Loading,
    /// A token that could not be decoded; the rest of the message is unaffected
    Malformed {
        raw: &'a str,
        error: TranscodeError,
    },
}

/// Split output of [`render_message`] into displayable segments.
pub fn segments(rendered: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut cursor = 0;
    for caps in TOKEN.captures_iter(rendered) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() > cursor {
            out.push(Segment::Markdown(&rendered[cursor..whole.start()]));
        }
        match caps.get(1) {
            Some(payload) => match FileUpdate::decode(payload.as_str()) {
                Ok(update) => out.push(Segment::FileUpdate(update)),
                Err(error) => out.push(Segment::Malformed {
                    raw: whole.as_str(),
                    error,
                }),
            },
            None => out.push(Segment::Loading),
        }
        cursor = whole.end();
    }
    if cursor < rendered.len() {
        out.push(Segment::Markdown(&rendered[cursor..]));
    }
    out
}
