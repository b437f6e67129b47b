//! Plain-text rendering of messages for the terminal.

use buildchat_session::transcode::{render_message, segments};
use buildchat_session::{Message, PreviewMetadata, Role, Segment};

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

fn ensure_newline(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Render transcoded markup: prose verbatim, files as one-line summaries.
pub fn format_segments(rendered: &str) -> String {
    let mut out = String::new();
    for segment in segments(rendered) {
        match segment {
            Segment::Markdown(text) => out.push_str(text),
            Segment::FileUpdate(update) => {
                ensure_newline(&mut out);
                out.push_str(&format!(
                    "  ✎ {} ({})\n",
                    update.filename,
                    plural(update.content.lines().count(), "line")
                ));
            }
            Segment::Loading => {
                ensure_newline(&mut out);
                out.push_str("  … writing file\n");
            }
            Segment::Malformed { error, .. } => {
                ensure_newline(&mut out);
                out.push_str(&format!("  ! unreadable file update: {error}\n"));
            }
        }
    }
    ensure_newline(&mut out);
    out
}

/// One message as a block of text.
pub fn format_message(message: &Message, streaming: bool) -> String {
    let who = match message.role {
        Role::User => "you",
        Role::Assistant => "agent",
    };
    let mut out = format!("{who} ›\n");
    if message.shows_thinking() {
        out.push_str(&format!("  ({})\n", message.thinking_headline()));
    }
    out.push_str(&format_segments(&render_message(&message.content, streaming)));
    for image in &message.images {
        out.push_str(&format!("  [image] {image}\n"));
    }
    out
}

/// One-line progress summary for the message that is still streaming.
pub fn progress_line(message: &Message) -> String {
    if message.content.is_empty() {
        return message.thinking_headline().to_string();
    }
    let rendered = render_message(&message.content, true);
    let mut files = 0;
    let mut loading = false;
    for segment in segments(&rendered) {
        match segment {
            Segment::FileUpdate(_) => files += 1,
            Segment::Loading => loading = true,
            _ => {}
        }
    }
    match (files, loading) {
        (0, false) => "Writing...".to_string(),
        (n, false) => format!("Writing... ({} done)", plural(n, "file")),
        (n, true) => format!("Writing file {}...", n + 1),
    }
}

/// Where the preview currently points.
pub fn format_preview(preview: &PreviewMetadata) -> Option<String> {
    preview
        .location()
        .map(|location| format!("preview: {location} (rev {})", preview.preview_hash))
}

/// Numbered suggestion list.
pub fn format_suggestions(suggestions: &[&str]) -> String {
    suggestions
        .iter()
        .enumerate()
        .map(|(i, s)| format!("  /follow {} → {s}\n", i + 1))
        .collect()
}

/// Tracks what has already been printed so that each change prints only
/// new or edited messages. The streaming tail is left to the progress line.
#[derive(Debug, Default)]
pub struct Transcript {
    printed: Vec<String>,
}

impl Transcript {
    pub fn refresh(&mut self, messages: &[Message], streaming_tail: bool) -> Vec<String> {
        if self.printed.len() > messages.len() {
            self.printed.clear();
        }
        let settled = if streaming_tail {
            messages.len().saturating_sub(1)
        } else {
            messages.len()
        };

        let mut blocks = Vec::new();
        for (index, message) in messages[..settled].iter().enumerate() {
            match self.printed.get_mut(index) {
                Some(content) if *content == message.content => {}
                Some(content) => {
                    blocks.push(format!("(edited) {}", format_message(message, false)));
                    content.clone_from(&message.content);
                }
                None => {
                    blocks.push(format_message(message, false));
                    self.printed.push(message.content.clone());
                }
            }
        }
        blocks
    }
}
