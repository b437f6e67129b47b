//! Interactive session loop: stdin prompts and slash commands in, rendered
//! transcript out.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use buildchat_session::{
    Changes, SendError, SessionController, SessionStatus, WsConnector,
};
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use crate::cli::api::{ApiClient, ChatRecord};
use crate::cli::render::{
    Transcript, format_preview, format_suggestions, progress_line,
};

const HELP: &str = "\
commands:
  /reconnect         reopen the session connection
  /image <path|url>  attach an image to the next prompt
  /path <path>       point the preview at another path
  /follow <n>        send the nth suggestion
  /share             share or unshare this chat
  /status            show session status and preview
  /quit              leave the session";

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Empty,
    Prompt(String),
    Reconnect,
    Image(String),
    Path(String),
    Follow(usize),
    Share,
    Status,
    Help,
    Quit,
    /// A slash command that was not understood
    Invalid(String),
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Self::Prompt(line.to_string());
        };
        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        match (name, arg) {
            ("reconnect", "") => Self::Reconnect,
            ("share", "") => Self::Share,
            ("status", "") => Self::Status,
            ("help", "") => Self::Help,
            ("quit" | "exit", "") => Self::Quit,
            ("image", arg) if !arg.is_empty() => Self::Image(arg.to_string()),
            ("path", arg) if !arg.is_empty() => {
                let path = if arg.starts_with('/') {
                    arg.to_string()
                } else {
                    format!("/{arg}")
                };
                Self::Path(path)
            }
            ("follow", arg) => match arg.parse::<usize>() {
                Ok(n) if n > 0 => Self::Follow(n),
                _ => Self::Invalid(line.to_string()),
            },
            _ => Self::Invalid(line.to_string()),
        }
    }
}

/// Turn an image argument into an uploaded URL. URLs pass through.
pub async fn resolve_image(api: &ApiClient, source: &str) -> Result<String> {
    if Url::parse(source).is_ok_and(|u| matches!(u.scheme(), "http" | "https")) {
        return Ok(source.to_string());
    }
    Ok(api.upload_image(Path::new(source)).await?)
}

/// What has been shown, so each change prints only what is new.
#[derive(Default)]
struct View {
    transcript: Transcript,
    last_status: Option<SessionStatus>,
    last_preview: Option<String>,
    progress_shown: bool,
    long_warned: bool,
}

impl View {
    fn clear_progress(&mut self) {
        if self.progress_shown {
            eprint!("\r\x1b[2K");
            self.progress_shown = false;
        }
    }

    fn update(&mut self, controller: &SessionController<WsConnector>, changes: Changes) {
        if changes.is_empty() {
            return;
        }
        let messages = controller.messages();
        let streaming = messages
            .len()
            .checked_sub(1)
            .is_some_and(|tail| controller.is_streaming(tail));

        let blocks = self.transcript.refresh(messages, streaming);
        if !blocks.is_empty() {
            self.clear_progress();
            let mut stdout = std::io::stdout().lock();
            for block in blocks {
                let _ = writeln!(stdout, "{block}");
            }
            let _ = stdout.flush();
        }

        if changes.status && self.last_status != Some(controller.status()) {
            self.clear_progress();
            self.last_status = Some(controller.status());
            eprintln!("[buildchat: {}]", controller.status().label());
        }

        if changes.preview {
            let preview = format_preview(controller.preview());
            if preview.is_some() && preview != self.last_preview {
                self.clear_progress();
                if let Some(line) = &preview {
                    eprintln!("[buildchat: {line}]");
                }
            }
            self.last_preview = preview;
        }

        if changes.follow_ups && !controller.follow_ups().is_empty() {
            self.clear_progress();
            eprint!("{}", format_suggestions(&controller.suggestions()));
        }

        if controller.is_long_conversation() && !self.long_warned {
            self.long_warned = true;
            eprintln!(
                "[buildchat: this conversation is getting long; consider starting a new chat]"
            );
        }

        match messages.last() {
            Some(tail) if streaming => {
                eprint!("\r\x1b[2K{}", progress_line(tail));
                self.progress_shown = true;
            }
            _ => self.clear_progress(),
        }
    }

    fn show_status(&mut self, controller: &SessionController<WsConnector>) {
        self.clear_progress();
        eprintln!("[buildchat: {}]", controller.status().label());
        if let Some(line) = format_preview(controller.preview()) {
            eprintln!("[buildchat: {line}]");
        }
        let suggestions = controller.suggestions();
        if !suggestions.is_empty() {
            eprint!("{}", format_suggestions(&suggestions));
        }
    }
}

fn send_prompt(
    controller: &mut SessionController<WsConnector>,
    view: &mut View,
    prompt: String,
    images: &mut Vec<String>,
) {
    let attached = std::mem::take(images);
    match controller.send_user_message(prompt, attached.clone()) {
        Ok(()) => view.update(
            controller,
            Changes {
                status: true,
                messages: true,
                ..Default::default()
            },
        ),
        Err(e) => {
            *images = attached;
            match e {
                SendError::Busy(status) => eprintln!(
                    "[buildchat: {}]",
                    status.input_blocked_reason().unwrap_or("Not ready for input")
                ),
                other => eprintln!("[buildchat: {other}]"),
            }
        }
    }
}

/// Drive an attached controller until the user quits or stdin closes.
pub async fn run(
    controller: &mut SessionController<WsConnector>,
    api: &ApiClient,
    web_url: &Url,
    mut chat: ChatRecord,
) -> Result<()> {
    let (input_tx, mut input_rx) = mpsc::channel::<String>(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else {
                break;
            };
            if input_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let mut view = View::default();
    view.show_status(controller);
    let mut images: Vec<String> = Vec::new();

    loop {
        tokio::select! {
            Some(event) = controller.next_event() => {
                let changes = controller.handle_event(event).await;
                view.update(controller, changes);
            }

            line = input_rx.recv() => {
                let Some(line) = line else {
                    debug!("stdin closed");
                    break;
                };
                match Input::parse(&line) {
                    Input::Empty => {}
                    Input::Prompt(prompt) => send_prompt(controller, &mut view, prompt, &mut images),
                    Input::Follow(n) => match controller.follow_ups().get(n - 1).cloned() {
                        Some(prompt) => send_prompt(controller, &mut view, prompt, &mut images),
                        None => eprintln!("[buildchat: no suggestion #{n}]"),
                    },
                    Input::Reconnect => {
                        let changes = controller.reconnect().await;
                        view.update(controller, changes);
                    }
                    Input::Image(source) => match resolve_image(api, &source).await {
                        Ok(url) => {
                            eprintln!("[buildchat: attached {url}]");
                            images.push(url);
                        }
                        Err(e) => eprintln!("[buildchat: image not attached: {e}]"),
                    },
                    Input::Path(path) => {
                        controller.set_preview_path(path);
                        view.update(controller, Changes { preview: true, ..Default::default() });
                    }
                    Input::Share => match api.toggle_share(&chat).await {
                        Ok(next) => {
                            match next.share_url(web_url) {
                                Some(url) => eprintln!("[buildchat: shared at {url}]"),
                                None => eprintln!("[buildchat: chat is now private]"),
                            }
                            chat = next;
                        }
                        Err(e) => eprintln!("[buildchat: unable to share chat: {e}]"),
                    },
                    Input::Status => view.show_status(controller),
                    Input::Help => eprintln!("{HELP}"),
                    Input::Quit => break,
                    Input::Invalid(text) => eprintln!("[buildchat: unknown command {text}; try /help]"),
                }
            }
        }
    }

    view.clear_progress();
    controller.detach();
    Ok(())
}
