pub mod api;
pub mod render;
pub mod session;

use anyhow::{Context, Result};
use buildchat_session::transcode::render_message;
use buildchat_session::{SessionController, WsConnector};
use std::io::Read;
use std::path::Path;
use tracing::info;

use crate::config::BuildchatConfig;
use api::{ApiClient, ApiError, CreateChatRequest};

/// Arguments of `buildchat new`.
pub struct NewChatOptions {
    pub prompt: String,
    pub images: Vec<String>,
    pub stack_pack_id: Option<i64>,
    pub project_id: Option<i64>,
    pub team_id: Option<i64>,
}

fn unavailable_hint(err: ApiError) -> anyhow::Error {
    match err {
        ApiError::Unavailable => anyhow::anyhow!("API server is unavailable; check api.url"),
        other => other.into(),
    }
}

/// Open an existing chat and run the interactive session.
pub async fn attach_command(config: &BuildchatConfig, chat_id: i64) -> Result<()> {
    let file_config = config.load()?;
    let session_config = file_config.session_config()?;
    let web_url = file_config.web_url()?;
    let api = ApiClient::new(&session_config);

    let chat = api.get_chat(chat_id).await.map_err(unavailable_hint)?;
    info!(chat_id = chat.id, name = %chat.name, "attaching");

    let mut controller = SessionController::new(WsConnector, session_config);
    controller.attach(chat.session_id()).await;
    session::run(&mut controller, &api, &web_url, chat).await
}

/// Create a chat from a first prompt, then run the interactive session. The
/// prompt becomes the chat's seed and is sent once the environment is ready.
pub async fn new_command(config: &BuildchatConfig, options: NewChatOptions) -> Result<()> {
    let file_config = config.load()?;
    let session_config = file_config.session_config()?;
    let web_url = file_config.web_url()?;
    let api = ApiClient::new(&session_config);

    let mut images = Vec::with_capacity(options.images.len());
    for source in &options.images {
        let url = session::resolve_image(&api, source)
            .await
            .with_context(|| format!("Failed to attach image {source}"))?;
        images.push(url);
    }

    let mut controller = SessionController::new(WsConnector, session_config);
    controller
        .send_user_message(options.prompt.clone(), images)
        .context("Prompt was not accepted")?;

    let request = CreateChatRequest {
        stack_pack_id: options.stack_pack_id,
        project_id: options.project_id,
        team_id: options.team_id,
        ..CreateChatRequest::from_prompt(&options.prompt)
    };
    let chat = api.create_chat(&request).await.map_err(unavailable_hint)?;
    eprintln!("[buildchat: created chat {} ({}), setting things up...]", chat.id, chat.name);

    controller.attach(chat.session_id()).await;
    session::run(&mut controller, &api, &web_url, chat).await
}

/// Transcode a message body from a file or stdin and print its segments.
pub fn render_command(file: Option<&Path>, partial: bool) -> Result<()> {
    let text = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };
    print!("{}", render::format_segments(&render_message(&text, partial)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_command_reads_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("msg.md");
        std::fs::write(&path, "```py\n# a.py\nx = 1\n```").unwrap();
        render_command(Some(&path), false).unwrap();
        assert!(render_command(Some(&tmp.path().join("missing.md")), false).is_err());
    }

    #[test]
    fn unavailable_gets_a_hint() {
        let err = unavailable_hint(ApiError::Unavailable);
        assert!(err.to_string().contains("api.url"));
    }
}
