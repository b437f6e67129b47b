use proptest::prelude::*;

use buildchat_session::assembler::{apply_chunk, apply_update};
use buildchat_session::transcode::{
    FILE_LOADING_TOKEN, FILE_UPDATE_OPEN, render_message, segments,
};
use buildchat_session::{ChatChunkEvent, ChatUpdateEvent, FileUpdate, Message, Role, Segment};

fn chunk(content: &str, thinking: &str) -> ChatChunkEvent {
    ChatChunkEvent {
        content: content.to_string(),
        thinking_content: thinking.to_string(),
    }
}

fn update(message: Message) -> ChatUpdateEvent {
    ChatUpdateEvent {
        message: Some(message),
        ..Default::default()
    }
}

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::User), Just(Role::Assistant)]
}

/// A conversation of durable messages with distinct ids.
fn arb_durable_conversation() -> impl Strategy<Value = Vec<Message>> {
    prop::collection::vec((arb_role(), ".{0,20}"), 1..12).prop_map(|turns| {
        turns
            .into_iter()
            .enumerate()
            .map(|(i, (role, content))| Message {
                role,
                content,
                thinking_content: None,
                id: Some(i as i64 + 1),
                images: Vec::new(),
            })
            .collect()
    })
}

fn arb_filename() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_./é日-]{1,24}"
}

// --- Message assembly ---

proptest! {
    #[test]
    fn chunks_concatenate(
        parts in prop::collection::vec((".{0,10}", ".{0,10}"), 1..20),
    ) {
        let mut messages = vec![Message::user("go", Vec::new())];
        for (content, thinking) in &parts {
            messages = apply_chunk(messages, &chunk(content, thinking));
        }

        prop_assert_eq!(messages.len(), 2);
        let tail = &messages[1];
        let content: String = parts.iter().map(|(c, _)| c.as_str()).collect();
        let thinking: String = parts.iter().map(|(_, t)| t.as_str()).collect();
        prop_assert_eq!(&tail.content, &content);
        prop_assert_eq!(tail.thinking_content.clone().unwrap_or_default(), thinking);
    }

    #[test]
    fn id_match_replaces_in_place(
        conversation in arb_durable_conversation(),
        pick in any::<prop::sample::Index>(),
        content in ".{0,30}",
    ) {
        let index = pick.index(conversation.len());
        let target = conversation[index].clone();
        let replacement = Message { content: content.clone(), ..target.clone() };

        let (next, _, _) = apply_update(conversation.clone(), &update(replacement));

        prop_assert_eq!(next.len(), conversation.len());
        prop_assert_eq!(&next[index].content, &content);
        for (i, (before, after)) in conversation.iter().zip(&next).enumerate() {
            prop_assert_eq!(before.id, after.id);
            if i != index {
                prop_assert_eq!(before, after);
            }
        }
    }

    #[test]
    fn idless_update_on_streaming_tail_never_grows(
        conversation in arb_durable_conversation(),
        streamed in ".{1,20}",
        content in ".{0,30}",
    ) {
        let streaming = apply_chunk(conversation, &chunk(&streamed, ""));
        let len = streaming.len();
        let incoming = Message {
            role: Role::Assistant,
            content,
            thinking_content: None,
            id: None,
            images: Vec::new(),
        };
        let (next, _, _) = apply_update(streaming, &update(incoming));
        prop_assert_eq!(next.len(), len);
    }

    #[test]
    fn full_updates_are_idempotent(
        conversation in arb_durable_conversation(),
        role in arb_role(),
        id in prop::option::of(1i64..20),
        content in ".{0,30}",
        thinking in prop::option::of(".{0,10}"),
    ) {
        let event = update(Message {
            role,
            content,
            thinking_content: thinking,
            id,
            images: Vec::new(),
        });
        let (once, _, _) = apply_update(conversation, &event);
        let (twice, _, _) = apply_update(once.clone(), &event);
        prop_assert_eq!(once, twice);
    }
}

// --- Code block transcoding ---

proptest! {
    #[test]
    fn token_round_trips(filename in arb_filename(), content in "(?s).{0,80}") {
        let update = FileUpdate::new(filename, content);
        prop_assert_eq!(FileUpdate::decode(&update.encode()).unwrap(), update.clone());

        let rendered = format!("before {} after", update.token());
        let decoded: Vec<FileUpdate> = segments(&rendered)
            .into_iter()
            .filter_map(|s| match s {
                Segment::FileUpdate(u) => Some(u),
                _ => None,
            })
            .collect();
        prop_assert_eq!(decoded, vec![update]);
    }

    #[test]
    fn tagged_block_round_trips(
        filename in "[a-zA-Z0-9_/-]{1,16}\\.[a-z]{1,4}",
        body in prop::collection::vec("[a-zA-Z0-9 (){};=é日]{0,20}", 1..6),
    ) {
        let content = format!("{}\n", body.join("\n"));
        let text = format!("Here:\n```js\n// {filename}\n{content}```\nDone.");
        let rendered = render_message(&text, false);

        let decoded: Vec<FileUpdate> = segments(&rendered)
            .into_iter()
            .filter_map(|s| match s {
                Segment::FileUpdate(u) => Some(u),
                _ => None,
            })
            .collect();
        prop_assert_eq!(decoded, vec![FileUpdate::new(filename, content)]);
    }

    #[test]
    fn unclosed_fence_yields_one_loading_token(
        prose in "[a-zA-Z .,]{0,40}",
        filename in "[a-z]{1,10}\\.py",
        partial_body in "[a-zA-Z0-9 (=]{0,40}",
    ) {
        let text = format!("{prose}\n```python\n# {filename}\n{partial_body}");
        let rendered = render_message(&text, true);
        prop_assert_eq!(rendered.matches(FILE_LOADING_TOKEN).count(), 1);
        prop_assert_eq!(rendered.matches(FILE_UPDATE_OPEN).count(), 0);
        prop_assert!(rendered.starts_with(&prose));
    }
}
