//! Message stream assembly.
//!
//! Folds `chat_update` and `chat_chunk` events into the ordered message list.
//! The reducer is pure: it takes the current list and one event and returns
//! the next list plus whatever preview side effects the event carries. Events
//! must be applied in receipt order; nothing is buffered or reordered.

use crate::message::{Message, Role};
use crate::protocol::{ChatChunkEvent, ChatUpdateEvent};

/// Side effects of a full update, applied by the owner of the preview state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateEffects {
    /// Replacement suggestion list, if the update carried one
    pub follow_ups: Option<Vec<String>>,
    /// Preview path to jump to
    pub navigate_to: Option<String>,
    /// Full updates always reload the preview
    pub bump_preview: bool,
}

/// Where a full update landed in the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Replaced the message with the same id
    Replaced(usize),
    /// Merged into the trailing assistant turn
    MergedTrailing(usize),
    /// Adopted by an optimistic local user message
    AdoptedLocal(usize),
    /// Appended as a new turn
    Appended(usize),
    /// The update carried no message
    None,
}

/// Apply a full update.
pub fn apply_update(
    mut messages: Vec<Message>,
    update: &ChatUpdateEvent,
) -> (Vec<Message>, Placement, UpdateEffects) {
    let placement = match &update.message {
        Some(incoming) => place(&mut messages, incoming),
        None => Placement::None,
    };
    let effects = UpdateEffects {
        follow_ups: update.follow_ups.clone(),
        navigate_to: update.navigate_to.clone(),
        bump_preview: true,
    };
    (messages, placement, effects)
}

fn place(messages: &mut Vec<Message>, incoming: &Message) -> Placement {
    if let Some(id) = incoming.id {
        if let Some(index) = messages.iter().position(|m| m.id == Some(id)) {
            messages[index] = incoming.clone();
            return Placement::Replaced(index);
        }
    }

    // The server sometimes emits two full updates for one logical assistant
    // turn; coalesce them into the trailing bubble.
    if incoming.role == Role::Assistant {
        if let Some(last) = messages.last_mut().filter(|m| m.is_assistant()) {
            last.absorb(incoming);
            return Placement::MergedTrailing(messages.len() - 1);
        }
    }

    if incoming.role == Role::User {
        if let Some(index) = messages
            .iter()
            .rposition(|m| m.role == Role::User && m.is_in_progress())
        {
            messages[index].absorb(incoming);
            return Placement::AdoptedLocal(index);
        }
    }

    messages.push(incoming.clone());
    Placement::Appended(messages.len() - 1)
}

/// Apply a delta chunk.
pub fn apply_chunk(mut messages: Vec<Message>, chunk: &ChatChunkEvent) -> Vec<Message> {
    match messages.last_mut().filter(|m| m.is_assistant()) {
        Some(last) => last.append_chunk(&chunk.content, &chunk.thinking_content),
        None => messages.push(Message::assistant_chunk(
            &chunk.content,
            &chunk.thinking_content,
        )),
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str, thinking: &str) -> ChatChunkEvent {
        ChatChunkEvent {
            content: content.to_string(),
            thinking_content: thinking.to_string(),
        }
    }

    fn assistant(id: Option<i64>, content: &str) -> Message {
        Message {
            role: Role::Assistant,
            content: content.to_string(),
            thinking_content: None,
            id,
            images: Vec::new(),
        }
    }

    fn user(id: Option<i64>, content: &str) -> Message {
        Message {
            id,
            ..Message::user(content, Vec::new())
        }
    }

    fn update(message: Message) -> ChatUpdateEvent {
        ChatUpdateEvent {
            message: Some(message),
            ..Default::default()
        }
    }

    #[test]
    fn chunks_start_and_extend_assistant_turn() {
        let msgs = vec![user(Some(1), "make a game")];
        let msgs = apply_chunk(msgs, &chunk("Hel", "plan "));
        let msgs = apply_chunk(msgs, &chunk("lo", "more"));
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].content, "Hello");
        assert_eq!(msgs[1].thinking_content.as_deref(), Some("plan more"));
        assert!(msgs[1].is_in_progress());
    }

    #[test]
    fn chunk_on_empty_list_creates_message() {
        let msgs = apply_chunk(Vec::new(), &chunk("x", ""));
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].is_assistant());
    }

    #[test]
    fn update_replaces_by_id_in_place() {
        let msgs = vec![
            user(Some(1), "a"),
            assistant(Some(2), "old"),
            user(Some(3), "b"),
            assistant(Some(4), "reply"),
        ];
        let (next, placement, effects) = apply_update(msgs, &update(assistant(Some(2), "new")));
        assert_eq!(placement, Placement::Replaced(1));
        assert_eq!(next.len(), 4);
        assert_eq!(next[1].content, "new");
        assert_eq!(next[3].content, "reply");
        assert!(effects.bump_preview);
    }

    #[test]
    fn id_match_replaces_whole_message() {
        let earlier = Message {
            thinking_content: Some("### Planning".into()),
            images: vec!["https://img/a.png".into()],
            ..assistant(Some(2), "old")
        };
        let msgs = vec![user(Some(1), "a"), earlier, user(Some(3), "b")];
        let (next, placement, _) = apply_update(msgs, &update(assistant(Some(2), "new")));
        assert_eq!(placement, Placement::Replaced(1));
        assert_eq!(next[1], assistant(Some(2), "new"));
    }

    #[test]
    fn update_merges_into_trailing_assistant() {
        let msgs = apply_chunk(vec![user(Some(1), "hi")], &chunk("Hello", ""));
        let (next, placement, _) = apply_update(msgs, &update(assistant(Some(7), "Hello world")));
        assert_eq!(placement, Placement::MergedTrailing(1));
        assert_eq!(next.len(), 2);
        assert_eq!(next[1].id, Some(7));
        assert_eq!(next[1].content, "Hello world");
    }

    #[test]
    fn idless_update_never_grows_list_on_assistant_tail() {
        let msgs = apply_chunk(Vec::new(), &chunk("draft", ""));
        let (next, _, _) = apply_update(msgs, &update(assistant(None, "final")));
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].content, "final");
        assert!(next[0].is_in_progress());
    }

    #[test]
    fn consecutive_assistant_updates_coalesce() {
        let msgs = vec![user(Some(1), "q")];
        let (msgs, _, _) = apply_update(msgs, &update(assistant(Some(2), "first")));
        let (msgs, placement, _) = apply_update(msgs, &update(assistant(Some(3), "second")));
        assert_eq!(placement, Placement::MergedTrailing(1));
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].content, "second");
        assert_eq!(msgs[1].id, Some(3));
    }

    #[test]
    fn update_appends_after_user_turn() {
        let msgs = vec![user(Some(1), "q")];
        let (next, placement, _) = apply_update(msgs, &update(assistant(Some(2), "a")));
        assert_eq!(placement, Placement::Appended(1));
        assert_eq!(next.len(), 2);
    }

    #[test]
    fn user_echo_adopts_optimistic_message() {
        let msgs = vec![user(Some(1), "q"), assistant(Some(2), "a"), user(None, "next")];
        let echo = Message {
            images: vec!["https://img".into()],
            ..user(Some(3), "next")
        };
        let (next, placement, _) = apply_update(msgs, &update(echo));
        assert_eq!(placement, Placement::AdoptedLocal(2));
        assert_eq!(next.len(), 3);
        assert_eq!(next[2].id, Some(3));
        assert_eq!(next[2].images, vec!["https://img".to_string()]);
    }

    #[test]
    fn user_update_without_pending_local_appends() {
        let msgs = vec![user(Some(1), "q"), assistant(Some(2), "a")];
        let (next, placement, _) = apply_update(msgs, &update(user(Some(3), "again")));
        assert_eq!(placement, Placement::Appended(2));
        assert_eq!(next.len(), 3);
    }

    #[test]
    fn applying_same_update_twice_is_idempotent() {
        let msgs = apply_chunk(vec![user(None, "hi")], &chunk("Hel", "t"));
        let event = ChatUpdateEvent {
            message: Some(assistant(Some(7), "Hello world")),
            follow_ups: Some(vec!["More".into()]),
            navigate_to: Some("/x".into()),
        };
        let (once, _, effects_once) = apply_update(msgs, &event);
        let (twice, _, effects_twice) = apply_update(once.clone(), &event);
        assert_eq!(once, twice);
        assert_eq!(effects_once, effects_twice);
    }

    #[test]
    fn update_without_message_still_has_effects() {
        let event = ChatUpdateEvent {
            message: None,
            follow_ups: Some(vec!["a".into(), "b".into()]),
            navigate_to: None,
        };
        let (next, placement, effects) = apply_update(vec![user(Some(1), "q")], &event);
        assert_eq!(placement, Placement::None);
        assert_eq!(next.len(), 1);
        assert_eq!(effects.follow_ups.unwrap().len(), 2);
        assert!(effects.bump_preview);
    }

    #[test]
    fn idless_incoming_never_matches_idless_messages() {
        let msgs = vec![user(None, "pending")];
        let (next, placement, _) = apply_update(msgs, &update(assistant(None, "reply")));
        assert_eq!(placement, Placement::Appended(1));
        assert_eq!(next[0].content, "pending");
    }
}
