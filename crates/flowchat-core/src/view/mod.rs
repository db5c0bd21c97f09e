//! View Renderer
//!
//! Pure functions from session state to view models. Nothing here touches
//! the Session Store; hosts turn the models into DOM updates, usually via
//! the [`markup`] helpers.

use flowchat_types::{Conversation, Role, Session};

pub mod format;
pub mod markup;

pub use format::{escape_html, format_inline, strip_markup, truncate_chars, RenderContext};

/// Characters of the first turn shown as a conversation title
pub const TITLE_CHARS: usize = 30;

/// Characters of the latest turn shown in a conversation preview
pub const PREVIEW_CHARS: usize = 40;

pub const EMPTY_LIST_TEXT: &str = "No conversations yet";
pub const UNTITLED_TEXT: &str = "New Chat";

/// Speaker label used in previews
pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Assistant => "Copilot",
    }
}

/// First characters of the opening turn
pub fn conversation_title(conversation: &Conversation) -> String {
    match conversation.first_turn() {
        Some(turn) => truncate_chars(&turn.content, TITLE_CHARS),
        None => UNTITLED_TEXT.to_string(),
    }
}

/// Role-prefixed snippet of the latest turn
pub fn conversation_preview(conversation: &Conversation) -> String {
    match conversation.len() {
        0 => "New chat".to_string(),
        1 => "Started conversation".to_string(),
        _ => match conversation.last_turn() {
            Some(turn) => format!(
                "{}: {}",
                role_label(turn.role),
                truncate_chars(&turn.content, PREVIEW_CHARS)
            ),
            None => "New chat".to_string(),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationListItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub time_label: String,
    pub active: bool,
}

/// Sidebar entries, newest conversation first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationListView {
    pub items: Vec<ConversationListItem>,
}

impl ConversationListView {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

pub fn conversation_list(session: &Session, ctx: &RenderContext) -> ConversationListView {
    let mut conversations: Vec<&Conversation> = session.conversations().iter().collect();
    conversations.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

    let items = conversations
        .into_iter()
        .map(|conversation| ConversationListItem {
            id: conversation.id().to_string(),
            title: conversation_title(conversation),
            preview: conversation_preview(conversation),
            time_label: ctx.date_label(conversation.created_at()),
            active: session.current_id() == Some(conversation.id()),
        })
        .collect();

    ConversationListView { items }
}

/// Text handed to text-to-speech for a turn
pub fn speakable_text(content: &str) -> String {
    strip_markup(&format_inline(content))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnView {
    pub index: usize,
    pub role: Role,
    pub html: String,
    pub time_label: String,
    pub is_error: bool,
    pub speak_text: String,
}

/// The active conversation's turn log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageLogView {
    pub conversation_id: String,
    pub turns: Vec<TurnView>,
    /// A completion request for this conversation is outstanding
    pub typing: bool,
}

pub fn message_log(conversation: &Conversation, typing: bool, ctx: &RenderContext) -> MessageLogView {
    let turns = conversation
        .turns()
        .iter()
        .enumerate()
        .map(|(index, turn)| TurnView {
            index,
            role: turn.role,
            html: format_inline(&turn.content),
            time_label: ctx.time_label(turn.timestamp),
            is_error: turn.error_flag(),
            speak_text: speakable_text(&turn.content),
        })
        .collect();

    MessageLogView {
        conversation_id: conversation.id().to_string(),
        turns,
        typing,
    }
}

/// Visual state of a toggle button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonView {
    pub active: bool,
    pub active_class: &'static str,
    pub icon: &'static str,
    pub title: &'static str,
}

pub fn mic_button(listening: bool) -> ButtonView {
    if listening {
        ButtonView {
            active: true,
            active_class: "listening",
            icon: "fas fa-stop",
            title: "Stop listening",
        }
    } else {
        ButtonView {
            active: false,
            active_class: "listening",
            icon: "fas fa-microphone",
            title: "Voice to text",
        }
    }
}

pub fn audio_button(speaking: bool) -> ButtonView {
    if speaking {
        ButtonView {
            active: true,
            active_class: "speaking",
            icon: "fas fa-stop",
            title: "Stop speaking",
        }
    } else {
        ButtonView {
            active: false,
            active_class: "speaking",
            icon: "fas fa-volume-up",
            title: "Read response aloud",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};
    use flowchat_types::Turn;
    use pretty_assertions::assert_eq;

    fn ctx() -> RenderContext {
        RenderContext::utc(Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_title_and_preview_progression() {
        let ctx = ctx();
        let mut conversation = Conversation::new("chat_1", ctx.now);
        assert_eq!(conversation_title(&conversation), "New Chat");
        assert_eq!(conversation_preview(&conversation), "New chat");

        conversation.push(Turn::user("Hello", ctx.now));
        assert_eq!(conversation_title(&conversation), "Hello");
        assert_eq!(conversation_preview(&conversation), "Started conversation");

        conversation.push(Turn::assistant("Hi there", ctx.now));
        assert_eq!(conversation_preview(&conversation), "Copilot: Hi there");

        conversation.push(Turn::user("x".repeat(45), ctx.now));
        assert_eq!(
            conversation_preview(&conversation),
            format!("You: {}...", "x".repeat(40))
        );
    }

    #[test]
    fn test_long_title_is_cut() {
        let mut conversation = Conversation::new("chat_1", ctx().now);
        conversation.push(Turn::user("a".repeat(31), ctx().now));
        assert_eq!(conversation_title(&conversation), format!("{}...", "a".repeat(30)));
    }

    #[test]
    fn test_list_is_newest_first_with_active_marker() {
        let ctx = ctx();
        let older = Conversation::new("chat_old", ctx.now - TimeDelta::days(2));
        let newer = Conversation::new("chat_new", ctx.now);
        let session = Session::new(vec![older, newer], Some("chat_old".into()));

        let list = conversation_list(&session, &ctx);
        let items = &list.items;
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["chat_new", "chat_old"]);
        assert!(!items[0].active);
        assert!(items[1].active);
        assert_eq!(items[1].time_label, "2 days ago");
    }

    #[test]
    fn test_empty_session_lists_nothing() {
        assert!(conversation_list(&Session::default(), &ctx()).is_empty());
    }

    #[test]
    fn test_message_log_marks_errors_and_formats() {
        let ctx = ctx();
        let mut conversation = Conversation::new("chat_1", ctx.now);
        conversation.push(Turn::user("**hi**", ctx.now));
        conversation.push(Turn::assistant_error("failed", ctx.now));

        let log = message_log(&conversation, true, &ctx);
        assert!(log.typing);
        assert_eq!(log.turns.len(), 2);
        assert_eq!(log.turns[0].html, "<strong>hi</strong>");
        assert_eq!(log.turns[0].speak_text, "hi");
        assert!(!log.turns[0].is_error);
        assert!(log.turns[1].is_error);
        assert_eq!(log.turns[1].time_label, "12:00");
    }

    #[test]
    fn test_button_views() {
        assert_eq!(mic_button(true).title, "Stop listening");
        assert_eq!(mic_button(false).icon, "fas fa-microphone");
        assert_eq!(audio_button(true).title, "Stop speaking");
        assert_eq!(audio_button(false).title, "Read response aloud");
    }
}
