//! HTML fragments for the browser host
//!
//! Every fragment is built from view models; user text is escaped before it
//! reaches these functions, either by [`format_inline`](super::format_inline)
//! or by [`escape_html`] here.

use flowchat_types::Role;

use super::format::escape_html;
use super::{ButtonView, ConversationListView, MessageLogView, TurnView, EMPTY_LIST_TEXT};

const COPILOT_AVATAR: &str = r#"<div class="message-avatar">
    <div class="copilot-logo">
        <div class="logo-squares">
            <div class="square red"></div>
            <div class="square yellow"></div>
            <div class="square green"></div>
            <div class="square blue"></div>
        </div>
    </div>
</div>"#;

const USER_AVATAR: &str = r#"<div class="message-avatar"><div class="user-avatar"><i class="fas fa-user"></i></div></div>"#;

/// Sidebar contents
pub fn conversation_list_html(list: &ConversationListView) -> String {
    if list.is_empty() {
        return format!(r#"<div class="conversation-empty">{}</div>"#, EMPTY_LIST_TEXT);
    }

    list.items
        .iter()
        .map(|item| {
            let id = escape_html(&item.id);
            format!(
                r#"<div class="conversation-item{active}" data-chat-id="{id}">
    <div class="conversation-title">{title}</div>
    <div class="conversation-preview">{preview}</div>
    <div class="conversation-time">{time}</div>
    <button class="conversation-delete-btn" data-delete-id="{id}" title="Delete conversation">
        <i class="fas fa-trash"></i>
    </button>
</div>"#,
                active = if item.active { " active" } else { "" },
                id = id,
                title = escape_html(&item.title),
                preview = escape_html(&item.preview),
                time = escape_html(&item.time_label),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn turn_html(turn: &TurnView) -> String {
    match turn.role {
        Role::User => format!(
            r#"<div class="message user-message">
    <div class="message-content">
        <div class="message-text">{html}</div>
        <div class="message-time">{time}</div>
    </div>
    {avatar}
</div>"#,
            html = turn.html,
            time = escape_html(&turn.time_label),
            avatar = USER_AVATAR,
        ),
        Role::Assistant => format!(
            r#"<div class="message assistant-message{error}">
    {avatar}
    <div class="message-content">
        <div class="message-text">{html}</div>
        <div class="message-actions">
            <button class="message-speak-btn" data-speak-index="{index}" title="Read this message aloud">
                <i class="fas fa-volume-up"></i>
            </button>
            <div class="message-time">{time}</div>
        </div>
    </div>
</div>"#,
            error = if turn.is_error { " error" } else { "" },
            avatar = COPILOT_AVATAR,
            html = turn.html,
            index = turn.index,
            time = escape_html(&turn.time_label),
        ),
    }
}

/// Placeholder shown while a completion is outstanding
pub fn typing_indicator_html() -> String {
    format!(
        r#"<div class="message assistant-message typing">
    {}
    <div class="message-content">
        <div class="typing-indicator">
            <span>Copilot is thinking</span>
            <div class="typing-dots">
                <div class="typing-dot"></div>
                <div class="typing-dot"></div>
                <div class="typing-dot"></div>
            </div>
        </div>
    </div>
</div>"#,
        COPILOT_AVATAR
    )
}

/// The active conversation, oldest turn first
pub fn message_log_html(log: &MessageLogView) -> String {
    let mut html = format!(
        r#"<div class="chat-messages" id="chatMessages" data-chat-id="{}">"#,
        escape_html(&log.conversation_id)
    );
    for turn in &log.turns {
        html.push_str(&turn_html(turn));
    }
    if log.typing {
        html.push_str(&typing_indicator_html());
    }
    html.push_str("</div>");
    html
}

/// Shown when no conversation is selected
pub fn welcome_html() -> String {
    r#"<div class="welcome-section">
    <h1 class="welcome-title">Welcome. I am WindowsFlowAgent.</h1>
    <div class="welcome-description">
        <p>I can help you with automating tasks such as:</p>
        <ul class="capability-list">
            <li>Playing videos on Amazon Prime, YouTube, or Netflix.</li>
            <li>Opening Outlook and navigating buttons.</li>
            <li>Clicking icons and automating workflows.</li>
        </ul>
        <p class="welcome-cta">Just tell me what you'd like me to do!</p>
    </div>
</div>"#
        .to_string()
}

/// Icon markup for a toggle button
pub fn button_icon_html(button: &ButtonView) -> String {
    format!(r#"<i class="{}"></i>"#, button.icon)
}
