//! Pure rendering of board payloads.
//!
//! `render` is a stateless function of (message, endorsement count,
//! optional referenced message); the gateway turns the resulting payloads
//! into whatever the platform calls an embed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gateway::ChatMessage;

/// Accent color for the original-message payload.
pub const ORIGINAL_COLOR: u32 = 0xFDD835;
/// Accent color marking the referenced-message payload.
pub const REFERENCE_COLOR: u32 = 0xE3E5E8;

/// One display unit posted to the board channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayPayload {
    pub color: u32,
    pub timestamp: DateTime<Utc>,
    pub author_name: String,
    pub thumbnail_url: String,
    pub title: String,
    pub url: String,
    pub body: String,
    pub footer: String,
    pub image_url: Option<String>,
}

fn payload_for(message: &ChatMessage, footer: String, color: u32) -> DisplayPayload {
    DisplayPayload {
        color,
        timestamp: message.edited_at.unwrap_or(message.created_at),
        author_name: message.author.display_name.clone(),
        thumbnail_url: message.author.avatar_url.clone(),
        title: "Jump to Message".to_string(),
        url: message.jump_url.clone(),
        body: message.content.trim().to_string(),
        footer,
        image_url: message.attachment_url.clone(),
    }
}

/// Render the board copy for `message`. When the original replies to
/// another message, a payload summarizing the referenced message comes
/// first, visually marked by its own color and footer.
pub fn render(
    message: &ChatMessage,
    endorsement_count: u16,
    emoji: &str,
    referenced: Option<&ChatMessage>,
) -> Vec<DisplayPayload> {
    let mut payloads = Vec::with_capacity(2);
    if let Some(referenced) = referenced {
        payloads.push(payload_for(
            referenced,
            "Original Message".to_string(),
            REFERENCE_COLOR,
        ));
    }
    payloads.push(payload_for(
        message,
        format!("{} {}", endorsement_count, emoji),
        ORIGINAL_COLOR,
    ));
    payloads
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ChatAuthor;
    use chrono::TimeZone;

    fn message(id: i64) -> ChatMessage {
        ChatMessage {
            id,
            channel_id: 10,
            author: ChatAuthor {
                id: 77,
                display_name: "pom".to_string(),
                avatar_url: "https://cdn.example/avatars/pom.png".to_string(),
            },
            content: "  hello starboard  ".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            edited_at: None,
            jump_url: format!("https://chat.example/channels/1/10/{}", id),
            attachment_url: None,
            replies_to: None,
        }
    }

    #[test]
    fn single_payload_for_plain_message() {
        let payloads = render(&message(1), 3, "⭐", None);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].footer, "3 ⭐");
        assert_eq!(payloads[0].color, ORIGINAL_COLOR);
        assert_eq!(payloads[0].body, "hello starboard");
        assert_eq!(payloads[0].title, "Jump to Message");
    }

    #[test]
    fn referenced_message_renders_first() {
        let mut referenced = message(2);
        referenced.content = "the message being replied to".to_string();
        let payloads = render(&message(1), 5, "⭐", Some(&referenced));
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].footer, "Original Message");
        assert_eq!(payloads[0].color, REFERENCE_COLOR);
        assert_eq!(payloads[0].body, "the message being replied to");
        assert_eq!(payloads[1].footer, "5 ⭐");
    }

    #[test]
    fn edit_time_preferred_over_creation_time() {
        let mut edited = message(1);
        edited.edited_at = Some(Utc.with_ymd_and_hms(2024, 3, 2, 8, 30, 0).unwrap());
        let payloads = render(&edited, 4, "⭐", None);
        assert_eq!(payloads[0].timestamp, edited.edited_at.unwrap());

        let plain = message(1);
        let payloads = render(&plain, 4, "⭐", None);
        assert_eq!(payloads[0].timestamp, plain.created_at);
    }

    #[test]
    fn first_attachment_becomes_preview_image() {
        let mut with_image = message(1);
        with_image.attachment_url = Some("https://cdn.example/a.png".to_string());
        let payloads = render(&with_image, 3, "⭐", None);
        assert_eq!(payloads[0].image_url.as_deref(), Some("https://cdn.example/a.png"));
    }
}
