//! Gmail API client for listing and reading labeled messages.

use chrono::{DateTime, FixedOffset, Local, Utc};
use google_gmail1::api::{Message, MessagePart, Scope};
use html2text::render::text_renderer::TrivialDecorator;
use payment_types::MailMessage;

use crate::auth::{GmailHub, Session};
use crate::error::{PollerError, PollerResult};
use crate::fetcher::{MailProvider, MessagePage};

/// Largest page Gmail will return for a message listing
const PAGE_SIZE: u32 = 500;

/// Client for interacting with Gmail API
pub struct GmailClient {
    hub: GmailHub,
}

impl GmailClient {
    pub fn new(session: Session) -> Self {
        Self {
            hub: session.into_hub(),
        }
    }

    fn parse_message(message: Message) -> MailMessage {
        let id = message.id.clone().unwrap_or_default();
        let date = Self::message_date(&message);

        let (body_text, body_html) = Self::extract_bodies(&message);
        let body = body_text
            .or_else(|| body_html.map(|html| html_to_text(&html)))
            .filter(|b| !b.trim().is_empty())
            .or_else(|| message.snippet.clone())
            .unwrap_or_default();

        MailMessage { id, body, date }
    }

    /// `Date` header first, then Gmail's receive time
    fn message_date(message: &Message) -> Option<DateTime<FixedOffset>> {
        let header_date = message
            .payload
            .as_ref()
            .and_then(|p| p.headers.as_ref())
            .and_then(|headers| {
                headers
                    .iter()
                    .find(|h| h.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case("date")))
            })
            .and_then(|h| h.value.as_deref())
            .and_then(Self::parse_date);

        header_date.or_else(|| {
            message
                .internal_date
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(|utc| utc.with_timezone(&Local).fixed_offset())
        })
    }

    fn parse_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
        // Some senders append a zone comment like "(UTC)"
        let trimmed = match date_str.find(" (") {
            Some(idx) => &date_str[..idx],
            None => date_str,
        };
        DateTime::parse_from_rfc2822(trimmed.trim()).ok()
    }

    fn extract_bodies(message: &Message) -> (Option<String>, Option<String>) {
        let payload = match message.payload.as_ref() {
            Some(p) => p,
            None => return (None, None),
        };

        let mut text_body = None;
        let mut html_body = None;

        if let Some(parts) = &payload.parts {
            Self::extract_bodies_from_parts(parts, &mut text_body, &mut html_body);
        }

        if text_body.is_none() && html_body.is_none() {
            if let Some(decoded) = Self::part_text(payload) {
                match payload.mime_type.as_deref() {
                    Some("text/html") => html_body = Some(decoded),
                    _ => text_body = Some(decoded),
                }
            }
        }

        (text_body, html_body)
    }

    fn extract_bodies_from_parts(
        parts: &[MessagePart],
        text_body: &mut Option<String>,
        html_body: &mut Option<String>,
    ) {
        for part in parts {
            match part.mime_type.as_deref() {
                Some("text/plain") if text_body.is_none() => {
                    *text_body = Self::part_text(part);
                }
                Some("text/html") if html_body.is_none() => {
                    *html_body = Self::part_text(part);
                }
                Some(mime) if mime.starts_with("multipart/") => {
                    if let Some(nested_parts) = &part.parts {
                        Self::extract_bodies_from_parts(nested_parts, text_body, html_body);
                    }
                }
                _ => {}
            }
        }
    }

    fn part_text(part: &MessagePart) -> Option<String> {
        let data = part.body.as_ref()?.data.as_ref()?;
        String::from_utf8(data.clone()).ok()
    }
}

/// Wide enough that a notification sentence is never wrapped mid-name
const HTML_WIDTH: usize = 1000;

fn html_to_text(html: &str) -> String {
    let rendered = std::panic::catch_unwind(|| {
        html2text::from_read_with_decorator(html.as_bytes(), HTML_WIDTH, TrivialDecorator::new())
    });
    let Ok(text) = rendered else {
        tracing::warn!("Failed to render HTML body, falling back to snippet");
        return String::new();
    };

    text.lines()
        .map(|line| line.replace('\u{a0}', " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

impl MailProvider for GmailClient {
    async fn resolve_label(&self, name: &str) -> PollerResult<Option<String>> {
        let (_, response) = self
            .hub
            .users()
            .labels_list("me")
            .add_scope(Scope::Readonly)
            .doit()
            .await
            .map_err(|e| PollerError::fetch("list labels", e))?;

        Ok(response
            .labels
            .unwrap_or_default()
            .into_iter()
            .find(|label| {
                label
                    .name
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
            })
            .and_then(|label| label.id))
    }

    async fn list_page(
        &self,
        label_id: &str,
        query: Option<&str>,
        page_token: Option<&str>,
    ) -> PollerResult<MessagePage> {
        let mut call = self
            .hub
            .users()
            .messages_list("me")
            .add_label_ids(label_id)
            .max_results(PAGE_SIZE)
            .add_scope(Scope::Readonly);
        if let Some(q) = query {
            call = call.q(q);
        }
        if let Some(token) = page_token {
            call = call.page_token(token);
        }

        let (_, response) = call
            .doit()
            .await
            .map_err(|e| PollerError::fetch("list messages", e))?;

        Ok(MessagePage {
            ids: response
                .messages
                .unwrap_or_default()
                .into_iter()
                .filter_map(|m| m.id)
                .collect(),
            next_page_token: response.next_page_token,
        })
    }

    async fn get_message(&self, id: &str) -> PollerResult<MailMessage> {
        let (_, message) = self
            .hub
            .users()
            .messages_get("me", id)
            .format("full")
            .add_scope(Scope::Readonly)
            .doit()
            .await
            .map_err(|e| PollerError::fetch(format!("get message {}", id), e))?;

        Ok(Self::parse_message(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use google_gmail1::api::{MessagePartBody, MessagePartHeader};

    fn part(mime: &str, data: &str) -> MessagePart {
        MessagePart {
            mime_type: Some(mime.to_string()),
            body: Some(MessagePartBody {
                data: Some(data.as_bytes().to_vec()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn multipart(parts: Vec<MessagePart>) -> MessagePart {
        MessagePart {
            mime_type: Some("multipart/alternative".to_string()),
            parts: Some(parts),
            ..Default::default()
        }
    }

    fn message(payload: MessagePart) -> Message {
        Message {
            id: Some("18f0a".to_string()),
            snippet: Some("snippet text".to_string()),
            payload: Some(payload),
            ..Default::default()
        }
    }

    #[test]
    fn test_prefers_plain_text_part() {
        let msg = message(multipart(vec![
            part("text/html", "<p>Alice paid you $1.00</p>"),
            part("text/plain", "Alice paid you $20.00"),
        ]));
        let parsed = GmailClient::parse_message(msg);
        assert_eq!(parsed.id, "18f0a");
        assert_eq!(parsed.body, "Alice paid you $20.00");
    }

    #[test]
    fn test_finds_nested_plain_text() {
        let msg = message(MessagePart {
            mime_type: Some("multipart/mixed".to_string()),
            parts: Some(vec![multipart(vec![part("text/plain", "nested")])]),
            ..Default::default()
        });
        assert_eq!(GmailClient::parse_message(msg).body, "nested");
    }

    #[test]
    fn test_single_part_payload_body() {
        let msg = message(part("text/plain", "You paid Bob $15.50"));
        assert_eq!(GmailClient::parse_message(msg).body, "You paid Bob $15.50");
    }

    #[test]
    fn test_html_only_is_flattened() {
        let msg = message(multipart(vec![part(
            "text/html",
            "<html><body><p>Alice&nbsp;Smith paid you <b>$20.00</b></p>\n<p>&quot;Tacos&quot;</p></body></html>",
        )]));
        let body = GmailClient::parse_message(msg).body;
        assert!(body.contains("Alice Smith paid you $20.00"), "{body}");
        assert!(body.contains("\"Tacos\""), "{body}");
    }

    #[test]
    fn test_html_entities_and_links_are_plain_text() {
        let msg = message(multipart(vec![part(
            "text/html",
            "<div><a href=\"https://venmo.com/u/alice\">Alice Smith</a> paid you &#36;20.00</div>\
             <div>&ldquo;Rent &amp; utilities&rdquo;</div>",
        )]));
        let body = GmailClient::parse_message(msg).body;
        assert!(body.contains("Alice Smith paid you $20.00"), "{body}");
        assert!(body.contains("\u{201c}Rent & utilities\u{201d}"), "{body}");
        assert!(!body.contains("venmo.com"), "{body}");
    }

    #[test]
    fn test_falls_back_to_snippet() {
        let msg = message(MessagePart {
            mime_type: Some("multipart/mixed".to_string()),
            parts: Some(vec![]),
            ..Default::default()
        });
        assert_eq!(GmailClient::parse_message(msg).body, "snippet text");
    }

    #[test]
    fn test_date_header_wins_over_internal_date() {
        let mut payload = part("text/plain", "x");
        payload.headers = Some(vec![MessagePartHeader {
            name: Some("Date".to_string()),
            value: Some("Tue, 1 Jul 2025 10:52:37 -0700 (PDT)".to_string()),
        }]);
        let mut msg = message(payload);
        msg.internal_date = Some(0);

        let date = GmailClient::parse_message(msg).date.unwrap();
        assert_eq!(date.to_rfc3339(), "2025-07-01T10:52:37-07:00");
    }

    #[test]
    fn test_internal_date_fallback() {
        let mut msg = message(part("text/plain", "x"));
        msg.internal_date = Some(1_751_392_357_000);

        let date = GmailClient::parse_message(msg).date.unwrap();
        assert_eq!(date.timestamp(), 1_751_392_357);
    }

    #[test]
    fn test_no_date_at_all() {
        let msg = message(part("text/plain", "x"));
        assert!(GmailClient::parse_message(msg).date.is_none());
    }
}
