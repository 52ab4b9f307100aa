//! Twilio WhatsApp webhook handler
//!
//! Receives form-encoded message callbacks and answers with TwiML.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use axum::{
    Form,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::api::ApiState;
use crate::conversation::{InboundMessage, Reply};

/// Reply sent when handling fails unexpectedly
pub const GENERIC_FAILURE: &str = "Something went wrong on our side. Please try again.";

/// Fallback media type when the provider omits one
const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Handle an incoming Twilio message callback
pub async fn handle_message(
    State(state): State<Arc<ApiState>>,
    Form(fields): Form<HashMap<String, String>>,
) -> Response {
    let Some(message) = parse_message(&fields) else {
        tracing::warn!("Twilio callback without sender");
        return (StatusCode::BAD_REQUEST, "missing From").into_response();
    };

    tracing::info!(
        user = %message.sender,
        message_id = %message.message_id,
        media = message.media_count,
        "WhatsApp message received"
    );

    let reply = match state.dispatcher.handle(&message).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(
                user = %message.sender,
                message_id = %message.message_id,
                error = %e,
                "failed to handle message"
            );
            Reply::text(GENERIC_FAILURE)
        }
    };

    twiml(&reply)
}

/// Normalize Twilio form fields into an inbound message
///
/// Returns `None` when the sender is missing. A missing `MessageSid` gets a
/// locally generated id so derived filenames stay unique.
#[must_use]
pub fn parse_message(fields: &HashMap<String, String>) -> Option<InboundMessage> {
    let sender = fields.get("From").map(|s| s.trim()).filter(|s| !s.is_empty())?;

    let message_id = fields
        .get("MessageSid")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map_or_else(|| format!("local-{}", uuid::Uuid::new_v4()), ToString::to_string);

    let body = fields.get("Body").map_or("", String::as_str);
    let mut message = InboundMessage::new(message_id, sender, body);

    let reported: usize = fields
        .get("NumMedia")
        .and_then(|n| n.trim().parse().ok())
        .unwrap_or(0);

    for i in 0..reported {
        let Some(url) = fields.get(&format!("MediaUrl{i}")) else {
            tracing::warn!(index = i, reported, "media url missing from callback");
            break;
        };
        let content_type = fields
            .get(&format!("MediaContentType{i}"))
            .map_or(DEFAULT_MEDIA_TYPE, String::as_str);
        message = message.with_media(url.as_str(), content_type);
    }
    message.media_count = reported;

    Some(message)
}

/// Render a reply as a TwiML response
#[must_use]
pub fn twiml(reply: &Reply) -> Response {
    (
        [(header::CONTENT_TYPE, "application/xml")],
        render_twiml(reply),
    )
        .into_response()
}

/// TwiML document with one `<Message>` per reply segment
#[must_use]
pub fn render_twiml(reply: &Reply) -> String {
    let mut out = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#);
    for segment in reply.segments() {
        let _ = write!(out, "<Message>{}</Message>", escape_xml(segment));
    }
    out.push_str("</Response>");
    out
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
