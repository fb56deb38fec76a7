use std::fmt::Write;

use jointly_db::models::{EventRow, MessageRow};

const ANONYMOUS: &str = "Anonymous";

/// Plain-text transcript of an event's messages, oldest first.
///
/// Output depends only on the inputs: the same messages in any order
/// render to the same bytes.
pub fn render_transcript(event: &EventRow, messages: &[MessageRow]) -> String {
    let mut ordered: Vec<&MessageRow> = messages.iter().collect();
    ordered.sort_by_key(|m| (m.created_at, m.id));

    let heavy = "=".repeat(80);
    let light = "-".repeat(80);
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "Event: {}", event.title);
    let _ = writeln!(out, "Date: {}", event.event_date.format("%d %B %Y, %H:%M"));
    let _ = writeln!(out, "Location: {}", event.location);
    let _ = writeln!(out);
    let _ = writeln!(out, "{heavy}");
    let _ = writeln!(out, "MESSAGES (Total: {})", ordered.len());
    let _ = writeln!(out, "{heavy}");
    let _ = writeln!(out);

    for (i, message) in ordered.iter().enumerate() {
        let _ = writeln!(out, "[{}] {}", i + 1, message.created_at.format("%d %b %Y, %H:%M"));
        let _ = writeln!(out, "From: {}", message.sender_name.as_deref().unwrap_or(ANONYMOUS));
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", message.body);
        let _ = writeln!(out);
        let _ = writeln!(out, "{light}");
        let _ = writeln!(out);
    }

    out
}
