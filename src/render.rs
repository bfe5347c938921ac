// src/render.rs

//! Markdown rendering of documents and alerts for the delivery channel.

use chrono::{DateTime, SecondsFormat};

use crate::models::{Document, DocumentDiff, DocumentType};

fn type_emoji(kind: DocumentType) -> &'static str {
    match kind {
        DocumentType::Story => "📖",
        DocumentType::Comment => "💬",
        DocumentType::Job => "💼",
        DocumentType::Poll => "📊",
        DocumentType::PollOpt => "🔘",
    }
}

fn format_time(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| secs.to_string())
}

/// Lines describing one document, optionally numbered for list output.
pub fn view_lines(doc: &Document, counter: Option<usize>) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(counter) = counter {
        let emoji = type_emoji(doc.kind);
        lines.push(format!(
            "🗳️ #{counter} - *{emoji} {} {emoji}*",
            doc.kind.label()
        ));
    }
    if let Some(title) = &doc.title {
        lines.push(format!("📝 *Title:* {title}"));
    }
    if let Some(url) = &doc.url {
        lines.push(format!("🔗 *URL:* {url}"));
    }
    lines.push(format!("🆔 *ID:* [{}]({})", doc.id, doc.item_url()));
    lines.push(format!("👤 *Author:* [{}]({})", doc.by, doc.author_url()));
    lines.push(format!("🕒 *Posted at:* {}", format_time(doc.time)));

    if let Some(score) = doc.score {
        lines.push(format!("⭐️ *Score:* {score}"));
    }
    if let Some(descendants) = doc.descendants {
        lines.push(format!("💬 *Comments:* {descendants}"));
    }

    lines
}

/// Rendered document view as one message body.
pub fn view_text(doc: &Document, counter: Option<usize>) -> String {
    view_lines(doc, counter).join("\n")
}

/// Lines announcing a change, one row per changed metric.
pub fn alert_lines(doc: &Document, diff: &DocumentDiff) -> Vec<String> {
    let mut lines = vec![format!(
        "🚨 [{}]({}) has been updated.🚨\n",
        doc.id,
        doc.item_url()
    )];

    let emoji = type_emoji(doc.kind);
    lines.push(format!("{emoji} *Type*: {}", doc.kind.label()));
    if let Some(title) = &doc.title {
        lines.push(format!("📝 *Title:* {title}"));
    }

    lines.push("------------------------------".to_string());

    if let (Some(prev), Some(next), Some(delta)) =
        (diff.score_prev, diff.score_next, diff.score_delta)
    {
        lines.push(format!("⭐️ *Score:* {prev} # {next} -> *{delta}*"));
    }
    if let (Some(prev), Some(next), Some(delta)) = (
        diff.descendants_prev,
        diff.descendants_next,
        diff.descendants_delta,
    ) {
        lines.push(format!("💬 *Comments:* {prev} # {next} -> *{delta}*"));
    }

    lines
}

/// Rendered alert as one message body.
pub fn alert_text(doc: &Document, diff: &DocumentDiff) -> String {
    alert_lines(doc, diff).join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story() -> Document {
        Document {
            id: 8863,
            kind: DocumentType::Story,
            by: "dhouston".into(),
            time: 1_175_714_200,
            title: Some("My YC app: Dropbox".into()),
            url: Some("http://www.getdropbox.com".into()),
            text: None,
            score: Some(104),
            descendants: Some(71),
            parent: None,
            poll: None,
            kids: None,
            parts: None,
            deleted: None,
            dead: None,
        }
    }

    #[test]
    fn test_view_contains_core_fields() {
        let text = view_text(&story(), None);
        assert!(text.contains("*Title:* My YC app: Dropbox"));
        assert!(text.contains("news.ycombinator.com/item?id=8863"));
        assert!(text.contains("*Score:* 104"));
        assert!(text.contains("*Comments:* 71"));
        assert!(!text.contains("#1"));
    }

    #[test]
    fn test_view_counter_line() {
        let lines = view_lines(&story(), Some(3));
        assert!(lines[0].contains("#3"));
        assert!(lines[0].contains("Story"));
    }

    #[test]
    fn test_view_omits_absent_fields() {
        let mut doc = story();
        doc.title = None;
        doc.url = None;
        doc.score = None;
        let text = view_text(&doc, None);
        assert!(!text.contains("*Title:*"));
        assert!(!text.contains("*URL:*"));
        assert!(!text.contains("*Score:*"));
    }

    #[test]
    fn test_alert_renders_only_changed_metrics() {
        let diff = DocumentDiff {
            ts: 0,
            score_prev: Some(10),
            score_next: Some(15),
            score_delta: Some(5),
            ..DocumentDiff::default()
        };
        let text = alert_text(&story(), &diff);
        assert!(text.contains("has been updated"));
        assert!(text.contains("*Score:* 10 # 15 -> *5*"));
        assert!(!text.contains("*Comments:* "));
    }
}
