// src/models/document.rs

//! External document snapshot as returned by the Hacker News item API.

use serde::{Deserialize, Serialize};

/// Kind of an external document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Story,
    Comment,
    Job,
    Poll,
    PollOpt,
}

impl DocumentType {
    /// Human-readable label for message rendering.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::Story => "Story",
            DocumentType::Comment => "Comment",
            DocumentType::Job => "Job",
            DocumentType::Poll => "Poll",
            DocumentType::PollOpt => "Poll Option",
        }
    }
}

/// Snapshot of one Hacker News item.
///
/// The upstream API returns a loosely-shaped record; this is the closed set
/// of fields we track. `id`, `type` and `time` are required on ingest,
/// everything else is optional. Deserialization failure of a payload is a
/// transport fault, not a crash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,

    #[serde(rename = "type")]
    pub kind: DocumentType,

    /// Author username. Absent for deleted items.
    #[serde(default)]
    pub by: String,

    /// Creation time in seconds since the Unix epoch.
    pub time: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,

    /// Total comment count in the item's subtree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descendants: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kids: Option<Vec<i64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<i64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead: Option<bool>,
}

impl Document {
    /// Canonical discussion URL for this item.
    pub fn item_url(&self) -> String {
        format!("https://news.ycombinator.com/item?id={}", self.id)
    }

    /// Profile URL of the author.
    pub fn author_url(&self) -> String {
        format!("https://news.ycombinator.com/user?id={}", self.by)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_story() {
        let json = r#"{
            "by": "dhouston",
            "descendants": 71,
            "id": 8863,
            "kids": [9224, 8917],
            "score": 104,
            "time": 1175714200,
            "title": "My YC app: Dropbox",
            "type": "story",
            "url": "http://www.getdropbox.com/u/2/screencast.html"
        }"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.id, 8863);
        assert_eq!(doc.kind, DocumentType::Story);
        assert_eq!(doc.score, Some(104));
        assert_eq!(doc.descendants, Some(71));
    }

    #[test]
    fn test_deserialize_deleted_item_without_author() {
        let json = r#"{"id": 1, "type": "comment", "time": 1160418111, "deleted": true}"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.by, "");
        assert_eq!(doc.deleted, Some(true));
    }

    #[test]
    fn test_missing_required_fields_is_an_error() {
        // No "time" field
        let json = r#"{"id": 1, "type": "story"}"#;
        assert!(serde_json::from_str::<Document>(json).is_err());
    }

    #[test]
    fn test_pollopt_type_name() {
        let json = r#"{"id": 160705, "type": "pollopt", "time": 1207886576, "score": 335}"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.kind, DocumentType::PollOpt);
        assert_eq!(doc.kind.label(), "Poll Option");
    }
}
