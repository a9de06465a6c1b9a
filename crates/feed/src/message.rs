use std::collections::HashSet;

use chrono::{DateTime, Utc};
use parley_storage::{Document, DocumentId, NewDocument, Snapshot};
use url::Url;

/// Collection holding chat message documents.
pub const MESSAGES_COLLECTION: &str = "messages";

// Persisted field names; other clients read and write the same documents.
pub const FIELD_MESSAGE: &str = "message";
pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_IS_VOICE_MESSAGE: &str = "isVoiceMessage";
pub const FIELD_VOICE_URL: &str = "voiceURL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub id: DocumentId,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

/// Voice note whose audio is downloadable from `voice_url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceMessage {
    pub id: DocumentId,
    pub voice_url: Url,
    pub sent_at: DateTime<Utc>,
}

/// Canonical chat message, as confirmed by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(TextMessage),
    Voice(VoiceMessage),
}

impl Message {
    pub fn id(&self) -> DocumentId {
        match self {
            Self::Text(message) => message.id,
            Self::Voice(message) => message.id,
        }
    }

    pub fn sent_at(&self) -> DateTime<Utc> {
        match self {
            Self::Text(message) => message.sent_at,
            Self::Voice(message) => message.sent_at,
        }
    }

    /// Message body; always empty for voice notes.
    pub fn text(&self) -> &str {
        match self {
            Self::Text(message) => &message.text,
            Self::Voice(_) => "",
        }
    }

    pub fn is_voice(&self) -> bool {
        matches!(self, Self::Voice(_))
    }

    pub fn voice_url(&self) -> Option<&Url> {
        match self {
            Self::Text(_) => None,
            Self::Voice(message) => Some(&message.voice_url),
        }
    }
}

/// Why a raw document was left out of the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    MissingText,
    MissingTimestamp,
    MissingVoiceFlag,
    MissingVoiceUrl,
    MalformedVoiceUrl,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingText => "missing-text",
            Self::MissingTimestamp => "missing-timestamp",
            Self::MissingVoiceFlag => "missing-voice-flag",
            Self::MissingVoiceUrl => "missing-voice-url",
            Self::MalformedVoiceUrl => "malformed-voice-url",
        }
    }
}

impl TryFrom<&Document> for Message {
    type Error = DropReason;

    fn try_from(document: &Document) -> Result<Self, Self::Error> {
        // Wrong-typed fields count as missing.
        let text = document
            .get_str(FIELD_MESSAGE)
            .ok_or(DropReason::MissingText)?;
        let sent_at = document
            .get_timestamp(FIELD_TIMESTAMP)
            .ok_or(DropReason::MissingTimestamp)?;
        let is_voice = document
            .get_bool(FIELD_IS_VOICE_MESSAGE)
            .ok_or(DropReason::MissingVoiceFlag)?;

        if !is_voice {
            return Ok(Self::Text(TextMessage {
                id: document.id,
                text: text.to_string(),
                sent_at,
            }));
        }

        let raw_url = document
            .get_str(FIELD_VOICE_URL)
            .ok_or(DropReason::MissingVoiceUrl)?;
        let voice_url = Url::parse(raw_url).map_err(|_| DropReason::MalformedVoiceUrl)?;
        Ok(Self::Voice(VoiceMessage {
            id: document.id,
            voice_url,
            sent_at,
        }))
    }
}

/// Validates a snapshot and orders the survivors by timestamp.
///
/// A document id appearing twice keeps its first occurrence. The sort is stable,
/// so equal timestamps keep the store's delivery order.
pub fn messages_from_snapshot(snapshot: &Snapshot) -> Vec<Message> {
    let mut seen = HashSet::new();
    let mut messages = snapshot
        .documents
        .iter()
        .filter(|document| seen.insert(document.id))
        .filter_map(|document| match Message::try_from(document) {
            Ok(message) => Some(message),
            Err(reason) => {
                tracing::debug!(
                    id = %document.id,
                    reason = reason.as_str(),
                    "dropping message document"
                );
                None
            }
        })
        .collect::<Vec<_>>();
    messages.sort_by_key(Message::sent_at);
    messages
}

pub(crate) fn text_document(text: &str) -> NewDocument {
    NewDocument::new()
        .with_field(FIELD_MESSAGE, text)
        .with_server_timestamp(FIELD_TIMESTAMP)
        .with_field(FIELD_IS_VOICE_MESSAGE, false)
}

pub(crate) fn voice_document(reference: &Url) -> NewDocument {
    NewDocument::new()
        .with_field(FIELD_MESSAGE, "")
        .with_server_timestamp(FIELD_TIMESTAMP)
        .with_field(FIELD_IS_VOICE_MESSAGE, true)
        .with_field(FIELD_VOICE_URL, reference.as_str())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use parley_storage::{DocumentFields, FieldValue};

    use super::*;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 1, 10, minute, 0).unwrap()
    }

    fn raw(fields: &[(&str, FieldValue)]) -> Document {
        let fields = fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect::<DocumentFields>();
        Document::new(DocumentId::new_v7(), fields)
    }

    fn text_doc(text: &str, minute: u32) -> Document {
        raw(&[
            (FIELD_MESSAGE, text.into()),
            (FIELD_TIMESTAMP, at(minute).into()),
            (FIELD_IS_VOICE_MESSAGE, false.into()),
        ])
    }

    #[test]
    fn text_document_becomes_text_message() {
        let document = text_doc("hello", 1);
        let message = Message::try_from(&document).unwrap();

        assert_eq!(
            message,
            Message::Text(TextMessage {
                id: document.id,
                text: "hello".to_string(),
                sent_at: at(1),
            })
        );
        assert_eq!(message.voice_url(), None);
    }

    #[test]
    fn voice_document_ignores_its_text_field() {
        let document = raw(&[
            (FIELD_MESSAGE, "".into()),
            (FIELD_TIMESTAMP, at(2).into()),
            (FIELD_IS_VOICE_MESSAGE, true.into()),
            (FIELD_VOICE_URL, "https://blobs.example/voice_notes/a.m4a".into()),
        ]);
        let message = Message::try_from(&document).unwrap();

        assert!(message.is_voice());
        assert_eq!(message.text(), "");
        assert_eq!(
            message.voice_url().map(Url::as_str),
            Some("https://blobs.example/voice_notes/a.m4a")
        );
    }

    #[test]
    fn shape_checks_report_the_first_missing_field() {
        let cases = [
            (
                raw(&[
                    (FIELD_TIMESTAMP, at(1).into()),
                    (FIELD_IS_VOICE_MESSAGE, false.into()),
                ]),
                DropReason::MissingText,
            ),
            (
                raw(&[
                    (FIELD_MESSAGE, "x".into()),
                    (FIELD_IS_VOICE_MESSAGE, false.into()),
                ]),
                DropReason::MissingTimestamp,
            ),
            (
                raw(&[
                    (FIELD_MESSAGE, "x".into()),
                    (FIELD_TIMESTAMP, at(1).into()),
                ]),
                DropReason::MissingVoiceFlag,
            ),
            (
                raw(&[
                    (FIELD_MESSAGE, "".into()),
                    (FIELD_TIMESTAMP, at(1).into()),
                    (FIELD_IS_VOICE_MESSAGE, true.into()),
                ]),
                DropReason::MissingVoiceUrl,
            ),
            (
                raw(&[
                    (FIELD_MESSAGE, "".into()),
                    (FIELD_TIMESTAMP, at(1).into()),
                    (FIELD_IS_VOICE_MESSAGE, true.into()),
                    (FIELD_VOICE_URL, "not a url".into()),
                ]),
                DropReason::MalformedVoiceUrl,
            ),
        ];

        for (document, expected) in cases {
            assert_eq!(Message::try_from(&document), Err(expected));
        }
    }

    #[test]
    fn wrong_typed_fields_are_treated_as_missing() {
        let document = raw(&[
            (FIELD_MESSAGE, "x".into()),
            (FIELD_TIMESTAMP, "2024-04-01T10:00:00Z".into()),
            (FIELD_IS_VOICE_MESSAGE, false.into()),
        ]);
        assert_eq!(
            Message::try_from(&document),
            Err(DropReason::MissingTimestamp)
        );
    }

    #[test]
    fn snapshot_is_filtered_and_sorted_stably() {
        let late = text_doc("late", 9);
        let tie_a = text_doc("tie-a", 5);
        let broken = raw(&[(FIELD_MESSAGE, "orphan".into())]);
        let tie_b = text_doc("tie-b", 5);
        let snapshot = Snapshot {
            collection: MESSAGES_COLLECTION.to_string(),
            documents: vec![late, tie_a, broken, tie_b],
        };

        let texts = messages_from_snapshot(&snapshot)
            .iter()
            .map(|message| message.text().to_string())
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["tie-a", "tie-b", "late"]);
    }

    #[test]
    fn repeated_document_ids_are_published_once() {
        let original = text_doc("once", 3);
        let mut repeat = original.clone();
        repeat.fields.insert(FIELD_MESSAGE.to_string(), "twice".into());
        let snapshot = Snapshot {
            collection: MESSAGES_COLLECTION.to_string(),
            documents: vec![original, repeat],
        };

        let messages = messages_from_snapshot(&snapshot);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text(), "once");
    }

    #[test]
    fn outgoing_text_document_has_no_voice_url() {
        let fields = text_document("hi").resolve(at(0));
        assert_eq!(fields.get(FIELD_VOICE_URL), None);
        assert_eq!(fields.get(FIELD_IS_VOICE_MESSAGE), Some(&FieldValue::Bool(false)));
    }
}
