//! Ordered, validated chat message feed over a live document store.

pub mod display;
pub mod error;
pub mod feed;
pub mod message;
pub mod playback;
pub mod voice;

pub use display::{clock_label, playback_label, recording_label};
pub use error::{FeedError, FeedResult};
pub use feed::{FeedEvent, FeedListener, FeedSubscription, FnListener, MessageFeed, SubmitOutcome};
pub use message::{
    DropReason, MESSAGES_COLLECTION, Message, TextMessage, VoiceMessage, messages_from_snapshot,
};
pub use playback::{PlaybackSession, PlaybackState, VoicePlayer};
pub use voice::{SentVoiceNote, VOICE_NOTES_PREFIX, VoiceNoteSender};
