use std::time::Duration;

use parley_storage::DocumentId;
use url::Url;

use crate::display::playback_label;
use crate::message::VoiceMessage;

/// Audio output for one voice note.
pub trait VoicePlayer {
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn seek(&mut self, position: Duration);
    fn position(&self) -> Duration;
    fn duration(&self) -> Duration;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing(DocumentId),
    Paused(DocumentId),
}

impl PlaybackState {
    pub fn message_id(&self) -> Option<DocumentId> {
        match self {
            Self::Idle => None,
            Self::Playing(id) | Self::Paused(id) => Some(*id),
        }
    }
}

struct ActivePlayer<P> {
    message_id: DocumentId,
    player: P,
    playing: bool,
}

/// Owner of the single voice note that may be playing at a time.
///
/// Starting another note stops the current one. Dropping the session stops playback.
pub struct PlaybackSession<P: VoicePlayer> {
    active: Option<ActivePlayer<P>>,
}

impl<P: VoicePlayer> Default for PlaybackSession<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: VoicePlayer> PlaybackSession<P> {
    pub fn new() -> Self {
        Self { active: None }
    }

    pub fn state(&self) -> PlaybackState {
        match &self.active {
            None => PlaybackState::Idle,
            Some(active) if active.playing => PlaybackState::Playing(active.message_id),
            Some(active) => PlaybackState::Paused(active.message_id),
        }
    }

    /// Play/pause control for `message`.
    ///
    /// Pauses or resumes when `message` already owns the session. Otherwise opens a
    /// player through `open`; on success the previous player is stopped and replaced,
    /// on failure the session is left as it was.
    pub fn toggle<F, E>(&mut self, message: &VoiceMessage, open: F) -> Result<PlaybackState, E>
    where
        F: FnOnce(&Url) -> Result<P, E>,
    {
        if let Some(active) = self
            .active
            .as_mut()
            .filter(|active| active.message_id == message.id)
        {
            if active.playing {
                active.player.pause();
            } else {
                active.player.play();
            }
            active.playing = !active.playing;
            return Ok(self.state());
        }

        let mut player = open(&message.voice_url)?;
        self.stop();
        player.play();
        tracing::debug!(id = %message.id, "started voice note playback");
        self.active = Some(ActivePlayer {
            message_id: message.id,
            player,
            playing: true,
        });
        Ok(self.state())
    }

    /// Player reached the end of `message_id`; ignored for any other note.
    pub fn finished(&mut self, message_id: DocumentId) {
        if self
            .active
            .as_ref()
            .is_some_and(|active| active.message_id == message_id)
        {
            self.stop();
        }
    }

    pub fn stop(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.player.stop();
            tracing::debug!(id = %active.message_id, "stopped voice note playback");
        }
    }

    /// Seeks the active note. Positions past the end clamp to its duration.
    pub fn seek(&mut self, message_id: DocumentId, position: Duration) -> bool {
        match self
            .active
            .as_mut()
            .filter(|active| active.message_id == message_id)
        {
            Some(active) => {
                let target = position.min(active.player.duration());
                active.player.seek(target);
                true
            }
            None => false,
        }
    }

    pub fn position_label(&self, message_id: DocumentId) -> Option<String> {
        self.player_for(message_id)
            .map(|player| playback_label(player.position()))
    }

    pub fn duration_label(&self, message_id: DocumentId) -> Option<String> {
        self.player_for(message_id)
            .map(|player| playback_label(player.duration()))
    }

    fn player_for(&self, message_id: DocumentId) -> Option<&P> {
        self.active
            .as_ref()
            .filter(|active| active.message_id == message_id)
            .map(|active| &active.player)
    }
}

impl<P: VoicePlayer> Drop for PlaybackSession<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::Utc;

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    struct FakePlayer {
        name: String,
        log: Log,
        position: Duration,
        duration: Duration,
    }

    impl FakePlayer {
        fn record(&self, action: &str) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{action} {}", self.name));
        }
    }

    impl VoicePlayer for FakePlayer {
        fn play(&mut self) {
            self.record("play");
        }

        fn pause(&mut self) {
            self.record("pause");
        }

        fn stop(&mut self) {
            self.record("stop");
        }

        fn seek(&mut self, position: Duration) {
            self.position = position;
        }

        fn position(&self) -> Duration {
            self.position
        }

        fn duration(&self) -> Duration {
            self.duration
        }
    }

    fn note(name: &str) -> VoiceMessage {
        VoiceMessage {
            id: DocumentId::new_v7(),
            voice_url: Url::parse(&format!("https://blobs.example/{name}.m4a")).unwrap(),
            sent_at: Utc::now(),
        }
    }

    fn opener(log: &Log) -> impl FnOnce(&Url) -> Result<FakePlayer, String> + '_ {
        move |url: &Url| {
            Ok(FakePlayer {
                name: url.path().trim_start_matches('/').to_string(),
                log: log.clone(),
                position: Duration::ZERO,
                duration: Duration::from_secs(95),
            })
        }
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn toggle_starts_pauses_and_resumes_one_note() {
        let log = Log::default();
        let first = note("a");
        let mut session = PlaybackSession::new();

        assert_eq!(
            session.toggle(&first, opener(&log)),
            Ok(PlaybackState::Playing(first.id))
        );
        assert_eq!(
            session.toggle(&first, opener(&log)),
            Ok(PlaybackState::Paused(first.id))
        );
        assert_eq!(
            session.toggle(&first, opener(&log)),
            Ok(PlaybackState::Playing(first.id))
        );
        assert_eq!(entries(&log), vec!["play a.m4a", "pause a.m4a", "play a.m4a"]);
    }

    #[test]
    fn starting_another_note_stops_the_current_one() {
        let log = Log::default();
        let first = note("a");
        let second = note("b");
        let mut session = PlaybackSession::new();

        session.toggle(&first, opener(&log)).unwrap();
        let state = session.toggle(&second, opener(&log)).unwrap();

        assert_eq!(state, PlaybackState::Playing(second.id));
        assert_eq!(entries(&log), vec!["play a.m4a", "stop a.m4a", "play b.m4a"]);
        assert_eq!(session.position_label(first.id), None);
    }

    #[test]
    fn failed_open_keeps_the_current_note() {
        let log = Log::default();
        let first = note("a");
        let mut session = PlaybackSession::new();
        session.toggle(&first, opener(&log)).unwrap();

        let result = session.toggle(&note("b"), |_: &Url| Err("unreadable".to_string()));

        assert_eq!(result, Err("unreadable".to_string()));
        assert_eq!(session.state(), PlaybackState::Playing(first.id));
    }

    #[test]
    fn finished_only_resets_the_matching_note() {
        let log = Log::default();
        let first = note("a");
        let mut session = PlaybackSession::new();
        session.toggle(&first, opener(&log)).unwrap();

        session.finished(DocumentId::new_v7());
        assert_eq!(session.state(), PlaybackState::Playing(first.id));

        session.finished(first.id);
        assert_eq!(session.state(), PlaybackState::Idle);
    }

    #[test]
    fn seek_clamps_and_labels_follow_the_player() {
        let log = Log::default();
        let first = note("a");
        let mut session = PlaybackSession::new();
        session.toggle(&first, opener(&log)).unwrap();

        assert!(session.seek(first.id, Duration::from_secs(61)));
        assert_eq!(session.position_label(first.id).as_deref(), Some("01:01"));
        assert!(session.seek(first.id, Duration::from_secs(500)));
        assert_eq!(session.position_label(first.id).as_deref(), Some("01:35"));
        assert_eq!(session.duration_label(first.id).as_deref(), Some("01:35"));
        assert!(!session.seek(DocumentId::new_v7(), Duration::ZERO));
    }

    #[test]
    fn dropping_the_session_stops_playback() {
        let log = Log::default();
        let mut session = PlaybackSession::new();
        session.toggle(&note("a"), opener(&log)).unwrap();

        drop(session);
        assert_eq!(entries(&log), vec!["play a.m4a", "stop a.m4a"]);
    }
}
