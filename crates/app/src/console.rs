use std::collections::HashSet;
use std::path::PathBuf;

use chrono::FixedOffset;
use parley_feed::{Message, clock_label};
use parley_storage::DocumentId;

/// One line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Text(String),
    Voice(PathBuf),
    Offset(i32),
    Quit,
    Invalid(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Self::Text(line.to_string());
        };

        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (rest, ""),
        };
        match name {
            "quit" | "exit" => Self::Quit,
            "voice" if !argument.is_empty() => Self::Voice(PathBuf::from(argument)),
            "voice" => Self::Invalid("usage: /voice <recording path>".to_string()),
            "tz" => match argument.parse::<i32>() {
                Ok(minutes) => Self::Offset(minutes),
                Err(_) => Self::Invalid("usage: /tz <utc offset in minutes>".to_string()),
            },
            other => Self::Invalid(format!("unknown command `/{other}`")),
        }
    }
}

/// Prints each feed message once, in feed order.
pub struct FeedPrinter {
    printed: HashSet<DocumentId>,
    tz: FixedOffset,
}

impl FeedPrinter {
    pub fn new(tz: FixedOffset) -> Self {
        Self {
            printed: HashSet::new(),
            tz,
        }
    }

    pub fn set_time_zone(&mut self, tz: FixedOffset) {
        self.tz = tz;
    }

    pub fn fresh_lines(&mut self, messages: &[Message]) -> Vec<String> {
        messages
            .iter()
            .filter(|message| self.printed.insert(message.id()))
            .map(|message| render(message, &self.tz))
            .collect()
    }
}

fn render(message: &Message, tz: &FixedOffset) -> String {
    let time = clock_label(message.sent_at(), tz);
    match message.voice_url() {
        Some(url) => format!("[{time}] (voice note) {url}"),
        None => format!("[{time}] {}", message.text()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use parley_feed::{TextMessage, VoiceMessage};

    use super::*;

    #[test]
    fn plain_lines_are_text_and_keep_their_spacing() {
        assert_eq!(Command::parse("  hi there "), Command::Text("  hi there ".to_string()));
        assert_eq!(Command::parse(""), Command::Text(String::new()));
    }

    #[test]
    fn slash_commands_are_recognized() {
        assert_eq!(Command::parse("/quit"), Command::Quit);
        assert_eq!(
            Command::parse("/voice  /tmp/take one.m4a "),
            Command::Voice(PathBuf::from("/tmp/take one.m4a"))
        );
        assert_eq!(Command::parse("/tz -300"), Command::Offset(-300));
        assert!(matches!(Command::parse("/voice"), Command::Invalid(_)));
        assert!(matches!(Command::parse("/tz later"), Command::Invalid(_)));
        assert!(matches!(Command::parse("/dance"), Command::Invalid(_)));
    }

    #[test]
    fn printer_emits_each_message_once() {
        let sent_at = Utc.with_ymd_and_hms(2024, 2, 2, 9, 30, 0).unwrap();
        let text = Message::Text(TextMessage {
            id: DocumentId::new_v7(),
            text: "morning".to_string(),
            sent_at,
        });
        let voice = Message::Voice(VoiceMessage {
            id: DocumentId::new_v7(),
            voice_url: "file:///tmp/voice_notes/a.m4a".parse().unwrap(),
            sent_at,
        });
        let mut printer = FeedPrinter::new(FixedOffset::east_opt(3600).unwrap());

        assert_eq!(printer.fresh_lines(&[text.clone()]), vec!["[10:30] morning"]);
        assert_eq!(
            printer.fresh_lines(&[text, voice]),
            vec!["[10:30] (voice note) file:///tmp/voice_notes/a.m4a"]
        );
    }
}
