//! Derives the visual grouping of a message list: date separators, bubble
//! grouping, and which entries carry an inline timestamp. Pure projection of
//! an already-reconciled list; it never mutates messages.

use chrono::{Datelike, TimeZone};

use crate::state::ChatMessage;

/// Two consecutive messages from the same sender stay in one group only when
/// they are at most this many seconds apart.
const GROUP_GAP_SECS: i64 = 300;

#[derive(uniffi::Enum, Debug, Clone, PartialEq)]
pub enum TimelineItem {
    /// Inserted before the first message of each calendar day, in the
    /// device's local time zone.
    DateSeparator { year: i32, month: u32, day: u32 },
    Entry {
        message: ChatMessage,
        /// First message of its group; the UI renders the sender header here.
        starts_group: bool,
        /// Last message of its group; the UI renders the timestamp here.
        show_timestamp: bool,
    },
}

/// Projects a conversation's messages into renderable timeline items.
#[uniffi::export]
pub fn project_timeline(messages: Vec<ChatMessage>) -> Vec<TimelineItem> {
    project_timeline_in(messages, &chrono::Local)
}

fn civil_date<Tz: TimeZone>(timestamp: i64, tz: &Tz) -> (i32, u32, u32) {
    match tz.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => {
            (dt.year(), dt.month(), dt.day())
        }
        // Out-of-range or DST-skipped instant; pin to the epoch day rather
        // than dropping the message.
        chrono::LocalResult::None => (1970, 1, 1),
    }
}

fn project_timeline_in<Tz: TimeZone>(messages: Vec<ChatMessage>, tz: &Tz) -> Vec<TimelineItem> {
    let mut items = Vec::with_capacity(messages.len());
    let mut prev: Option<(String, i64, (i32, u32, u32))> = None;

    for (idx, message) in messages.iter().enumerate() {
        let date = civil_date(message.timestamp, tz);
        let starts_group = match &prev {
            None => true,
            Some((sender, ts, prev_date)) => {
                *sender != message.sender_id
                    || message.timestamp - ts > GROUP_GAP_SECS
                    || *prev_date != date
            }
        };

        if prev.as_ref().map(|(_, _, d)| *d) != Some(date) {
            let (year, month, day) = date;
            items.push(TimelineItem::DateSeparator { year, month, day });
        }

        // Whether the next message continues this group decides the inline
        // timestamp; the last message overall always shows one.
        let show_timestamp = match messages.get(idx + 1) {
            None => true,
            Some(next) => {
                next.sender_id != message.sender_id
                    || next.timestamp - message.timestamp > GROUP_GAP_SECS
                    || civil_date(next.timestamp, tz) != date
            }
        };

        prev = Some((message.sender_id.clone(), message.timestamp, date));
        items.push(TimelineItem::Entry {
            message: message.clone(),
            starts_group,
            show_timestamp,
        });
    }

    items
}
