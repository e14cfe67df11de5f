//! Pure display views over an ordered message list.
//!
//! This module contains:
//! - Calendar-day grouping with relative labels (Today, Yesterday, weekday)
//! - Thread resolution (top-level messages with their ordered replies)
//! - Compact timestamp labels for chat-list rows
//!
//! Everything here is a pure function over a message slice; nothing touches
//! the cache or the store.

use chrono::{DateTime, Datelike, Duration, Locale, NaiveDate, TimeZone, Utc};

use crate::message::Message;

/// One date bucket of messages, in display order.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageGroup {
    pub label: String,
    pub messages: Vec<Message>,
}

/// A top-level message and the replies pointing at it.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageThread {
    pub root: Message,
    pub replies: Vec<Message>,
}

/// Bucket messages into labeled calendar-day groups.
///
/// Labels are relative to now: `Today`, `Yesterday`, the weekday name for
/// dates within the last seven days that fall in the current or previous
/// Monday-start week, and a localized long-form date otherwise. Groups keep
/// the chronological order of their first message.
pub fn group_by_date(messages: &[Message], locale: Locale) -> Vec<MessageGroup> {
    group_by_date_at(messages, locale, Utc::now())
}

/// [`group_by_date`] with an explicit reference time.
pub fn group_by_date_at(
    messages: &[Message],
    locale: Locale,
    now: DateTime<Utc>,
) -> Vec<MessageGroup> {
    let today = now.date_naive();
    let mut groups: Vec<MessageGroup> = Vec::new();

    for message in messages {
        let label = date_label(message_date(message), today, locale);
        match groups.iter_mut().find(|group| group.label == label) {
            Some(group) => group.messages.push(message.clone()),
            None => groups.push(MessageGroup {
                label,
                messages: vec![message.clone()],
            }),
        }
    }

    groups
}

/// Partition messages into top-level threads.
///
/// Replies keep their chronological order under their root. A reply whose
/// parent is absent (e.g. deleted mid-cascade) belongs to no thread.
pub fn resolve_thread(messages: &[Message]) -> Vec<MessageThread> {
    let mut threads: Vec<MessageThread> = messages
        .iter()
        .filter(|message| !message.is_reply())
        .map(|message| MessageThread {
            root: message.clone(),
            replies: Vec::new(),
        })
        .collect();

    for message in messages {
        let Some(parent_id) = message.reply_to.as_deref() else {
            continue;
        };
        if let Some(thread) = threads.iter_mut().find(|t| t.root.id == parent_id) {
            thread.replies.push(message.clone());
        }
    }

    threads
}

/// Compact label for chat-list rows: time of day for today, `Yesterday`,
/// weekday within the current window, short date otherwise.
pub fn format_timestamp(timestamp: u64, locale: Locale) -> String {
    format_timestamp_at(timestamp, locale, Utc::now())
}

/// [`format_timestamp`] with an explicit reference time.
pub fn format_timestamp_at(timestamp: u64, locale: Locale, now: DateTime<Utc>) -> String {
    let Some(datetime) = Utc.timestamp_millis_opt(timestamp as i64).single() else {
        return String::new();
    };
    let date = datetime.date_naive();
    let today = now.date_naive();

    if date == today {
        return datetime.format("%H:%M").to_string();
    }
    if date == today - Duration::days(1) {
        return "Yesterday".to_string();
    }
    if in_weekday_window(date, today) {
        return date.format_localized("%A", locale).to_string();
    }
    date.format_localized("%-d %b %Y", locale).to_string()
}

fn message_date(message: &Message) -> NaiveDate {
    Utc.timestamp_millis_opt(message.timestamp as i64)
        .single()
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}

fn date_label(date: NaiveDate, today: NaiveDate, locale: Locale) -> String {
    if date == today {
        return "Today".to_string();
    }
    if date == today - Duration::days(1) {
        return "Yesterday".to_string();
    }
    if in_weekday_window(date, today) {
        return date.format_localized("%A", locale).to_string();
    }
    date.format_localized("%-d %B %Y", locale).to_string()
}

/// Within the last seven days, restricted to the current or previous
/// Monday-start calendar week.
fn in_weekday_window(date: NaiveDate, today: NaiveDate) -> bool {
    let days_ago = (today - date).num_days();
    if !(0..7).contains(&days_ago) {
        return false;
    }
    let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    date >= monday - Duration::days(7)
}
