use std::collections::VecDeque;

use chrono::Utc;

use crate::app::models::LogEntry;

/// Append-only view of the session log, owned by the UI thread.
///
/// Entries keep their arrival order and a strictly increasing sequence number.
/// Memory is bounded: once `capacity` is reached the oldest entry is evicted.
/// Every message also goes through `tracing`, so eviction never loses data.
#[derive(Debug)]
pub struct LogBook {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    next_sequence: u64,
    evicted: u64,
}

impl LogBook {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            next_sequence: 1,
            evicted: 0,
        }
    }

    pub fn append(&mut self, message: impl Into<String>) -> &LogEntry {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
        let entry = LogEntry {
            sequence: self.next_sequence,
            timestamp: Utc::now(),
            message: message.into(),
        };
        self.next_sequence += 1;
        self.entries.push_back(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn tail(&self, count: usize) -> impl Iterator<Item = &LogEntry> {
        let skip = self.entries.len().saturating_sub(count);
        self.entries.iter().skip(skip)
    }
}

pub fn format_entry(entry: &LogEntry) -> String {
    format!(
        "[{}] {}",
        entry.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S"),
        entry.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_arrival_order_with_increasing_sequence() {
        let mut book = LogBook::new(100);
        for index in 0..10 {
            book.append(format!("cycle {index}"));
        }
        let messages = book.entries().map(|e| e.message.clone()).collect::<Vec<_>>();
        assert_eq!(messages.first().map(String::as_str), Some("cycle 0"));
        assert_eq!(messages.last().map(String::as_str), Some("cycle 9"));
        let sequences = book.entries().map(|e| e.sequence).collect::<Vec<_>>();
        assert!(sequences.windows(2).all(|pair| pair[1] == pair[0] + 1));
        assert!(book
            .entries()
            .collect::<Vec<_>>()
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp));
    }

    #[test]
    fn evicts_only_from_the_oldest_end() {
        let mut book = LogBook::new(3);
        for index in 0..5 {
            book.append(format!("m{index}"));
        }
        assert_eq!(book.len(), 3);
        assert_eq!(book.evicted(), 2);
        let messages = book.entries().map(|e| e.message.as_str()).collect::<Vec<_>>();
        assert_eq!(messages, vec!["m2", "m3", "m4"]);
        assert_eq!(book.entries().next().map(|e| e.sequence), Some(3));
    }

    #[test]
    fn tail_returns_latest_entries_in_order() {
        let mut book = LogBook::new(10);
        assert!(book.is_empty());
        for index in 0..4 {
            book.append(format!("m{index}"));
        }
        let tail = book.tail(2).map(|e| e.message.as_str()).collect::<Vec<_>>();
        assert_eq!(tail, vec!["m2", "m3"]);
        assert_eq!(book.tail(50).count(), 4);
    }

    #[test]
    fn formats_with_time_prefix() {
        let mut book = LogBook::new(2);
        let line = format_entry(book.append("hello"));
        assert!(line.starts_with('['));
        assert!(line.ends_with("] hello"));
    }
}
