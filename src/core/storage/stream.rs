// src/core/storage/stream.rs

//! The append-only stream type backing `XADD`/`XRANGE`/`XREAD`.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A stream entry ID: a millisecond timestamp paired with a per-millisecond
/// sequence number, ordered first by timestamp, then by sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId {
    pub timestamp_ms: u64,
    pub sequence: u64,
}

impl StreamId {
    pub const MIN: StreamId = StreamId {
        timestamp_ms: 0,
        sequence: 0,
    };
    pub const MAX: StreamId = StreamId {
        timestamp_ms: u64::MAX,
        sequence: u64::MAX,
    };

    pub fn new(timestamp_ms: u64, sequence: u64) -> Self {
        Self {
            timestamp_ms,
            sequence,
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.timestamp_ms, self.sequence)
    }
}

impl FromStr for StreamId {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ms_part, seq_part) = s
            .split_once('-')
            .ok_or("stream IDs must be of the form <ms>-<seq>")?;
        let timestamp_ms = ms_part.parse().map_err(|_| "invalid stream ID timestamp")?;
        let sequence = seq_part.parse().map_err(|_| "invalid stream ID sequence")?;
        Ok(StreamId {
            timestamp_ms,
            sequence,
        })
    }
}

/// How the caller wants a new entry's ID to be assigned, as parsed from the
/// `XADD` ID argument.
#[derive(Debug, Clone, Copy)]
pub enum StreamIdSpec {
    /// `*` — fully server-generated: current time, auto sequence.
    Auto,
    /// `<ms>-*` — caller-pinned timestamp, server-assigned sequence.
    AutoSeq(u64),
    /// `<ms>-<seq>` — fully caller-specified; must be strictly greater than
    /// the stream's current last ID.
    Explicit(StreamId),
}

impl StreamIdSpec {
    pub fn parse(raw: &str) -> Result<Self, &'static str> {
        if raw == "*" {
            return Ok(StreamIdSpec::Auto);
        }
        if let Some(ms_part) = raw.strip_suffix("-*") {
            let ms = ms_part.parse().map_err(|_| "invalid stream ID timestamp")?;
            return Ok(StreamIdSpec::AutoSeq(ms));
        }
        Ok(StreamIdSpec::Explicit(raw.parse()?))
    }
}

/// A per-key `XREAD` starting point, as parsed from its ID argument.
#[derive(Debug, Clone, Copy)]
pub enum XReadFromId {
    /// An explicit `<ms>-<seq>` ID: read entries strictly after it.
    Explicit(StreamId),
    /// The literal `$`: read entries strictly after whatever the stream's
    /// last ID is at the moment the request is made, resolved once before
    /// the read (and before any blocking wait), not re-evaluated on a
    /// blocked wakeup.
    Last,
}

impl XReadFromId {
    pub fn parse(raw: &str) -> Result<Self, &'static str> {
        if raw == "$" {
            return Ok(XReadFromId::Last);
        }
        Ok(XReadFromId::Explicit(raw.parse()?))
    }
}

#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<(Bytes, Bytes)>,
}

/// The two client-visible error strings `XADD` can produce, kept verbatim so
/// clients that match on message text keep working.
pub const ERR_ID_NOT_GREATER_THAN_ZERO: &str =
    "ERR The ID specified in XADD must be greater than 0-0";
pub const ERR_ID_NOT_MONOTONIC: &str =
    "ERR The ID specified in XADD is equal or smaller than the target stream top item";

#[derive(Debug, Default)]
pub struct Stream {
    pub entries: BTreeMap<StreamId, StreamEntry>,
    last_id: StreamId,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_id(&self) -> StreamId {
        self.last_id
    }

    /// Resolves `spec` against the stream's current last ID and `now_ms`,
    /// appends the new entry, and returns its assigned ID.
    ///
    /// ID generation follows three cases:
    /// - `Auto`: `now_ms-0` if `now_ms` is ahead of the last entry's
    ///   timestamp, otherwise the last timestamp with the sequence bumped.
    /// - `AutoSeq(ms)`: sequence starts at 0 for a timestamp not yet seen
    ///   (or `1` when the stream is empty and `ms` is `0`, since `0-0` is
    ///   never a valid ID), otherwise the last sequence bumped.
    /// - `Explicit(id)`: accepted only if strictly greater than the last ID
    ///   and not `0-0`.
    pub fn add_entry(
        &mut self,
        spec: StreamIdSpec,
        fields: Vec<(Bytes, Bytes)>,
        now_ms: u64,
    ) -> Result<StreamId, &'static str> {
        let new_id = match spec {
            StreamIdSpec::Auto => {
                if now_ms > self.last_id.timestamp_ms {
                    StreamId::new(now_ms, 0)
                } else {
                    StreamId::new(self.last_id.timestamp_ms, self.last_id.sequence + 1)
                }
            }
            StreamIdSpec::AutoSeq(ms) => {
                if ms != self.last_id.timestamp_ms {
                    if ms == 0 && self.entries.is_empty() && self.last_id == StreamId::MIN {
                        StreamId::new(0, 1)
                    } else {
                        StreamId::new(ms, 0)
                    }
                } else {
                    StreamId::new(ms, self.last_id.sequence + 1)
                }
            }
            StreamIdSpec::Explicit(id) => {
                if id == StreamId::MIN {
                    return Err(ERR_ID_NOT_GREATER_THAN_ZERO);
                }
                if id <= self.last_id {
                    return Err(ERR_ID_NOT_MONOTONIC);
                }
                id
            }
        };

        self.entries.insert(new_id, StreamEntry { id: new_id, fields });
        self.last_id = new_id;
        Ok(new_id)
    }

    /// Inclusive range query over `[lo, hi]`.
    pub fn range(&self, lo: StreamId, hi: StreamId) -> Vec<StreamEntry> {
        self.entries
            .range(lo..=hi)
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Entries with an ID strictly greater than `after`, for `XREAD`.
    pub fn read_after(&self, after: StreamId) -> Vec<StreamEntry> {
        self.entries
            .range((
                std::ops::Bound::Excluded(after),
                std::ops::Bound::Unbounded,
            ))
            .map(|(_, entry)| entry.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(k: &str, v: &str) -> (Bytes, Bytes) {
        (Bytes::copy_from_slice(k.as_bytes()), Bytes::copy_from_slice(v.as_bytes()))
    }

    #[test]
    fn auto_id_advances_sequence_within_same_millisecond() {
        let mut s = Stream::new();
        let a = s.add_entry(StreamIdSpec::Auto, vec![field("a", "1")], 100).unwrap();
        let b = s.add_entry(StreamIdSpec::Auto, vec![field("a", "2")], 100).unwrap();
        assert_eq!(a, StreamId::new(100, 0));
        assert_eq!(b, StreamId::new(100, 1));
    }

    #[test]
    fn autoseq_on_empty_stream_at_zero_starts_at_one() {
        let mut s = Stream::new();
        let id = s.add_entry(StreamIdSpec::AutoSeq(0), vec![], 1000).unwrap();
        assert_eq!(id, StreamId::new(0, 1));
    }

    #[test]
    fn explicit_zero_zero_rejected() {
        let mut s = Stream::new();
        let err = s
            .add_entry(StreamIdSpec::Explicit(StreamId::new(0, 0)), vec![], 1)
            .unwrap_err();
        assert_eq!(err, ERR_ID_NOT_GREATER_THAN_ZERO);
    }

    #[test]
    fn explicit_id_must_be_strictly_increasing() {
        let mut s = Stream::new();
        s.add_entry(StreamIdSpec::Explicit(StreamId::new(5, 5)), vec![], 1)
            .unwrap();
        let err = s
            .add_entry(StreamIdSpec::Explicit(StreamId::new(5, 5)), vec![], 1)
            .unwrap_err();
        assert_eq!(err, ERR_ID_NOT_MONOTONIC);
        let err = s
            .add_entry(StreamIdSpec::Explicit(StreamId::new(4, 9)), vec![], 1)
            .unwrap_err();
        assert_eq!(err, ERR_ID_NOT_MONOTONIC);
    }

    #[test]
    fn range_is_inclusive() {
        let mut s = Stream::new();
        s.add_entry(StreamIdSpec::Explicit(StreamId::new(1, 0)), vec![], 1).unwrap();
        s.add_entry(StreamIdSpec::Explicit(StreamId::new(2, 0)), vec![], 1).unwrap();
        s.add_entry(StreamIdSpec::Explicit(StreamId::new(3, 0)), vec![], 1).unwrap();
        let got = s.range(StreamId::new(2, 0), StreamId::new(3, 0));
        assert_eq!(got.len(), 2);
    }
}
