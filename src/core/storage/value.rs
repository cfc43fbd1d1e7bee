// src/core/storage/value.rs

//! The tagged value stored per key, and the small set of data shapes this
//! server supports.

use super::stream::Stream;
use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Instant;

#[derive(Debug)]
pub enum DataValue {
    Str(Bytes),
    List(VecDeque<Bytes>),
    Stream(Stream),
}

impl DataValue {
    /// The name `TYPE` reports for this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            DataValue::Str(_) => "string",
            DataValue::List(_) => "list",
            DataValue::Stream(_) => "stream",
        }
    }
}

/// A key's value plus its absolute expiry deadline, following `SET ... PX`'s
/// semantics of an absolute deadline rather than a TTL recomputed on access.
#[derive(Debug)]
pub struct StoredValue {
    pub data: DataValue,
    pub expiry: Option<Instant>,
}

impl StoredValue {
    pub fn new(data: DataValue) -> Self {
        Self { data, expiry: None }
    }

    pub fn with_expiry(data: DataValue, expiry: Instant) -> Self {
        Self {
            data,
            expiry: Some(expiry),
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expiry.is_some_and(|deadline| deadline <= now)
    }
}
