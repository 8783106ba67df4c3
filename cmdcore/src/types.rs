//! Core identifier types for the `CmdCore` command execution library.
//!
//! This module defines the fundamental types used throughout the library.
//! All types use smart constructors to ensure validity at construction time,
//! following the "parse, don't validate" principle.

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A correlation identifier joining an asynchronous request to its response.
///
/// `CorrelationId` values are guaranteed to be non-empty and at most 255
/// characters. The id is the only join key between `send` and `receive`:
/// at most one in-flight message may exist per correlation id at any time.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mints a fresh correlation id backed by a `UUIDv7`.
    ///
    /// Time-ordered UUIDs keep generated ids unique across concurrent
    /// callers without any coordination.
    pub fn generate() -> Self {
        Self::try_new(Uuid::now_v7().to_string())
            .expect("a UUIDv7 string is always a valid correlation id")
    }
}

/// A stable identifier naming a command implementation.
///
/// Command ids are used to pair a `receive` call with the command whose
/// message was sent, and to resolve the owning command when a message
/// frame is revived from its wire form.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct CommandId(String);

/// The name of the facade a request entered the system through.
///
/// Trace metadata only; propagated with every message, never interpreted.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct FacadeName(String);

/// The name of the business action being performed.
///
/// Trace metadata only; propagated with every message, never interpreted.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct ActionName(String);

/// A timestamp recording when an action entered the system.
///
/// This wrapper ensures consistent timestamp handling throughout the
/// library and keeps the serialized form stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a new timestamp from a UTC `DateTime`.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Creates a timestamp representing the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}
