//! Operation status codes.
//!
//! Status codes are carried on the wire as bare integers in the
//! `status_code` envelope field, with the display name duplicated in the
//! `status` field. Codes at or above 200 are final: an operation that
//! reaches one never changes status again.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// Status of a REST operation.
///
/// The numeric values are part of the wire contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    Created = 100,
    Started = 101,
    Stopped = 102,
    Running = 103,
    Cancelling = 104,
    Pending = 105,
    Starting = 106,
    Stopping = 107,
    Aborting = 108,
    Freezing = 109,
    Frozen = 110,
    Thawed = 111,
    Error = 112,

    Success = 200,

    Failure = 400,
    Cancelled = 401,
}

impl StatusCode {
    /// All status codes, in wire-value order.
    pub const ALL: [StatusCode; 16] = [
        StatusCode::Created,
        StatusCode::Started,
        StatusCode::Stopped,
        StatusCode::Running,
        StatusCode::Cancelling,
        StatusCode::Pending,
        StatusCode::Starting,
        StatusCode::Stopping,
        StatusCode::Aborting,
        StatusCode::Freezing,
        StatusCode::Frozen,
        StatusCode::Thawed,
        StatusCode::Error,
        StatusCode::Success,
        StatusCode::Failure,
        StatusCode::Cancelled,
    ];

    /// Returns the display name used in the envelope's `status` field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Created => "Created",
            StatusCode::Started => "Started",
            StatusCode::Stopped => "Stopped",
            StatusCode::Running => "Running",
            StatusCode::Cancelling => "Cancelling",
            StatusCode::Pending => "Pending",
            StatusCode::Starting => "Starting",
            StatusCode::Stopping => "Stopping",
            StatusCode::Aborting => "Aborting",
            StatusCode::Freezing => "Freezing",
            StatusCode::Frozen => "Frozen",
            StatusCode::Thawed => "Thawed",
            StatusCode::Error => "Error",
            StatusCode::Success => "Success",
            StatusCode::Failure => "Failure",
            StatusCode::Cancelled => "Cancelled",
        }
    }

    /// Numeric wire value of the status code.
    #[must_use]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Looks up a status code by its numeric wire value.
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        StatusCode::ALL.iter().copied().find(|s| s.code() == code)
    }

    /// True when the code indicates an end state (code >= 200).
    #[must_use]
    pub fn is_final(self) -> bool {
        self.code() >= 200
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for StatusCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.code())
    }
}

impl<'de> Deserialize<'de> for StatusCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u16::deserialize(deserializer)?;
        StatusCode::from_code(code)
            .ok_or_else(|| de::Error::custom(format!("unknown status code: {code}")))
    }
}
