//! Typed field values carried on ARI resources, parsed from their wire strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Channel state carried in the `state` field of a channel — wire names match
/// Asterisk's `ast_state2str`, mixed-case and two of them containing spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum ChannelState {
    Down,
    Reserved,
    OffHook,
    Dialing,
    Ring,
    Ringing,
    Up,
    Busy,
    DialingOffhook,
    PreRing,
    Unknown,
}

impl ChannelState {
    /// `true` once media can flow on the channel.
    pub fn is_up(&self) -> bool {
        matches!(self, ChannelState::Up)
    }

    /// `true` while the channel is still being set up (no media yet,
    /// not failed either).
    pub fn is_ringing(&self) -> bool {
        matches!(
            self,
            ChannelState::Ring | ChannelState::Ringing | ChannelState::PreRing
        )
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Down => "Down",
            Self::Reserved => "Rsrved",
            Self::OffHook => "OffHook",
            Self::Dialing => "Dialing",
            Self::Ring => "Ring",
            Self::Ringing => "Ringing",
            Self::Up => "Up",
            Self::Busy => "Busy",
            Self::DialingOffhook => "Dialing Offhook",
            Self::PreRing => "Pre-ring",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Error returned when parsing an invalid channel state string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseChannelStateError(pub String);

impl fmt::Display for ParseChannelStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown channel state: {}", self.0)
    }
}

impl std::error::Error for ParseChannelStateError {}

impl FromStr for ChannelState {
    type Err = ParseChannelStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The wire form is mixed-case; normalize down rather than trusting it.
        match s
            .to_ascii_lowercase()
            .as_str()
        {
            "down" => Ok(Self::Down),
            "rsrved" => Ok(Self::Reserved),
            "offhook" => Ok(Self::OffHook),
            "dialing" => Ok(Self::Dialing),
            "ring" => Ok(Self::Ring),
            "ringing" => Ok(Self::Ringing),
            "up" => Ok(Self::Up),
            "busy" => Ok(Self::Busy),
            "dialing offhook" => Ok(Self::DialingOffhook),
            "pre-ring" => Ok(Self::PreRing),
            "unknown" => Ok(Self::Unknown),
            _ => Err(ParseChannelStateError(s.to_string())),
        }
    }
}

/// Device state value from the `state` field of a deviceState resource and
/// from `DeviceStateChanged` events. Wire format is uppercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum DeviceStateValue {
    Unknown,
    NotInUse,
    InUse,
    Busy,
    Invalid,
    Unavailable,
    Ringing,
    RingInUse,
    OnHold,
}

impl DeviceStateValue {
    /// `true` when the device can take another call.
    pub fn is_available(&self) -> bool {
        matches!(self, DeviceStateValue::NotInUse | DeviceStateValue::Unknown)
    }
}

impl fmt::Display for DeviceStateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::NotInUse => "NOT_INUSE",
            Self::InUse => "INUSE",
            Self::Busy => "BUSY",
            Self::Invalid => "INVALID",
            Self::Unavailable => "UNAVAILABLE",
            Self::Ringing => "RINGING",
            Self::RingInUse => "RINGINUSE",
            Self::OnHold => "ONHOLD",
        };
        f.write_str(name)
    }
}

/// Error returned when parsing an invalid device state string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDeviceStateError(pub String);

impl fmt::Display for ParseDeviceStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown device state: {}", self.0)
    }
}

impl std::error::Error for ParseDeviceStateError {}

impl FromStr for DeviceStateValue {
    type Err = ParseDeviceStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s
            .to_uppercase()
            .as_str()
        {
            "UNKNOWN" => Ok(Self::Unknown),
            "NOT_INUSE" => Ok(Self::NotInUse),
            "INUSE" => Ok(Self::InUse),
            "BUSY" => Ok(Self::Busy),
            "INVALID" => Ok(Self::Invalid),
            "UNAVAILABLE" => Ok(Self::Unavailable),
            "RINGING" => Ok(Self::Ringing),
            "RINGINUSE" => Ok(Self::RingInUse),
            "ONHOLD" => Ok(Self::OnHold),
            _ => Err(ParseDeviceStateError(s.to_string())),
        }
    }
}

/// Playback state from the `state` field of a playback resource.
/// Wire format is lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum PlaybackState {
    Queued,
    Playing,
    Paused,
    Continuing,
    Done,
    Failed,
}

impl PlaybackState {
    /// `true` once the playback can no longer produce media.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackState::Done | PlaybackState::Failed)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Continuing => "continuing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Error returned when parsing an invalid playback state string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePlaybackStateError(pub String);

impl fmt::Display for ParsePlaybackStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown playback state: {}", self.0)
    }
}

impl std::error::Error for ParsePlaybackStateError {}

impl FromStr for PlaybackState {
    type Err = ParsePlaybackStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s
            .to_lowercase()
            .as_str()
        {
            "queued" => Ok(Self::Queued),
            "playing" => Ok(Self::Playing),
            "paused" => Ok(Self::Paused),
            "continuing" => Ok(Self::Continuing),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            _ => Err(ParsePlaybackStateError(s.to_string())),
        }
    }
}

/// Live recording state from the `state` field of a recording resource.
/// Wire format is lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum RecordingState {
    Queued,
    Recording,
    Paused,
    Done,
    Failed,
    Canceled,
}

impl RecordingState {
    /// `true` once the recording has stopped for good.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecordingState::Done | RecordingState::Failed | RecordingState::Canceled
        )
    }
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Recording => "recording",
            Self::Paused => "paused",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        };
        f.write_str(name)
    }
}

/// Error returned when parsing an invalid recording state string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRecordingStateError(pub String);

impl fmt::Display for ParseRecordingStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown recording state: {}", self.0)
    }
}

impl std::error::Error for ParseRecordingStateError {}

impl FromStr for RecordingState {
    type Err = ParseRecordingStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s
            .to_lowercase()
            .as_str()
        {
            "queued" => Ok(Self::Queued),
            "recording" => Ok(Self::Recording),
            "paused" => Ok(Self::Paused),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            _ => Err(ParseRecordingStateError(s.to_string())),
        }
    }
}
