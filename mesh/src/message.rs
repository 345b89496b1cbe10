//! Core type definitions for mesh messages.
//!
//! These types form the vocabulary of everything that travels the mesh.
//! A [`Message`] is immutable once created: forwarding never mutates the
//! stored copy, it produces a new one with the hop budget decremented
//! (see [`Message::forward_copy`]).

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DEFAULT_TTL;

/// Globally unique, opaque message identifier. Assigned once at creation,
/// never reused.
pub type MessageId = String;

/// Returns the current wall-clock time as milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Total order over message urgency. Declaration order is the sort order:
/// `Critical` compares lowest and therefore sorts (and transmits) first.
///
/// Priority is assigned exactly once, at creation time, by a
/// [`crate::classify::PriorityClassifier`]. The engine never recomputes it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    /// Life-threatening. SOS traffic lands here.
    Critical,
    /// Serious danger or urgent need.
    High,
    /// Actionable but not urgent.
    Medium,
    /// Routine traffic.
    Low,
    /// Ambient chatter; forwarded last.
    Info,
}

impl Priority {
    /// Numeric rank used by ordering indices. Lower is more urgent.
    pub fn rank(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "CRITICAL"),
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
            Self::Info => write!(f, "INFO"),
        }
    }
}

// ---------------------------------------------------------------------------
// MessageContent
// ---------------------------------------------------------------------------

/// The payload of a message, tagged by its type discriminant.
///
/// Every consumer (forwarding, persistence, display) matches this enum
/// exhaustively — adding a variant without updating a consumer is a compile
/// error, which is exactly the point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessageContent {
    /// A distress call. Always classified CRITICAL.
    #[serde(rename = "SOS", rename_all = "camelCase")]
    Sos {
        /// What kind of emergency: "MEDICAL", "TRAPPED", "FIRE", ...
        category: String,
        /// Free-text details for responders.
        description: String,
        /// How many people are affected.
        #[serde(default = "default_people_count")]
        people_count: u32,
    },

    /// "I'm OK" check-in.
    #[serde(rename = "STATUS_OK", rename_all = "camelCase")]
    StatusOk {
        #[serde(default = "default_status_text")]
        message: String,
    },

    /// A request for supplies: water, food, medicine.
    #[serde(rename = "RESOURCE_REQUEST", rename_all = "camelCase")]
    ResourceRequest {
        resource_type: String,
        #[serde(default = "default_quantity")]
        quantity: u32,
        #[serde(default)]
        urgent: bool,
        #[serde(default)]
        description: String,
    },

    /// A hazard observation: blocked road, gas leak, unstable structure.
    #[serde(rename = "DANGER_REPORT", rename_all = "camelCase")]
    DangerReport {
        danger_type: String,
        /// 1 (minor) through 10 (catastrophic).
        #[serde(default = "default_severity")]
        severity: u8,
        description: String,
        #[serde(default)]
        is_blocking: bool,
    },

    /// Plain chat text.
    #[serde(rename = "CHAT", rename_all = "camelCase")]
    Chat { text: String },
}

fn default_people_count() -> u32 {
    1
}

fn default_status_text() -> String {
    "I'm OK".to_string()
}

fn default_quantity() -> u32 {
    1
}

fn default_severity() -> u8 {
    5
}

impl MessageContent {
    /// The wire-level discriminant string for this variant.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Sos { .. } => "SOS",
            Self::StatusOk { .. } => "STATUS_OK",
            Self::ResourceRequest { .. } => "RESOURCE_REQUEST",
            Self::DangerReport { .. } => "DANGER_REPORT",
            Self::Chat { .. } => "CHAT",
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One immutable unit of mesh traffic.
///
/// Invariants:
/// - `id` is assigned once at creation and never reused.
/// - `priority` is assigned once at creation and never recomputed.
/// - `ttl` is non-increasing along any single copy's forwarding chain; a
///   message is expired exactly when `ttl == 0` arrives (stored, shown,
///   never re-forwarded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Globally unique opaque id.
    pub id: MessageId,

    /// The room this message belongs to. Engines are per-room; traffic from
    /// other rooms never reaches this engine instance.
    pub room_id: String,

    /// Stable identifier of the originating device.
    pub sender_id: String,

    /// Human-readable display name of the sender, carried for UI use.
    pub sender_name: String,

    /// The typed payload.
    #[serde(flatten)]
    pub content: MessageContent,

    /// Creation time at the origin device, epoch milliseconds.
    pub timestamp: u64,

    /// Remaining hop budget. Decremented per retransmission; forwarding
    /// stops once a copy arrives with zero.
    #[serde(default = "default_ttl")]
    pub ttl: u8,

    /// Hops this copy has already taken.
    #[serde(default)]
    pub hop_count: u8,

    /// Urgency class assigned at creation.
    pub priority: Priority,

    /// Optional origin latitude, decimal degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,

    /// Optional origin longitude, decimal degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

fn default_ttl() -> u8 {
    DEFAULT_TTL
}

impl Message {
    /// Creates a locally originated message with a fresh UUID, the full hop
    /// budget, and zero hops taken.
    pub fn new(
        room_id: impl Into<String>,
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        content: MessageContent,
        priority: Priority,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            room_id: room_id.into(),
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            content,
            timestamp: now_millis(),
            ttl: DEFAULT_TTL,
            hop_count: 0,
            priority,
            lat: None,
            lon: None,
        }
    }

    /// Attaches an origin location.
    pub fn with_location(mut self, lat: f64, lon: f64) -> Self {
        self.lat = Some(lat);
        self.lon = Some(lon);
        self
    }

    /// Overrides the default hop budget.
    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    /// Produces the copy to retransmit: one hop consumed from the budget,
    /// one hop recorded as taken. Returns `None` when this copy arrived with
    /// an exhausted budget — it is stored and displayed, never re-sent.
    ///
    /// The original is untouched; the log keeps each message with its
    /// as-received ttl.
    pub fn forward_copy(&self) -> Option<Message> {
        if self.ttl == 0 {
            return None;
        }
        let mut copy = self.clone();
        copy.ttl = self.ttl - 1;
        copy.hop_count = self.hop_count.saturating_add(1);
        Some(copy)
    }

    /// True once the hop budget is exhausted.
    pub fn is_expired(&self) -> bool {
        self.ttl == 0
    }
}
