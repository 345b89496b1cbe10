//! Priority classification.
//!
//! The engine never decides how urgent a message is — it consumes a
//! [`Priority`] assigned exactly once at creation time and treats it as
//! opaque and immutable thereafter. The [`PriorityClassifier`] trait is that
//! seam: hosts plug in whatever heuristic fits their deployment.
//!
//! [`UrgencyClassifier`] is the reference implementation: a numeric urgency
//! score built from a per-type base plus content modifiers, banded onto the
//! five priority classes. An SOS with category MEDICAL scores
//! 50 (base) + 20 (category) = 70 and lands in CRITICAL.

use crate::config::{
    CRITICAL_THRESHOLD, DANGER_BASE_SCORE, HIGH_THRESHOLD, LOW_THRESHOLD, MEDIUM_THRESHOLD,
    RESOURCE_BASE_SCORE, SOS_BASE_SCORE, STATUS_OK_SCORE,
};
use crate::message::{MessageContent, Priority};

// ---------------------------------------------------------------------------
// PriorityClassifier contract
// ---------------------------------------------------------------------------

/// Assigns a priority to message content at creation time.
///
/// Called once per locally created message, before the message enters the
/// store. The engine never re-invokes the classifier for received messages;
/// they carry the priority their origin assigned.
pub trait PriorityClassifier: Send + Sync {
    /// Numeric urgency score; higher is more urgent. Exposed separately from
    /// [`Self::classify`] so hosts can display the raw score.
    fn score(&self, content: &MessageContent) -> u32;

    /// The priority band for this content.
    fn classify(&self, content: &MessageContent) -> Priority;
}

// ---------------------------------------------------------------------------
// UrgencyClassifier
// ---------------------------------------------------------------------------

/// Reference keyword/category scoring heuristic.
///
/// Scoring rules, applied to the content only (never to metadata):
///
/// | type             | score                                              |
/// |------------------|----------------------------------------------------|
/// | SOS              | 50 + category weight + 2 per extra person (cap 10) |
/// | DANGER_REPORT    | 30 + 3 × severity + 10 if blocking                 |
/// | RESOURCE_REQUEST | 20 + resource weight + 15 if urgent                |
/// | STATUS_OK        | 5                                                  |
/// | CHAT             | 0                                                  |
#[derive(Debug, Clone, Copy, Default)]
pub struct UrgencyClassifier;

impl UrgencyClassifier {
    /// Extra weight for the SOS category. Unrecognized categories still get
    /// the minimum weight — every SOS must clear the CRITICAL threshold.
    fn sos_category_weight(category: &str) -> u32 {
        match category.to_ascii_uppercase().as_str() {
            "TRAPPED" => 30,
            "FIRE" => 25,
            "MEDICAL" => 20,
            _ => 20,
        }
    }

    /// Extra weight for the requested resource type.
    fn resource_weight(resource_type: &str) -> u32 {
        match resource_type.to_ascii_uppercase().as_str() {
            "MEDICINE" => 15,
            "WATER" => 10,
            "FOOD" => 8,
            "SHELTER" => 8,
            _ => 5,
        }
    }
}

impl PriorityClassifier for UrgencyClassifier {
    fn score(&self, content: &MessageContent) -> u32 {
        match content {
            MessageContent::Sos {
                category,
                people_count,
                ..
            } => {
                let crowd_bonus = people_count.saturating_sub(1).saturating_mul(2).min(10);
                SOS_BASE_SCORE + Self::sos_category_weight(category) + crowd_bonus
            }
            MessageContent::DangerReport {
                severity,
                is_blocking,
                ..
            } => {
                let blocking_bonus = if *is_blocking { 10 } else { 0 };
                DANGER_BASE_SCORE + 3 * u32::from(*severity) + blocking_bonus
            }
            MessageContent::ResourceRequest {
                resource_type,
                urgent,
                ..
            } => {
                let urgency_bonus = if *urgent { 15 } else { 0 };
                RESOURCE_BASE_SCORE + Self::resource_weight(resource_type) + urgency_bonus
            }
            MessageContent::StatusOk { .. } => STATUS_OK_SCORE,
            MessageContent::Chat { .. } => 0,
        }
    }

    fn classify(&self, content: &MessageContent) -> Priority {
        let score = self.score(content);
        if score >= CRITICAL_THRESHOLD {
            Priority::Critical
        } else if score >= HIGH_THRESHOLD {
            Priority::High
        } else if score >= MEDIUM_THRESHOLD {
            Priority::Medium
        } else if score >= LOW_THRESHOLD {
            Priority::Low
        } else {
            Priority::Info
        }
    }
}
