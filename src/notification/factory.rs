//! Per-event notification factories.
//!
//! Each factory owns the title/message template, payload shape, priority and
//! expiry policy of one domain event. Callers never assemble raw notification
//! fields. Inputs are trusted: the caller has already validated the ids.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::notification::{NewNotification, NotificationData, Priority, RequestResponse};

/// Marriage requests that are never answered drop out of the inbox after this.
pub const MARRIAGE_REQUEST_TTL_DAYS: i64 = 30;
/// Guardian decisions are time-sensitive.
pub const GUARDIAN_APPROVAL_TTL_DAYS: i64 = 7;
/// Chat message previews are cut to this many characters.
pub const MESSAGE_PREVIEW_CHARS: usize = 100;

pub fn marriage_request_received(
    recipient_id: Uuid,
    sender_id: Uuid,
    sender_name: &str,
    request_id: Uuid,
) -> NewNotification {
    NewNotification::typed(
        recipient_id,
        NotificationData::MarriageRequest {
            request_id,
            sender_id,
            response: None,
        },
        "New Marriage Request",
        format!("{} has sent you a marriage request", sender_name),
    )
    .with_priority(Priority::High)
    .expires_at(Utc::now() + Duration::days(MARRIAGE_REQUEST_TTL_DAYS))
}

pub fn marriage_request_accepted(
    recipient_id: Uuid,
    responder_id: Uuid,
    responder_name: &str,
    request_id: Uuid,
) -> NewNotification {
    NewNotification::typed(
        recipient_id,
        NotificationData::MarriageRequest {
            request_id,
            sender_id: responder_id,
            response: Some(RequestResponse::Accepted),
        },
        "Marriage Request Accepted",
        format!("{} has accepted your marriage request", responder_name),
    )
    .with_priority(Priority::High)
}

pub fn marriage_request_rejected(
    recipient_id: Uuid,
    responder_id: Uuid,
    responder_name: &str,
    request_id: Uuid,
) -> NewNotification {
    NewNotification::typed(
        recipient_id,
        NotificationData::MarriageRequest {
            request_id,
            sender_id: responder_id,
            response: Some(RequestResponse::Rejected),
        },
        "Marriage Request Declined",
        format!("{} has declined your marriage request", responder_name),
    )
}

pub fn message_received(
    recipient_id: Uuid,
    sender_id: Uuid,
    sender_name: &str,
    chat_room_id: Uuid,
    message_id: Option<Uuid>,
    preview: &str,
) -> NewNotification {
    NewNotification::typed(
        recipient_id,
        NotificationData::Message {
            chat_room_id,
            sender_id,
            message_id,
        },
        format!("New message from {}", sender_name),
        truncate_preview(preview),
    )
}

pub fn profile_viewed(recipient_id: Uuid, viewer_id: Uuid, viewer_name: &str) -> NewNotification {
    NewNotification::typed(
        recipient_id,
        NotificationData::ProfileView { viewer_id },
        "Profile View",
        format!("{} viewed your profile", viewer_name),
    )
    .with_priority(Priority::Low)
}

pub fn match_found(
    recipient_id: Uuid,
    match_user_id: Uuid,
    match_name: &str,
    score: Option<u8>,
) -> NewNotification {
    let message = match score {
        Some(score) => format!(
            "You have a new match with {} ({}% compatible)",
            match_name,
            score.min(100)
        ),
        None => format!("You have a new match with {}", match_name),
    };
    NewNotification::typed(
        recipient_id,
        NotificationData::Match {
            match_user_id,
            score: score.map(|s| s.min(100)),
        },
        "New Match Found",
        message,
    )
}

/// Sent to the guardian of a user who received a request needing approval.
pub fn guardian_approval_needed(
    guardian_id: Uuid,
    request_id: Uuid,
    requester_id: Uuid,
    requester_name: &str,
    ward_id: Uuid,
    ward_name: &str,
) -> NewNotification {
    NewNotification::typed(
        guardian_id,
        NotificationData::GuardianApproval {
            request_id,
            requester_id,
            ward_id,
        },
        "Guardian Approval Required",
        format!(
            "{} has sent a marriage request to {} that needs your approval",
            requester_name, ward_name
        ),
    )
    .with_priority(Priority::Urgent)
    .expires_at(Utc::now() + Duration::days(GUARDIAN_APPROVAL_TTL_DAYS))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
}

impl VerificationStatus {
    fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Approved => "approved",
            VerificationStatus::Rejected => "rejected",
        }
    }
}

pub fn verification_updated(recipient_id: Uuid, status: VerificationStatus) -> NewNotification {
    let (title, message, priority) = match status {
        VerificationStatus::Pending => (
            "Verification In Review",
            "Your verification documents are being reviewed",
            Priority::Low,
        ),
        VerificationStatus::Approved => (
            "Profile Verified",
            "Your profile has been verified",
            Priority::High,
        ),
        VerificationStatus::Rejected => (
            "Verification Unsuccessful",
            "Your verification could not be completed. Please review your documents and try again",
            Priority::High,
        ),
    };
    NewNotification::typed(
        recipient_id,
        NotificationData::Verification {
            status: status.as_str().to_string(),
        },
        title,
        message,
    )
    .with_priority(priority)
}

pub fn system_announcement(
    recipient_id: Uuid,
    title: &str,
    message: &str,
    link: Option<String>,
) -> NewNotification {
    NewNotification::typed(
        recipient_id,
        NotificationData::System { link },
        title,
        message,
    )
}

fn truncate_preview(preview: &str) -> String {
    let preview = preview.trim();
    if preview.chars().count() <= MESSAGE_PREVIEW_CHARS {
        return preview.to_string();
    }
    let cut: String = preview.chars().take(MESSAGE_PREVIEW_CHARS).collect();
    format!("{}...", cut.trim_end())
}

// ── Domain events ─────────────────────────────────────────────

/// Events raised by the platform's route handlers, one per factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    #[serde(rename_all = "camelCase")]
    MarriageRequestReceived {
        recipient_id: Uuid,
        sender_id: Uuid,
        sender_name: String,
        request_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    MarriageRequestAccepted {
        recipient_id: Uuid,
        responder_id: Uuid,
        responder_name: String,
        request_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    MarriageRequestRejected {
        recipient_id: Uuid,
        responder_id: Uuid,
        responder_name: String,
        request_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    MessageReceived {
        recipient_id: Uuid,
        sender_id: Uuid,
        sender_name: String,
        chat_room_id: Uuid,
        #[serde(default)]
        message_id: Option<Uuid>,
        preview: String,
    },
    #[serde(rename_all = "camelCase")]
    ProfileViewed {
        recipient_id: Uuid,
        viewer_id: Uuid,
        viewer_name: String,
    },
    #[serde(rename_all = "camelCase")]
    MatchFound {
        recipient_id: Uuid,
        match_user_id: Uuid,
        match_name: String,
        #[serde(default)]
        score: Option<u8>,
    },
    #[serde(rename_all = "camelCase")]
    GuardianApprovalNeeded {
        guardian_id: Uuid,
        request_id: Uuid,
        requester_id: Uuid,
        requester_name: String,
        ward_id: Uuid,
        ward_name: String,
    },
    #[serde(rename_all = "camelCase")]
    VerificationUpdated {
        recipient_id: Uuid,
        status: VerificationStatus,
    },
    #[serde(rename_all = "camelCase")]
    SystemAnnouncement {
        recipient_id: Uuid,
        title: String,
        message: String,
        #[serde(default)]
        link: Option<String>,
    },
}

impl DomainEvent {
    pub fn into_notification(self) -> NewNotification {
        match self {
            DomainEvent::MarriageRequestReceived {
                recipient_id,
                sender_id,
                sender_name,
                request_id,
            } => marriage_request_received(recipient_id, sender_id, &sender_name, request_id),
            DomainEvent::MarriageRequestAccepted {
                recipient_id,
                responder_id,
                responder_name,
                request_id,
            } => marriage_request_accepted(recipient_id, responder_id, &responder_name, request_id),
            DomainEvent::MarriageRequestRejected {
                recipient_id,
                responder_id,
                responder_name,
                request_id,
            } => marriage_request_rejected(recipient_id, responder_id, &responder_name, request_id),
            DomainEvent::MessageReceived {
                recipient_id,
                sender_id,
                sender_name,
                chat_room_id,
                message_id,
                preview,
            } => message_received(
                recipient_id,
                sender_id,
                &sender_name,
                chat_room_id,
                message_id,
                &preview,
            ),
            DomainEvent::ProfileViewed {
                recipient_id,
                viewer_id,
                viewer_name,
            } => profile_viewed(recipient_id, viewer_id, &viewer_name),
            DomainEvent::MatchFound {
                recipient_id,
                match_user_id,
                match_name,
                score,
            } => match_found(recipient_id, match_user_id, &match_name, score),
            DomainEvent::GuardianApprovalNeeded {
                guardian_id,
                request_id,
                requester_id,
                requester_name,
                ward_id,
                ward_name,
            } => guardian_approval_needed(
                guardian_id,
                request_id,
                requester_id,
                &requester_name,
                ward_id,
                &ward_name,
            ),
            DomainEvent::VerificationUpdated {
                recipient_id,
                status,
            } => verification_updated(recipient_id, status),
            DomainEvent::SystemAnnouncement {
                recipient_id,
                title,
                message,
                link,
            } => system_announcement(recipient_id, &title, &message, link),
        }
    }
}
