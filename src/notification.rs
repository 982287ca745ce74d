//! In-app notification records and outbound email notices
use std::fmt;

use chrono::Utc;

use crate::trade::TimeStamp;

/// The feed shows at most this many entries, newest first.
pub const FEED_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum NotificationKind {
    #[n(0)]
    TradeRequest,
    #[n(1)]
    TradeAccepted,
    #[n(2)]
    TradeDeclined,
    #[n(3)]
    Info,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotificationKind::TradeRequest => "trade_request",
            NotificationKind::TradeAccepted => "trade_accepted",
            NotificationKind::TradeDeclined => "trade_declined",
            NotificationKind::Info => "info",
        };
        f.write_str(name)
    }
}

/// One entry in a user's in-app feed. Written only by the lifecycle engine;
/// the read flag and deletion belong to the recipient.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Notification {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub user_id: String,
    #[n(2)]
    pub kind: NotificationKind,
    #[n(3)]
    pub message: String,
    #[n(4)]
    pub read: bool,
    #[n(5)]
    pub created_at: TimeStamp<Utc>,
    #[n(6)]
    pub transaction_id: Option<String>,
    #[n(7)]
    pub from_user_id: Option<String>,
}

/// An email side effect emitted by the engine and handed to the dispatcher.
/// Delivery is best-effort; these never affect the lifecycle outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailNotice {
    Welcome {
        email: String,
        name: String,
        username: String,
    },
    TradeRequest {
        to_email: String,
        from_user: String,
        food_name: String,
        offer_food: String,
        trade_time: String,
        trade_date: String,
    },
    TradeAccepted {
        to_email: String,
        from_user: String,
        food_name: String,
        trade_time: String,
        trade_date: String,
    },
    TradeDeclined {
        to_email: String,
        from_user: String,
        reason: String,
    },
}
