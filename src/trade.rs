//! Transaction records and the trade status state machine
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::TradeError;

#[derive(Debug, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl<T: TimeZone> PartialEq for TimeStamp<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: TimeZone> Eq for TimeStamp<T> {}

impl<T: TimeZone> PartialOrd for TimeStamp<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TimeZone> Ord for TimeStamp<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// The status of a transaction record. `Pending` and `PendingRequest` are the
/// two live states; everything else is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum TradeStatus {
    /// A public offer, open to requests.
    #[n(0)]
    Pending,
    /// A directed request awaiting the offer owner's decision.
    #[n(1)]
    PendingRequest,
    #[n(2)]
    Accepted,
    #[n(3)]
    Declined,
    #[n(4)]
    Cancelled,
    /// A public offer consumed by an accepted request.
    #[n(5)]
    Taken,
}

impl TradeStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TradeStatus::Pending | TradeStatus::PendingRequest)
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TradeStatus::Pending => "pending",
            TradeStatus::PendingRequest => "pending_request",
            TradeStatus::Accepted => "accepted",
            TradeStatus::Declined => "declined",
            TradeStatus::Cancelled => "cancelled",
            TradeStatus::Taken => "taken",
        };
        f.write_str(name)
    }
}

/// The transitions the engine may apply to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeAction {
    Accept,
    Decline,
    Cancel,
    Take,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TradeAction::Accept => "accept",
            TradeAction::Decline => "decline",
            TradeAction::Cancel => "cancel",
            TradeAction::Take => "take",
        };
        f.write_str(name)
    }
}

impl TradeStatus {
    /// The full transition table. Everything not listed here is invalid, which
    /// in particular means no terminal status ever moves again.
    pub fn apply(self, action: TradeAction) -> Result<TradeStatus, TradeError> {
        use TradeAction::*;
        use TradeStatus::*;
        match (self, action) {
            (PendingRequest, Accept) => Ok(Accepted),
            (PendingRequest, Decline) => Ok(Declined),
            (Pending, Cancel) => Ok(Cancelled),
            (Pending, Take) => Ok(Taken),
            (from, action) => Err(TradeError::InvalidTransition { from, action }),
        }
    }
}

/// What the offering user wants in return. The legacy store encoded this as a
/// food id with the sentinel `"all"` standing for "negotiable".
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum Wanted {
    #[n(0)]
    Anything,
    #[n(1)]
    Food(#[n(0)] String),
}

/// A public offer or a directed request in the trade lifecycle.
///
/// `trade_date`/`trade_time` are snapshots of the offered food's availability
/// at creation time; later edits to the food do not propagate.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Transaction {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub from_user_id: String,
    /// `None` means public, visible to everyone but the owner.
    #[n(2)]
    pub to_user: Option<String>,
    #[n(3)]
    pub offered_food_id: String,
    #[n(4)]
    pub wanted: Wanted,
    #[n(5)]
    pub status: TradeStatus,
    #[n(6)]
    pub trade_date: String,
    #[n(7)]
    pub trade_time: String,
    /// Present on requests only: the public offer this request answers.
    #[n(8)]
    pub parent_offer_id: Option<String>,
    #[n(9)]
    pub is_request: bool,
    #[n(10)]
    pub decline_reason: Option<String>,
    #[n(11)]
    pub created_at: TimeStamp<Utc>,
}

impl Transaction {
    /// A new public offer in `Pending` state.
    pub fn public_offer(
        id: String,
        from_user_id: &str,
        offered_food_id: &str,
        wanted: Wanted,
        trade_date: &str,
        trade_time: &str,
    ) -> Self {
        Self {
            id,
            from_user_id: from_user_id.to_string(),
            to_user: None,
            offered_food_id: offered_food_id.to_string(),
            wanted,
            status: TradeStatus::Pending,
            trade_date: trade_date.to_string(),
            trade_time: trade_time.to_string(),
            parent_offer_id: None,
            is_request: false,
            decline_reason: None,
            created_at: TimeStamp::new(),
        }
    }

    /// A new directed request answering `parent`, wanting the parent's offered
    /// food and copying the parent's trade date/time snapshot.
    pub fn request(id: String, from_user_id: &str, parent: &Transaction, offered_food_id: &str) -> Self {
        Self {
            id,
            from_user_id: from_user_id.to_string(),
            to_user: Some(parent.from_user_id.clone()),
            offered_food_id: offered_food_id.to_string(),
            wanted: Wanted::Food(parent.offered_food_id.clone()),
            status: TradeStatus::PendingRequest,
            trade_date: parent.trade_date.clone(),
            trade_time: parent.trade_time.clone(),
            parent_offer_id: Some(parent.id.clone()),
            is_request: true,
            decline_reason: None,
            created_at: TimeStamp::new(),
        }
    }

    /// Apply a lifecycle transition. This is the sole writer of `status`.
    pub fn advance(&mut self, action: TradeAction) -> Result<(), TradeError> {
        self.status = self.status.apply(action)?;
        Ok(())
    }

    pub fn is_open_public_offer(&self) -> bool {
        !self.is_request && self.to_user.is_none() && self.status == TradeStatus::Pending
    }

    /// Enforce the record-shape invariants at the store boundary. Requests
    /// always carry a target and a parent; public offers never do, and each
    /// side only occupies its own statuses.
    pub fn validate_shape(&self) -> Result<(), TradeError> {
        let malformed = |reason: &str| TradeError::MalformedRecord {
            collection: "transactions",
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.is_empty() || self.from_user_id.is_empty() || self.offered_food_id.is_empty() {
            return Err(malformed("missing id, owner, or offered food"));
        }

        if self.is_request {
            if self.to_user.as_deref().is_none_or(str::is_empty) {
                return Err(malformed("request without a target user"));
            }
            if self.parent_offer_id.is_none() {
                return Err(malformed("request without a parent offer"));
            }
            match self.status {
                TradeStatus::PendingRequest | TradeStatus::Accepted | TradeStatus::Declined => {}
                other => return Err(malformed(&format!("request in {other} state"))),
            }
        } else {
            if self.to_user.is_some() {
                return Err(malformed("public offer with a target user"));
            }
            if self.parent_offer_id.is_some() {
                return Err(malformed("public offer with a parent offer"));
            }
            match self.status {
                TradeStatus::Pending | TradeStatus::Cancelled | TradeStatus::Taken => {}
                other => return Err(malformed(&format!("public offer in {other} state"))),
            }
        }
        Ok(())
    }
}
