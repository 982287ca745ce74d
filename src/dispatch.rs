//! Best-effort email dispatch
//!
//! The engine hands every [`EmailNotice`] to an [`EmailDispatch`]
//! implementation and logs failures at warn level without surfacing them:
//! email is a secondary channel and must never block a lifecycle transition.
use std::time::Duration;

use serde::Serialize;

use crate::notification::EmailNotice;

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("endpoint returned status {0}")]
    Status(reqwest::StatusCode),
}

pub trait EmailDispatch: Send + Sync {
    fn deliver(&self, notice: &EmailNotice) -> Result<(), DispatchError>;
}

/// Discards every notice. Stands in wherever no mail backend is configured.
pub struct NullDispatch;

impl EmailDispatch for NullDispatch {
    fn deliver(&self, _notice: &EmailNotice) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// POSTs JSON payloads to the mail backend's endpoint family.
pub struct HttpDispatch {
    client: reqwest::blocking::Client,
    base_url: String,
}

#[derive(Serialize)]
struct WelcomePayload<'a> {
    email: &'a str,
    name: &'a str,
    username: &'a str,
}

#[derive(Serialize)]
struct TradeRequestPayload<'a> {
    to_email: &'a str,
    from_user: &'a str,
    food_name: &'a str,
    offer_food: &'a str,
    trade_time: &'a str,
    trade_date: &'a str,
}

#[derive(Serialize)]
struct TradeAcceptedPayload<'a> {
    to_email: &'a str,
    from_user: &'a str,
    food_name: &'a str,
    trade_time: &'a str,
    trade_date: &'a str,
}

#[derive(Serialize)]
struct TradeDeclinedPayload<'a> {
    to_email: &'a str,
    from_user: &'a str,
    reason: &'a str,
}

impl HttpDispatch {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DispatchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    fn post<T: Serialize>(&self, path: &str, payload: &T) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(payload)
            .send()?;
        if !response.status().is_success() {
            return Err(DispatchError::Status(response.status()));
        }
        Ok(())
    }
}

impl EmailDispatch for HttpDispatch {
    fn deliver(&self, notice: &EmailNotice) -> Result<(), DispatchError> {
        match notice {
            EmailNotice::Welcome {
                email,
                name,
                username,
            } => self.post(
                "/api/send_welcome_email",
                &WelcomePayload {
                    email,
                    name,
                    username,
                },
            ),
            EmailNotice::TradeRequest {
                to_email,
                from_user,
                food_name,
                offer_food,
                trade_time,
                trade_date,
            } => self.post(
                "/api/send_trade_request",
                &TradeRequestPayload {
                    to_email,
                    from_user,
                    food_name,
                    offer_food,
                    trade_time,
                    trade_date,
                },
            ),
            EmailNotice::TradeAccepted {
                to_email,
                from_user,
                food_name,
                trade_time,
                trade_date,
            } => self.post(
                "/api/send_trade_accepted",
                &TradeAcceptedPayload {
                    to_email,
                    from_user,
                    food_name,
                    trade_time,
                    trade_date,
                },
            ),
            EmailNotice::TradeDeclined {
                to_email,
                from_user,
                reason,
            } => self.post(
                "/api/send_trade_declined",
                &TradeDeclinedPayload {
                    to_email,
                    from_user,
                    reason,
                },
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads_match_the_backend_contract() {
        let payload = TradeRequestPayload {
            to_email: "alice@school.test",
            from_user: "Bob",
            food_name: "Grilled Chicken Sandwich",
            offer_food: "Greek Yogurt Parfait",
            trade_time: "12:30",
            trade_date: "2025-03-20",
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "to_email": "alice@school.test",
                "from_user": "Bob",
                "food_name": "Grilled Chicken Sandwich",
                "offer_food": "Greek Yogurt Parfait",
                "trade_time": "12:30",
                "trade_date": "2025-03-20",
            })
        );
    }

    #[test]
    fn null_dispatch_accepts_everything() {
        let notice = EmailNotice::Welcome {
            email: "dana@school.test".into(),
            name: "Dana".into(),
            username: "dana".into(),
        };
        assert!(NullDispatch.deliver(&notice).is_ok());
    }
}
