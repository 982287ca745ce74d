//! Service layer API for marketplace lifecycle operations
//!
//! [`TradeService`] owns every valid transition of a [`Transaction`] and the
//! side effects that go with it: in-app notification records written to the
//! store, and best-effort email notices handed to the dispatcher. The accept
//! path commits the request and its parent offer through one atomic batch so
//! the pair is never observed torn.
use std::sync::Arc;

use log::warn;
use sled::Db;

use crate::dispatch::EmailDispatch;
use crate::error::TradeError;
use crate::food::{Food, MealType, NewFood, OfferFilters};
use crate::notification::{EmailNotice, Notification, NotificationKind, FEED_LIMIT};
use crate::session::{AuthHandle, Session};
use crate::store::TradeStore;
use crate::trade::{TimeStamp, TradeAction, TradeStatus, Transaction, Wanted};
use crate::user::{ProfileChanges, Rating, User};
use crate::utils;

pub struct TradeService {
    store: TradeStore,
    mailer: Arc<dyn EmailDispatch>,
}

/// One row of the public offer listing: the offer, the food on the table, and
/// what the owner wants back (`None` = negotiable).
#[derive(Debug, Clone)]
pub struct OfferListing {
    pub offer: Transaction,
    pub food: Food,
    pub wanted: Option<Food>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeDirection {
    Sent,
    Received,
}

/// One row of a user's trade history, with references resolved where they
/// still exist.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub transaction: Transaction,
    pub direction: TradeDirection,
    pub other_user: Option<String>,
    pub offered_food: Option<Food>,
    pub wanted_food: Option<Food>,
}

impl TradeService {
    pub fn new(db: Arc<Db>, mailer: Arc<dyn EmailDispatch>) -> Result<Self, TradeError> {
        Ok(Self {
            store: TradeStore::open(db)?,
            mailer,
        })
    }

    pub fn store(&self) -> &TradeStore {
        &self.store
    }

    // accounts

    /// Create the marketplace account for a freshly authenticated identity,
    /// with the product's signup defaults, and send the welcome email.
    pub fn register_user(
        &self,
        handle: &AuthHandle,
        full_name: &str,
        username: &str,
        grade: &str,
    ) -> Result<User, TradeError> {
        let session = Session::authenticated(handle)?;
        if self.store.user(&session.user_id)?.is_some() {
            return Err(TradeError::UserExists(session.user_id));
        }

        let user = User::register(session.user_id, full_name, username, &handle.email, grade);
        self.store.put_user(&user)?;

        self.send_mail(EmailNotice::Welcome {
            email: user.email.clone(),
            name: user.full_name.clone(),
            username: user.username.clone(),
        });
        Ok(user)
    }

    /// Rebuild a session from the stored user record (admin flag included).
    pub fn session_for(&self, user_id: &str) -> Result<Session, TradeError> {
        let user = self.store.require_user(user_id)?;
        Ok(Session::for_user(&user))
    }

    pub fn update_profile(
        &self,
        session: &Session,
        changes: ProfileChanges,
    ) -> Result<User, TradeError> {
        let mut user = self.store.require_user(&session.user_id)?;
        changes.apply(&mut user);
        self.store.put_user(&user)?;
        Ok(user)
    }

    pub fn set_admin(
        &self,
        session: &Session,
        user_id: &str,
        is_admin: bool,
    ) -> Result<User, TradeError> {
        session.require_admin()?;
        let mut user = self.store.require_user(user_id)?;
        user.is_admin = is_admin;
        self.store.put_user(&user)?;
        Ok(user)
    }

    // offers and requests

    /// Post a public offer. The trade date/time are snapshotted from the
    /// offered food's availability at this instant.
    pub fn create_public_offer(
        &self,
        session: &Session,
        offered_food_id: &str,
        wanted: Wanted,
    ) -> Result<Transaction, TradeError> {
        if offered_food_id.is_empty() {
            return Err(TradeError::NoFoodSelected);
        }
        let food = self
            .store
            .food(offered_food_id)?
            .ok_or_else(|| TradeError::UnknownFood(offered_food_id.to_string()))?;
        if let Wanted::Food(id) = &wanted {
            if self.store.food(id)?.is_none() {
                return Err(TradeError::UnknownFood(id.clone()));
            }
        }

        let offer = Transaction::public_offer(
            utils::mint("trade_")?,
            &session.user_id,
            offered_food_id,
            wanted,
            &food.available_date,
            &food.available_time,
        );
        self.store.put_transaction(&offer)?;
        Ok(offer)
    }

    /// Lazily walk the open public offers visible to this session: pending,
    /// untargeted, not the viewer's own, and passing the filters. Offers whose
    /// food reference dangles are skipped. Restart by calling again.
    pub fn available_offers<'a>(
        &'a self,
        session: &Session,
        filters: OfferFilters,
    ) -> impl Iterator<Item = Result<OfferListing, TradeError>> + 'a {
        let viewer = session.user_id.clone();
        self.store.transactions().filter_map(move |entry| {
            let offer = match entry {
                Ok(tx) => tx,
                Err(e) => return Some(Err(e)),
            };
            if !offer.is_open_public_offer() || offer.from_user_id == viewer {
                return None;
            }
            let food = match self.store.food(&offer.offered_food_id) {
                Ok(Some(food)) => food,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            };
            if !filters.accepts(&food) {
                return None;
            }
            let wanted = match &offer.wanted {
                Wanted::Anything => None,
                Wanted::Food(id) => match self.store.food(id) {
                    Ok(found) => found,
                    Err(e) => return Some(Err(e)),
                },
            };
            Some(Ok(OfferListing {
                offer,
                food,
                wanted,
            }))
        })
    }

    /// Answer a public offer with a directed request. Notifies the offer
    /// owner in-app and by email.
    pub fn send_trade_request(
        &self,
        session: &Session,
        parent_offer_id: &str,
        offered_food_id: &str,
    ) -> Result<Transaction, TradeError> {
        if offered_food_id.is_empty() {
            return Err(TradeError::NoFoodSelected);
        }
        let parent = self
            .store
            .transaction(parent_offer_id)?
            .filter(Transaction::is_open_public_offer)
            .ok_or_else(|| TradeError::OfferNotOpen(parent_offer_id.to_string()))?;
        if parent.from_user_id == session.user_id {
            return Err(TradeError::SelfTrade);
        }
        let offered = self
            .store
            .food(offered_food_id)?
            .ok_or_else(|| TradeError::UnknownFood(offered_food_id.to_string()))?;
        let parent_food = self.store.require_food(&parent.offered_food_id)?;
        let requester = self.store.require_user(&session.user_id)?;
        let owner = self.store.require_user(&parent.from_user_id)?;

        let request = Transaction::request(
            utils::mint("trade_")?,
            &session.user_id,
            &parent,
            offered_food_id,
        );
        self.store.put_transaction(&request)?;

        self.notify(
            &owner.id,
            NotificationKind::TradeRequest,
            format!(
                "{} wants to trade {} for your {}",
                requester.full_name, offered.name, parent_food.name
            ),
            Some(parent.id.clone()),
            Some(requester.id.clone()),
        )?;
        self.send_mail(EmailNotice::TradeRequest {
            to_email: owner.email,
            from_user: requester.full_name,
            food_name: parent_food.name,
            offer_food: offered.name,
            trade_time: parent.trade_time.clone(),
            trade_date: parent.trade_date.clone(),
        });
        Ok(request)
    }

    /// Accept a request addressed to this session. The request and its parent
    /// offer move together (`Accepted` + `Taken`) in one atomic batch, then
    /// both participants' completed-trade counters advance and the requester
    /// is notified.
    pub fn accept_trade_request(
        &self,
        session: &Session,
        request_id: &str,
    ) -> Result<Transaction, TradeError> {
        let mut request = self.store.require_transaction(request_id)?;
        if request.to_user.as_deref() != Some(session.user_id.as_str()) {
            return Err(TradeError::NotRequestRecipient(request_id.to_string()));
        }
        let Some(parent_id) = request.parent_offer_id.clone() else {
            return Err(TradeError::MalformedRecord {
                collection: "transactions",
                id: request.id.clone(),
                reason: "request without a parent offer".to_string(),
            });
        };
        let mut parent = self.store.require_transaction(&parent_id)?;
        let mut responder = self.store.require_user(&session.user_id)?;
        let mut requester = self.store.require_user(&request.from_user_id)?;

        request.advance(TradeAction::Accept)?;
        parent.advance(TradeAction::Take)?;
        self.store.put_transactions_atomic(&[&request, &parent])?;

        responder.record_completed_trade();
        requester.record_completed_trade();
        self.store.put_user(&responder)?;
        self.store.put_user(&requester)?;

        self.notify(
            &requester.id,
            NotificationKind::TradeAccepted,
            format!("{} accepted your trade request", responder.full_name),
            None,
            None,
        )?;

        // the requester receives the food the parent offered
        match &request.wanted {
            Wanted::Food(food_id) => match self.store.food(food_id)? {
                Some(food) => self.send_mail(EmailNotice::TradeAccepted {
                    to_email: requester.email,
                    from_user: responder.full_name,
                    food_name: food.name,
                    trade_time: request.trade_time.clone(),
                    trade_date: request.trade_date.clone(),
                }),
                None => warn!(
                    "skipping acceptance email for {}: food {food_id} is gone",
                    request.id
                ),
            },
            Wanted::Anything => warn!(
                "skipping acceptance email for {}: request wants no specific food",
                request.id
            ),
        }
        Ok(request)
    }

    /// Decline a request addressed to this session. The parent offer stays
    /// `Pending` and remains available to other requesters.
    pub fn decline_trade_request(
        &self,
        session: &Session,
        request_id: &str,
        reason: Option<&str>,
    ) -> Result<Transaction, TradeError> {
        let mut request = self.store.require_transaction(request_id)?;
        if request.to_user.as_deref() != Some(session.user_id.as_str()) {
            return Err(TradeError::NotRequestRecipient(request_id.to_string()));
        }

        request.advance(TradeAction::Decline)?;
        let given_reason = reason.map(str::trim).filter(|r| !r.is_empty());
        let stored_reason = given_reason.unwrap_or("No reason provided").to_string();
        request.decline_reason = Some(stored_reason.clone());
        self.store.put_transaction(&request)?;

        let responder = self.store.require_user(&session.user_id)?;
        let requester = self.store.require_user(&request.from_user_id)?;

        let message = match given_reason {
            Some(reason) => format!(
                "{} declined your trade request: {reason}",
                responder.full_name
            ),
            None => format!("{} declined your trade request", responder.full_name),
        };
        self.notify(
            &requester.id,
            NotificationKind::TradeDeclined,
            message,
            None,
            None,
        )?;
        self.send_mail(EmailNotice::TradeDeclined {
            to_email: requester.email,
            from_user: responder.full_name,
            reason: stored_reason,
        });
        Ok(request)
    }

    /// Withdraw one's own pending public offer. `confirmed` carries the
    /// caller-side confirmation the UI collects before this is invoked.
    pub fn cancel_offer(
        &self,
        session: &Session,
        offer_id: &str,
        confirmed: bool,
    ) -> Result<Transaction, TradeError> {
        if !confirmed {
            return Err(TradeError::NotConfirmed);
        }
        let mut offer = self.store.require_transaction(offer_id)?;
        if offer.from_user_id != session.user_id {
            return Err(TradeError::NotOfferOwner);
        }
        offer.advance(TradeAction::Cancel)?;
        self.store.put_transaction(&offer)?;
        Ok(offer)
    }

    /// Everything the user sent or received, newest first. Dangling food and
    /// user references render as `None` rather than failing the projection.
    pub fn trade_history(&self, user_id: &str) -> Result<Vec<HistoryEntry>, TradeError> {
        let mut entries = Vec::new();
        for entry in self.store.transactions() {
            let transaction = entry?;
            let direction = if transaction.from_user_id == user_id {
                TradeDirection::Sent
            } else if transaction.to_user.as_deref() == Some(user_id) {
                TradeDirection::Received
            } else {
                continue;
            };
            let other_id = match direction {
                TradeDirection::Sent => transaction.to_user.clone(),
                TradeDirection::Received => Some(transaction.from_user_id.clone()),
            };
            let other_user = match other_id {
                Some(id) => self.store.user(&id)?.map(|u| u.full_name),
                None => None,
            };
            let offered_food = self.store.food(&transaction.offered_food_id)?;
            let wanted_food = match &transaction.wanted {
                Wanted::Anything => None,
                Wanted::Food(id) => self.store.food(id)?,
            };
            entries.push(HistoryEntry {
                transaction,
                direction,
                other_user,
                offered_food,
                wanted_food,
            });
        }
        entries.sort_by(|a, b| b.transaction.created_at.cmp(&a.transaction.created_at));
        Ok(entries)
    }

    /// Rate the counterparty of a completed (accepted) trade. Folds the score
    /// into their aggregates in the same operation that records the rating.
    pub fn rate_trade(
        &self,
        session: &Session,
        transaction_id: &str,
        rating: u32,
        comment: &str,
    ) -> Result<Rating, TradeError> {
        if !(1..=5).contains(&rating) {
            return Err(TradeError::RatingOutOfRange(rating));
        }
        let transaction = self.store.require_transaction(transaction_id)?;
        if transaction.status != TradeStatus::Accepted {
            return Err(TradeError::NotCompleted(transaction_id.to_string()));
        }
        let rated_id = if transaction.from_user_id == session.user_id {
            match transaction.to_user.clone() {
                Some(id) => id,
                None => return Err(TradeError::NotParticipant(transaction_id.to_string())),
            }
        } else if transaction.to_user.as_deref() == Some(session.user_id.as_str()) {
            transaction.from_user_id.clone()
        } else {
            return Err(TradeError::NotParticipant(transaction_id.to_string()));
        };

        let mut rated = self.store.require_user(&rated_id)?;
        let record = Rating {
            id: utils::mint("rating_")?,
            from_user_id: session.user_id.clone(),
            to_user_id: rated_id,
            transaction_id: transaction.id.clone(),
            rating,
            comment: comment.to_string(),
            created_at: TimeStamp::new(),
        };
        self.store.put_rating(&record)?;
        rated.record_rating(rating);
        self.store.put_user(&rated)?;
        Ok(record)
    }

    // notification projection

    /// The user's feed: most recent first, capped at [`FEED_LIMIT`].
    pub fn notifications_for(&self, session: &Session) -> Result<Vec<Notification>, TradeError> {
        let mut notes = self.store.notifications_for(&session.user_id)?;
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notes.truncate(FEED_LIMIT);
        Ok(notes)
    }

    pub fn unread_count(&self, session: &Session) -> Result<usize, TradeError> {
        let notes = self.store.notifications_for(&session.user_id)?;
        Ok(notes.iter().filter(|note| !note.read).count())
    }

    pub fn mark_all_notifications_read(&self, session: &Session) -> Result<(), TradeError> {
        self.store.mark_all_read(&session.user_id)
    }

    pub fn clear_all_notifications(&self, session: &Session) -> Result<(), TradeError> {
        self.store.clear_notifications_for(&session.user_id)
    }

    // admin catalog

    pub fn add_food(&self, session: &Session, new: NewFood) -> Result<Food, TradeError> {
        session.require_admin()?;
        if new.name.trim().is_empty() {
            return Err(TradeError::EmptyFoodName);
        }
        let food = Food::new(utils::mint("food_")?, new);
        self.store.put_food(&food)?;
        Ok(food)
    }

    pub fn update_food(
        &self,
        session: &Session,
        food_id: &str,
        new: NewFood,
    ) -> Result<Food, TradeError> {
        session.require_admin()?;
        if new.name.trim().is_empty() {
            return Err(TradeError::EmptyFoodName);
        }
        let existing = self.store.require_food(food_id)?;
        let mut food = Food::new(existing.id, new);
        food.created_at = existing.created_at;
        self.store.put_food(&food)?;
        Ok(food)
    }

    /// Remove a catalog entry. Existing transactions keep their reference and
    /// simply stop resolving it; listings skip such offers.
    pub fn remove_food(&self, session: &Session, food_id: &str) -> Result<(), TradeError> {
        session.require_admin()?;
        if !self.store.remove_food(food_id)? {
            return Err(TradeError::FoodNotFound(food_id.to_string()));
        }
        Ok(())
    }

    pub fn food(&self, food_id: &str) -> Result<Option<Food>, TradeError> {
        self.store.food(food_id)
    }

    pub fn foods(&self) -> impl Iterator<Item = Result<Food, TradeError>> + '_ {
        self.store.foods()
    }

    /// Insert the product's three sample foods when the catalog is empty.
    /// Returns how many were added (0 if the catalog already has entries).
    pub fn seed_sample_foods(&self, session: &Session) -> Result<usize, TradeError> {
        session.require_admin()?;
        if let Some(first) = self.store.foods().next() {
            first?;
            return Ok(0);
        }
        let samples = sample_foods()
            .into_iter()
            .map(|sample| Ok(Food::new(utils::mint("food_")?, sample)))
            .collect::<Result<Vec<_>, TradeError>>()?;
        self.store.put_foods_atomic(&samples)?;
        Ok(samples.len())
    }

    // side-effect helpers

    fn notify(
        &self,
        user_id: &str,
        kind: NotificationKind,
        message: String,
        transaction_id: Option<String>,
        from_user_id: Option<String>,
    ) -> Result<Notification, TradeError> {
        let note = Notification {
            id: utils::mint("note_")?,
            user_id: user_id.to_string(),
            kind,
            message,
            read: false,
            created_at: TimeStamp::new(),
            transaction_id,
            from_user_id,
        };
        self.store.put_notification(&note)?;
        Ok(note)
    }

    fn send_mail(&self, notice: EmailNotice) {
        if let Err(err) = self.mailer.deliver(&notice) {
            warn!("email dispatch failed, continuing: {err}");
        }
    }
}

fn sample_foods() -> Vec<NewFood> {
    vec![
        NewFood {
            name: "Grilled Chicken Sandwich".into(),
            calories: 350,
            protein: 25,
            carbs: 30,
            fat: 12,
            meal_type: MealType::Lunch,
            available_date: "2025-03-20".into(),
            available_time: "12:30".into(),
            allergy_warnings: vec!["none".into()],
            nutrients_importance: "High protein for muscle repair".into(),
        },
        NewFood {
            name: "Greek Yogurt Parfait".into(),
            calories: 280,
            protein: 15,
            carbs: 45,
            fat: 8,
            meal_type: MealType::Breakfast,
            available_date: "2025-03-20".into(),
            available_time: "08:00".into(),
            allergy_warnings: vec!["dairy".into()],
            nutrients_importance: "Calcium for bone health".into(),
        },
        NewFood {
            name: "Vegetable Stir Fry".into(),
            calories: 320,
            protein: 12,
            carbs: 40,
            fat: 10,
            meal_type: MealType::Dinner,
            available_date: "2025-03-20".into(),
            available_time: "18:00".into(),
            allergy_warnings: vec!["soy".into()],
            nutrients_importance: "Rich in vitamins and fiber".into(),
        },
    ]
}
