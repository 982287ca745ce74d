//! Typed document store over sled
//!
//! One named tree per collection. Records are encoded with minicbor and
//! validated on the way in and out: bytes that fail to decode, and
//! transactions whose shape breaks the lifecycle invariants, surface as
//! errors instead of being trusted.
use std::sync::Arc;

use sled::{Batch, Db, Tree};

use crate::error::TradeError;
use crate::food::Food;
use crate::notification::Notification;
use crate::trade::Transaction;
use crate::user::{Rating, User};

pub struct TradeStore {
    users: Tree,
    foods: Tree,
    transactions: Tree,
    notifications: Tree,
    ratings: Tree,
}

fn encode_record<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, TradeError> {
    minicbor::to_vec(value).map_err(|e| TradeError::Codec(e.to_string()))
}

fn decode_record<T>(collection: &'static str, id: &str, bytes: &[u8]) -> Result<T, TradeError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    minicbor::decode(bytes).map_err(|e| TradeError::MalformedRecord {
        collection,
        id: id.to_string(),
        reason: e.to_string(),
    })
}

impl TradeStore {
    pub fn open(db: Arc<Db>) -> Result<Self, TradeError> {
        Ok(Self {
            users: db.open_tree("users")?,
            foods: db.open_tree("foods")?,
            transactions: db.open_tree("transactions")?,
            notifications: db.open_tree("notifications")?,
            ratings: db.open_tree("ratings")?,
        })
    }

    // users

    pub fn put_user(&self, user: &User) -> Result<(), TradeError> {
        self.users.insert(user.id.as_bytes(), encode_record(user)?)?;
        Ok(())
    }

    pub fn user(&self, id: &str) -> Result<Option<User>, TradeError> {
        match self.users.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode_record("users", id, &bytes)?)),
            None => Ok(None),
        }
    }

    pub fn require_user(&self, id: &str) -> Result<User, TradeError> {
        self.user(id)?
            .ok_or_else(|| TradeError::UserNotFound(id.to_string()))
    }

    // foods

    pub fn put_food(&self, food: &Food) -> Result<(), TradeError> {
        self.foods.insert(food.id.as_bytes(), encode_record(food)?)?;
        Ok(())
    }

    /// Insert a set of foods in one atomic batch.
    pub fn put_foods_atomic(&self, foods: &[Food]) -> Result<(), TradeError> {
        let mut batch = Batch::default();
        for food in foods {
            batch.insert(food.id.as_bytes(), encode_record(food)?);
        }
        self.foods.apply_batch(batch)?;
        Ok(())
    }

    pub fn food(&self, id: &str) -> Result<Option<Food>, TradeError> {
        match self.foods.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode_record("foods", id, &bytes)?)),
            None => Ok(None),
        }
    }

    pub fn require_food(&self, id: &str) -> Result<Food, TradeError> {
        self.food(id)?
            .ok_or_else(|| TradeError::FoodNotFound(id.to_string()))
    }

    /// Remove a catalog entry. Transactions referencing it keep their dangling
    /// id; listings skip those records.
    pub fn remove_food(&self, id: &str) -> Result<bool, TradeError> {
        Ok(self.foods.remove(id.as_bytes())?.is_some())
    }

    pub fn foods(&self) -> impl Iterator<Item = Result<Food, TradeError>> + '_ {
        self.foods.iter().map(|entry| {
            let (key, bytes) = entry?;
            let id = String::from_utf8_lossy(&key);
            decode_record("foods", &id, &bytes)
        })
    }

    // transactions

    pub fn put_transaction(&self, tx: &Transaction) -> Result<(), TradeError> {
        tx.validate_shape()?;
        self.transactions.insert(tx.id.as_bytes(), encode_record(tx)?)?;
        Ok(())
    }

    /// Write several transactions as one all-or-nothing batch. Used by accept,
    /// where the request and its parent offer must never be observed torn.
    pub fn put_transactions_atomic(&self, records: &[&Transaction]) -> Result<(), TradeError> {
        let mut batch = Batch::default();
        for tx in records {
            tx.validate_shape()?;
            batch.insert(tx.id.as_bytes(), encode_record(*tx)?);
        }
        self.transactions.apply_batch(batch)?;
        Ok(())
    }

    pub fn transaction(&self, id: &str) -> Result<Option<Transaction>, TradeError> {
        match self.transactions.get(id.as_bytes())? {
            Some(bytes) => {
                let tx: Transaction = decode_record("transactions", id, &bytes)?;
                tx.validate_shape()?;
                Ok(Some(tx))
            }
            None => Ok(None),
        }
    }

    pub fn require_transaction(&self, id: &str) -> Result<Transaction, TradeError> {
        self.transaction(id)?
            .ok_or_else(|| TradeError::TransactionNotFound(id.to_string()))
    }

    pub fn transactions(&self) -> impl Iterator<Item = Result<Transaction, TradeError>> + '_ {
        self.transactions.iter().map(|entry| {
            let (key, bytes) = entry?;
            let id = String::from_utf8_lossy(&key);
            let tx: Transaction = decode_record("transactions", &id, &bytes)?;
            tx.validate_shape()?;
            Ok(tx)
        })
    }

    // notifications

    pub fn put_notification(&self, note: &Notification) -> Result<(), TradeError> {
        self.notifications
            .insert(note.id.as_bytes(), encode_record(note)?)?;
        Ok(())
    }

    /// All of one user's notifications, in no particular order. Callers sort
    /// and cap for the feed.
    pub fn notifications_for(&self, user_id: &str) -> Result<Vec<Notification>, TradeError> {
        let mut notes = Vec::new();
        for entry in self.notifications.iter() {
            let (key, bytes) = entry?;
            let id = String::from_utf8_lossy(&key);
            let note: Notification = decode_record("notifications", &id, &bytes)?;
            if note.user_id == user_id {
                notes.push(note);
            }
        }
        Ok(notes)
    }

    /// Flip every unread notification for the user in one batch. Idempotent.
    pub fn mark_all_read(&self, user_id: &str) -> Result<(), TradeError> {
        let mut batch = Batch::default();
        let mut dirty = false;
        for entry in self.notifications.iter() {
            let (key, bytes) = entry?;
            let id = String::from_utf8_lossy(&key).to_string();
            let mut note: Notification = decode_record("notifications", &id, &bytes)?;
            if note.user_id != user_id || note.read {
                continue;
            }
            note.read = true;
            batch.insert(key, encode_record(&note)?);
            dirty = true;
        }
        if dirty {
            self.notifications.apply_batch(batch)?;
        }
        Ok(())
    }

    /// Delete every notification for the user in one batch. Idempotent.
    pub fn clear_notifications_for(&self, user_id: &str) -> Result<(), TradeError> {
        let mut batch = Batch::default();
        let mut dirty = false;
        for entry in self.notifications.iter() {
            let (key, bytes) = entry?;
            let id = String::from_utf8_lossy(&key);
            let note: Notification = decode_record("notifications", &id, &bytes)?;
            if note.user_id == user_id {
                batch.remove(key);
                dirty = true;
            }
        }
        if dirty {
            self.notifications.apply_batch(batch)?;
        }
        Ok(())
    }

    // ratings

    pub fn put_rating(&self, rating: &Rating) -> Result<(), TradeError> {
        self.ratings
            .insert(rating.id.as_bytes(), encode_record(rating)?)?;
        Ok(())
    }
}
