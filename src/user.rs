//! User records, profile edits, and rating aggregates
use chrono::Utc;

use crate::trade::TimeStamp;

/// A marketplace member. The id comes from the external identity provider.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct User {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub full_name: String,
    #[n(2)]
    pub username: String,
    #[n(3)]
    pub email: String,
    #[n(4)]
    pub grade: String,
    #[n(5)]
    pub description: String,
    #[n(6)]
    pub is_admin: bool,
    #[n(7)]
    pub dark_mode: bool,
    #[n(8)]
    pub trades_completed: u32,
    #[n(9)]
    pub total_rating: u32,
    #[n(10)]
    pub rating_count: u32,
    /// Derived: `total_rating / rating_count`, or zero before the first
    /// rating. Never written independently of the other two fields.
    #[n(11)]
    pub average_rating: f64,
    #[n(12)]
    pub created_at: TimeStamp<Utc>,
}

impl User {
    /// A fresh account with the product's signup defaults. `grade` is the
    /// bare grade number as entered on the form.
    pub fn register(id: String, full_name: &str, username: &str, email: &str, grade: &str) -> Self {
        Self {
            id,
            full_name: full_name.to_string(),
            username: username.to_string(),
            email: email.to_string(),
            grade: format!("Grade {grade}"),
            description: format!("Hello! I'm a Grade {grade} student."),
            is_admin: false,
            dark_mode: false,
            trades_completed: 0,
            total_rating: 0,
            rating_count: 0,
            average_rating: 0.0,
            created_at: TimeStamp::new(),
        }
    }

    /// Fold a 1-5 score into the aggregates, keeping the average derived.
    pub fn record_rating(&mut self, rating: u32) {
        self.total_rating += rating;
        self.rating_count += 1;
        self.average_rating = f64::from(self.total_rating) / f64::from(self.rating_count);
    }

    pub fn record_completed_trade(&mut self) {
        self.trades_completed += 1;
    }
}

/// The subset of profile fields a user may edit about themselves.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub full_name: Option<String>,
    pub grade: Option<String>,
    pub description: Option<String>,
    pub dark_mode: Option<bool>,
}

impl ProfileChanges {
    pub fn apply(self, user: &mut User) {
        if let Some(full_name) = self.full_name {
            user.full_name = full_name;
        }
        if let Some(grade) = self.grade {
            user.grade = grade;
        }
        if let Some(description) = self.description {
            user.description = description;
        }
        if let Some(dark_mode) = self.dark_mode {
            user.dark_mode = dark_mode;
        }
    }
}

/// One submitted rating for a completed trade.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Rating {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub from_user_id: String,
    #[n(2)]
    pub to_user_id: String,
    #[n(3)]
    pub transaction_id: String,
    #[n(4)]
    pub rating: u32,
    #[n(5)]
    pub comment: String,
    #[n(6)]
    pub created_at: TimeStamp<Utc>,
}
