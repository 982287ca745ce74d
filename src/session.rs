//! Explicit session context for lifecycle operations
//!
//! Every operation takes a [`Session`] instead of consulting ambient state.
//! Sessions are produced from the external identity provider's handle; the
//! engine trusts them and only checks the flags they carry.
use crate::error::TradeError;
use crate::user::User;

/// Opaque authenticated-user handle returned by the identity provider.
#[derive(Debug, Clone)]
pub struct AuthHandle {
    pub uid: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub is_admin: bool,
}

impl Session {
    /// A session for a freshly authenticated handle. Admin rights are never
    /// granted this way; they come from the stored user record.
    pub fn authenticated(handle: &AuthHandle) -> Result<Self, TradeError> {
        if handle.uid.is_empty() {
            return Err(TradeError::EmptyIdentity);
        }
        Ok(Self {
            user_id: handle.uid.clone(),
            is_admin: false,
        })
    }

    pub fn for_user(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            is_admin: user.is_admin,
        }
    }

    pub fn require_admin(&self) -> Result<(), TradeError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(TradeError::AdminOnly)
        }
    }
}
