//! Session identity.

use crate::UserId;

/// Who the current session belongs to.
///
/// The cart is backed by local storage for [`Identity::Anonymous`] and by
/// remote rows for [`Identity::Authenticated`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Identity {
    /// No stable identity.
    #[default]
    Anonymous,
    /// A signed-in user.
    Authenticated(UserId),
}

impl Identity {
    /// Returns `true` for a signed-in user.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// The signed-in user's ID, if any.
    #[must_use]
    pub const fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(id) => Some(id),
        }
    }
}

impl From<Option<UserId>> for Identity {
    fn from(user: Option<UserId>) -> Self {
        user.map_or(Self::Anonymous, Self::Authenticated)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::Authenticated(id) => write!(f, "user:{id}"),
        }
    }
}
