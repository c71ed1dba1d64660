use crate::domain::UserId;

/// Only the configured operator may mutate subscriptions.
///
/// Messages without a sender (channel posts, anonymous admins) are rejected.
pub fn is_authorized(user_id: Option<UserId>, admin_user_id: i64) -> bool {
    matches!(user_id, Some(UserId(id)) if id == admin_user_id)
}
