//! Freshness gate for stored profiles.

use chrono::DateTime;
use std::time::Duration;

use crate::models::UserRecord;

/// Whether `user`'s stored profile must be rebuilt before it is served.
///
/// Fresh means a profile and its generation time are both present and the
/// user's last activity is less than `threshold` after generation. Timestamps
/// that fail to parse always count as stale.
pub fn needs_regeneration(user: &UserRecord, threshold: Duration) -> bool {
    let generated_at = match (&user.profile, &user.profile_generated_at) {
        (Some(_), Some(generated_at)) => generated_at,
        _ => return true,
    };

    let (updated, generated) = match (
        DateTime::parse_from_rfc3339(&user.updated_at),
        DateTime::parse_from_rfc3339(generated_at),
    ) {
        (Ok(updated), Ok(generated)) => (updated, generated),
        _ => return true,
    };

    let threshold = match chrono::Duration::from_std(threshold) {
        Ok(threshold) => threshold,
        Err(_) => return true,
    };

    updated.signed_duration_since(generated) >= threshold
}
