//! TTL (time-to-live) support for cached query results.
//!
//! Every cache entry carries an absolute `expires_at` timestamp computed at
//! write time as `created_at + ttl`. An entry stays valid up to and including
//! that instant and is treated as stale strictly after it.

use chrono::{DateTime, Duration, Utc};

/// Default lifetime of a cached response: 10 minutes.
pub const DEFAULT_CACHE_TTL: Duration = Duration::minutes(10);

/// Default lifetime in whole minutes, as exposed on the command line.
pub const DEFAULT_CACHE_TTL_MINUTES: i64 = 10;

/// Convert a `--cache-expiration` minute count into a [`chrono::Duration`].
///
/// Zero is accepted and yields entries that expire immediately after they
/// are written. Negative values are rejected, as are lifetimes whose expiry
/// would fall past the last representable timestamp.
pub fn ttl_from_minutes(minutes: i64) -> Result<Duration, String> {
    if minutes < 0 {
        return Err(format!("cache expiration must not be negative, got {minutes}"));
    }
    let out_of_range = || format!("cache expiration of {minutes} minutes is out of range");
    let ttl = Duration::try_minutes(minutes).ok_or_else(out_of_range)?;
    Utc::now().checked_add_signed(ttl).ok_or_else(out_of_range)?;
    Ok(ttl)
}

/// Compute the absolute expiry for an entry created at `created_at`.
///
/// Saturates at [`DateTime::<Utc>::MAX_UTC`] instead of overflowing.
pub fn compute_expires_at(created_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    created_at
        .checked_add_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// An entry is expired once `now` is strictly past its `expires_at`.
pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now > expires_at
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // --- ttl_from_minutes ---

    #[test]
    fn test_ttl_from_minutes_default() {
        let d = ttl_from_minutes(DEFAULT_CACHE_TTL_MINUTES).unwrap();
        assert_eq!(d, DEFAULT_CACHE_TTL);
    }

    #[test]
    fn test_ttl_from_minutes_zero() {
        assert_eq!(ttl_from_minutes(0).unwrap(), Duration::zero());
    }

    #[test]
    fn test_ttl_from_minutes_hours_worth() {
        assert_eq!(ttl_from_minutes(90).unwrap(), Duration::minutes(90));
    }

    #[test]
    fn test_ttl_from_minutes_negative() {
        assert!(ttl_from_minutes(-1).is_err());
    }

    #[test]
    fn test_ttl_from_minutes_overflow() {
        assert!(ttl_from_minutes(i64::MAX).is_err());
    }

    #[test]
    fn test_ttl_from_minutes_past_max_timestamp() {
        // Representable as a Duration, but not once added to the clock.
        assert!(Duration::try_minutes(1_000_000_000_000).is_some());
        assert!(ttl_from_minutes(1_000_000_000_000).is_err());
    }

    // --- compute_expires_at ---

    #[test]
    fn test_compute_expires_at_adds_ttl() {
        let created = Utc::now();
        let expires = compute_expires_at(created, Duration::minutes(10));
        assert_eq!(expires - created, Duration::minutes(10));
    }

    #[test]
    fn test_compute_expires_at_saturates() {
        let created = Utc::now();
        let ttl = Duration::try_minutes(1_000_000_000_000).unwrap();
        assert_eq!(compute_expires_at(created, ttl), DateTime::<Utc>::MAX_UTC);
    }

    // --- is_expired ---

    #[test]
    fn test_not_expired_before_deadline() {
        let now = Utc::now();
        assert!(!is_expired(now + Duration::minutes(1), now));
    }

    #[test]
    fn test_not_expired_at_deadline() {
        let now = Utc::now();
        assert!(!is_expired(now, now));
    }

    #[test]
    fn test_expired_past_deadline() {
        let now = Utc::now();
        assert!(is_expired(now - Duration::seconds(1), now));
    }
}
