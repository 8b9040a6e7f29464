//! Timestamp freshness check that runs before any cryptographic work.

use crate::error::ProtocolError;

/// Default tolerance window in seconds.
pub const DEFAULT_WINDOW_SECS: u64 = 300;

/// Rejects requests whose timestamp is older than the tolerance window.
///
/// Timestamps from the future are accepted unless a maximum skew is set with
/// [`ReplayGuard::with_max_future_skew`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayGuard {
    window_secs: u64,
    max_future_skew_secs: Option<u64>,
}

impl ReplayGuard {
    /// Create a guard with the given tolerance window.
    pub fn new(window_secs: u64) -> Self {
        Self {
            window_secs,
            max_future_skew_secs: None,
        }
    }

    /// Also reject timestamps more than `secs` ahead of the server clock.
    pub fn with_max_future_skew(mut self, secs: u64) -> Self {
        self.max_future_skew_secs = Some(secs);
        self
    }

    /// Parse the timestamp header and check it against `now`.
    ///
    /// Returns the parsed timestamp on success.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::MalformedTimestamp`] if the header is absent or not an integer.
    /// - [`ProtocolError::ExpiredTimestamp`] if `now - timestamp > window`.
    /// - [`ProtocolError::FutureTimestamp`] if a future skew limit is set and exceeded.
    pub fn check_header(&self, header: Option<&str>, now: i64) -> Result<i64, ProtocolError> {
        let timestamp = parse_timestamp(header)?;
        check(timestamp, now, self.window_secs)?;
        if let Some(max_skew_secs) = self.max_future_skew_secs {
            let ahead_secs = timestamp.saturating_sub(now);
            if ahead_secs > clamp(max_skew_secs) {
                return Err(ProtocolError::FutureTimestamp {
                    ahead_secs,
                    max_skew_secs,
                });
            }
        }
        Ok(timestamp)
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECS)
    }
}

/// Staleness check. The boundary is inclusive: an age equal to the window passes.
///
/// # Errors
///
/// Returns [`ProtocolError::ExpiredTimestamp`] if `now - timestamp > window_secs`.
pub fn check(timestamp: i64, now: i64, window_secs: u64) -> Result<(), ProtocolError> {
    let age_secs = now.saturating_sub(timestamp);
    if age_secs > clamp(window_secs) {
        return Err(ProtocolError::ExpiredTimestamp {
            age_secs,
            window_secs,
        });
    }
    Ok(())
}

fn parse_timestamp(header: Option<&str>) -> Result<i64, ProtocolError> {
    header
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or(ProtocolError::MalformedTimestamp)
}

fn clamp(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}
