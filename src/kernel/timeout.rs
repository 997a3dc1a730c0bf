// Millisecond timeouts shared by every blocking call
//
// u32::MAX means "no timeout", 0 means "poll once".

use std::time::{Duration, Instant};

/// Block with no timeout.
pub const FOREVER: u32 = u32::MAX;

/// Absolute deadline for a timeout, `None` for [`FOREVER`].
pub(crate) fn deadline(timeout_ms: u32) -> Option<Instant> {
    if timeout_ms == FOREVER {
        None
    } else {
        Some(Instant::now() + Duration::from_millis(timeout_ms as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forever_has_no_deadline() {
        assert!(deadline(FOREVER).is_none());
    }

    #[test]
    fn zero_is_already_due() {
        let d = deadline(0).unwrap();
        assert!(d <= Instant::now());
    }

    #[test]
    fn finite_deadline_is_in_the_future() {
        let before = Instant::now();
        let d = deadline(50).unwrap();
        assert!(d >= before + Duration::from_millis(50));
    }
}
