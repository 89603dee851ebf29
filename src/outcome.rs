use crate::poller::Verification;

/// Two-valued verification result returned to callers.
///
/// `Failure` covers both an explicit rejection and a challenge that was never
/// answered before the deadline; use the `*_detailed` client operations to
/// tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Outcome {
    Success = 1,
    Failure = 2,
}

impl Outcome {
    /// Numeric response code (`1` success, `2` failure).
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl From<Verification> for Outcome {
    fn from(verification: Verification) -> Self {
        match verification {
            Verification::Success => Self::Success,
            Verification::Rejected | Verification::TimedOut => Self::Failure,
        }
    }
}
