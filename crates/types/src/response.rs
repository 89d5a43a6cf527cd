//! Classification of native callback deliveries.

use std::fmt;

/// Lowest response code reserved for application-defined event categories.
pub const CUSTOM_KIND_BASE: u32 = 100;

/// What a single callback delivery means for its request.
///
/// Custom kinds carry an application subtype tag (processing events,
/// subscription events, ...). The correlator treats every custom kind as a
/// streamed payload and leaves the subtype to the typed wrapper layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    /// Result payload, terminal when `finished` is set.
    Success,
    /// Native-reported error, always terminal.
    Error,
    /// No payload; only the `finished` flag matters.
    Nop,
    /// Streamed event with an application subtype (>= 100).
    Custom(u32),
}

impl ResponseKind {
    /// Classify a raw response code.
    ///
    /// Returns `None` for the reserved range `3..100`.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(ResponseKind::Success),
            1 => Some(ResponseKind::Error),
            2 => Some(ResponseKind::Nop),
            n if n >= CUSTOM_KIND_BASE => Some(ResponseKind::Custom(n)),
            _ => None,
        }
    }

    /// Raw response code as used on the native boundary.
    pub fn code(&self) -> u32 {
        match self {
            ResponseKind::Success => 0,
            ResponseKind::Error => 1,
            ResponseKind::Nop => 2,
            ResponseKind::Custom(n) => *n,
        }
    }

    /// Whether this kind delivers an event into a stream.
    pub fn is_streamed(&self) -> bool {
        matches!(self, ResponseKind::Custom(_))
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseKind::Success => write!(f, "Success"),
            ResponseKind::Error => write!(f, "Error"),
            ResponseKind::Nop => write!(f, "Nop"),
            ResponseKind::Custom(n) => write!(f, "Custom({})", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(ResponseKind::from_code(0), Some(ResponseKind::Success));
        assert_eq!(ResponseKind::from_code(1), Some(ResponseKind::Error));
        assert_eq!(ResponseKind::from_code(2), Some(ResponseKind::Nop));
        assert_eq!(ResponseKind::from_code(100), Some(ResponseKind::Custom(100)));
        assert_eq!(ResponseKind::from_code(4242), Some(ResponseKind::Custom(4242)));
    }

    #[test]
    fn test_reserved_range_is_unknown() {
        for code in 3..CUSTOM_KIND_BASE {
            assert_eq!(ResponseKind::from_code(code), None, "code {} should be unknown", code);
        }
    }

    #[test]
    fn test_code_inverts_from_code() {
        for kind in [
            ResponseKind::Success,
            ResponseKind::Error,
            ResponseKind::Nop,
            ResponseKind::Custom(101),
        ] {
            assert_eq!(ResponseKind::from_code(kind.code()), Some(kind));
        }
        assert!(ResponseKind::Custom(100).is_streamed());
        assert!(!ResponseKind::Success.is_streamed());
    }
}
