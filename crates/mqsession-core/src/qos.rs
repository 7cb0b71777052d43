//! Quality of Service levels.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Quality of Service levels.
///
/// Ordered so that the maximum over a set of matching subscriptions is the
/// level a message is delivered at.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
#[allow(clippy::enum_variant_names)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    /// Returns true for at-least-once (and stronger) delivery classes.
    #[inline]
    pub fn is_guaranteed(self) -> bool {
        self != QoS::AtMostOnce
    }
}

impl TryFrom<u8> for QoS {
    type Error = Error;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(Error::InvalidQoS(value)),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_picks_highest() {
        let levels = [QoS::AtMostOnce, QoS::AtLeastOnce, QoS::AtMostOnce];
        assert_eq!(levels.iter().copied().max(), Some(QoS::AtLeastOnce));
    }

    #[test]
    fn test_try_from_rejects_out_of_range() {
        assert_eq!(QoS::try_from(1), Ok(QoS::AtLeastOnce));
        assert_eq!(QoS::try_from(3), Err(Error::InvalidQoS(3)));
    }

    #[test]
    fn test_guaranteed() {
        assert!(!QoS::AtMostOnce.is_guaranteed());
        assert!(QoS::AtLeastOnce.is_guaranteed());
        assert!(QoS::ExactlyOnce.is_guaranteed());
    }
}
