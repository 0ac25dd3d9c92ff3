/// Item lifecycle definitions for a harvest pass
///
/// Each application moves `Navigating -> {NoRecords, HasRecords} -> Done`,
/// or straight from `Navigating` to `Done` when its listing never loads.
use std::fmt;

/// The phase of one application inside a harvest session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemPhase {
    /// Loading the listing for the application
    Navigating,

    /// The listing reported zero matches
    NoRecords,

    /// The listing has rows; artifacts are being enumerated
    HasRecords,

    /// The ledger row has been built
    Done,
}

impl ItemPhase {
    /// Returns true if moving from `self` to `next` is a legal step
    pub fn can_transition_to(&self, next: ItemPhase) -> bool {
        matches!(
            (self, next),
            (Self::Navigating, Self::NoRecords)
                | (Self::Navigating, Self::HasRecords)
                | (Self::Navigating, Self::Done)
                | (Self::NoRecords, Self::Done)
                | (Self::HasRecords, Self::Done)
        )
    }

    /// Performs a checked transition
    pub fn transition(self, next: ItemPhase) -> Result<ItemPhase, crate::HarvestError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(crate::HarvestError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigating => "navigating",
            Self::NoRecords => "no_records",
            Self::HasRecords => "has_records",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for ItemPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a successfully loaded listing said about the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalState {
    /// The portal reported "0 of 0" matching records
    NoRecords,

    /// The listing had rows (possibly without any observation letters)
    HasRecords,
}

impl TerminalState {
    /// Value of the `no_record_found` ledger column
    pub fn no_record_flag(&self) -> u8 {
        match self {
            Self::NoRecords => 1,
            Self::HasRecords => 0,
        }
    }

    pub fn from_no_record_flag(flag: bool) -> Self {
        if flag {
            Self::NoRecords
        } else {
            Self::HasRecords
        }
    }
}
