//! Observation positions and their ledger encoding
//!
//! Every artifact found in an application's listing occupies exactly one
//! position, whether or not it could be fetched. A position holds either the
//! resolved locator of the letter or one of two sentinels.

use std::collections::BTreeSet;
use std::fmt;

/// Ledger spelling of a position whose artifact could not be fetched
pub const FAILED_SENTINEL: &str = "DOWNLOAD_FAILED";

/// Ledger spelling of a position whose artifact was already on disk
pub const PRESENT_SENTINEL: &str = "EXISTS";

/// Separator between positions in the `observation_urls` column
pub const POSITION_SEPARATOR: char = ';';

/// One slot in an application's artifact list
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObservationPosition {
    /// The artifact was resolved to this locator
    Resolved(String),

    /// The artifact exists but resolving or fetching it failed
    Failed,

    /// The artifact was already present locally and was not fetched again
    AlreadyPresent,
}

impl ObservationPosition {
    /// Parses one token of the `observation_urls` column
    ///
    /// Both spellings used by earlier passes are accepted for each sentinel.
    /// An empty token cannot be a locator, so it is read as a failure and
    /// becomes eligible for a targeted re-fetch.
    pub fn parse(token: &str) -> Self {
        match token.trim() {
            "" | FAILED_SENTINEL | "FAILED" => Self::Failed,
            PRESENT_SENTINEL | "ALREADY_PRESENT" => Self::AlreadyPresent,
            locator => Self::Resolved(unescape_locator(locator)),
        }
    }

    /// Returns the token written to the ledger for this position
    pub fn to_ledger_token(&self) -> String {
        match self {
            Self::Resolved(locator) => escape_locator(locator),
            Self::Failed => FAILED_SENTINEL.to_string(),
            Self::AlreadyPresent => PRESENT_SENTINEL.to_string(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Returns the locator if this position was resolved
    pub fn locator(&self) -> Option<&str> {
        match self {
            Self::Resolved(locator) => Some(locator),
            _ => None,
        }
    }

    /// Short status name used in exports
    pub fn status(&self) -> &'static str {
        match self {
            Self::Resolved(_) => "resolved",
            Self::Failed => "failed",
            Self::AlreadyPresent => "already_present",
        }
    }
}

/// Escape sequences that can appear in a ledger locator
const ESCAPED_SEPARATOR: &str = "%3B";
const ESCAPED_PERCENT: &str = "%25";

fn is_escape(rest: &str) -> bool {
    rest.starts_with(ESCAPED_PERCENT)
        || rest
            .get(..ESCAPED_SEPARATOR.len())
            .map_or(false, |head| head.eq_ignore_ascii_case(ESCAPED_SEPARATOR))
}

/// Writes `;` as `%3B`, and `%` as `%25` only where it would otherwise read
/// back as one of those two escapes
///
/// Ordinary percent-encoded locators such as `a%20b` are written unchanged.
fn escape_locator(locator: &str) -> String {
    let mut out = String::with_capacity(locator.len());
    for (i, c) in locator.char_indices() {
        match c {
            POSITION_SEPARATOR => out.push_str(ESCAPED_SEPARATOR),
            '%' if is_escape(&locator[i..]) => out.push_str(ESCAPED_PERCENT),
            _ => out.push(c),
        }
    }
    out
}

fn unescape_locator(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut rest = token;
    while let Some(c) = rest.chars().next() {
        if c == '%' && is_escape(rest) {
            if rest.starts_with(ESCAPED_PERCENT) {
                out.push('%');
            } else {
                out.push(POSITION_SEPARATOR);
            }
            rest = &rest[3..];
        } else {
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }
    out
}

impl fmt::Display for ObservationPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ledger_token())
    }
}

/// The ordered, position-indexed artifact list of one application
///
/// Indices are global across all pages of the listing. The length is the
/// number of artifacts discovered, independent of how many were fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Positions(Vec<ObservationPosition>);

impl Positions {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_vec(positions: Vec<ObservationPosition>) -> Self {
        Self(positions)
    }

    /// Parses the semicolon-joined `observation_urls` column
    ///
    /// Empty cells (and the `nan` that spreadsheet tooling writes for them)
    /// are an empty list.
    pub fn parse_ledger(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
            return Self::new();
        }

        Self(
            raw.split(POSITION_SEPARATOR)
                .map(ObservationPosition::parse)
                .collect(),
        )
    }

    /// Serializes the list for the `observation_urls` column
    pub fn to_ledger_string(&self) -> String {
        self.0
            .iter()
            .map(ObservationPosition::to_ledger_token)
            .collect::<Vec<_>>()
            .join(&POSITION_SEPARATOR.to_string())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ObservationPosition> {
        self.0.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObservationPosition> {
        self.0.iter()
    }

    pub fn push(&mut self, position: ObservationPosition) {
        self.0.push(position);
    }

    /// Overwrites an existing slot; out-of-range indices are ignored so the
    /// length can never change through this method
    pub fn set(&mut self, index: usize, position: ObservationPosition) -> bool {
        match self.0.get_mut(index) {
            Some(slot) => {
                *slot = position;
                true
            }
            None => false,
        }
    }

    /// Indices holding the failure sentinel
    pub fn failed_indices(&self) -> BTreeSet<usize> {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_failed())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        self.0.iter().any(ObservationPosition::is_failed)
    }

    /// Counts of (resolved, failed, already present) positions
    pub fn tally(&self) -> (usize, usize, usize) {
        self.0.iter().fold((0, 0, 0), |(r, f, p), position| match position {
            ObservationPosition::Resolved(_) => (r + 1, f, p),
            ObservationPosition::Failed => (r, f + 1, p),
            ObservationPosition::AlreadyPresent => (r, f, p + 1),
        })
    }
}

impl FromIterator<ObservationPosition> for Positions {
    fn from_iter<I: IntoIterator<Item = ObservationPosition>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Parses the comma-joined `failed_positions` column of a download worklist
///
/// Tokens that are not integers are dropped.
pub fn parse_failed_indices(raw: &str) -> BTreeSet<usize> {
    raw.split(',')
        .filter_map(|part| {
            let part = part.trim();
            // Spreadsheet round-trips sometimes turn "3" into "3.0"
            part.strip_suffix(".0").unwrap_or(part).parse().ok()
        })
        .collect()
}

/// Formats failed indices for the `failed_positions` column
pub fn format_failed_indices(indices: &BTreeSet<usize>) -> String {
    indices
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
