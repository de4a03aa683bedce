//! Trust actions and the per-entry action map.
//!
//! A remembered entry carries one decision per *action id* (the kind of
//! trust-sensitive operation being confirmed). Decisions are persisted as
//! a compact positional string, one character per action id, so the store
//! file stays human-editable: `A` remembers "always run unsigned", `XN`
//! leaves the unsigned slot undecided and remembers "never" for the
//! allowable-codebase check.

use thiserror::Error;

/// A single trust decision.
///
/// `Always` and `Never` are *sticky*: they suppress future prompts. The
/// remaining variants apply to one launch only and never short-circuit a
/// later lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecuteAction {
    /// Run, and remember the grant.
    Always,
    /// Refuse, and remember the refusal.
    Never,
    /// Run this once.
    Yes,
    /// Refuse this once.
    No,
    /// Run this once with reduced (sandbox) privileges.
    Sandbox,
    /// The prompt was dismissed without an answer.
    Cancel,
}

impl ExecuteAction {
    /// Returns true for decisions that suppress future prompts.
    #[must_use]
    pub const fn is_sticky(self) -> bool {
        matches!(self, Self::Always | Self::Never)
    }

    /// The single-character persisted form.
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::Always => 'A',
            Self::Never => 'N',
            Self::Yes => 'y',
            Self::No => 'n',
            Self::Sandbox => 's',
            Self::Cancel => 'c',
        }
    }

    /// Parses the single-character persisted form.
    #[must_use]
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'A' => Some(Self::Always),
            'N' => Some(Self::Never),
            'y' => Some(Self::Yes),
            'n' => Some(Self::No),
            's' => Some(Self::Sandbox),
            'c' => Some(Self::Cancel),
            _ => None,
        }
    }

    /// Returns the string representation of this action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Never => "never",
            Self::Yes => "yes",
            Self::No => "no",
            Self::Sandbox => "sandbox",
            Self::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for ExecuteAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The kind of trust-sensitive operation a decision applies to.
///
/// The discriminant doubles as the position of the decision character in
/// the persisted action string, so the order of variants is part of the
/// file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum ActionId {
    /// Confirmation of an unsigned or partially-signed application run.
    UnsignedApplet = 0,
    /// Confirmation that a library may be loaded from a codebase other
    /// than the application's own.
    AllowableCodebase = 1,
}

impl ActionId {
    /// Position of this action in the persisted string.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Character marking an undecided slot in the persisted form.
const UNSET: char = 'X';

/// Error raised when a persisted action string cannot be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionParseError {
    /// The string was empty.
    #[error("empty action string")]
    Empty,

    /// The string held a character no known action maps to.
    #[error("unknown action character {character:?} at position {position}")]
    UnknownCharacter {
        /// The offending character.
        character: char,
        /// Its zero-based position in the string.
        position: usize,
    },
}

/// Per-entry map from [`ActionId`] to decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSet {
    slots: Vec<Option<ExecuteAction>>,
}

impl ActionSet {
    /// Creates an empty set: every action id is undecided.
    #[must_use]
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Creates a set holding a single decision.
    #[must_use]
    pub fn from_action(id: ActionId, action: ExecuteAction) -> Self {
        let mut set = Self::new();
        set.set_action(id, action);
        set
    }

    /// Returns the decision for `id`, if one was recorded.
    #[must_use]
    pub fn action(&self, id: ActionId) -> Option<ExecuteAction> {
        self.slots.get(id.index()).copied().flatten()
    }

    /// Records a decision for `id`, replacing any previous one.
    pub fn set_action(&mut self, id: ActionId, action: ExecuteAction) {
        let index = id.index();
        if self.slots.len() <= index {
            self.slots.resize(index + 1, None);
        }
        self.slots[index] = Some(action);
    }

    /// Encodes the set into its persisted positional form.
    ///
    /// Trailing undecided slots are trimmed; a fully undecided set
    /// encodes as a single `X` so the field is never empty on disk.
    #[must_use]
    pub fn encode(&self) -> String {
        let last_set = self.slots.iter().rposition(Option::is_some);
        match last_set {
            None => UNSET.to_string(),
            Some(last) => self.slots[..=last]
                .iter()
                .map(|slot| slot.map_or(UNSET, ExecuteAction::as_char))
                .collect(),
        }
    }

    /// Decodes the persisted positional form.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty string or for any character that
    /// does not map to a known action; callers treat such records as
    /// opaque rather than dropping them.
    pub fn parse(s: &str) -> Result<Self, ActionParseError> {
        if s.is_empty() {
            return Err(ActionParseError::Empty);
        }
        let mut slots = Vec::with_capacity(s.len());
        for (position, character) in s.chars().enumerate() {
            if character == UNSET {
                slots.push(None);
            } else {
                match ExecuteAction::from_char(character) {
                    Some(action) => slots.push(Some(action)),
                    None => {
                        return Err(ActionParseError::UnknownCharacter {
                            character,
                            position,
                        })
                    }
                }
            }
        }
        Ok(Self { slots })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_has_no_decisions() {
        let set = ActionSet::new();
        assert_eq!(set.action(ActionId::UnsignedApplet), None);
        assert_eq!(set.action(ActionId::AllowableCodebase), None);
        assert_eq!(set.encode(), "X");
    }

    #[test]
    fn from_action_sets_only_the_requested_slot() {
        let set = ActionSet::from_action(ActionId::AllowableCodebase, ExecuteAction::Never);
        assert_eq!(set.action(ActionId::UnsignedApplet), None);
        assert_eq!(
            set.action(ActionId::AllowableCodebase),
            Some(ExecuteAction::Never)
        );
        assert_eq!(set.encode(), "XN");
    }

    #[test]
    fn set_action_replaces_previous_decision() {
        let mut set = ActionSet::from_action(ActionId::UnsignedApplet, ExecuteAction::Yes);
        set.set_action(ActionId::UnsignedApplet, ExecuteAction::Always);
        assert_eq!(
            set.action(ActionId::UnsignedApplet),
            Some(ExecuteAction::Always)
        );
        assert_eq!(set.encode(), "A");
    }

    #[test]
    fn encode_parse_round_trip() {
        let mut set = ActionSet::from_action(ActionId::UnsignedApplet, ExecuteAction::Always);
        set.set_action(ActionId::AllowableCodebase, ExecuteAction::Sandbox);
        let encoded = set.encode();
        assert_eq!(encoded, "As");
        assert_eq!(ActionSet::parse(&encoded).expect("must parse"), set);
    }

    #[test]
    fn parse_rejects_empty_string() {
        assert_eq!(ActionSet::parse(""), Err(ActionParseError::Empty));
    }

    #[test]
    fn parse_rejects_unknown_characters() {
        assert_eq!(
            ActionSet::parse("AQ"),
            Err(ActionParseError::UnknownCharacter {
                character: 'Q',
                position: 1,
            })
        );
    }

    #[test]
    fn sticky_classification() {
        assert!(ExecuteAction::Always.is_sticky());
        assert!(ExecuteAction::Never.is_sticky());
        assert!(!ExecuteAction::Yes.is_sticky());
        assert!(!ExecuteAction::No.is_sticky());
        assert!(!ExecuteAction::Sandbox.is_sticky());
        assert!(!ExecuteAction::Cancel.is_sticky());
    }

    #[test]
    fn char_round_trip() {
        for action in [
            ExecuteAction::Always,
            ExecuteAction::Never,
            ExecuteAction::Yes,
            ExecuteAction::No,
            ExecuteAction::Sandbox,
            ExecuteAction::Cancel,
        ] {
            assert_eq!(ExecuteAction::from_char(action.as_char()), Some(action));
        }
        assert_eq!(ExecuteAction::from_char('X'), None);
    }
}
