use std::fmt;
use std::str::FromStr;

use crate::PdiskError;

/// Backend-independent LUN action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    Check,
    Create,
    Delete,
    Map,
    Rebase,
    Snapshot,
    Unmap,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Check,
        Action::Create,
        Action::Delete,
        Action::Map,
        Action::Rebase,
        Action::Snapshot,
        Action::Unmap,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Action::Check => "check",
            Action::Create => "create",
            Action::Delete => "delete",
            Action::Map => "map",
            Action::Rebase => "rebase",
            Action::Snapshot => "snapshot",
            Action::Unmap => "unmap",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = PdiskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .find(|action| action.name() == s)
            .copied()
            .ok_or_else(|| PdiskError::UnknownAction(s.to_string()))
    }
}

/// Primitive backend operation, several of which may implement one [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubAction {
    Check,
    Clone,
    Create,
    Delete,
    Map,
    Snapdel,
    Snapshot,
    Unmap,
}

impl SubAction {
    pub const ALL: [SubAction; 8] = [
        SubAction::Check,
        SubAction::Clone,
        SubAction::Create,
        SubAction::Delete,
        SubAction::Map,
        SubAction::Snapdel,
        SubAction::Snapshot,
        SubAction::Unmap,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SubAction::Check => "check",
            SubAction::Clone => "clone",
            SubAction::Create => "create",
            SubAction::Delete => "delete",
            SubAction::Map => "map",
            SubAction::Snapdel => "snapdel",
            SubAction::Snapshot => "snapshot",
            SubAction::Unmap => "unmap",
        }
    }
}

impl fmt::Display for SubAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
