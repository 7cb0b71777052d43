//! Authorization callback contract.
//!
//! The session never decides permissions itself. Callers pass a predicate
//! that answers whether a client may perform an [`Action`] on a topic.

use std::fmt;

/// Action being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Publish,
    Subscribe,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Publish => "publish",
            Action::Subscribe => "subscribe",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization predicate: `(action, topic) -> allowed`.
pub type Authorize<'a> = &'a dyn Fn(Action, &str) -> bool;
