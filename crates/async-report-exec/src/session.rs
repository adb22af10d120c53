//! Session identity used to tag audit records.

use serde::{Deserialize, Serialize};

/// Placeholder user name when no session is available.
pub const UNKNOWN_USER: &str = "Unknown";

/// Identity of the user that requested an execution.
pub trait SessionIdentity: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
}

/// Owned session identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTag {
    pub id: String,
    pub name: String,
}

impl SessionTag {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl SessionIdentity for SessionTag {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// `(id, name)` for an optional session, falling back to `("", "Unknown")`.
pub fn session_labels(session: Option<&dyn SessionIdentity>) -> (String, String) {
    match session {
        Some(s) => (s.id().to_string(), s.name().to_string()),
        None => (String::new(), UNKNOWN_USER.to_string()),
    }
}
