use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

use uuid::Uuid;

/// Cookie the browser session rides in.
pub const SESSION_COOKIE: &str = "sessionid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        Uuid::try_parse(s).map(Self).map_err(|_| ())
    }
}

/// Server-side session state: one user id per live session, held in
/// process memory. Sessions end with the process - the relational
/// store never sees them.
#[derive(Debug, Default)]
pub struct SessionStore {
    live: RwLock<HashMap<SessionId, i64>>,
}

impl SessionStore {
    pub fn insert(&self, user_id: i64) -> SessionId {
        let id = SessionId::new();
        self.live.write().expect("session lock").insert(id, user_id);
        id
    }

    pub fn user_id(&self, id: &SessionId) -> Option<i64> {
        self.live.read().expect("session lock").get(id).copied()
    }

    pub fn remove(&self, id: &SessionId) -> Option<i64> {
        self.live.write().expect("session lock").remove(id)
    }
}
