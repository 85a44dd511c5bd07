use std::fmt;

use serde::{Deserialize, Serialize};

/// An uncommitted code review overlay: `server/issue/patchset`.
///
/// Its serialised form (`{"server", "issue", "patchset"}`) is a direct field
/// mapping, so `serde` doubles as `as_dict`/`from_dict`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Patch {
    server: String,
    issue: u64,
    patchset: u64,
}

impl Patch {
    pub fn new(server: impl Into<String>, issue: u64, patchset: u64) -> Self {
        Self {
            server: server.into(),
            issue,
            patchset,
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn issue(&self) -> u64 {
        self.issue
    }

    pub fn patchset(&self) -> u64 {
        self.patchset
    }

    pub fn id_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.server, self.issue, self.patchset)
    }
}
