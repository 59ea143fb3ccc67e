//! Accepted command words and the canonical operation each resolves to.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Init,
    /// Power on, or resume a paused machine.
    Start,
    Save,
    Pause,
    /// Graceful ACPI shutdown.
    Stop,
    Poweroff,
    Reset,
    Restart,
    Delete,
    Status,
    Info,
    Ssh,
    Download,
}

/// Every accepted word. Aliases resolve here, once, before dispatch.
pub const VERBS: &[(&str, Verb)] = &[
    ("init", Verb::Init),
    ("start", Verb::Start),
    ("up", Verb::Start),
    ("boot", Verb::Start),
    ("resume", Verb::Start),
    ("save", Verb::Save),
    ("suspend", Verb::Save),
    ("pause", Verb::Pause),
    ("stop", Verb::Stop),
    ("halt", Verb::Stop),
    ("down", Verb::Stop),
    ("poweroff", Verb::Poweroff),
    ("reset", Verb::Reset),
    ("restart", Verb::Restart),
    ("delete", Verb::Delete),
    ("destroy", Verb::Delete),
    ("status", Verb::Status),
    ("info", Verb::Info),
    ("ssh", Verb::Ssh),
    ("download", Verb::Download),
];

impl Verb {
    /// Canonical word for this operation.
    pub fn as_str(self) -> &'static str {
        VERBS
            .iter()
            .find(|(_, v)| *v == self)
            .map(|(word, _)| *word)
            .unwrap_or("?")
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VERBS
            .iter()
            .find(|(word, _)| *word == s)
            .map(|(_, verb)| *verb)
            .ok_or_else(|| {
                let words: Vec<&str> = VERBS.iter().map(|(w, _)| *w).collect();
                format!("expected one of {}", words.join("|"))
            })
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
