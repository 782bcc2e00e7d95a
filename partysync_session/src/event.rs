// Session events.
//
// Everything the orchestrator wants its owner to know about comes back from
// `MultiplayerGame::tick` as a `SessionEvent`. Nothing in the session layer
// terminates the process; failures (a dead server link, a module that could
// not load, a participant sending something it may not) become events and
// the owner decides what to do.

use std::fmt;

use partysync_protocol::{CommandKind, CreatureRole};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum SessionEvent {
    ModuleLoadStarted {
        module: String,
    },
    ModuleLoaded {
        module: String,
    },
    ModuleLoadFailed {
        module: String,
        reason: String,
    },
    ParticipantJoined {
        tag: String,
    },
    /// Late-join sequence delivered. `role` is `None` for observers.
    ParticipantSynchronized {
        tag: String,
        role: Option<CreatureRole>,
    },
    /// `released` lists the tags of actors the participant controlled.
    ParticipantLeft {
        tag: String,
        released: Vec<String>,
    },
    ServerConnectionLost,
    /// A participant sent a command it is not allowed to send.
    CommandRejected {
        from: String,
        kind: CommandKind,
    },
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::ModuleLoadStarted { module } => write!(f, "loading module {module}"),
            SessionEvent::ModuleLoaded { module } => write!(f, "module {module} loaded"),
            SessionEvent::ModuleLoadFailed { module, reason } => {
                write!(f, "module {module} failed to load: {reason}")
            }
            SessionEvent::ParticipantJoined { tag } => write!(f, "{tag} joined"),
            SessionEvent::ParticipantSynchronized { tag, role: Some(role) } => {
                write!(f, "{tag} synchronized as {role}")
            }
            SessionEvent::ParticipantSynchronized { tag, role: None } => {
                write!(f, "{tag} synchronized as observer")
            }
            SessionEvent::ParticipantLeft { tag, released } if released.is_empty() => {
                write!(f, "{tag} left")
            }
            SessionEvent::ParticipantLeft { tag, released } => {
                write!(f, "{tag} left, released {}", released.join(", "))
            }
            SessionEvent::ServerConnectionLost => f.write_str("connection to server lost"),
            SessionEvent::CommandRejected { from, kind } => write!(f, "rejected {kind} from {from}"),
        }
    }
}
