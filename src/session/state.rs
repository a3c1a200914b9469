use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a capture session
///
/// ```text
/// Idle -> Acquiring -> Recording -> Stopping -> Stopped
///             |            |           |
///             +------------+-----------+-> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Acquiring,
    Recording,
    Stopping,
    Stopped,
    Failed,
}

impl SessionState {
    /// Stopped and Failed are final for a session instance
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Failed)
    }

    /// Acquiring, Recording or Stopping
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Acquiring | SessionState::Recording | SessionState::Stopping
        )
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Acquiring)
                | (Acquiring, Recording)
                | (Recording, Stopping)
                | (Stopping, Stopped)
                | (Acquiring, Failed)
                | (Recording, Failed)
                | (Stopping, Failed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Acquiring => "acquiring",
            SessionState::Recording => "recording",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    #[test]
    fn test_happy_path() {
        assert!(Idle.can_transition_to(Acquiring));
        assert!(Acquiring.can_transition_to(Recording));
        assert!(Recording.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Stopped));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for next in [Idle, Acquiring, Recording, Stopping, Stopped, Failed] {
            assert!(!Stopped.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
        assert!(!Idle.can_transition_to(Failed));
        assert!(!Recording.can_transition_to(Stopped));
    }
}
