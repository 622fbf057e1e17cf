//! Controller lifecycle states.

/// State of one controller version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Spawned, no event handled yet
  Parsed,
  Installing,
  /// Shell assets cached, waiting to take over
  Installed,
  Activating,
  /// Stale generations purged; intercepting fetches
  Activated,
  /// Failed to install or replaced by a newer version
  Redundant,
}

impl WorkerState {
  /// Check whether moving to `next` is a legal lifecycle step.
  pub fn can_transition_to(self, next: WorkerState) -> bool {
    use WorkerState::*;
    matches!(
      (self, next),
      (Parsed, Installing)
        | (Installing, Installed)
        | (Installed, Activating)
        | (Activating, Activated)
        // Activation is idempotent
        | (Activated, Activating)
        | (_, Redundant)
    )
  }

  pub fn is_active(self) -> bool {
    self == WorkerState::Activated
  }
}

impl std::fmt::Display for WorkerState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Self::Parsed => "parsed",
      Self::Installing => "installing",
      Self::Installed => "installed",
      Self::Activating => "activating",
      Self::Activated => "activated",
      Self::Redundant => "redundant",
    };
    f.write_str(s)
  }
}

#[cfg(test)]
mod tests {
  use super::WorkerState::*;

  #[test]
  fn test_forward_path() {
    assert!(Parsed.can_transition_to(Installing));
    assert!(Installing.can_transition_to(Installed));
    assert!(Installed.can_transition_to(Activating));
    assert!(Activating.can_transition_to(Activated));
  }

  #[test]
  fn test_cannot_skip_install() {
    assert!(!Parsed.can_transition_to(Activating));
    assert!(!Parsed.can_transition_to(Activated));
    assert!(!Installing.can_transition_to(Activating));
  }

  #[test]
  fn test_redundant_is_terminal() {
    for state in [Parsed, Installing, Installed, Activating, Activated] {
      assert!(state.can_transition_to(Redundant));
    }
    assert!(!Redundant.can_transition_to(Installing));
    assert!(!Redundant.can_transition_to(Activating));
  }
}
