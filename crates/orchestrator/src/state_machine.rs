use std::fmt;

use tracing::debug;

use crate::error::{OrchestratorError, Result};

/// Steps of a single install request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallPhase {
    Init,
    Validating,
    CheckingExistence,
    AlreadyInstalled,
    NotFoundOnHost,
    Installing,
    VerifyingPresence,
    Persisting,
    Complete,
    Failed,
}

impl InstallPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Validating => "validating",
            Self::CheckingExistence => "checking_existence",
            Self::AlreadyInstalled => "already_installed",
            Self::NotFoundOnHost => "not_found_on_host",
            Self::Installing => "installing",
            Self::VerifyingPresence => "verifying_presence",
            Self::Persisting => "persisting",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct InstallStateMachine;

impl InstallStateMachine {
    pub fn validate_transition(from: &InstallPhase, to: &InstallPhase) -> Result<()> {
        let allowed = Self::allowed_transitions(from);

        if allowed.contains(to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    fn allowed_transitions(from: &InstallPhase) -> Vec<InstallPhase> {
        use InstallPhase::*;

        match from {
            Init => vec![Validating, Failed],
            Validating => vec![CheckingExistence, Failed],
            CheckingExistence => vec![AlreadyInstalled, NotFoundOnHost, Installing, Failed],
            AlreadyInstalled => vec![Persisting, Failed],
            NotFoundOnHost => vec![Failed],
            Installing => vec![VerifyingPresence, Persisting, Failed],
            VerifyingPresence => vec![Persisting, Failed],
            Persisting => vec![Complete, Failed],
            Complete | Failed => vec![],
        }
    }

    pub fn can_transition(from: &InstallPhase, to: &InstallPhase) -> bool {
        Self::validate_transition(from, to).is_ok()
    }
}

/// Tracks where one install currently is.
#[derive(Debug)]
pub struct InstallRun {
    owner_id: String,
    app_id: String,
    phase: InstallPhase,
    history: Vec<InstallPhase>,
}

impl InstallRun {
    pub fn new(owner_id: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            app_id: app_id.into(),
            phase: InstallPhase::Init,
            history: vec![InstallPhase::Init],
        }
    }

    pub fn phase(&self) -> InstallPhase {
        self.phase
    }

    pub fn history(&self) -> &[InstallPhase] {
        &self.history
    }

    pub fn advance(&mut self, to: InstallPhase) -> Result<()> {
        InstallStateMachine::validate_transition(&self.phase, &to)?;

        debug!(
            owner_id = %self.owner_id,
            app_id = %self.app_id,
            from = %self.phase,
            to = %to,
            "Install phase transition"
        );

        self.phase = to;
        self.history.push(to);
        Ok(())
    }

    /// Move to `Failed` unless already terminal.
    pub fn fail(&mut self) {
        if !self.phase.is_terminal() {
            let _ = self.advance(InstallPhase::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use InstallPhase::*;

    #[test]
    fn test_formula_happy_path() {
        let mut run = InstallRun::new("owner", "git");
        for phase in [Validating, CheckingExistence, Installing, Persisting, Complete] {
            run.advance(phase).unwrap();
        }
        assert_eq!(run.phase(), Complete);
        assert!(!run.history().contains(&VerifyingPresence));
    }

    #[test]
    fn test_already_installed_on_host_persists() {
        assert!(InstallStateMachine::can_transition(&CheckingExistence, &AlreadyInstalled));
        assert!(InstallStateMachine::can_transition(&AlreadyInstalled, &Persisting));
        assert!(!InstallStateMachine::can_transition(&AlreadyInstalled, &Installing));
    }

    #[test]
    fn test_not_found_only_fails() {
        assert!(InstallStateMachine::can_transition(&NotFoundOnHost, &Failed));
        assert!(!InstallStateMachine::can_transition(&NotFoundOnHost, &Installing));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!InstallStateMachine::can_transition(&Init, &Installing));
        assert!(!InstallStateMachine::can_transition(&Validating, &Persisting));
        assert!(!InstallStateMachine::can_transition(&Complete, &Failed));

        let mut run = InstallRun::new("owner", "git");
        assert!(matches!(
            run.advance(Complete),
            Err(OrchestratorError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_fail_is_idempotent() {
        let mut run = InstallRun::new("owner", "git");
        run.advance(Validating).unwrap();
        run.fail();
        run.fail();

        assert_eq!(run.phase(), Failed);
        assert_eq!(run.history(), &[Init, Validating, Failed]);
    }
}
