use std::fmt;

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Reset,
    Simulation,
    Distribution,
}

impl OperationKind {
    pub const ALL: [OperationKind; 3] = [
        OperationKind::Reset,
        OperationKind::Simulation,
        OperationKind::Distribution,
    ];

    pub fn idle_label(self) -> &'static str {
        match self {
            OperationKind::Reset => "Reset Leaderboard",
            OperationKind::Simulation => "Simulate Weekly Changes",
            OperationKind::Distribution => "Distribute Prize Pool Among Players",
        }
    }

    pub fn running_label(self) -> &'static str {
        match self {
            OperationKind::Reset => "Please wait...",
            OperationKind::Simulation => "Simulation continues...",
            OperationKind::Distribution => "Distribution continues...",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Reset => "reset",
            OperationKind::Simulation => "simulation",
            OperationKind::Distribution => "distribution",
        };
        f.write_str(name)
    }
}

/// Per-button state derived from the lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationState {
    pub disabled: bool,
    pub stopped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("{running} is still running")]
    Busy { running: OperationKind },
    #[error("waiting for leaderboard data after reset")]
    AwaitingData,
    #[error("{kind} is not running")]
    NotRunning { kind: OperationKind },
}

/// Exclusive lock over the three long-running operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OperationLock {
    #[default]
    Idle,
    Running(OperationKind),
    /// Everything stays disabled until a non-empty page arrives.
    AwaitingData,
}

impl OperationLock {
    pub fn running(&self) -> Option<OperationKind> {
        match self {
            OperationLock::Running(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn state_of(&self, kind: OperationKind) -> OperationState {
        match self {
            OperationLock::Idle => OperationState {
                disabled: false,
                stopped: true,
            },
            OperationLock::Running(running) => OperationState {
                disabled: true,
                stopped: *running != kind,
            },
            OperationLock::AwaitingData => OperationState {
                disabled: true,
                stopped: true,
            },
        }
    }

    pub fn label_of(&self, kind: OperationKind) -> &'static str {
        if self.state_of(kind).stopped {
            kind.idle_label()
        } else {
            kind.running_label()
        }
    }

    pub fn start(&mut self, kind: OperationKind) -> Result<(), LockError> {
        match *self {
            OperationLock::Idle => {
                *self = OperationLock::Running(kind);
                Ok(())
            }
            OperationLock::Running(running) => Err(LockError::Busy { running }),
            OperationLock::AwaitingData => Err(LockError::AwaitingData),
        }
    }

    pub fn finish(&mut self, kind: OperationKind) -> Result<(), LockError> {
        self.leave_running(kind, OperationLock::Idle)
    }

    /// Reset succeeded: hold every control until fresh rows show up.
    pub fn await_data(&mut self, kind: OperationKind) -> Result<(), LockError> {
        self.leave_running(kind, OperationLock::AwaitingData)
    }

    /// Failure recovery back to idle.
    pub fn abort(&mut self, kind: OperationKind) -> Result<(), LockError> {
        self.leave_running(kind, OperationLock::Idle)
    }

    /// Re-enables the controls once a non-empty page lands after a reset.
    /// Returns whether the lock changed.
    pub fn data_arrived(&mut self, non_empty: bool) -> bool {
        if non_empty && *self == OperationLock::AwaitingData {
            *self = OperationLock::Idle;
            return true;
        }
        false
    }

    fn leave_running(
        &mut self,
        kind: OperationKind,
        next: OperationLock,
    ) -> Result<(), LockError> {
        match *self {
            OperationLock::Running(running) if running == kind => {
                *self = next;
                Ok(())
            }
            _ => Err(LockError::NotRunning { kind }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_count(lock: &OperationLock) -> usize {
        OperationKind::ALL
            .iter()
            .filter(|kind| !lock.state_of(**kind).stopped)
            .count()
    }

    #[test]
    fn idle_enables_everything() {
        let lock = OperationLock::Idle;
        for kind in OperationKind::ALL {
            assert_eq!(
                lock.state_of(kind),
                OperationState {
                    disabled: false,
                    stopped: true
                }
            );
            assert_eq!(lock.label_of(kind), kind.idle_label());
        }
    }

    #[test]
    fn start_disables_the_other_two() {
        for kind in OperationKind::ALL {
            let mut lock = OperationLock::Idle;
            lock.start(kind).unwrap();
            for other in OperationKind::ALL {
                let state = lock.state_of(other);
                assert!(state.disabled);
                assert_eq!(state.stopped, other != kind);
            }
            assert_eq!(lock.label_of(kind), kind.running_label());
            assert_eq!(running_count(&lock), 1);
        }
    }

    #[test]
    fn second_start_is_rejected() {
        let mut lock = OperationLock::Idle;
        lock.start(OperationKind::Simulation).unwrap();
        assert_eq!(
            lock.start(OperationKind::Reset),
            Err(LockError::Busy {
                running: OperationKind::Simulation
            })
        );
        assert_eq!(lock, OperationLock::Running(OperationKind::Simulation));
    }

    #[test]
    fn finish_requires_matching_kind() {
        let mut lock = OperationLock::Idle;
        lock.start(OperationKind::Distribution).unwrap();
        assert!(lock.finish(OperationKind::Reset).is_err());
        lock.finish(OperationKind::Distribution).unwrap();
        assert_eq!(lock, OperationLock::Idle);
    }

    #[test]
    fn reset_holds_until_data_arrives() {
        let mut lock = OperationLock::Idle;
        lock.start(OperationKind::Reset).unwrap();
        lock.await_data(OperationKind::Reset).unwrap();
        for kind in OperationKind::ALL {
            assert_eq!(
                lock.state_of(kind),
                OperationState {
                    disabled: true,
                    stopped: true
                }
            );
        }
        assert_eq!(lock.start(OperationKind::Simulation), Err(LockError::AwaitingData));
        assert!(!lock.data_arrived(false));
        assert!(lock.data_arrived(true));
        assert_eq!(lock, OperationLock::Idle);
    }

    #[test]
    fn data_arrival_never_unlocks_a_running_operation() {
        let mut lock = OperationLock::Idle;
        lock.start(OperationKind::Simulation).unwrap();
        assert!(!lock.data_arrived(true));
        assert_eq!(lock.running(), Some(OperationKind::Simulation));
    }
}
