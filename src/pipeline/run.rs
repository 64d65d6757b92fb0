use crate::media::MediaAsset;

/// Lifecycle of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Probing,
    SynthesizingFrame,
    Trimming,
    Concatenating,
    Complete,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// The state a successful stage moves to
    pub fn successor(&self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::Probing),
            Self::Probing => Some(Self::SynthesizingFrame),
            Self::SynthesizingFrame => Some(Self::Trimming),
            Self::Trimming => Some(Self::Concatenating),
            Self::Concatenating => Some(Self::Complete),
            Self::Complete | Self::Failed => None,
        }
    }

    /// Whether `next` is a legal transition from this state
    pub fn can_advance_to(&self, next: RunState) -> bool {
        match next {
            Self::Failed => !self.is_terminal(),
            _ => self.successor() == Some(next),
        }
    }
}

/// Latest state reported for the newest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStatus {
    pub run_id: u64,
    pub state: RunState,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self { run_id: 0, state: RunState::Idle }
    }
}

/// The authoritative result, tagged with the run that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedOutput {
    pub run_id: u64,
    pub asset: MediaAsset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_advance_in_order() {
        let mut state = RunState::Idle;
        let mut seen = vec![state];
        while let Some(next) = state.successor() {
            assert!(state.can_advance_to(next));
            state = next;
            seen.push(state);
        }

        assert_eq!(
            seen,
            vec![
                RunState::Idle,
                RunState::Probing,
                RunState::SynthesizingFrame,
                RunState::Trimming,
                RunState::Concatenating,
                RunState::Complete,
            ]
        );
    }

    #[test]
    fn test_no_skipping_or_leaving_terminal_states() {
        assert!(!RunState::Idle.can_advance_to(RunState::Trimming));
        assert!(RunState::Trimming.can_advance_to(RunState::Failed));
        assert!(!RunState::Complete.can_advance_to(RunState::Failed));
        assert!(!RunState::Failed.can_advance_to(RunState::Probing));
    }
}
