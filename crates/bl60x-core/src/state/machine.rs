//! State machine for an ISP session.

use std::fmt;

use crate::events::FlashPhase;
use crate::integrity::Digest;
use crate::protocol::{BootInfo, SecurityFlags, Stage};

/// Session states, in the order a session walks through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Synchronized,
    InfoFetched,
    LoaderHeaderLoaded,
    PubKeyLoaded,
    SignatureLoaded,
    AesIvLoaded,
    SegmentHeaderLoaded,
    SegmentDataLoaded,
    ImageChecked,
    ImageRunning,
    PostRunHandshake,
    FlashingLoop,
    SessionFinished,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "DISCONNECTED",
            SessionState::Synchronized => "SYNCHRONIZED",
            SessionState::InfoFetched => "INFO_FETCHED",
            SessionState::LoaderHeaderLoaded => "LOADER_HEADER_LOADED",
            SessionState::PubKeyLoaded => "PUBKEY_LOADED",
            SessionState::SignatureLoaded => "SIGNATURE_LOADED",
            SessionState::AesIvLoaded => "AES_IV_LOADED",
            SessionState::SegmentHeaderLoaded => "SEGMENT_HEADER_LOADED",
            SessionState::SegmentDataLoaded => "SEGMENT_DATA_LOADED",
            SessionState::ImageChecked => "IMAGE_CHECKED",
            SessionState::ImageRunning => "IMAGE_RUNNING",
            SessionState::PostRunHandshake => "POST_RUN_HANDSHAKE",
            SessionState::FlashingLoop => "FLASHING_LOOP",
            SessionState::SessionFinished => "SESSION_FINISHED",
        };
        write!(f, "{}", name)
    }
}

/// Branch conditions read back from the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BranchFlags {
    pub signed: bool,
    pub encrypted: bool,
}

impl From<SecurityFlags> for BranchFlags {
    fn from(flags: SecurityFlags) -> Self {
        Self {
            signed: flags.is_signed(),
            encrypted: flags.is_encrypted(),
        }
    }
}

impl SessionState {
    /// The state after this one. `None` once finished.
    pub fn next(self, flags: BranchFlags) -> Option<SessionState> {
        use SessionState::*;
        let after_signing = |flags: BranchFlags| {
            if flags.encrypted {
                AesIvLoaded
            } else {
                SegmentHeaderLoaded
            }
        };
        Some(match self {
            Disconnected => Synchronized,
            Synchronized => InfoFetched,
            InfoFetched => LoaderHeaderLoaded,
            LoaderHeaderLoaded if flags.signed => PubKeyLoaded,
            LoaderHeaderLoaded => after_signing(flags),
            PubKeyLoaded => SignatureLoaded,
            SignatureLoaded => after_signing(flags),
            AesIvLoaded => SegmentHeaderLoaded,
            SegmentHeaderLoaded => SegmentDataLoaded,
            SegmentDataLoaded => ImageChecked,
            ImageChecked => ImageRunning,
            ImageRunning => PostRunHandshake,
            PostRunHandshake => FlashingLoop,
            FlashingLoop => SessionFinished,
            SessionFinished => return None,
        })
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::SessionFinished
    }

    /// Phase this state belongs to.
    pub fn phase(self) -> FlashPhase {
        use SessionState::*;
        match self {
            Disconnected | Synchronized | InfoFetched => FlashPhase::Handshake,
            LoaderHeaderLoaded | PubKeyLoaded | SignatureLoaded | AesIvLoaded
            | SegmentHeaderLoaded | SegmentDataLoaded | ImageChecked | ImageRunning
            | PostRunHandshake => FlashPhase::LoaderBringUp,
            FlashingLoop => FlashPhase::Flashing,
            SessionFinished => FlashPhase::Complete,
        }
    }
}

/// Verification result for one programmed asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetOutcome {
    pub address: u32,
    pub len: u32,
    pub expected: Digest,
    pub actual: Digest,
}

impl AssetOutcome {
    pub fn verified(&self) -> bool {
        self.expected == self.actual
    }
}

/// State machine context holding all runtime state.
#[derive(Debug, Default)]
pub struct StateMachineContext {
    /// Current state.
    pub state: SessionState,
    /// Every state entered, starting with `Disconnected`.
    pub trail: Vec<SessionState>,
    /// Which error table applies to device codes.
    pub stage: Stage,
    pub boot_info: Option<BootInfo>,
    pub flags: BranchFlags,
    /// One entry per asset that reached digest verification.
    pub outcomes: Vec<AssetOutcome>,
}

impl StateMachineContext {
    pub fn new() -> Self {
        Self {
            trail: vec![SessionState::Disconnected],
            ..Default::default()
        }
    }

    /// Transition to a new state.
    pub fn goto_state(&mut self, new_state: SessionState) {
        tracing::info!(from = %self.state, to = %new_state, "State transition");
        self.state = new_state;
        self.trail.push(new_state);
    }

    /// Where the machine goes next, given what is known so far.
    pub fn next_state(&self) -> Option<SessionState> {
        self.state.next(self.flags)
    }

    pub fn visited(&self, state: SessionState) -> bool {
        self.trail.contains(&state)
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    fn walk(flags: BranchFlags) -> Vec<SessionState> {
        let mut out = vec![Disconnected];
        let mut s = Disconnected;
        while let Some(n) = s.next(flags) {
            out.push(n);
            s = n;
        }
        out
    }

    #[test]
    fn test_plain_walk() {
        let trail = walk(BranchFlags::default());
        assert_eq!(
            trail,
            vec![
                Disconnected,
                Synchronized,
                InfoFetched,
                LoaderHeaderLoaded,
                SegmentHeaderLoaded,
                SegmentDataLoaded,
                ImageChecked,
                ImageRunning,
                PostRunHandshake,
                FlashingLoop,
                SessionFinished,
            ]
        );
    }

    #[test]
    fn test_signed_only() {
        let trail = walk(BranchFlags {
            signed: true,
            encrypted: false,
        });
        assert!(trail.contains(&PubKeyLoaded));
        assert!(trail.contains(&SignatureLoaded));
        assert!(!trail.contains(&AesIvLoaded));
        let pos = trail.iter().position(|s| *s == SignatureLoaded).unwrap();
        assert_eq!(trail[pos + 1], SegmentHeaderLoaded);
    }

    #[test]
    fn test_encrypted_only() {
        let trail = walk(BranchFlags {
            signed: false,
            encrypted: true,
        });
        assert!(!trail.contains(&PubKeyLoaded));
        assert!(trail.contains(&AesIvLoaded));
        assert_eq!(LoaderHeaderLoaded.next(BranchFlags { signed: false, encrypted: true }), Some(AesIvLoaded));
    }

    #[test]
    fn test_signed_and_encrypted() {
        let trail = walk(BranchFlags {
            signed: true,
            encrypted: true,
        });
        let idx = |s| trail.iter().position(|x| *x == s).unwrap();
        assert!(idx(PubKeyLoaded) < idx(SignatureLoaded));
        assert!(idx(SignatureLoaded) < idx(AesIvLoaded));
        assert!(idx(AesIvLoaded) < idx(SegmentHeaderLoaded));
    }

    #[test]
    fn test_terminal() {
        assert_eq!(SessionFinished.next(BranchFlags::default()), None);
        assert!(SessionFinished.is_terminal());
        assert_eq!(FlashingLoop.phase(), FlashPhase::Flashing);
    }

    #[test]
    fn test_context_trail() {
        let mut ctx = StateMachineContext::new();
        assert_eq!(ctx.trail, vec![Disconnected]);
        ctx.goto_state(Synchronized);
        assert!(ctx.visited(Synchronized));
        assert_eq!(ctx.next_state(), Some(InfoFetched));
        assert!(!ctx.is_complete());
    }
}
