//! Rolling whole-image SHA-1 (spec.md §4.5).
//!
//! Defined only for a fully sequential run starting at offset 0: the
//! first gap (sampling, `offset_start > 0`, or a skipped page) abandons
//! the state permanently. Updated only by the producer (driver) thread,
//! in submission order, before `submit` returns — never touched by
//! workers.

use sha1::{Digest, Sha1};

pub struct RollingHash {
    state: Option<RollingState>,
}

struct RollingState {
    hasher: Sha1,
    next_offset: u64,
}

impl RollingHash {
    /// `enabled` mirrors `config`'s decision to track the hash at all;
    /// an engine run with hashing disabled never allocates a `Sha1`.
    pub fn new(enabled: bool) -> Self {
        Self {
            state: enabled.then(|| RollingState { hasher: Sha1::new(), next_offset: 0 }),
        }
    }

    pub fn is_live(&self) -> bool {
        self.state.is_some()
    }

    /// Feed a submitted leaf page's bytes if its raw offset continues
    /// the gap-free prefix; otherwise abandon the state permanently.
    pub fn observe(&mut self, raw_offset: u64, page_bytes: &[u8]) {
        let Some(state) = self.state.as_mut() else { return };
        if raw_offset != state.next_offset {
            self.state = None;
            return;
        }
        state.hasher.update(page_bytes);
        state.next_offset += page_bytes.len() as u64;
    }

    /// Abandon the rolling hash permanently (a sampled, gated, or
    /// otherwise skipped page breaks the gap-free invariant).
    pub fn abandon(&mut self) {
        self.state = None;
    }

    /// The final digest, only if the state survived the entire run.
    pub fn finalize(self) -> Option<String> {
        self.state.map(|s| {
            let digest = s.hasher.finalize();
            digest.iter().map(|b| format!("{b:02x}")).collect()
        })
    }
}
