//! Ordered pool of subscription credentials with rotation on balance exhaustion

use std::sync::Mutex;

use secrecy::SecretString;

/// Credential handed out for a single call
#[derive(Debug, Clone)]
pub struct Credential {
    /// Position in the configured list
    pub index: usize,
    pub key: SecretString,
}

/// Outcome of reporting an exhausted credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// Another credential is now active
    Rotated,
    /// No usable credential remains
    Exhausted,
}

#[derive(Debug)]
struct PoolState {
    active: usize,
    exhausted: Vec<bool>,
}

/// Process-wide credential pool
///
/// Calls read the active credential; an exhausted-balance response moves the
/// pool to the next credential that has not been marked exhausted. Exhaustion
/// is never reset during the process lifetime.
#[derive(Debug)]
pub struct CredentialPool {
    keys: Vec<SecretString>,
    state: Mutex<PoolState>,
}

impl CredentialPool {
    pub fn new(keys: Vec<SecretString>) -> Self {
        let exhausted = vec![false; keys.len()];

        Self {
            keys,
            state: Mutex::new(PoolState { active: 0, exhausted }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Credential to use for the next call, if any remains
    pub fn active(&self) -> Option<Credential> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if state.exhausted.get(state.active).copied().unwrap_or(true) {
            return None;
        }

        self.keys.get(state.active).map(|key| Credential {
            index: state.active,
            key: key.clone(),
        })
    }

    /// Mark a credential as exhausted and advance to the next usable one
    ///
    /// Reporting a credential that is no longer active does not move the
    /// pool again, so concurrent failures on the same key rotate once.
    pub fn mark_exhausted(&self, credential: &Credential) -> Rotation {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(flag) = state.exhausted.get_mut(credential.index) {
            *flag = true;
        }

        if state.active == credential.index {
            let next = (0..self.keys.len())
                .map(|offset| (credential.index + 1 + offset) % self.keys.len())
                .find(|&index| !state.exhausted[index]);

            match next {
                Some(index) => {
                    tracing::warn!(from = credential.index, to = index, "rotating subscription credential");
                    state.active = index;
                }
                None => {
                    tracing::error!("all subscription credentials exhausted");
                    return Rotation::Exhausted;
                }
            }
        }

        if state.exhausted.get(state.active).copied().unwrap_or(true) {
            Rotation::Exhausted
        } else {
            Rotation::Rotated
        }
    }

    /// Number of credentials not yet marked exhausted
    pub fn remaining(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.exhausted.iter().filter(|exhausted| !**exhausted).count()
    }
}
