//! The hash-chained move log of one match.
//!
//! Every applied action appends one entry; the rolling hash after the
//! last entry is the root committed to settlement.  Nothing else ever
//! appends: forfeits, draws and reconnection sync are pure reads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::{canonical_encode, chain_hash, hash_state};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub sequence: u64,
    pub player: String,
    pub action: Value,
    pub state_hash: String,
    pub prev_hash: String,
    pub timestamp: u64,
}

impl TranscriptEntry {
    pub fn canonical(&self) -> String {
        // The struct serializes to plain JSON fields, so this cannot
        // fail; fall back to an empty object keeps the chain total.
        let value = serde_json::to_value(self).unwrap_or(Value::Null);
        canonical_encode(&value)
    }
}

#[derive(Debug, Clone)]
pub struct Transcript {
    match_id: String,
    game_id: String,
    initial_state_hash: String,
    entries: Vec<TranscriptEntry>,
    current_hash: String,
}

impl Transcript {
    pub fn new(match_id: impl Into<String>, game_id: impl Into<String>, initial_state: &Value) -> Self {
        let initial_state_hash = hash_state(initial_state);
        Self {
            match_id: match_id.into(),
            game_id: game_id.into(),
            initial_state_hash: initial_state_hash.clone(),
            entries: Vec::new(),
            current_hash: initial_state_hash,
        }
    }

    /// Rebuild a transcript from persisted entries, trusting their
    /// recorded hashes.  Used by the archive replay path.
    pub fn from_entries(
        match_id: impl Into<String>,
        game_id: impl Into<String>,
        initial_state_hash: String,
        entries: Vec<TranscriptEntry>,
    ) -> Self {
        let current_hash = match entries.last() {
            Some(last) => chain_hash(&last.prev_hash, &last.canonical()),
            None => initial_state_hash.clone(),
        };
        Self {
            match_id: match_id.into(),
            game_id: game_id.into(),
            initial_state_hash,
            entries,
            current_hash,
        }
    }

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn initial_state_hash(&self) -> &str {
        &self.initial_state_hash
    }

    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// The rolling hash after the last entry; the settlement commitment
    /// once the match is terminal.
    pub fn root_hash(&self) -> &str {
        &self.current_hash
    }

    pub fn add_entry(&mut self, player: &str, action: Value, new_state: &Value, timestamp: u64) -> &TranscriptEntry {
        let entry = TranscriptEntry {
            sequence: self.entries.len() as u64,
            player: player.to_owned(),
            action,
            state_hash: hash_state(new_state),
            prev_hash: self.current_hash.clone(),
            timestamp,
        };
        self.current_hash = chain_hash(&entry.prev_hash, &entry.canonical());
        self.entries.push(entry);
        self.entries
            .last()
            .unwrap_or_else(|| unreachable!("entry pushed above"))
    }

    /// Check sequence density and the hash chain.  Returns the index of
    /// the first broken entry.
    pub fn verify_chain(&self) -> std::result::Result<(), u64> {
        let mut prev = self.initial_state_hash.clone();
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.sequence != i as u64 || entry.prev_hash != prev {
                return Err(i as u64);
            }
            prev = chain_hash(&entry.prev_hash, &entry.canonical());
        }
        if prev != self.current_hash {
            return Err(self.entries.len() as u64);
        }
        Ok(())
    }
}
