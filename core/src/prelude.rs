pub use crate::canonical::{canonical_encode, chain_hash, hash_state, parse_hash};
pub use crate::chain::{
    address_hex, match_id_bytes32, parse_address, parse_stake, EnsResolverT, EscrowT,
    OutcomeAttestation, SettlementT,
};
pub use crate::coordination::CoordStoreT;
pub use crate::credentials::{
    canonical_auth_message, canonicalize_address, recover_address, verify_player_auth, ServerKey,
};
pub use crate::error::{Error, Result};
pub use crate::frame::{Frame, FrameType};
pub use crate::storage::{LeaderboardEntry, MatchResultUpdate, PlayerRow, StorageT};
pub use crate::transcript::{Transcript, TranscriptEntry};
pub use crate::types::{
    current_timestamp, ActiveMatchEntry, ChatMessage, Match, MatchStatus, PendingMatch,
    QueueSnapshot, QueueTicket, WsToken,
};
