//! Redis key discipline.  Isolation between deployments is handled by
//! Redis database selection, so keys carry no environment prefix.

pub fn queue(game_id: &str, stake: &str) -> String {
    format!("queue:{game_id}:{stake}")
}

/// Parse a queue key back into `(gameId, stake)`.
pub fn parse_queue(key: &str) -> Option<(String, String)> {
    let rest = key.strip_prefix("queue:")?;
    let (game_id, stake) = rest.rsplit_once(':')?;
    Some((game_id.to_owned(), stake.to_owned()))
}

pub fn pending_match(player: &str, game_id: &str, stake: &str) -> String {
    format!("pending:{player}:{game_id}:{stake}")
}

pub fn invite(code: &str) -> String {
    format!("invite:{code}")
}

pub fn ws_token(token: &str) -> String {
    format!("wstoken:{token}")
}

pub fn active_match(player: &str) -> String {
    format!("active:{player}")
}

/// Reverse index from ticket id to its queue key + player, so a leave
/// request holding only the opaque id can find the ticket.
pub fn ticket_ref(ticket_id: &str) -> String {
    format!("ticket:{ticket_id}")
}
