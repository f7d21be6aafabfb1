pub use crate::engine::{current_player, GameModule, SPECTATOR};
pub use crate::error::{HandleError, HandleResult};
pub use crate::random::GameRng;
pub use crate::registry::GameRegistry;
pub use crate::types::{GameConfig, GameMetadata, MoveTimeout, Outcome};
