pub use crate::chain_helpers::{DummyEscrow, DummySettlement};
pub use crate::client_helpers::TestClient;
