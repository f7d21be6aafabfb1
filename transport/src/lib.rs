pub mod abi;
pub mod ens;
pub mod escrow;
pub mod rpc;
pub mod settlement;

pub use ens::{EnsResolver, NullEnsResolver};
pub use escrow::EvmEscrow;
pub use rpc::EthRpc;
pub use settlement::EvmSettlement;
