pub mod canonical;
pub mod chain;
pub mod coordination;
pub mod credentials;
pub mod elo;
pub mod error;
pub mod frame;
pub mod prelude;
pub mod storage;
pub mod transcript;
pub mod types;
