//! Application runtime context: the process-wide singletons, passed
//! explicitly to every component that needs them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy_primitives::U256;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use dork_api::registry::GameRegistry;
use dork_core::chain::{EnsResolverT, EscrowT, SettlementT};
use dork_core::coordination::CoordStoreT;
use dork_core::credentials::ServerKey;
use dork_core::error::{Error, Result};
use dork_core::storage::StorageT;
use dork_env::Config;
use dork_local_db::LocalDbStorage;
use dork_store::{MemoryCoordStore, RedisCoordStore};
use dork_transport::{EnsResolver, EvmEscrow, EvmSettlement, NullEnsResolver};

use crate::frame::SignalFrame;
use crate::handle::MatchDeps;
use crate::match_manager::MatchManager;
use crate::room::RoomManager;

const MIN_STAKE_CACHE_TTL: Duration = Duration::from_secs(60);

/// External adapters, injectable for tests.
pub struct ContextDeps {
    pub storage: Arc<dyn StorageT>,
    pub coord: Arc<dyn CoordStoreT>,
    pub escrow: Option<Arc<dyn EscrowT>>,
    pub settlement: Option<Arc<dyn SettlementT>>,
    pub ens: Arc<dyn EnsResolverT>,
}

pub struct ApplicationContext {
    pub config: Config,
    pub registry: GameRegistry,
    pub storage: Arc<dyn StorageT>,
    pub coord: Arc<dyn CoordStoreT>,
    pub escrow: Option<Arc<dyn EscrowT>>,
    pub settlement: Option<Arc<dyn SettlementT>>,
    pub ens: Arc<dyn EnsResolverT>,
    pub room_manager: Arc<RoomManager>,
    pub match_manager: Arc<MatchManager>,
    emergency: AtomicBool,
    min_stake_cache: Mutex<Option<(U256, Instant)>>,
    pair_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    signal_tx: mpsc::Sender<SignalFrame>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ApplicationContext {
    pub fn new(
        config: Config,
        registry: GameRegistry,
        deps: ContextDeps,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let room_manager = Arc::new(RoomManager::new());
        let match_manager = Arc::new(MatchManager::new(room_manager.clone()));
        let (signal_tx, signal_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctx = Arc::new(Self {
            config,
            registry,
            storage: deps.storage,
            coord: deps.coord,
            escrow: deps.escrow,
            settlement: deps.settlement,
            ens: deps.ens,
            room_manager,
            match_manager,
            emergency: AtomicBool::new(false),
            min_stake_cache: Mutex::new(None),
            pair_locks: Mutex::new(HashMap::new()),
            signal_tx,
            shutdown_rx,
        });
        let join_handle = ctx.clone().start_signal_loop(signal_rx, shutdown_tx);
        (ctx, join_handle)
    }

    /// Construct the production context from environment configuration.
    pub async fn try_from_env(config: Config) -> anyhow::Result<(Arc<Self>, JoinHandle<()>)> {
        let storage: Arc<dyn StorageT> = if config.database_url == ":memory:" {
            Arc::new(LocalDbStorage::try_new_mem()?)
        } else {
            Arc::new(LocalDbStorage::try_new(&config.database_url)?)
        };

        let coord: Arc<dyn CoordStoreT> = match &config.redis_url {
            Some(url) => Arc::new(RedisCoordStore::connect(url).await?),
            None => {
                warn!("REDIS_URL not set, falling back to the in-memory coordination store");
                Arc::new(MemoryCoordStore::new())
            }
        };

        let escrow: Option<Arc<dyn EscrowT>> = match (&config.rpc_url, &config.escrow_address) {
            (Some(rpc), Some(addr)) => Some(Arc::new(EvmEscrow::new(rpc, addr))),
            _ => {
                warn!("Escrow not configured, staked matches are disabled");
                None
            }
        };

        let settlement: Option<Arc<dyn SettlementT>> = match (
            &config.rpc_url,
            &config.settlement_address,
            &config.server_private_key,
        ) {
            (Some(rpc), Some(addr), Some(key)) => {
                let key = ServerKey::from_hex(key)?;
                info!("Settlement signer: {}", key.address());
                Some(Arc::new(EvmSettlement::new(rpc, addr, key)?))
            }
            _ => {
                warn!("Settlement not configured, outcomes will not be attested");
                None
            }
        };

        let ens: Arc<dyn EnsResolverT> = match &config.ens_rpc_url {
            Some(url) => Arc::new(EnsResolver::new(url)),
            None => Arc::new(NullEnsResolver),
        };

        let mut registry = GameRegistry::new();
        registry.register(Arc::new(dork_game_tictactoe::TicTacToe))?;

        Ok(Self::new(
            config,
            registry,
            ContextDeps {
                storage,
                coord,
                escrow,
                settlement,
                ens,
            },
        ))
    }

    fn start_signal_loop(
        self: Arc<Self>,
        mut signal_rx: mpsc::Receiver<SignalFrame>,
        shutdown_tx: watch::Sender<bool>,
    ) -> JoinHandle<()> {
        info!("Starting signal loop");
        tokio::spawn(async move {
            while let Some(signal) = signal_rx.recv().await {
                match signal {
                    SignalFrame::RemoveMatch { match_id } => {
                        info!("Unloaded match {}", match_id);
                    }
                    SignalFrame::Shutdown => {
                        info!("Shutting down match manager");
                        self.match_manager.shutdown_all().await;
                        if shutdown_tx.send(true).is_err() {
                            warn!("No shutdown listeners");
                        }
                        break;
                    }
                }
            }
        })
    }

    pub fn signal_sender(&self) -> mpsc::Sender<SignalFrame> {
        self.signal_tx.clone()
    }

    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub async fn shutdown(&self) {
        if self.signal_tx.send(SignalFrame::Shutdown).await.is_err() {
            warn!("Signal loop already stopped");
        }
    }

    pub fn emergency_active(&self) -> bool {
        self.emergency.load(Ordering::SeqCst)
    }

    pub fn set_emergency(&self, on: bool) {
        self.emergency.store(on, Ordering::SeqCst);
    }

    pub fn match_deps(&self) -> MatchDeps {
        MatchDeps {
            storage: self.storage.clone(),
            coord: self.coord.clone(),
            escrow: self.escrow.clone(),
            settlement: self.settlement.clone(),
            settlement_enabled: self.config.settlement_enabled,
            deposit_timeout_ms: self.config.deposit_timeout_ms,
            default_move_timeout_ms: self.config.default_move_timeout_ms,
        }
    }

    /// Serializes pairing per `(gameId, stake)` so two simultaneous
    /// joins cannot consume the same ticket twice.
    pub async fn pair_lock(&self, game_id: &str, stake: &str) -> Arc<Mutex<()>> {
        let key = format!("{game_id}:{stake}");
        let mut locks = self.pair_locks.lock().await;
        locks.entry(key).or_default().clone()
    }

    /// Minimum stake from the Escrow, cached for a minute.
    pub async fn minimum_stake(&self) -> Result<U256> {
        let Some(escrow) = &self.escrow else {
            return Ok(U256::ZERO);
        };
        let mut cache = self.min_stake_cache.lock().await;
        if let Some((value, fetched_at)) = *cache {
            if fetched_at.elapsed() < MIN_STAKE_CACHE_TTL {
                return Ok(value);
            }
        }
        let value = escrow.minimum_stake().await?;
        *cache = Some((value, Instant::now()));
        Ok(value)
    }

    pub fn reject_in_emergency(&self) -> Result<()> {
        if self.emergency_active() {
            Err(Error::EmergencyMode)
        } else {
            Ok(())
        }
    }
}
