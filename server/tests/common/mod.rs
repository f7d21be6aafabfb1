use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use dork_api::registry::GameRegistry;
use dork_core::frame::FrameType;
use dork_env::Config;
use dork_game_tictactoe::TicTacToe;
use dork_local_db::LocalDbStorage;
use dork_server::context::{ApplicationContext, ContextDeps};
use dork_server::frame::RoomEvent;
use dork_store::MemoryCoordStore;
use dork_test::{DummyEscrow, DummySettlement};
use dork_transport::NullEnsResolver;

pub struct TestApp {
    pub ctx: Arc<ApplicationContext>,
    pub escrow: Arc<DummyEscrow>,
    pub settlement: Arc<DummySettlement>,
}

pub fn build_app(config: Config) -> TestApp {
    let escrow = Arc::new(DummyEscrow::default());
    let settlement = Arc::new(DummySettlement::default());
    let mut registry = GameRegistry::new();
    registry.register(Arc::new(TicTacToe)).unwrap();

    let deps = ContextDeps {
        storage: Arc::new(LocalDbStorage::try_new_mem().unwrap()),
        coord: Arc::new(MemoryCoordStore::new()),
        escrow: Some(escrow.clone()),
        settlement: Some(settlement.clone()),
        ens: Arc::new(NullEnsResolver),
    };
    let (ctx, _signal_loop) = ApplicationContext::new(config, registry, deps);
    TestApp {
        ctx,
        escrow,
        settlement,
    }
}

pub fn test_app() -> TestApp {
    build_app(Config::for_tests())
}

/// Wait for the next room event of the given frame type, skipping
/// everything else.
pub async fn wait_for_frame(
    rx: &mut broadcast::Receiver<RoomEvent>,
    frame_type: FrameType,
) -> RoomEvent {
    timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if event.frame.frame_type == frame_type => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    panic!("room closed while waiting for {frame_type:?}")
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {frame_type:?}"))
}

/// Poll until `predicate` holds.
pub async fn wait_until<F, Fut>(predicate: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    timeout(Duration::from_secs(5), async {
        loop {
            if predicate().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never became true")
}
