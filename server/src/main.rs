use clap::{arg, Command};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dork_env::Config;
use dork_server::context::ApplicationContext;
use dork_server::server::run_server;
use dork_server::sweeper::start_sweepers;

fn cli() -> Command {
    Command::new("dork-server")
        .about("dork.fun match hosting server")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(Command::new("run").arg(arg!(--"log-dir" [dir] "Directory for log files")))
}

async fn run(log_dir: Option<&String>) -> anyhow::Result<()> {
    let _guard = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "dork-server.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
                .with(fmt::layer())
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
                .with(fmt::layer())
                .init();
            None
        }
    };

    let config = Config::from_env()?;
    let (ctx, signal_handle) = ApplicationContext::try_from_env(config).await?;
    let sweeper = start_sweepers(ctx.clone());

    // SIGTERM/SIGINT drain the matches and stop the listener.
    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let terminate = async {
                #[cfg(unix)]
                {
                    use tokio::signal::unix::{signal, SignalKind};
                    match signal(SignalKind::terminate()) {
                        Ok(mut sigterm) => {
                            sigterm.recv().await;
                        }
                        Err(_) => std::future::pending::<()>().await,
                    }
                }
                #[cfg(not(unix))]
                std::future::pending::<()>().await
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate => {}
            }
            info!("Shutdown signal received");
            ctx.shutdown().await;
        });
    }

    run_server(ctx).await?;
    sweeper.abort();
    signal_handle.await.ok();
    info!("Bye");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("run", subcommand_matches)) => {
            run(subcommand_matches.get_one::<String>("log-dir")).await
        }
        _ => unreachable!(),
    }
}
