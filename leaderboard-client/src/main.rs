use anyhow::{anyhow, Context, Result};
use leaderboard_client::api::ApiClient;
use leaderboard_client::app::App;
use leaderboard_client::config::Config;
use leaderboard_client::controller::{Input, Notice, UserAction};
use leaderboard_client::stream::EventStream;
use leaderboard_client::view::{self, Command};
use rustls::crypto::ring::default_provider;
use rustls::crypto::CryptoProvider;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leaderboard_client=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    CryptoProvider::install_default(default_provider())
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    let config = Config::from_env()?;
    let api = ApiClient::new(config.backend_url.clone(), config.request_timeout)?;
    let stream = EventStream::connect(&config);
    info!(backend = %config.backend_url, stream = %config.stream_url, "leaderboard client starting");

    let mut app = App::new(&config, api, stream);
    let mut stdout = io::stdout();
    let mut lines = BufReader::new(io::stdin()).lines();

    let notices = app.dispatch(Input::User(UserAction::Mount));
    draw(&mut stdout, &app, &notices).await?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                let current = app.view();
                match view::parse_command(&line, &current, config.distribution_ratio) {
                    Ok(Command::Quit) => break,
                    Ok(Command::Help) => {
                        stdout.write_all(format!("{}\n", view::HELP).as_bytes()).await?;
                        stdout.flush().await?;
                    }
                    Ok(Command::Redraw) => draw(&mut stdout, &app, &[]).await?,
                    Ok(Command::Action(action)) => {
                        let notices = app.dispatch(Input::User(action));
                        draw(&mut stdout, &app, &notices).await?;
                    }
                    Err(message) => {
                        let notice = Notice::error(message);
                        stdout
                            .write_all(format!("{}\n", view::render_notice(&notice)).as_bytes())
                            .await?;
                        stdout.flush().await?;
                    }
                }
            }
            input = app.next_input() => {
                let Some(input) = input else {
                    warn!("input queue closed");
                    break;
                };
                let notices = app.dispatch(input);
                draw(&mut stdout, &app, &notices).await?;
            }
        }
    }

    app.shutdown();
    Ok(())
}

async fn draw(stdout: &mut io::Stdout, app: &App, notices: &[Notice]) -> Result<()> {
    let frame = view::render(&app.view(), notices);
    stdout
        .write_all(frame.as_bytes())
        .await
        .context("failed to write to stdout")?;
    stdout.flush().await.context("failed to flush stdout")?;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let ctrl_c = tokio::signal::ctrl_c();
        let terminate = match signal(SignalKind::terminate()) {
            Ok(signal) => Some(signal),
            Err(err) => {
                warn!(?err, "failed to install SIGTERM handler");
                None
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = async {
                if let Some(mut signal) = terminate {
                    signal.recv().await;
                } else {
                    std::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
