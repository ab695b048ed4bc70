mod cli;
mod display;

use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use roomchat_client::{
    Authenticator, ChatSession, EnvAuthenticator, LoadOutcome, StaticAuthenticator,
};
use roomchat_common::{ChatError, ClientEvent, ConnectionState, RoomId};
use roomchat_config::RoomchatConfig;

use cli::{Args, Input};
use display::Printer;

fn init_tracing(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        directive
            .parse::<tracing_subscriber::filter::Directive>()
            .map(|d| EnvFilter::default().add_directive(d))
            .unwrap_or_else(|_| EnvFilter::new("roomchat=info"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    // Logging depends on the config, so load it first and report afterwards.
    let loaded = roomchat_config::load_config(args.config.as_deref());
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(e) if args.config.is_some() => {
            eprintln!("roomchat: {e}");
            return ExitCode::FAILURE;
        }
        Err(_) => RoomchatConfig::default(),
    };
    args.apply(&mut config);

    init_tracing(&args.log_directive(&config));
    info!("roomchat v{} starting", env!("CARGO_PKG_VERSION"));
    if let Err(e) = &loaded {
        warn!("Config load failed, using defaults: {e}");
    }

    match run(&args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "roomchat exited with an error");
            eprintln!("roomchat: {e}");
            ExitCode::FAILURE
        }
    }
}

fn authenticator(args: &Args, config: &RoomchatConfig) -> Arc<dyn Authenticator> {
    match &args.token {
        Some(token) => Arc::new(StaticAuthenticator::new(Some(token.clone()))),
        None => Arc::new(EnvAuthenticator::new(config.identity.token_env.clone())),
    }
}

async fn run(args: &Args, config: RoomchatConfig) -> Result<(), ChatError> {
    let auth = authenticator(args, &config);
    if auth.current_credential().is_none() {
        info!("No credential available, joining anonymously");
    }

    let session = ChatSession::from_config(&config, auth)?;
    let mut events = session.subscribe();
    let mut printer = Printer::new(std::io::stdout());
    let room = RoomId::from(args.room.as_str());

    match session.enter_room(&room).await {
        Ok(_) => {}
        Err(e) if e.is_retryable() => {
            let _ = printer.status(&format!("{e} (/retry to try again)"));
        }
        Err(e) => return Err(e),
    }
    let _ = printer.status(&format!("joined {room}, type /help for commands"));
    let _ = printer.sync(&session.store().messages().await);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !handle_input(&session, &mut printer, Input::parse(&line)).await {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(event) => show_event(&session, &mut printer, event).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged");
                    let _ = printer.sync(&session.store().messages().await);
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

/// Returns false when the user asked to quit.
async fn handle_input<W: std::io::Write>(
    session: &ChatSession,
    printer: &mut Printer<W>,
    input: Input,
) -> bool {
    let is_text = matches!(input, Input::Text(_));
    let result = match input {
        Input::Quit => return false,
        Input::Empty => Ok(()),
        Input::Help => {
            let _ = printer.raw(cli::HELP);
            Ok(())
        }
        Input::More => session.load_older().await.map(|outcome| {
            if outcome == LoadOutcome::Skipped {
                let _ = printer.status("no older messages");
            }
        }),
        Input::Reconnect => session.reconnect().await,
        Input::Retry => session.reload().await.map(|_| ()),
        Input::Text(text) => session.send(&text).await.map(|_| ()),
    };

    // History and fallback failures are already reported through events.
    if let Err(e) = result {
        let via_event = matches!(e, ChatError::Fetch(_))
            || (is_text && session.sender().send_error().await.is_some());
        if !via_event {
            let _ = printer.status(&e.to_string());
        }
    }
    true
}

async fn show_event<W: std::io::Write>(
    session: &ChatSession,
    printer: &mut Printer<W>,
    event: ClientEvent,
) {
    let _ = match event {
        ClientEvent::MessagesChanged { .. } => printer
            .sync(&session.store().messages().await)
            .map(|_| ()),
        ClientEvent::ConnectionStateChanged {
            state: ConnectionState::Failed,
            ..
        } => match session.connection_error().await {
            Some(ChatError::Network(reason)) => printer.status(&format!(
                "connection: failed, {reason} (/reconnect to try again)"
            )),
            _ => printer.status("connection: failed"),
        },
        ClientEvent::ConnectionStateChanged { state, .. } => {
            printer.status(&format!("connection: {state}"))
        }
        ClientEvent::HistoryFailed { error, .. } => {
            printer.status(&format!("{error} (/retry to try again)"))
        }
        ClientEvent::SendFailed { error, .. } => printer.status(&error),
        ClientEvent::AuthRejected { reason, .. } => printer.status(&format!(
            "authentication rejected: {reason} (/reconnect after fixing the token)"
        )),
    };
}
