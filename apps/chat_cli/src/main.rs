use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use client_core::{
    config::load_settings, display::display_time, ChatSession, ImageFile, SendOutcome,
    SessionError, SessionEvent,
};
use shared::{
    domain::{Authorship, DisplayName, Message},
    error::ValidationError,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::warn;

#[derive(Parser, Debug)]
struct Args {
    /// Overrides `server_url` from chat.toml and the environment.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    nickname: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(server_url) = args.server_url {
        settings = settings.with_server_url(server_url);
    }

    let session = ChatSession::new(settings)?;
    let renderer = tokio::spawn(render_events(Arc::clone(&session)));

    session.connect(&args.nickname).await?;
    println!("connected as {}. /image <path>, /remove, /quit", args.nickname.trim());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/remove" => session.clear_pending().await,
            command if command.starts_with("/image ") => {
                let path = PathBuf::from(command.trim_start_matches("/image ").trim());
                attach(&session, path).await;
            }
            _ => match session.submit(&line).await {
                Ok(SendOutcome::Sent) => {}
                Ok(SendOutcome::NotConnected) => {
                    println!("not connected");
                    break;
                }
                Err(SessionError::Validation(ValidationError::EmptyMessage)) => {}
                Err(err) => println!("! {err}"),
            },
        }
    }

    session.disconnect().await;
    renderer.abort();
    Ok(())
}

async fn attach(session: &ChatSession, path: PathBuf) {
    let file = match ImageFile::read(&path).await {
        Ok(file) => file,
        Err(err) => {
            println!("! {err:#}");
            return;
        }
    };
    if let Err(err) = session.select_image(file).await {
        println!("! {err}");
    }
}

async fn render_events(session: Arc<ChatSession>) {
    let mut events = session.subscribe_events();
    loop {
        match events.recv().await {
            Ok(SessionEvent::MessageAppended { message, .. }) => {
                let me = session.display_name().await;
                print_message(&session, me.as_ref(), &message);
            }
            Ok(SessionEvent::PendingAttachmentChanged(Some(preview))) => {
                println!(
                    "attached {} ({}, {} bytes)",
                    preview.file_name, preview.media_type, preview.size_bytes
                );
            }
            Ok(SessionEvent::PendingAttachmentChanged(None)) => {}
            Ok(SessionEvent::SessionEnded { reason }) => match reason {
                Some(reason) => println!("disconnected: {reason}"),
                None => println!("disconnected"),
            },
            Ok(SessionEvent::StateChanged(_)) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "chat_cli: renderer fell behind");
            }
            Err(RecvError::Closed) => return,
        }
    }
}

fn print_message(session: &ChatSession, me: Option<&DisplayName>, message: &Message) {
    let time = display_time(message.timestamp());
    let authorship = match me {
        Some(me) => message.authorship(me),
        None if message.sender().is_system() => Authorship::System,
        None => Authorship::Other,
    };
    match authorship {
        Authorship::System => println!("* {} ({time})", message.body()),
        Authorship::Own => println!("[{time}] you: {}", message.body()),
        Authorship::Other => {
            let nickname = message.sender().nickname().unwrap_or("?");
            println!("[{time}] {nickname}: {}", message.body());
        }
    }

    if let Some(attachment) = message.attachment() {
        match session.settings().resolve_media_url(&attachment.url) {
            Some(url) => println!("    image: {url}"),
            None => println!("    image: {}", attachment.url),
        }
    }
}
