//! # hotlist
//!
//! Line-oriented frontend over the application controller. Boots against
//! the local cache, completes a provider redirect when one is passed on
//! the command line, and then takes simple commands on stdin while
//! background sync runs.

use std::str::FromStr;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use hotlist_app::{AppConfig, Controller, Notice};
use hotlist_shared::{ClientRecord, ClientStatus};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,hotlist_app=debug,hotlist_cloud=debug,hotlist_store=info")
    });
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Starting Hotlist v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from_env();
    let redirect_url = redirect_arg();

    let (controller, notices) = Controller::from_config(config)?;
    controller.boot(redirect_url.as_deref()).await;

    tokio::spawn(print_notices(notices));

    run_command_loop(&controller).await?;

    controller.shutdown();
    Ok(())
}

/// `--redirect-url <url>`: the URL a provider redirect landed on, so a
/// browser-completed login can be finished here.
fn redirect_arg() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--redirect-url" {
            return args.next();
        }
    }
    None
}

async fn print_notices(mut notices: mpsc::UnboundedReceiver<Notice>) {
    while let Some(notice) = notices.recv().await {
        match notice {
            Notice::StateRefreshed { clients } => {
                println!("state refreshed ({clients} clients)");
            }
            Notice::SignedIn { email } => println!("signed in as {email}"),
            Notice::SignedOut => println!("not signed in"),
            Notice::AuthFailure { message } => eprintln!("auth error: {message}"),
        }
    }
}

async fn run_command_loop(controller: &Controller) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("hotlist ready — type 'help' for commands");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c, shutting down");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !dispatch(controller, line.trim()).await {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Handle one command line; returns `false` to exit.
async fn dispatch(controller: &Controller, line: &str) -> bool {
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    match cmd {
        "" => {}
        "help" => print_help(),
        "list" => {
            let doc = controller.document();
            if doc.clients.is_empty() {
                println!("no clients");
            }
            for client in &doc.clients {
                println!("{}  {:?}  {}", client.id, client.status, client.name);
            }
        }
        "add" => {
            if rest.is_empty() {
                println!("usage: add <name>");
            } else {
                controller.add_client(ClientRecord::named(rest)).await;
                println!("added {rest}");
            }
        }
        "rm" => match Uuid::from_str(rest) {
            Ok(id) => {
                if controller.remove_client(id).await {
                    println!("removed {id}");
                } else {
                    println!("no client with id {id}");
                }
            }
            Err(_) => println!("usage: rm <client-id>"),
        },
        "mark" => {
            let (id, status) = match rest.split_once(char::is_whitespace) {
                Some((id, status)) => (id, status.trim()),
                None => ("", ""),
            };
            match (Uuid::from_str(id), parse_status(status)) {
                (Ok(id), Some(status)) => {
                    if controller.update_client_status(id, status).await {
                        println!("marked {id} {status:?}");
                    } else {
                        println!("no client with id {id}");
                    }
                }
                _ => println!("usage: mark <client-id> hot|warm|cold"),
            }
        }
        "quotes" => {
            if rest.is_empty() {
                let doc = controller.document();
                for quote in &doc.quotes.list {
                    println!("{quote}");
                }
            } else {
                controller.set_quotes(rest).await;
                println!("quotes updated");
            }
        }
        "login" => {
            if rest.is_empty() {
                println!("usage: login <email>");
            } else {
                match controller.sign_in_with_email(rest).await {
                    Ok(()) => println!("magic link sent to {rest}; open it, then run: redirect <landing-url>"),
                    Err(e) => eprintln!("login failed: {e}"),
                }
            }
        }
        "oauth" => {
            let provider = if rest.is_empty() { "google" } else { rest };
            match controller.sign_in_with_provider(provider) {
                Ok(url) => println!("open in a browser:\n{url}\nthen run: redirect <landing-url>"),
                Err(e) => eprintln!("login failed: {e}"),
            }
        }
        "redirect" => {
            if rest.is_empty() {
                println!("usage: redirect <landing-url>");
            } else {
                controller.handle_redirect_url(rest).await;
            }
        }
        "logout" => controller.sign_out().await,
        "save" => {
            controller.persist_state().await;
            println!("saved");
        }
        "status" => {
            match controller.current_user() {
                Some(user) => println!("signed in as {} via {}", user.email, user.provider),
                None => println!("not signed in"),
            }
            if let Some(status) = controller.sync_status() {
                println!(
                    "sync enabled: {}; last push: {}",
                    status.enabled,
                    status
                        .last_sync
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".into())
                );
            } else {
                println!("cloud sync not configured");
            }
        }
        "quit" | "exit" => return false,
        other => println!("unknown command '{other}' — type 'help'"),
    }

    true
}

fn parse_status(s: &str) -> Option<ClientStatus> {
    match s {
        "hot" => Some(ClientStatus::Hot),
        "warm" => Some(ClientStatus::Warm),
        "cold" => Some(ClientStatus::Cold),
        _ => None,
    }
}

fn print_help() {
    println!(
        "commands:\n  \
         list                      show clients\n  \
         add <name>                add a client\n  \
         rm <client-id>            remove a client\n  \
         mark <client-id> <level>  set status (hot|warm|cold)\n  \
         quotes [text]             show or replace quotes\n  \
         login <email>             request a magic link\n  \
         oauth [provider]          start a third-party login\n  \
         redirect <url>            complete a login from a landing URL\n  \
         logout                    sign out\n  \
         save                      persist now (local + cloud)\n  \
         status                    auth + sync status\n  \
         quit                      exit"
    );
}
