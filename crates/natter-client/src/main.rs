mod input;
mod net;

use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use input::{Action, InputParser, USAGE};
use natter_protocol::Message;
use net::Client;

/// How long to wait for the server to close its side after a quit.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(name = "natter-client", about = "Line-based chat client", version)]
struct Args {
    /// Name to register with on connect.
    name: String,

    #[arg(long, default_value = "127.0.0.1")]
    address: String,

    #[arg(long)]
    port: u16,
}

/// Blocking stdin reader on its own thread, so a pending read never holds
/// up runtime shutdown.
fn read_lines(tx: mpsc::Sender<String>) {
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        if tx.blocking_send(line).is_err() {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is for the conversation
    FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let addr = tokio::net::lookup_host((args.address.as_str(), args.port))
        .await?
        .next()
        .with_context(|| format!("could not resolve {}", args.address))?;

    let mut client = Client::new()?;
    let (mut reader, mut writer) = client
        .connect(addr)
        .await
        .context("unable to connect to server")?;

    writer.send(&Message::connect(args.name.as_str())).await?;

    let (line_tx, mut line_rx) = mpsc::channel(64);
    std::thread::spawn(move || read_lines(line_tx));

    let mut parser = InputParser::new();
    let mut quitting = false;

    loop {
        tokio::select! {
            line = line_rx.recv() => {
                let Some(line) = line else {
                    debug!("stdin closed");
                    break;
                };
                match parser.feed(&line) {
                    Ok(Action::Send(message)) => writer.send(&message).await?,
                    Ok(Action::Quit(message)) => {
                        writer.send(&message).await?;
                        quitting = true;
                        break;
                    }
                    Ok(Action::PromptName) => {
                        print!("name: ");
                        std::io::stdout().flush()?;
                    }
                    Err(e) => println!("{}\n{}", e, USAGE),
                }
            }

            result = reader.recv() => match result {
                Ok(Some(message)) => {
                    println!("{} - {}: {}", message.kind, message.sender_name, message.body);
                }
                Ok(None) => {
                    println!("Server terminated connection");
                    break;
                }
                Err(e) => {
                    println!("Error receiving message: {}", e);
                    break;
                }
            }
        }
    }

    let _ = writer.shutdown().await;
    if quitting {
        let drained = tokio::time::timeout(DISCONNECT_GRACE, async {
            while let Ok(Some(_)) = reader.recv().await {}
        })
        .await;
        if drained.is_err() {
            debug!("server did not close within {:?}", DISCONNECT_GRACE);
        }
    }
    client.close().await;

    Ok(())
}
