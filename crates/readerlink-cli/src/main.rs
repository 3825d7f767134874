mod cli;
mod output;

use anyhow::Context;
use clap::Parser;
use readerlink_core::Region;
use readerlink_hardware::mock::{MockGpio, MockReader};
use readerlink_hardware::{AnyGpio, AnyReaderDriver, platform};
use readerlink_session::{Role, SessionBuilder, SessionHandle, SubscriberId, Subscription};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use crate::cli::{Cli, Command, RunArgs};
use crate::output::{Line, parse_line};

/// Messages on this topic drive the output pin instead of the reader.
const OUTPUT_TOPIC: &str = "rfid gpo";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Ports => list_ports(),
        Command::Regions => {
            list_regions();
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = args.reader_config()?;
    if !config.is_configured() {
        warn!("no port or region configured, the reader will stay disconnected");
    }
    info!(port = %config.port, region = ?config.region, power = config.power, "starting session");

    let (reader, _reader) = MockReader::new();
    let builder = SessionBuilder::new(config, AnyReaderDriver::Mock(reader));
    let session = if args.simulate_gpio {
        let (gpio, _gpio) = MockGpio::new();
        builder.with_gpio(AnyGpio::Mock(gpio)).spawn()
    } else {
        builder.spawn()
    };

    let issuer = session
        .register(Role::CommandIssuer)
        .await
        .context("registering command issuer")?;
    let id = issuer.id;
    let printer = tokio::spawn(print_subscription(issuer));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("reading stdin")? {
                Some(line) => handle_line(&session, id, &line).await?,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    session.close().await;
    printer.await??;
    Ok(())
}

async fn handle_line(session: &SessionHandle, id: SubscriberId, line: &str) -> anyhow::Result<()> {
    let Some(message) = parse_line(line) else {
        return Ok(());
    };

    if message.topic.as_deref() == Some(OUTPUT_TOPIC) {
        return match session.write_output(message).await {
            Ok(()) => Ok(()),
            Err(e) => Line::Error {
                error: e.to_string(),
            }
            .emit(),
        };
    }

    match session.submit(id, message).await {
        Ok(accepted) => Line::Accepted {
            operation: accepted.operation.to_string(),
        }
        .emit(),
        Err(rejection) => Line::Rejected {
            reason: rejection.reason.to_string(),
            message: &rejection.message,
        }
        .emit(),
    }
}

/// Print replies and status changes until the session drops the subscriber.
async fn print_subscription(subscription: Subscription) -> anyhow::Result<()> {
    let Subscription {
        mut status,
        mut messages,
        ..
    } = subscription;

    let current = status.borrow_and_update().clone();
    Line::Status { status: &current }.emit()?;

    loop {
        tokio::select! {
            message = messages.recv() => match message {
                Some(message) => Line::Message { message: &message }.emit()?,
                None => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                Line::Status { status: &current }.emit()?;
            }
        }
    }

    // Replies that raced the status channel closing
    while let Ok(message) = messages.try_recv() {
        Line::Message { message: &message }.emit()?;
    }
    Ok(())
}

fn list_ports() -> anyhow::Result<()> {
    let ports = serialport::available_ports().context("enumerating serial ports")?;
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for port in ports {
        println!("{}", port.port_name);
    }

    let gpio = if platform::gpio_supported() {
        "available"
    } else {
        "not available"
    };
    println!("gpio: {gpio}");
    Ok(())
}

fn list_regions() {
    for region in Region::ALL {
        println!("{region}\t{}", region.code());
    }
}
