//! PipeKV Client Binary
//!
//! Connects to a server, reads commands from stdin and prints
//! notifications as they arrive.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

use clap::Parser;
use pipekv::client::{parse_client_command, ClientCommand, ClientPaths, Connection};
use pipekv::protocol::ResultCode;
use tracing_subscriber::{fmt, EnvFilter};

/// PipeKV Client
#[derive(Parser, Debug)]
#[command(name = "pipekv-client")]
#[command(about = "Subscribe to keys on a PipeKV server")]
#[command(version)]
struct Args {
    /// Unique client id
    id: String,

    /// Path of the server's registration FIFO
    register_pipe: PathBuf,

    /// Directory the client's FIFOs are created in
    #[arg(short, long, default_value = "/tmp")]
    fifo_dir: PathBuf,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,pipekv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let paths = ClientPaths::for_id(&args.fifo_dir, &args.id);

    let mut conn = match Connection::connect(&args.id, paths, &args.register_pipe) {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("Failed to connect to the server: {}", e);
            process::exit(1);
        }
    };

    let notifications = match conn.notifications() {
        Ok(rx) => rx,
        Err(e) => {
            tracing::error!("Failed to start notification reader: {}", e);
            process::exit(1);
        }
    };
    let printer = thread::spawn(move || {
        for n in notifications {
            let mut stdout = io::stdout().lock();
            let printed = writeln!(stdout, "({},{})", n.key, n.value);
            if let Err(e) = printed.and_then(|_| stdout.flush()) {
                tracing::error!("Failed to print notification: {}", e);
                break;
            }
        }
    });

    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to read stdin: {}", e);
                break;
            }
        };

        match parse_client_command(&line) {
            ClientCommand::Subscribe(key) => match conn.subscribe(&key) {
                Ok(result) => print_result("subscribe", result),
                Err(e) => tracing::error!("Command subscribe failed: {}", e),
            },
            ClientCommand::Unsubscribe(key) => match conn.unsubscribe(&key) {
                Ok(result) => print_result("unsubscribe", result),
                Err(e) => tracing::error!("Command unsubscribe failed: {}", e),
            },
            ClientCommand::Delay(ms) => {
                if ms > 0 {
                    println!("Waiting...");
                    thread::sleep(Duration::from_millis(ms));
                }
            }
            ClientCommand::Disconnect => break,
            ClientCommand::Empty => {}
            ClientCommand::Invalid(_) => {
                tracing::warn!("Invalid command. See HELP for usage");
            }
        }
    }

    match conn.disconnect() {
        Ok(_) => println!("Disconnected from server"),
        Err(e) => {
            tracing::error!("Failed to disconnect from the server: {}", e);
            process::exit(1);
        }
    }

    if printer.join().is_err() {
        tracing::error!("Notification printer panicked");
    }
}

fn print_result(operation: &str, result: ResultCode) {
    println!(
        "Server returned {} for operation: {}",
        result as u8 as char, operation
    );
}
