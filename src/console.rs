// src/console.rs
//
// Line-based command front end over stdin/stdout.
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::warn;

use crate::commands;
use crate::core::engine::CommandRequest;

const HELP: &str = "\
Commands:
  setcoin <SYMBOL>      switch the traded pair (e.g. BTCUSDT); resets the reference price
  set_decrease <x>      buy-trigger / trailing-stop fraction, 0 < x < 1 (0.02 = 2%)
  set_increase <x>      profit-target fraction, 0 < x < 1 (0.03 = 3%)
  set_amount <x>        quote currency spent per buy
  set_budget <x>        lifetime spend ceiling; also resets the remaining budget
  start                 start the price monitor
  stop                  stop the price monitor
  status                show the current state
  reset                 restore defaults, clear position and reference price
  help                  this text
  quit                  exit";

pub async fn run(commands_tx: mpsc::Sender<CommandRequest>, shutdown: watch::Sender<bool>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break, // stdin closed
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line {
            "help" => {
                println!("{HELP}");
                continue;
            }
            "quit" | "exit" => break,
            _ => {}
        }

        let command = match commands::parse_line(line) {
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = CommandRequest {
            command,
            reply: reply_tx,
        };
        if commands_tx.send(request).await.is_err() {
            println!("engine is gone; exiting");
            break;
        }
        match reply_rx.await {
            Ok(Ok(reply)) => println!("{}", reply.text),
            Ok(Err(e)) => println!("{e}"),
            Err(_) => {
                println!("engine dropped the command");
                break;
            }
        }
    }

    let _ = shutdown.send(true);
}
