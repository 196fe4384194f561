use std::sync::Arc;

use clap::{Parser, Subcommand};
use qc_faults::FaultConfig;
use qc_referendum::VoteId;
use qc_transport::Conversation;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const HELP_TEXT: &str = "\
commands:
  help
  request-vote <boolean expression>
  send-with-duplicates <count>
  set-loss-constant <0.0-1.0>
  set-defect-rate <0.0-1.0>
  send-hello
  disconnect";

#[derive(Parser, Debug)]
#[command(name = "", no_binary_name = true, disable_help_subcommand = true)]
struct OperatorLine {
    #[command(subcommand)]
    cmd: OperatorCommand,
}

#[derive(Subcommand, Debug)]
enum OperatorCommand {
    /// List available commands
    Help,
    /// Propose a boolean expression as a new referendum
    RequestVote {
        #[arg(trailing_var_arg = true)]
        question: Vec<String>,
    },
    /// Set how many extra duplicate datagrams follow every send, then send a HELLO
    SendWithDuplicates { count: u8 },
    /// Set the probability that an outbound datagram is dropped
    SetLossConstant { value: f64 },
    /// Set the probability of flipping a locally computed answer
    SetDefectRate { value: f64 },
    /// Send a HELLO to the server
    SendHello,
    /// Terminate the process
    Disconnect,
}

/// The operator menu (spec.md §6): a line-oriented stdin loop over a small
/// `clap`-derived subcommand set, modeled on `tools/netem/src/main.rs`'s
/// `Parser`/`Subcommand` style rather than a hand-rolled prompt parser.
pub async fn run(conv: Arc<Conversation>, faults: Arc<FaultConfig>) {
    println!("{HELP_TEXT}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }

        let cmd = match OperatorLine::try_parse_from(tokens) {
            Ok(parsed) => parsed.cmd,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match cmd {
            OperatorCommand::Help => println!("{HELP_TEXT}"),
            OperatorCommand::RequestVote { question } => {
                let text = question.join(" ");
                let vote_id = VoteId::new_random();
                info!(%vote_id, question = %text, "requesting vote");
                conv.send_vote_request(vote_id.to_wire(), text.into_bytes()).await;
            }
            OperatorCommand::SendWithDuplicates { count } => {
                faults.set_duplicates_mode(count);
                conv.send_hello().await;
            }
            OperatorCommand::SetLossConstant { value } => faults.set_loss_constant(value),
            OperatorCommand::SetDefectRate { value } => faults.set_defect_constant(value),
            OperatorCommand::SendHello => conv.send_hello().await,
            OperatorCommand::Disconnect => {
                warn!("operator requested disconnect");
                std::process::exit(0);
            }
        }
    }
}
