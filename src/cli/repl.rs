//! Interactive line-oriented chat loop.

use std::error::Error;
use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::debug;

use crate::cli::exchange::run_exchange;
use crate::commands::{process_input, CommandResult};
use crate::core::controller::{IgnoreReason, SubmitOutcome};
use crate::core::session::ChatSession;
use crate::core::verifier::VerificationOutcome;

type InputLines = Lines<BufReader<Stdin>>;

fn prompt() -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    write!(stdout, "> ")?;
    stdout.flush()
}

fn notice(text: &str) {
    println!("· {text}");
}

pub async fn run_repl(session: &ChatSession, base_url: &str) -> Result<(), Box<dyn Error>> {
    println!("driftchat: connected to {base_url}. Type /help for commands.");
    if !session.verifier().state().read(|state| state.has_credential()) {
        notice("No API key set. Use /key <api-key> or set DRIFTCHAT_API_KEY.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt()?;
        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        match process_input(session, &line) {
            CommandResult::Notice(text) => notice(&text),
            CommandResult::Quit => break,
            CommandResult::Verify => verify(session).await,
            CommandResult::ProcessAsMessage(text) => {
                if text.trim().is_empty() {
                    continue;
                }
                let during = watch_input(session, &mut lines);
                match run_exchange(session, &text, during).await? {
                    SubmitOutcome::Ignored(IgnoreReason::EmptyInput) => {}
                    SubmitOutcome::Ignored(reason) => notice(reason.describe()),
                    SubmitOutcome::Completed | SubmitOutcome::Failed(_) => {}
                }
            }
        }
    }
    debug!("Chat loop finished");
    Ok(())
}

/// Reads input while a reply is in progress: an empty line skips the
/// typewriter replay, anything else is refused because only one exchange runs
/// at a time.
async fn watch_input(session: &ChatSession, lines: &mut InputLines) -> io::Result<()> {
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            session.controller().skip_reveal();
        } else {
            notice(IgnoreReason::Busy.describe());
        }
    }
    Ok(())
}

async fn verify(session: &ChatSession) {
    notice("Verifying API key...");
    match session.verify().await {
        VerificationOutcome::Verified => notice("API key verified."),
        _ => {
            let message = session
                .verifier()
                .state()
                .read(|state| state.last_error.clone())
                .unwrap_or_else(|| "Verification failed.".to_string());
            notice(&message);
        }
    }
}
