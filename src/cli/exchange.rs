use std::future::Future;
use std::io::{self, Write};

use tokio_util::sync::CancellationToken;

use crate::cli::render::{render_live, ReplyPrinter};
use crate::core::controller::SubmitOutcome;
use crate::core::session::ChatSession;

/// Submits `input` and prints the reply as it arrives.
///
/// `during` runs alongside the exchange (the REPL uses it to read keystrokes)
/// and is dropped as soon as the exchange finishes.
pub async fn run_exchange<D>(
    session: &ChatSession,
    input: &str,
    during: D,
) -> io::Result<SubmitOutcome>
where
    D: Future<Output = io::Result<()>>,
{
    let reveal = session.controller().settings().reveal;
    let stop = CancellationToken::new();
    let render = tokio::spawn(render_live(
        session.conversation(),
        ReplyPrinter::new(reveal),
        stop.clone(),
    ));

    let outcome = {
        let submit = session.submit(input);
        tokio::pin!(submit);
        tokio::pin!(during);
        let mut during_done = false;
        loop {
            tokio::select! {
                outcome = &mut submit => break outcome,
                result = &mut during, if !during_done => {
                    during_done = true;
                    result?;
                }
            }
        }
    };

    stop.cancel();
    let mut printer = render.await.map_err(io::Error::other)??;

    let snapshot = session.controller().snapshot();
    let committed = match &outcome {
        SubmitOutcome::Ignored(_) => None,
        _ => snapshot.messages.last().filter(|message| message.is_assistant()),
    };
    let rest = committed.and_then(|message| printer.finish(&message.content));
    if printer.has_output() {
        let time = committed.map(|message| message.display_time()).unwrap_or_default();
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}  [{time}]", rest.unwrap_or_default())?;
        stdout.flush()?;
    }
    Ok(outcome)
}
