mod registry;

pub use registry::{all_commands, matching_commands, CommandInvocation};

use crate::core::session::ChatSession;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Informational text for the user; never part of the transcript.
    Notice(String),
    ProcessAsMessage(String),
    /// Run a credential probe; the caller owns the await.
    Verify,
    Quit,
}

pub fn process_input(session: &ChatSession, input: &str) -> CommandResult {
    let trimmed = input.trim();

    if !trimmed.starts_with('/') {
        return CommandResult::ProcessAsMessage(input.to_string());
    }

    let mut parts = trimmed[1..].splitn(2, ' ');
    let command_name = match parts.next() {
        Some(name) if !name.is_empty() => name,
        _ => return CommandResult::ProcessAsMessage(input.to_string()),
    };
    let args = parts.next().unwrap_or("").trim();

    if let Some(command) = registry::find_command(command_name) {
        (command.handler)(session, CommandInvocation { args })
    } else {
        let hints: Vec<&str> = matching_commands(command_name)
            .iter()
            .map(|command| command.usage)
            .collect();
        if hints.is_empty() {
            CommandResult::Notice(format!(
                "Unknown command: /{command_name}. Type /help for a list."
            ))
        } else {
            CommandResult::Notice(format!(
                "Unknown command: /{command_name}. Did you mean {}?",
                hints.join(" or ")
            ))
        }
    }
}

pub fn help_text() -> String {
    let mut help = String::from("Commands:\n");
    for command in all_commands() {
        help.push_str(&format!("  {:<16} {}\n", command.usage, command.help));
    }
    help.push_str("Anything else is sent as a message.");
    help
}

pub(super) fn handle_help(
    _session: &ChatSession,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    CommandResult::Notice(help_text())
}

pub(super) fn handle_key(
    session: &ChatSession,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    if invocation.args.is_empty() {
        return CommandResult::Notice("Usage: /key <api-key>".to_string());
    }
    if session.set_credential(invocation.args) {
        CommandResult::Notice("API key updated. Use /verify to check it.".to_string())
    } else {
        CommandResult::Notice("That API key is already in use.".to_string())
    }
}

pub(super) fn handle_verify(
    _session: &ChatSession,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    CommandResult::Verify
}

pub(super) fn handle_system(
    session: &ChatSession,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    let controller = session.controller();
    if invocation.args.is_empty() {
        return CommandResult::Notice(format!(
            "Developer message: {}",
            controller.developer_message()
        ));
    }
    controller.set_developer_message(invocation.args);
    CommandResult::Notice("Developer message updated.".to_string())
}

pub(super) fn handle_clear(
    session: &ChatSession,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    if session.controller().clear() {
        CommandResult::Notice("Transcript cleared".to_string())
    } else {
        CommandResult::Notice("Cannot clear while a reply is in progress.".to_string())
    }
}

pub(super) fn handle_quit(
    _session: &ChatSession,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    CommandResult::Quit
}
