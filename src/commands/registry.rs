use super::CommandResult;
use crate::core::session::ChatSession;

pub type CommandHandler = fn(&ChatSession, CommandInvocation<'_>) -> CommandResult;

pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    pub handler: CommandHandler,
}

#[derive(Clone, Copy)]
pub struct CommandInvocation<'a> {
    pub args: &'a str,
}

pub fn all_commands() -> &'static [Command] {
    COMMANDS
}

pub fn find_command(name: &str) -> Option<&'static Command> {
    all_commands()
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

/// Commands whose name starts with `prefix`, for completion hints.
pub fn matching_commands(prefix: &str) -> Vec<&'static Command> {
    let prefix = prefix.to_ascii_lowercase();
    all_commands()
        .iter()
        .filter(|command| command.name.starts_with(&prefix))
        .collect()
}

const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        usage: "/help",
        help: "Show available commands and usage information.",
        handler: super::handle_help,
    },
    Command {
        name: "key",
        usage: "/key <api-key>",
        help: "Set the API key used for new messages.",
        handler: super::handle_key,
    },
    Command {
        name: "verify",
        usage: "/verify",
        help: "Check the current API key against the chat service.",
        handler: super::handle_verify,
    },
    Command {
        name: "system",
        usage: "/system [text]",
        help: "Show or replace the developer message sent with each prompt.",
        handler: super::handle_system,
    },
    Command {
        name: "clear",
        usage: "/clear",
        help: "Clear the conversation.",
        handler: super::handle_clear,
    },
    Command {
        name: "quit",
        usage: "/quit",
        help: "Leave the chat.",
        handler: super::handle_quit,
    },
];
