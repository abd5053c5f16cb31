use dialoguer::console::style;

pub enum CommandStatus {
    Success,
    Error,
    Warning,
    Canceled,
}

/// Prints a one-line status to stderr, prefixed with a colored marker.
pub fn print_command_status(status: CommandStatus, message: &str) {
    let indicator = match status {
        CommandStatus::Success => style("✓").green(),
        CommandStatus::Error => style("✗").red(),
        CommandStatus::Warning => style("!").yellow(),
        CommandStatus::Canceled => style("■").dim(),
    };
    eprintln!("{indicator} {message}");
}
