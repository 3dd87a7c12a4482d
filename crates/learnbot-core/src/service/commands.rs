use crate::types::Command;

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse user text into a bot command, or `None` if not a command.
///
/// Accepts `/name`, `/name@BotName` and trailing arguments; names are
/// matched case-insensitively.
pub fn parse_command(text: &str) -> Option<Command> {
    let trimmed = text.trim_start();
    let rest = trimmed.strip_prefix('/')?;

    let word = rest.split(char::is_whitespace).next().unwrap_or("");
    let name = word.split('@').next().unwrap_or("");
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }

    let name = name.to_ascii_lowercase();
    Some(match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        _ => Command::Other(name),
    })
}
