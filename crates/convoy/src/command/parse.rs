//! Command-line parsing for chat messages.

use std::borrow::Cow;

/// Marker that starts a command.
pub const COMMAND_MARKER: char = '/';

/// The command that turns a registered prompt file into an assistant run.
pub const INVOKE_COMMAND: &str = "command-invoke";

/// Command words accepted without the leading marker.
pub const BARE_COMMANDS: &[&str] = &[
    "help",
    "status",
    "getcwd",
    "setcwd",
    "clone",
    "repos",
    "commands",
    "command-set",
    "load-commands",
    "reset",
    INVOKE_COMMAND,
];

/// A marker-prefixed message split into its name and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub args: Vec<String>,
}

/// Prefix the marker when the message starts with a known bare command word.
pub fn normalize(text: &str) -> Cow<'_, str> {
    let trimmed = text.trim_start();
    if trimmed.starts_with(COMMAND_MARKER) {
        return Cow::Borrowed(trimmed);
    }
    match trimmed.split_whitespace().next() {
        Some(word) if BARE_COMMANDS.contains(&word) => {
            Cow::Owned(format!("{COMMAND_MARKER}{trimmed}"))
        }
        _ => Cow::Borrowed(text),
    }
}

/// Whether a (normalized) message is addressed to the command handler.
///
/// True for any text starting with the marker, including a bare marker.
pub fn is_command(text: &str) -> bool {
    text.trim_start().starts_with(COMMAND_MARKER)
}

/// Parse a marker-prefixed message. Returns `None` for plain text.
pub fn parse_command(text: &str) -> Option<ParsedCommand> {
    let rest = text.trim_start().strip_prefix(COMMAND_MARKER)?;
    let mut tokens = tokenize(rest).into_iter();
    let name = tokens.next().filter(|n| !n.is_empty())?;
    Some(ParsedCommand {
        name,
        args: tokens.collect(),
    })
}

/// Split on whitespace, keeping single- or double-quoted runs together.
///
/// Quotes are stripped and inner spacing is preserved. An unterminated quote
/// runs to the end of the input.
pub fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

/// Expand `$1`..`$9` and `$ARGUMENTS` in a command template.
///
/// A positional reference without a matching argument is left as written.
/// Substituted text is not expanded again.
pub fn substitute(template: &str, args: &[String]) -> String {
    const ALL_ARGS: &str = "ARGUMENTS";

    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix(ALL_ARGS) {
            out.push_str(&args.join(" "));
            rest = tail;
            continue;
        }

        match after.chars().next().and_then(|c| c.to_digit(10)) {
            Some(n @ 1..=9) => {
                match args.get(n as usize - 1) {
                    Some(arg) => out.push_str(arg),
                    None => {
                        out.push('$');
                        out.push_str(&after[..1]);
                    }
                }
                rest = &after[1..];
            }
            _ => {
                out.push('$');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
