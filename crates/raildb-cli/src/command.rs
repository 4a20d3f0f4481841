//! Command-line tokenizer for the `[ts] cmd -k v ...` stream.

use std::collections::HashMap;

/// One parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub ts: i64,
    pub name: String,
    args: HashMap<char, String>,
}

impl Command {
    /// Parses a command line; `None` for malformed input (which the
    /// dispatch loop skips).
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();

        let ts = tokens
            .next()?
            .strip_prefix('[')?
            .strip_suffix(']')?
            .parse()
            .ok()?;
        let name = tokens.next()?.to_string();

        let mut args = HashMap::new();
        while let Some(flag) = tokens.next() {
            let mut key = flag.strip_prefix('-')?.chars();
            let (flag_char, rest) = (key.next()?, key.next());
            if rest.is_some() {
                return None;
            }
            args.insert(flag_char, tokens.next()?.to_string());
        }

        Some(Self { ts, name, args })
    }

    /// The value of one flag, if present.
    pub fn arg(&self, flag: char) -> Option<&str> {
        self.args.get(&flag).map(String::as_str)
    }

    /// The value of one flag, or `default` when absent.
    pub fn arg_or<'a>(&'a self, flag: char, default: &'a str) -> &'a str {
        self.arg(flag).unwrap_or(default)
    }
}
