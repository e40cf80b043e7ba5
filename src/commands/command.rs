//! Parsed Commands
//!
//! A [`Command`] is what the protocol layer hands to the dispatcher: a
//! lowercased name plus binary-safe arguments. It is immutable once built.

use bytes::Bytes;
use std::fmt;

use crate::error::{CommandError, CommandResult, ProtocolError};
use crate::storage::value::parse_canonical_int;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<Bytes>,
}

impl Command {
    pub fn new(name: impl AsRef<str>, args: Vec<Bytes>) -> Self {
        Self {
            name: name.as_ref().to_ascii_lowercase(),
            args,
        }
    }

    /// Builds a command from a protocol frame (`[name, arg1, arg2, ...]`).
    pub fn from_parts(parts: Vec<Bytes>) -> Result<Self, ProtocolError> {
        let mut parts = parts.into_iter();
        let name = parts.next().ok_or(ProtocolError::Empty)?;
        let name = std::str::from_utf8(&name).map_err(|_| ProtocolError::InvalidName)?;
        if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ProtocolError::InvalidName);
        }
        Ok(Self::new(name, parts.collect()))
    }

    /// Parses an inline command such as `SET "my key" 'a value'`.
    ///
    /// Double-quoted tokens understand `\n`, `\r`, `\t`, `\\`, `\"` and
    /// `\xHH` escapes; single-quoted tokens only `\'`.
    pub fn parse_inline(line: &str) -> Result<Self, ProtocolError> {
        Self::from_parts(split_inline(line)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Argument count including the command name.
    pub fn argc(&self) -> usize {
        self.args.len() + 1
    }

    /// The `i`-th argument (0-based, name excluded).
    pub fn arg(&self, i: usize) -> CommandResult<&Bytes> {
        self.args
            .get(i)
            .ok_or_else(|| CommandError::WrongArity(self.name.clone()))
    }

    /// The `i`-th argument parsed as a signed integer.
    pub fn int_arg(&self, i: usize) -> CommandResult<i64> {
        parse_int(self.arg(i)?)
    }

    /// The `i`-th argument uppercased, for option keywords.
    pub fn keyword(&self, i: usize) -> CommandResult<String> {
        Ok(String::from_utf8_lossy(self.arg(i)?).to_ascii_uppercase())
    }

    /// Every argument from `i` on.
    pub fn rest(&self, i: usize) -> &[Bytes] {
        self.args.get(i..).unwrap_or(&[])
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for arg in &self.args {
            write!(f, " {:?}", String::from_utf8_lossy(arg))?;
        }
        Ok(())
    }
}

pub(crate) fn parse_int(data: &[u8]) -> CommandResult<i64> {
    parse_canonical_int(data).ok_or(CommandError::NotInteger)
}

fn split_inline(line: &str) -> Result<Vec<Bytes>, ProtocolError> {
    let mut tokens = Vec::new();
    let mut chars = line.trim().chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(&first) = chars.peek() else {
            break;
        };

        let mut token: Vec<u8> = Vec::new();
        match first {
            '"' => {
                chars.next();
                loop {
                    match chars.next() {
                        None => return Err(ProtocolError::UnbalancedQuotes),
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => token.push(b'\n'),
                            Some('r') => token.push(b'\r'),
                            Some('t') => token.push(b'\t'),
                            Some('x') => {
                                let hex: String = chars.by_ref().take(2).collect();
                                match u8::from_str_radix(&hex, 16) {
                                    Ok(byte) if hex.len() == 2 => token.push(byte),
                                    _ => {
                                        token.extend_from_slice(b"x");
                                        token.extend_from_slice(hex.as_bytes());
                                    }
                                }
                            }
                            Some(c) => push_char(&mut token, c),
                            None => return Err(ProtocolError::UnbalancedQuotes),
                        },
                        Some(c) => push_char(&mut token, c),
                    }
                }
                // a closing quote must end the token
                if chars.peek().is_some_and(|c| !c.is_whitespace()) {
                    return Err(ProtocolError::UnbalancedQuotes);
                }
            }
            '\'' => {
                chars.next();
                loop {
                    match chars.next() {
                        None => return Err(ProtocolError::UnbalancedQuotes),
                        Some('\'') => break,
                        Some('\\') if chars.peek() == Some(&'\'') => {
                            chars.next();
                            token.push(b'\'');
                        }
                        Some(c) => push_char(&mut token, c),
                    }
                }
                if chars.peek().is_some_and(|c| !c.is_whitespace()) {
                    return Err(ProtocolError::UnbalancedQuotes);
                }
            }
            _ => {
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() {
                        break;
                    }
                    push_char(&mut token, c);
                    chars.next();
                }
            }
        }
        tokens.push(Bytes::from(token));
    }

    Ok(tokens)
}

fn push_char(buf: &mut Vec<u8>, c: char) {
    let mut tmp = [0u8; 4];
    buf.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
}
