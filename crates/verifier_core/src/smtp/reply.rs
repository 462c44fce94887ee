//! SMTP reply grammar
//!
//! A logical reply is one or more `\r\n`-terminated lines sharing a 3-digit
//! code. A hyphen after the code marks a continuation line, a space marks
//! the final line. Anything else is a protocol violation and aborts the
//! session.

use serde::Serialize;
use thiserror::Error;

/// Upper bound on the accumulated text of one logical reply
pub const MAX_REPLY_LEN: usize = 8 * 1024;

/// A complete SMTP reply: code plus the text of all its lines joined
/// with `\n`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmtpReply {
    pub code: u16,
    pub text: String,
}

impl SmtpReply {
    /// 2xx
    pub fn is_positive_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// 4xx
    pub fn is_transient(&self) -> bool {
        (400..500).contains(&self.code)
    }

    /// 5xx
    pub fn is_permanent(&self) -> bool {
        (500..600).contains(&self.code)
    }

    /// Render the reply on one line, with internal line breaks flattened
    /// to spaces. This is the canonical form cached and compared by the
    /// catch-all logic.
    pub fn to_single_line(&self) -> String {
        format!("{} {}", self.code, self.text.replace('\n', " "))
    }

    /// Scan every reply line for an extension keyword (first token,
    /// case-insensitive). STARTTLS may be advertised on any line of a
    /// multi-line EHLO reply.
    pub fn advertises(&self, keyword: &str) -> bool {
        self.text.lines().any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|word| word.eq_ignore_ascii_case(keyword))
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplyError {
    #[error("malformed reply line: {0:?}")]
    Malformed(String),
    #[error("reply code {0} outside 100..=599")]
    CodeOutOfRange(u16),
    #[error("continuation code differs from {expected}: {line:?}")]
    CodeMismatch { expected: u16, line: String },
    #[error("reply exceeds {MAX_REPLY_LEN} bytes")]
    TooLong,
}

/// One parsed line of a reply
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ReplyLine<'a> {
    pub code: u16,
    pub is_final: bool,
    pub content: &'a str,
}

/// Parse a single line (without its `\r\n`).
pub(crate) fn parse_reply_line(line: &str) -> Result<ReplyLine<'_>, ReplyError> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(ReplyError::Malformed(truncate_for_error(line)));
    }

    let code: u16 = line[..3]
        .parse()
        .map_err(|_| ReplyError::Malformed(truncate_for_error(line)))?;
    if !(100..=599).contains(&code) {
        return Err(ReplyError::CodeOutOfRange(code));
    }

    match bytes.get(3) {
        None => Ok(ReplyLine {
            code,
            is_final: true,
            content: "",
        }),
        Some(b' ') => Ok(ReplyLine {
            code,
            is_final: true,
            content: &line[4..],
        }),
        Some(b'-') => Ok(ReplyLine {
            code,
            is_final: false,
            content: &line[4..],
        }),
        Some(_) => Err(ReplyError::Malformed(truncate_for_error(line))),
    }
}

fn truncate_for_error(line: &str) -> String {
    line.chars().take(64).collect()
}

/// Accumulates the lines of one logical reply.
pub(crate) struct ReplyBuilder {
    code: u16,
    text: String,
}

impl ReplyBuilder {
    pub fn new(first: &ReplyLine) -> Self {
        Self {
            code: first.code,
            text: first.content.to_string(),
        }
    }

    pub fn add_line(&mut self, line: &ReplyLine) -> Result<(), ReplyError> {
        if line.code != self.code {
            return Err(ReplyError::CodeMismatch {
                expected: self.code,
                line: truncate_for_error(line.content),
            });
        }
        if self.text.len() + line.content.len() + 1 > MAX_REPLY_LEN {
            return Err(ReplyError::TooLong);
        }
        self.text.push('\n');
        self.text.push_str(line.content);
        Ok(())
    }

    pub fn build(self) -> SmtpReply {
        SmtpReply {
            code: self.code,
            text: self.text,
        }
    }
}
