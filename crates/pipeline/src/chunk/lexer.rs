//! Brace depth per line, skipping comments and string literals.

use super::languages::LexRules;
use super::lines::LineIndex;
use locodata_core::{AppError, AppResult};

/// Brace bookkeeping for one line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineDepth {
    /// Depth before the first character of the line
    pub start: usize,
    /// Depth after the last character of the line
    pub end: usize,
    /// A `{` was opened while at depth 0
    pub opens_at_zero: bool,
    /// A `;` at depth 0 came before any `{` on this line
    pub terminated_at_zero: bool,
    /// The line begins inside a block comment or multi-line string
    pub starts_in_literal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    BlockComment,
    Str(char),
}

/// Scan the whole text and return the depth of every line.
///
/// Fails on an unmatched `}` or when the text ends with open braces, an open
/// block comment or an open multi-line string.
pub fn scan(lines: &LineIndex<'_>, rules: &LexRules) -> AppResult<Vec<LineDepth>> {
    let mut depth: usize = 0;
    let mut state = State::Code;
    let mut result = Vec::with_capacity(lines.len());

    for i in 0..lines.len() {
        let chars: Vec<char> = lines.line(i).chars().collect();
        let mut info = LineDepth {
            start: depth,
            starts_in_literal: state != State::Code,
            ..Default::default()
        };
        let mut opened = false;
        let mut pos = 0;

        while pos < chars.len() {
            let c = chars[pos];
            let next = chars.get(pos + 1).copied();

            match state {
                State::BlockComment => {
                    if c == '*' && next == Some('/') {
                        state = State::Code;
                        pos += 1;
                    }
                }
                State::Str(quote) => {
                    if c == '\\' {
                        pos += 1;
                    } else if c == quote {
                        state = State::Code;
                    }
                }
                State::Code => match c {
                    '/' if rules.slash_comments && next == Some('/') => break,
                    '/' if rules.block_comments && next == Some('*') => {
                        state = State::BlockComment;
                        pos += 1;
                    }
                    '#' if rules.hash_comments
                        && (pos == 0 || chars[pos - 1].is_whitespace()) =>
                    {
                        break
                    }
                    '"' => state = State::Str('"'),
                    '`' if rules.backtick_strings => state = State::Str('`'),
                    '\'' => {
                        // 'x', '\n', '{' are short literals; anything else is a
                        // lifetime in some languages and a string in others
                        let close = if next == Some('\\') {
                            (chars.get(pos + 3) == Some(&'\'')).then_some(pos + 3)
                        } else {
                            (chars.get(pos + 2) == Some(&'\'')).then_some(pos + 2)
                        };
                        match close {
                            Some(j) => pos = j,
                            None if rules.lifetimes => {}
                            None => state = State::Str('\''),
                        }
                    }
                    '{' => {
                        if depth == 0 {
                            info.opens_at_zero = true;
                        }
                        depth += 1;
                        opened = true;
                    }
                    '}' => {
                        depth = depth.checked_sub(1).ok_or_else(|| {
                            AppError::Chunking(format!("unmatched '}}' on line {}", i + 1))
                        })?;
                    }
                    ';' if depth == 0 && !opened => info.terminated_at_zero = true,
                    _ => {}
                },
            }
            pos += 1;
        }

        // Only backtick strings continue past the end of a line
        if matches!(state, State::Str(q) if q != '`') {
            state = State::Code;
        }

        info.end = depth;
        result.push(info);
    }

    if depth != 0 {
        return Err(AppError::Chunking(format!(
            "{} unclosed '{{' at end of file",
            depth
        )));
    }
    if state != State::Code {
        return Err(AppError::Chunking(
            "unterminated comment or string at end of file".to_string(),
        ));
    }

    Ok(result)
}
