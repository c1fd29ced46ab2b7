use crate::errors::SandboxError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    /// Unquoted `>`.
    RedirectTruncate,
    /// Unquoted `>>`.
    RedirectAppend,
}

/// Splits a command line with shell-like rules.
///
/// Whitespace separates words, single and double quotes group text (the
/// quoted content is kept literally, quotes themselves dropped), a backslash
/// outside single quotes escapes the next character, and unquoted `>`/`>>`
/// are redirection operators even when glued to a word.
pub fn tokenize(line: &str) -> Result<Vec<Token>, SandboxError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    // Distinguishes `''` (an empty word) from no word at all.
    let mut in_word = false;
    let mut chars = line.chars().peekable();

    let flush = |tokens: &mut Vec<Token>, current: &mut String, in_word: &mut bool| {
        if *in_word {
            tokens.push(Token::Word(std::mem::take(current)));
            *in_word = false;
        }
    };

    while let Some(ch) = chars.next() {
        match ch {
            c if c.is_whitespace() => flush(&mut tokens, &mut current, &mut in_word),
            '>' => {
                flush(&mut tokens, &mut current, &mut in_word);
                if chars.peek() == Some(&'>') {
                    chars.next();
                    tokens.push(Token::RedirectAppend);
                } else {
                    tokens.push(Token::RedirectTruncate);
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(unterminated('\'')),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') if matches!(chars.peek(), Some('"') | Some('\\')) => {
                            if let Some(escaped) = chars.next() {
                                current.push(escaped);
                            }
                        }
                        Some(c) => current.push(c),
                        None => return Err(unterminated('"')),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    flush(&mut tokens, &mut current, &mut in_word);
    Ok(tokens)
}

fn unterminated(quote: char) -> SandboxError {
    SandboxError::invalid_input("", format!("unterminated quote: {quote}"))
}
