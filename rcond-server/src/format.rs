//! Command output formatting.

/// Prefix of an in-game formatting code (`§` followed by one code character).
const FORMAT_PREFIX: char = '§';

const ESC: char = '\x1b';

/// Removes `§x` formatting codes and ANSI escape sequences from command
/// output. RCON clients render plain text.
pub fn clean(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            FORMAT_PREFIX => {
                chars.next();
            }
            ESC => {
                if chars.peek() == Some(&'[') {
                    chars.next();
                    // Parameters and intermediates run until a final byte in '@'..='~'
                    for c in chars.by_ref() {
                        if ('@'..='~').contains(&c) {
                            break;
                        }
                    }
                } else {
                    chars.next();
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Prepares output for a response packet: trims surrounding whitespace and
/// rewrites line breaks to CRLF.
pub fn format_response(text: &str) -> String {
    text.trim().replace('\n', "\r\n")
}
