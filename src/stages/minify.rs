// src/stages/minify.rs

//! Comment and whitespace minification for bundled scripts.
//!
//! Not a parser: string, template and regex literals are copied verbatim,
//! comments are dropped, whitespace runs shrink to one space (between
//! identifier characters), one newline (where automatic semicolon insertion
//! may depend on it) or nothing.

/// Characters after which a `/` starts a regex literal rather than a division.
const REGEX_PREFIX: &[char] = &['(', ',', '=', ':', '[', '!', '&', '|', '?', '{', '}', ';', '+', '-', '*', '%', '<', '>', '~', '^'];

/// Newlines are dropped after these.
const NO_NEWLINE_AFTER: &[char] = &['{', '}', ';', ',', '(', '[', '=', ':', '&', '|', '?', '<', '>'];

/// Newlines are dropped before these.
const NO_NEWLINE_BEFORE: &[char] = &['{', '}', ')', ']', ';', ',', '.', ':', '?', '=', '&', '|'];

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

pub fn minify_js(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;
    let mut pending_space = false;
    let mut pending_newline = false;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c.is_whitespace() {
            pending_space = true;
            if c == '\n' {
                pending_newline = true;
            }
            i += 1;
            continue;
        }

        if c == '/' && next == Some('/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        if c == '/' && next == Some('*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                if chars[i] == '\n' {
                    pending_newline = true;
                }
                i += 1;
            }
            i += 2;
            pending_space = true;
            continue;
        }

        if pending_space {
            flush_whitespace(&mut out, c, pending_newline);
            pending_space = false;
            pending_newline = false;
        }

        match c {
            '"' | '\'' | '`' => {
                i = copy_quoted(&chars, i, c, &mut out);
            }
            '/' if starts_regex(&out) => {
                i = copy_regex(&chars, i, &mut out);
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Apply `rewrite` to the code between literals and comments. String,
/// template and regex literals and comments are copied unchanged, so the
/// line count is preserved as long as `rewrite` preserves it.
pub(crate) fn rewrite_code(source: &str, mut rewrite: impl FnMut(&str) -> String) -> String {
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut code_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let literal_end = match bytes[i] {
            b'"' | b'\'' | b'`' => Some(quoted_end(bytes, i)),
            b'/' if bytes.get(i + 1) == Some(&b'/') => Some(line_comment_end(bytes, i)),
            b'/' if bytes.get(i + 1) == Some(&b'*') => Some(block_comment_end(bytes, i)),
            b'/' if starts_regex(&source[..i]) => Some(regex_end(bytes, i)),
            _ => None,
        };

        match literal_end {
            Some(end) => {
                out.push_str(&rewrite(&source[code_start..i]));
                out.push_str(&source[i..end]);
                code_start = end;
                i = end;
            }
            None => i += 1,
        }
    }

    out.push_str(&rewrite(&source[code_start..]));
    out
}

fn quoted_end(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn line_comment_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |offset| start + offset)
}

fn block_comment_end(bytes: &[u8], start: usize) -> usize {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |offset| start + 2 + offset + 2)
}

fn regex_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    let mut in_class = false;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => return i,
            b'\\' => i += 1,
            b'[' => in_class = true,
            b']' => in_class = false,
            b'/' if !in_class => return i + 1,
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

fn flush_whitespace(out: &mut String, next: char, saw_newline: bool) {
    let Some(prev) = out.chars().last() else {
        return;
    };

    if saw_newline && !NO_NEWLINE_AFTER.contains(&prev) && !NO_NEWLINE_BEFORE.contains(&next) {
        out.push('\n');
    } else if (is_ident(prev) && is_ident(next))
        || (prev == '+' && next == '+')
        || (prev == '-' && next == '-')
    {
        out.push(' ');
    }
}

fn starts_regex(out: &str) -> bool {
    match out.trim_end().chars().last() {
        None => true,
        Some(prev) => REGEX_PREFIX.contains(&prev) || out.trim_end().ends_with("return"),
    }
}

/// Copy a string or template literal starting at `start`; returns the index
/// after the closing quote.
fn copy_quoted(chars: &[char], start: usize, quote: char, out: &mut String) -> usize {
    out.push(quote);
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        out.push(c);
        i += 1;
        if c == '\\' {
            if let Some(&escaped) = chars.get(i) {
                out.push(escaped);
                i += 1;
            }
        } else if c == quote {
            break;
        }
    }
    i
}

fn copy_regex(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push('/');
    let mut i = start + 1;
    let mut in_class = false;
    while i < chars.len() {
        let c = chars[i];
        if c == '\n' {
            break;
        }
        out.push(c);
        i += 1;
        match c {
            '\\' => {
                if let Some(&escaped) = chars.get(i) {
                    out.push(escaped);
                    i += 1;
                }
            }
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => break,
            _ => {}
        }
    }
    i
}
