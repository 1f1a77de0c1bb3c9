use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Display width of a string in terminal columns (CJK and emoji count as 2).
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Pads `s` with trailing spaces up to `width` columns.
///
/// Strings already at or beyond `width` are returned unchanged.
pub fn pad_to_width(s: &str, width: usize) -> Cow<'_, str> {
    let current = display_width(s);
    if current >= width {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + (width - current));
    out.push_str(s);
    out.extend(std::iter::repeat(' ').take(width - current));
    Cow::Owned(out)
}

/// Truncates `s` to at most `max_width` columns, appending "..." when cut.
///
/// Widths too narrow for the ellipsis keep as many whole characters as fit.
///
/// # Examples
///
/// ```
/// use serialized::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("OrderPlaced", 20), "OrderPlaced");
/// assert_eq!(truncate_to_width("OrderPlaced", 8), "Order...");
/// assert_eq!(truncate_to_width("OrderPlaced", 2), "Or");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }

    let budget = if max_width > ELLIPSIS_WIDTH {
        max_width - ELLIPSIS_WIDTH
    } else {
        max_width
    };

    let mut used = 0;
    let mut end = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        end = idx + c.len_utf8();
    }

    if max_width > ELLIPSIS_WIDTH {
        Cow::Owned(format!("{}{}", &s[..end], ELLIPSIS))
    } else {
        Cow::Owned(s[..end].to_string())
    }
}

/// Strips terminal control characters and ANSI escape sequences.
///
/// Event payloads and aggregate ids come from whoever wrote to the event
/// store, so they are sanitized before being echoed to a terminal. Tab is
/// kept; newlines and carriage returns are replaced by a space so a value
/// cannot break table rows. CSI (`ESC [`) and OSC (`ESC ]`, ended by BEL or
/// `ESC \`) sequences are dropped whole.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let needs_work = s.chars().any(|c| c != '\t' && c.is_control());
    if !needs_work {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => match chars.peek() {
                Some('[') => {
                    chars.next();
                    // Parameter and intermediate bytes up to the final byte
                    for n in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&n) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    while let Some(n) = chars.next() {
                        if n == '\x07' {
                            break;
                        }
                        if n == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            },
            '\n' | '\r' => out.push(' '),
            '\t' => out.push('\t'),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }

    Cow::Owned(out)
}
