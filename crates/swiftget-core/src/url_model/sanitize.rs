//! Filename sanitization for Linux filesystems.

/// Linux NAME_MAX.
const MAX_LEN: usize = 255;

/// Make `name` safe to create in a directory: path separators, NUL, control
/// characters and whitespace become `_` (runs collapsed), surrounding dots
/// and underscores are trimmed, and the result is cut at a char boundary
/// under 255 bytes.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_underscore = false;

    for c in name.chars() {
        let keep = !matches!(c, '\0' | '/' | '\\' | ' ' | '\t') && !c.is_control();
        if keep {
            out.push(c);
            last_was_underscore = false;
        } else if !last_was_underscore {
            out.push('_');
            last_was_underscore = true;
        }
    }

    let trimmed = out.trim_matches(['.', '_', ' ']);
    if trimmed.len() <= MAX_LEN {
        return trimmed.to_string();
    }
    let mut cut = MAX_LEN;
    while cut > 0 && !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    trimmed[..cut].to_string()
}
