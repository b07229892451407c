const MAX_FIELD_CHARS: usize = 4096;

enum EscapeMode {
    Esc,
    Csi,
    Osc,
    OscEsc,
    StTerminated,
    StEsc,
}

/// Single-line field: each line break becomes one space.
pub fn sanitize_line(input: &str) -> String {
    clean(input, false)
}

pub fn sanitize_block(input: &str) -> String {
    clean(input, true)
}

fn clean(input: &str, keep_newlines: bool) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_FIELD_CHARS));
    let mut esc_mode: Option<EscapeMode> = None;
    let mut char_count = 0usize;

    for c in input.chars() {
        if let Some(mode) = esc_mode.as_ref() {
            esc_mode = match mode {
                EscapeMode::Esc => match c {
                    '[' => Some(EscapeMode::Csi),
                    ']' => Some(EscapeMode::Osc),
                    'P' | 'X' | '^' | '_' => Some(EscapeMode::StTerminated),
                    _ => None,
                },
                EscapeMode::Csi if ('@'..='~').contains(&c) => None,
                EscapeMode::Csi => Some(EscapeMode::Csi),
                EscapeMode::Osc | EscapeMode::OscEsc => match c {
                    '\x07' => None,
                    '\\' if matches!(mode, EscapeMode::OscEsc) => None,
                    '\x1b' => Some(EscapeMode::OscEsc),
                    _ => Some(EscapeMode::Osc),
                },
                EscapeMode::StTerminated | EscapeMode::StEsc => match c {
                    '\\' if matches!(mode, EscapeMode::StEsc) => None,
                    '\x1b' => Some(EscapeMode::StEsc),
                    _ => Some(EscapeMode::StTerminated),
                },
            };
            continue;
        }

        let ch = match c {
            '\x1b' => {
                esc_mode = Some(EscapeMode::Esc);
                continue;
            }
            '\r' => continue,
            '\n' if keep_newlines => '\n',
            '\n' if out.is_empty() || out.ends_with(' ') => continue,
            '\n' | '\t' => ' ',
            c if c.is_control() || is_format_control(c) => continue,
            c => c,
        };

        if char_count >= MAX_FIELD_CHARS {
            out.push_str(" ...[truncated]");
            break;
        }
        out.push(ch);
        char_count += 1;
    }

    out
}

fn is_format_control(c: char) -> bool {
    c == '\u{061C}'
        || c == '\u{200E}'
        || c == '\u{200F}'
        || ('\u{202A}'..='\u{202E}').contains(&c)
        || ('\u{2066}'..='\u{2069}').contains(&c)
}
