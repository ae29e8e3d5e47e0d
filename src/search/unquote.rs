//! Quote removal for single search terms

/// Strip matching quotes and quote escapes from a term
///
/// A quote opens only when an unescaped quote of the same kind follows it;
/// otherwise it is literal. `\` before the currently open quote kind is
/// dropped, every other escape is kept as written.
pub fn unquote(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut escaped = false;
    let mut quote: Option<char> = None;

    for (i, &c) in chars.iter().enumerate() {
        if escaped {
            out.push(c);
            escaped = false;
            continue;
        }

        match c {
            '\\' => {
                escaped = true;
                let next = chars.get(i + 1).copied();
                if quote.is_none() || next != quote {
                    out.push(c);
                }
            }
            '"' | '\'' => {
                if quote == Some(c) {
                    quote = None;
                } else if quote.is_none() && find_unescaped(&chars[i + 1..], c) {
                    quote = Some(c);
                } else {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }

    out
}

fn find_unescaped(chars: &[char], wanted: char) -> bool {
    let mut escaped = false;
    for &c in chars {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == wanted {
            return true;
        }
    }
    false
}
