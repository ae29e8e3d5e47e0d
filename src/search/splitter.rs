//! Splits a raw search string into terms

/// Hard cap on terms per query
pub const MAX_SEARCH_TERMS: usize = 10;

/// Split `input` into at most `max_terms` terms
///
/// Whitespace separates terms outside quotes. `"` and `'` toggle quoting and
/// are kept, as is `\` together with the character it escapes; both are
/// removed later by [`super::unquote::unquote`]. Outside quotes, `(` is a
/// term of its own after whitespace or at the start, `)` before whitespace
/// or at the end. Anything past `max_terms` is dropped.
pub fn split(input: &str, max_terms: usize) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut terms = Vec::new();
    let mut part = String::new();
    let mut escaped = false;
    let mut prev_was_whitespace = true;
    let mut quote: Option<char> = None;

    for (i, &c) in chars.iter().enumerate() {
        if escaped {
            part.push(c);
            escaped = false;
            continue;
        }

        let mut finish_previous = false;
        let mut append = true;
        let mut finish_after = false;
        let mut is_whitespace = false;

        match c {
            '\\' => escaped = true,
            '(' => {
                if quote.is_none() && prev_was_whitespace {
                    finish_previous = true;
                    finish_after = true;
                }
            }
            ')' => {
                if quote.is_none() && chars.get(i + 1).is_none_or(|next| next.is_whitespace()) {
                    finish_previous = true;
                    finish_after = true;
                }
            }
            '"' | '\'' => {
                if quote == Some(c) {
                    quote = None;
                } else if quote.is_none() {
                    quote = Some(c);
                }
            }
            c if c.is_whitespace() => {
                is_whitespace = true;
                if quote.is_none() {
                    finish_previous = true;
                    append = false;
                }
            }
            _ => {}
        }

        if finish_previous {
            flush(&mut terms, &mut part);
        }

        if terms.len() >= max_terms {
            return terms;
        }

        if append {
            part.push(c);
        }

        if finish_after {
            flush(&mut terms, &mut part);
        }

        prev_was_whitespace = is_whitespace;
    }

    flush(&mut terms, &mut part);
    terms
}

fn flush(terms: &mut Vec<String>, part: &mut String) {
    if !part.is_empty() {
        terms.push(std::mem::take(part));
    }
}
