/// Convert common markdown to Telegram MarkdownV2.
///
/// Fenced and inline code spans pass through untouched, `**bold**` becomes
/// MarkdownV2's `*bold*`, and every other reserved character is escaped so
/// stray symbols in model output cannot break entity parsing.
pub fn to_telegram_markdown(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 4);
    let mut rest = input;

    while !rest.is_empty() {
        if let Some(after_fence) = rest.strip_prefix("```") {
            match after_fence.find("```") {
                Some(end) => {
                    // Opening fence + content + closing fence, verbatim.
                    out.push_str(&rest[..end + 6]);
                    rest = &after_fence[end + 3..];
                }
                None => {
                    // Unclosed block; emit the remainder as-is.
                    out.push_str(rest);
                    rest = "";
                }
            }
            continue;
        }

        if let Some(inner) = rest.strip_prefix("**") {
            if let Some(end) = inner.find("**") {
                out.push('*');
                push_escaped(&mut out, &inner[..end], Some('*'));
                out.push('*');
                rest = &inner[end + 2..];
                continue;
            }
        }

        if let Some(span) = rest.strip_prefix('`') {
            if let Some(end) = span.find('`') {
                out.push('`');
                out.push_str(&span[..end]);
                out.push('`');
                rest = &span[end + 1..];
                continue;
            }
        }

        let Some(ch) = rest.chars().next() else { break };
        if is_reserved(ch) {
            out.push('\\');
        }
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }

    out
}

fn push_escaped(out: &mut String, text: &str, keep: Option<char>) {
    for ch in text.chars() {
        if is_reserved(ch) && keep != Some(ch) {
            out.push('\\');
        }
        out.push(ch);
    }
}

fn is_reserved(c: char) -> bool {
    matches!(
        c,
        '_' | '*'
            | '['
            | ']'
            | '('
            | ')'
            | '~'
            | '`'
            | '>'
            | '#'
            | '+'
            | '-'
            | '='
            | '|'
            | '{'
            | '}'
            | '.'
            | '!'
    )
}

#[cfg(test)]
mod tests {
    use super::to_telegram_markdown;

    #[test]
    fn plain_text_escapes_reserved_chars() {
        assert_eq!(to_telegram_markdown("hello.world"), "hello\\.world");
        assert_eq!(to_telegram_markdown("1 + 2 = 3"), "1 \\+ 2 \\= 3");
        assert_eq!(to_telegram_markdown("no specials"), "no specials");
    }

    #[test]
    fn fenced_code_blocks_pass_through() {
        let input = "```rust\nfn main() {}\n```";
        assert_eq!(to_telegram_markdown(input), input);
    }

    #[test]
    fn unclosed_fence_passes_through() {
        let input = "```\nlet x = 1;";
        assert_eq!(to_telegram_markdown(input), input);
    }

    #[test]
    fn inline_code_passes_through() {
        assert_eq!(
            to_telegram_markdown("use `foo.bar()` here"),
            "use `foo.bar()` here"
        );
    }

    #[test]
    fn double_star_bold_becomes_single_star() {
        assert_eq!(
            to_telegram_markdown("this is **bold** text"),
            "this is *bold* text"
        );
        assert_eq!(to_telegram_markdown("**a.b**"), "*a\\.b*");
    }

    #[test]
    fn mixed_formatting() {
        assert_eq!(
            to_telegram_markdown("Hello! Try `code` and **bold**."),
            "Hello\\! Try `code` and *bold*\\."
        );
    }

    #[test]
    fn multibyte_text_is_preserved() {
        assert_eq!(to_telegram_markdown("héllö wörld."), "héllö wörld\\.");
    }
}
