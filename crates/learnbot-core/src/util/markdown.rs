/// Characters with meaning in Telegram's legacy `Markdown` parse mode.
const MARKDOWN_SPECIAL: &[char] = &['_', '*', '`', '['];

/// Escape user-supplied text for interpolation into a legacy Markdown message.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if MARKDOWN_SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Remove Markdown markers so a message can be resent as plain text.
pub fn strip_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(&next) = chars.peek() {
                    if MARKDOWN_SPECIAL.contains(&next) {
                        out.push(next);
                        chars.next();
                        continue;
                    }
                }
                out.push(c);
            }
            '*' | '_' | '`' => {}
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("Ann"), "Ann");
        assert_eq!(escape_markdown("snake_case"), "snake\\_case");
        assert_eq!(escape_markdown("*star* [x] `c`"), "\\*star\\* \\[x] \\`c\\`");
    }

    #[test]
    fn test_strip_markdown() {
        assert_eq!(strip_markdown("*Hello* _there_"), "Hello there");
        assert_eq!(strip_markdown("snake\\_case"), "snake_case");
        assert_eq!(strip_markdown("a \\ b"), "a \\ b");
    }

    #[test]
    fn test_escape_then_strip_restores_plain_name() {
        let name = "_mr*x_";
        let sent = format!("Hello *{}*!", escape_markdown(name));
        assert_eq!(strip_markdown(&sent), "Hello _mr*x_!");
    }
}
