//! Separation of `<think>` reasoning blocks from the visible reply.

const OPEN: &str = "<think>";
const CLOSE: &str = "</think>";

/// Splits `text` into the visible reply and the concatenated reasoning blocks.
///
/// An unterminated `<think>` swallows the rest of the text.
pub fn split_thinking(text: &str) -> (String, Option<String>) {
    let mut visible = String::with_capacity(text.len());
    let mut thoughts: Vec<&str> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(OPEN) {
        visible.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        match after_open.find(CLOSE) {
            Some(end) => {
                thoughts.push(after_open[..end].trim());
                rest = &after_open[end + CLOSE.len()..];
            }
            None => {
                thoughts.push(after_open.trim());
                rest = "";
            }
        }
    }
    visible.push_str(rest);

    let thinking = thoughts
        .into_iter()
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    let thinking = Some(thinking).filter(|t| !t.is_empty());
    (visible.trim().to_string(), thinking)
}
