//! Plain-text alternative synthesis
//!
//! HTML bodies always ship with a plain-text part. The conversion is
//! intentionally crude: drop `<style>`/`<script>` blocks, strip the
//! remaining tags, decode the handful of entities that matter, collapse
//! whitespace, and truncate.

const MAX_TEXT_LEN: usize = 1_000;

/// Synthesize the plain-text alternative for an HTML body.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    let without_blocks = strip_element(&strip_element(html, "style"), "script");

    let mut text = String::with_capacity(without_blocks.len());
    let mut in_tag = false;
    for c in without_blocks.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                // Tag boundaries separate words ("<p>a</p><p>b</p>")
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let decoded = decode_entities(&text);

    let mut collapsed = String::with_capacity(decoded.len());
    let mut last_was_space = true;
    for c in decoded.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                collapsed.push(' ');
                last_was_space = true;
            }
        } else {
            collapsed.push(c);
            last_was_space = false;
        }
    }
    let trimmed = collapsed.trim_end();

    if trimmed.chars().count() > MAX_TEXT_LEN {
        trimmed.chars().take(MAX_TEXT_LEN).collect()
    } else {
        trimmed.to_string()
    }
}

/// Remove `<name ...> ... </name>` blocks, case-insensitively, content
/// included. Unclosed blocks run to the end of input.
fn strip_element(html: &str, name: &str) -> String {
    let open = format!("<{name}");
    let close = format!("</{name}");
    // ASCII lowering keeps byte offsets aligned with the original
    let lower = html.to_ascii_lowercase();

    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;
    while let Some(start) = lower[cursor..].find(&open) {
        let start = cursor + start;
        out.push_str(&html[cursor..start]);

        match lower[start..].find(&close) {
            Some(close_rel) => {
                let close_at = start + close_rel;
                // Skip past the closing tag's '>'
                cursor = lower[close_at..]
                    .find('>')
                    .map_or(lower.len(), |gt| close_at + gt + 1);
            }
            None => {
                cursor = lower.len();
            }
        }
    }
    out.push_str(&html[cursor..]);
    out
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
