//! HTML to visible text

use regex_lite::Regex;
use std::sync::OnceLock;

/// Elements whose content is never visible text.
const HIDDEN_ELEMENTS: [&str; 5] = ["head", "script", "style", "noscript", "template"];

struct Patterns {
    comment: Regex,
    hidden: Vec<Regex>,
    block: Regex,
    tag: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        comment: Regex::new(r"(?s)<!--.*?-->").expect("valid comment pattern"),
        hidden: HIDDEN_ELEMENTS
            .iter()
            .map(|tag| {
                Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>"))
                    .expect("valid hidden element pattern")
            })
            .collect(),
        block: Regex::new(
            r"(?i)</?(address|article|aside|blockquote|br|caption|dd|details|div|dl|dt|fieldset|figcaption|figure|footer|form|h[1-6]|header|hr|legend|li|main|nav|ol|option|p|pre|section|summary|table|tbody|td|tfoot|th|thead|tr|ul)\b[^>]*>",
        )
        .expect("valid block pattern"),
        tag: Regex::new(r"<[^>]*>").expect("valid tag pattern"),
    })
}

/// Strip markup and return the visible text, one line per block element.
///
/// Entities are decoded after tags are removed so escaped markup in the
/// text (`&lt;b&gt;`) survives as literal text.
pub fn html_to_text(html: &str) -> String {
    let p = patterns();

    let mut text = p.comment.replace_all(html, "").into_owned();
    for hidden in &p.hidden {
        text = hidden.replace_all(&text, "").into_owned();
    }
    text = p.block.replace_all(&text, "\n").into_owned();
    text = p.tag.replace_all(&text, "").into_owned();

    let decoded = html_escape::decode_html_entities(&text);

    decoded
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
