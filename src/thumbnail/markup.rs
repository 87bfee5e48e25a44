//! `<img>` tag generation.

/// Escape HTML special characters.
pub fn html_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            _ => result.push(c),
        }
    }
    result
}

/// Build an `<img>` tag with `src` first, followed by `attributes` in order.
///
/// A caller-supplied `src` attribute is dropped in favour of `src`.
/// Attribute names that are empty or contain characters outside
/// `[A-Za-z0-9_:.-]` are skipped rather than emitted unescaped.
pub fn img_tag<K, V>(src: &str, attributes: impl IntoIterator<Item = (K, V)>) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut tag = format!("<img src=\"{}\"", html_escape(src));

    for (name, value) in attributes {
        let name = name.as_ref();
        if name.eq_ignore_ascii_case("src") || !is_valid_attribute_name(name) {
            continue;
        }
        tag.push(' ');
        tag.push_str(name);
        tag.push_str("=\"");
        tag.push_str(&html_escape(value.as_ref()));
        tag.push('"');
    }

    tag.push('>');
    tag
}

fn is_valid_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
}
