/// Escape text for use in XML element content or attribute values.
pub(crate) fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // XML 1.0 forbids most C0 control characters outright; drop them
            // rather than produce a package Excel refuses to open.
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

/// Text nodes with leading/trailing whitespace need `xml:space="preserve"`.
pub(crate) fn needs_space_preserve(s: &str) -> bool {
    s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_and_drops_control_chars() {
        assert_eq!(
            escape_xml("Sin Tóner/Tinta <\"A&B\">\u{1}"),
            "Sin Tóner/Tinta &lt;&quot;A&amp;B&quot;&gt;"
        );
        assert_eq!(escape_xml("line\nbreak"), "line\nbreak");
    }

    #[test]
    fn detects_significant_whitespace() {
        assert!(needs_space_preserve(" UCI"));
        assert!(needs_space_preserve("UCI "));
        assert!(!needs_space_preserve("UCI"));
        assert!(!needs_space_preserve(""));
    }
}
