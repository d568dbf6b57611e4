//! Cleanup of the decoded token text before conversion.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Any single-line markup tag, shortest match.
    static ref MARKUP_TAG: Regex = Regex::new(r"<.*?>").unwrap();
}

/// Strip the end-of-sequence and padding markers everywhere, drop the first
/// markup tag in the text and trim.
///
/// Only the first tag goes, whatever it is: in a normal decode that is the
/// task prompt the sequence was seeded with. Later tags carry the record
/// structure and are kept.
pub fn clean_sequence(raw: &str, eos: &str, pad: &str) -> String {
    let mut sequence = raw.to_string();
    for marker in [eos, pad] {
        if !marker.is_empty() {
            sequence = sequence.replace(marker, "");
        }
    }

    MARKUP_TAG.replace(&sequence, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_removes_only_first_tag() {
        assert_eq!(
            clean_sequence("<s_cord-v2><field>value</field>", "</s>", "<pad>"),
            "<field>value</field>"
        );
    }

    #[test]
    fn test_removes_markers_everywhere() {
        let raw = "<s_cord-v2><s_vendor>Acme</s_vendor></s><pad><pad>";
        assert_eq!(clean_sequence(raw, "</s>", "<pad>"), "<s_vendor>Acme</s_vendor>");

        let raw = "<s_cord-v2><pad><s_a>1</s><pad></s_a>";
        assert_eq!(clean_sequence(raw, "</s>", "<pad>"), "<s_a>1</s_a>");
    }

    #[test]
    fn test_first_tag_need_not_be_leading() {
        assert_eq!(
            clean_sequence("  total <s_total>5</s_total>", "</s>", "<pad>"),
            "total 5</s_total>"
        );
    }

    #[test]
    fn test_tag_free_text_is_trimmed_only() {
        assert_eq!(clean_sequence("  plain words \n", "</s>", "<pad>"), "plain words");
    }

    #[test]
    fn test_tag_does_not_span_lines() {
        assert_eq!(clean_sequence("a <b\nc> <d>e", "</s>", "<pad>"), "a <b\nc> e");
    }
}
