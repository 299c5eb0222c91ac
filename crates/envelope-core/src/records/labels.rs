use crate::config::LabelConfig;

/// What a token means to the record assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Starts a new record; carries the sequence code.
    Sequence(String),
    Owner,
    Id,
    /// Address label; carries the text after the label.
    Address(String),
    Other,
}

/// Classify a token by its prefix. Unrecognised tokens return `None`.
pub fn classify(text: &str, labels: &LabelConfig) -> Option<TokenKind> {
    if text.starts_with(labels.sequence_sentinel)
        && text.chars().count() == labels.sequence_length
    {
        let code: String = text
            .chars()
            .skip(labels.sequence_offset)
            .take(labels.sequence_width)
            .collect();
        return Some(TokenKind::Sequence(code));
    }

    if text.starts_with(&labels.owner_prefix) {
        Some(TokenKind::Owner)
    } else if text.starts_with(&labels.id_prefix) {
        Some(TokenKind::Id)
    } else if let Some(rest) = text.strip_prefix(&labels.address_prefix) {
        Some(TokenKind::Address(rest.to_string()))
    } else if text.starts_with(&labels.other_prefix) {
        Some(TokenKind::Other)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_token() {
        let labels = LabelConfig::default();
        assert_eq!(
            classify("（0001）登記次序：0001", &labels),
            Some(TokenKind::Sequence("0001".into()))
        );
    }

    #[test]
    fn test_sequence_wrong_length_ignored() {
        let labels = LabelConfig::default();
        assert_eq!(classify("（0001）", &labels), None);
        assert_eq!(classify("（備註）此項登記內容請詳閱", &labels), None);
    }

    #[test]
    fn test_labels() {
        let labels = LabelConfig::default();
        assert_eq!(classify("所有權人：王大明", &labels), Some(TokenKind::Owner));
        assert_eq!(classify("統一編號：A123456789", &labels), Some(TokenKind::Id));
        assert_eq!(
            classify("址：台北市中正區重慶南路1號", &labels),
            Some(TokenKind::Address("台北市中正區重慶南路1號".into()))
        );
        assert_eq!(classify("權利範圍：全部", &labels), Some(TokenKind::Other));
        assert_eq!(classify("住址：", &labels), None);
        assert_eq!(classify("登記日期", &labels), None);
    }
}
