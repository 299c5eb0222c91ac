pub mod associate;
pub mod labels;

use crate::config::LabelConfig;
use crate::error::EnvelopeError;
use crate::model::{Record, Token};
use labels::{classify, TokenKind};

/// Scan state: either nothing has been opened yet, or a record is collecting
/// its labelled tokens.
#[derive(Debug)]
enum AssemblerState {
    NoRecord,
    Open(Record),
}

/// Single forward scan over the token stream that builds records.
pub struct RecordAssembler<'a> {
    labels: &'a LabelConfig,
    state: AssemblerState,
    records: Vec<Record>,
}

impl<'a> RecordAssembler<'a> {
    pub fn new(labels: &'a LabelConfig) -> Self {
        RecordAssembler {
            labels,
            state: AssemblerState::NoRecord,
            records: Vec::new(),
        }
    }

    /// Feed one token. A label token arriving before any sequence token is
    /// rejected with `OrphanLabel`.
    pub fn feed(&mut self, token: &Token) -> Result<(), EnvelopeError> {
        let Some(kind) = classify(&token.text, self.labels) else {
            return Ok(());
        };

        match (kind, &mut self.state) {
            (TokenKind::Sequence(code), state) => {
                tracing::debug!(sequence = %code, page = token.page, "record opened");
                let opened = AssemblerState::Open(Record::new(code, token.clone()));
                if let AssemblerState::Open(previous) = std::mem::replace(state, opened) {
                    self.records.push(previous);
                }
            }
            (_, AssemblerState::NoRecord) => {
                return Err(EnvelopeError::OrphanLabel {
                    token: token.text.clone(),
                    page: token.page,
                });
            }
            (TokenKind::Owner, AssemblerState::Open(record)) => {
                record.owner_token = Some(token.clone());
            }
            (TokenKind::Id, AssemblerState::Open(record)) => {
                record.id_token = Some(token.clone());
            }
            (TokenKind::Address(address), AssemblerState::Open(record)) => {
                record.address = Some(address);
                record.address_token = Some(token.clone());
            }
            (TokenKind::Other, AssemblerState::Open(record)) => {
                record.other_token = Some(token.clone());
            }
        }

        Ok(())
    }

    pub fn finish(mut self) -> Vec<Record> {
        if let AssemblerState::Open(record) = self.state {
            self.records.push(record);
        }
        self.records
    }
}

/// Build records from tokens ordered by page, then reading order.
pub fn assemble_records<'t>(
    tokens: impl IntoIterator<Item = &'t Token>,
    labels: &LabelConfig,
) -> Result<Vec<Record>, EnvelopeError> {
    let mut assembler = RecordAssembler::new(labels);
    for token in tokens {
        assembler.feed(token)?;
    }
    Ok(assembler.finish())
}

/// Display name for the envelope: one character of the owner token plus a
/// title chosen by one character of the id token.
pub fn owner_display(record: &Record, labels: &LabelConfig) -> Result<String, EnvelopeError> {
    let field_error = |reason: String| EnvelopeError::RecordField {
        sequence: record.sequence.clone(),
        reason,
    };

    let owner = record
        .owner_token
        .as_ref()
        .ok_or_else(|| field_error("no owner token".into()))?;
    let id = record
        .id_token
        .as_ref()
        .ok_or_else(|| field_error("no identifier token".into()))?;

    let name = owner
        .text
        .chars()
        .nth(labels.owner_name_offset)
        .map(String::from)
        .unwrap_or_else(|| "  ".to_string());

    let marker = id.text.chars().nth(labels.gender_offset).ok_or_else(|| {
        field_error(format!(
            "identifier token '{}' is shorter than {} characters",
            id.text,
            labels.gender_offset + 1
        ))
    })?;

    let suffix = if marker == labels.male_marker {
        &labels.male_suffix
    } else {
        &labels.female_suffix
    };

    Ok(format!("{name}{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BBox, Point};

    fn tok(text: &str, page: usize, y: f32) -> Token {
        Token {
            text: text.to_string(),
            page,
            position: Point { x: 50.0, y },
            bbox: BBox {
                x_min: 50.0,
                y_min: y,
                x_max: 200.0,
                y_max: y + 10.0,
            },
        }
    }

    #[test]
    fn test_assemble_two_records() {
        let labels = LabelConfig::default();
        let tokens = vec![
            tok("土地所有權部", 1, 800.0),
            tok("（0001）登記次序：0001", 1, 700.0),
            tok("所有權人：王大明", 1, 680.0),
            tok("統一編號：A123456789", 1, 660.0),
            tok("址：台北市中正區重慶南路1號", 1, 640.0),
            tok("權利範圍：全部", 1, 620.0),
            tok("（0002）登記次序：0002", 1, 400.0),
            tok("所有權人：林美麗", 1, 380.0),
            tok("統一編號：B223456789", 2, 780.0),
            tok("權利範圍：二分之一", 2, 760.0),
        ];

        let records = assemble_records(&tokens, &labels).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence, "0001");
        assert_eq!(records[0].address.as_deref(), Some("台北市中正區重慶南路1號"));
        assert_eq!(records[1].sequence, "0002");
        assert_eq!(records[1].page, 1);
        assert!(records[1].address.is_none());
        assert_eq!(records[1].id_token.as_ref().unwrap().page, 2);
        assert_eq!(records[1].other_token.as_ref().unwrap().text, "權利範圍：二分之一");
    }

    #[test]
    fn test_orphan_label_rejected() {
        let labels = LabelConfig::default();
        let tokens = vec![
            tok("所有權人：王大明", 1, 680.0),
            tok("（0001）登記次序：0001", 1, 700.0),
        ];
        let err = assemble_records(&tokens, &labels).unwrap_err();
        assert!(matches!(err, EnvelopeError::OrphanLabel { page: 1, .. }));
    }

    #[test]
    fn test_reparse_is_stable() {
        let labels = LabelConfig::default();
        let tokens = vec![
            tok("（0007）登記次序：0007", 1, 700.0),
            tok("址：新北市板橋區文化路一段1號", 1, 640.0),
        ];
        let first = assemble_records(&tokens, &labels).unwrap();
        let second = assemble_records(&tokens, &labels).unwrap();
        assert_eq!(first[0].address, second[0].address);
        assert_eq!(first[0].address.as_deref(), Some("新北市板橋區文化路一段1號"));
    }

    #[test]
    fn test_owner_display() {
        let labels = LabelConfig::default();
        let mut male = Record::new("0001".into(), tok("（0001）登記次序：0001", 1, 700.0));
        male.owner_token = Some(tok("所有權人：王大明", 1, 680.0));
        male.id_token = Some(tok("統一編號：A123456789", 1, 660.0));
        assert_eq!(owner_display(&male, &labels).unwrap(), "王先生");

        let mut female = male.clone();
        female.id_token = Some(tok("統一編號：B223456789", 1, 660.0));
        assert_eq!(owner_display(&female, &labels).unwrap(), "王小姐");

        let mut unnamed = male.clone();
        unnamed.owner_token = Some(tok("所有權人：", 1, 680.0));
        assert_eq!(owner_display(&unnamed, &labels).unwrap(), "  先生");
    }

    #[test]
    fn test_owner_display_short_id_is_error() {
        let labels = LabelConfig::default();
        let mut short = Record::new("0003".into(), tok("（0003）登記次序：0003", 1, 700.0));
        short.owner_token = Some(tok("所有權人：王大明", 1, 680.0));
        short.id_token = Some(tok("統一編號：", 1, 660.0));

        let err = owner_display(&short, &labels).unwrap_err();
        assert!(matches!(err, EnvelopeError::RecordField { ref sequence, .. } if sequence == "0003"));
    }
}
