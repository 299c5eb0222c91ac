use envelope_core::model::{AddressSource, Record};
use envelope_core::Conversion;

pub fn print(conversion: &Conversion) {
    println!("  Records: {}\n", conversion.records.len());

    let max_name = conversion
        .records
        .iter()
        .map(|r| display_width(r.recipient.as_deref().unwrap_or("-")))
        .max()
        .unwrap_or(4);

    for record in &conversion.records {
        let recipient = record.recipient.as_deref().unwrap_or("-");
        let pad = max_name.saturating_sub(display_width(recipient));
        println!(
            "  {}  {}{}  {:<5}  {:<7}  {}",
            record.sequence,
            recipient,
            " ".repeat(pad),
            postal_label(record),
            record.address_source(),
            address_label(record),
        );
    }
    println!();

    if !conversion.warnings.is_empty() {
        println!("  Warnings:");
        for warning in &conversion.warnings {
            println!("    {warning}");
        }
        println!();
    }
}

fn postal_label(record: &Record) -> &str {
    match record.postal_code.as_deref() {
        Some("") | None => "-",
        Some(code) => code,
    }
}

fn address_label(record: &Record) -> String {
    match record.address_source() {
        AddressSource::Inline => record.address.clone().unwrap_or_default(),
        AddressSource::Image => match &record.ocr_text {
            Some(text) if !text.is_empty() => format!("(ocr) {text}"),
            _ => "(ocr unavailable)".into(),
        },
        AddressSource::Missing => "(no address found)".into(),
    }
}

/// Terminal columns: CJK characters take two.
fn display_width(s: &str) -> usize {
    s.chars().map(|c| if c.is_ascii() { 1 } else { 2 }).sum()
}
