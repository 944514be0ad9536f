//! PromptPay payloads in the EMVCo merchant-presented QR format.

use qrcode::{render::svg, QrCode};

const PROMPTPAY_AID: &str = "A000000677010111";

fn field(id: &str, value: &str) -> String {
    format!("{id}{:02}{value}", value.len())
}

/// CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Maps a phone number, national id or e-wallet id to its merchant sub-field.
/// `None` when the id has no usable digits.
fn target(id: &str) -> Option<String> {
    let digits: String = id.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        0 => None,
        n if n >= 15 => Some(field("03", &digits)),
        13 | 14 => Some(field("02", &digits)),
        _ => {
            // 0812345678 -> 0066812345678
            let local = digits.strip_prefix('0').unwrap_or(&digits);
            Some(field("01", &format!("{:0>13}", format!("66{local}"))))
        }
    }
}

/// Builds the payload string. `amount` is in whole baht; `None` yields a
/// static code where the payer types the amount.
pub fn payload(promptpay_id: &str, amount: Option<i64>) -> Option<String> {
    let merchant = format!("{}{}", field("00", PROMPTPAY_AID), target(promptpay_id)?);

    let mut out = String::new();
    out.push_str(&field("00", "01"));
    out.push_str(&field("01", if amount.is_some() { "12" } else { "11" }));
    out.push_str(&field("29", &merchant));
    out.push_str(&field("58", "TH"));
    out.push_str(&field("53", "764"));
    if let Some(a) = amount {
        out.push_str(&field("54", &format!("{a}.00")));
    }
    out.push_str("6304");
    let crc = crc16(out.as_bytes());
    out.push_str(&format!("{crc:04X}"));
    Some(out)
}

pub fn render_svg(payload: &str) -> anyhow::Result<String> {
    let code = QrCode::new(payload.as_bytes())?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(240, 240)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_check_value() {
        assert_eq!(crc16(b"123456789"), 0x29B1);
    }

    #[test]
    fn phone_number_is_reformatted() {
        let p = payload("081-234-5678", None).unwrap();
        let body = "00020101021129370016A000000677010111011300668123456785802TH53037646304";
        assert!(p.starts_with(body));
        assert_eq!(p.len(), body.len() + 4);
    }

    #[test]
    fn amount_makes_dynamic_code() {
        let p = payload("0812345678", Some(150)).unwrap();
        assert!(p.starts_with("000201010212"));
        assert!(p.contains("5406150.00"));
    }

    #[test]
    fn national_id_uses_its_own_tag() {
        let p = payload("1234567890123", None).unwrap();
        assert!(p.contains("02131234567890123"));
    }

    #[test]
    fn checksum_covers_the_payload() {
        let p = payload("0812345678", Some(20)).unwrap();
        let (body, crc) = p.split_at(p.len() - 4);
        assert!(body.ends_with("6304"));
        assert_eq!(crc, format!("{:04X}", crc16(body.as_bytes())));
    }

    #[test]
    fn empty_id_is_rejected() {
        assert!(payload("n/a", Some(10)).is_none());
    }

    #[test]
    fn svg_renders() {
        let p = payload("0812345678", Some(20)).unwrap();
        assert!(render_svg(&p).unwrap().contains("<svg"));
    }
}
