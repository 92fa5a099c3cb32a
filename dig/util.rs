use encoding8::ascii;

const WIDTH: usize = 16;

/// Formats `slice` as offset, hex and printable ascii columns, one row per
/// 16 bytes.
pub fn hexdump(slice: &[u8]) -> String {
    slice
        .chunks(WIDTH)
        .enumerate()
        .map(|(i, row)| {
            let hex: String = row.iter().map(|b| format!("{:02X} ", b)).collect();
            let text: String = row
                .iter()
                .map(|&b| if ascii::is_printable(b) { b as char } else { '.' })
                .collect();

            format!("{:>08x}: {:<48} {}\n", i * WIDTH, hex, text)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hexdump() {
        let got = hexdump(b"\x12\x34example\x03com\x00\x00\x01\x00\x01\xff");
        assert_eq!(
            got,
            "00000000: 12 34 65 78 61 6D 70 6C 65 03 63 6F 6D 00 00 01  .4example.com...\n\
             00000010: 00 01 FF                                         ...\n"
        );
        assert_eq!(hexdump(&[]), "");
    }
}
