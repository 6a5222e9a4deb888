//! A1-style cell references (1-based rows and columns)

/// Convert a 1-based column number to its letter form
///
/// Examples:
/// - 1 → A
/// - 26 → Z
/// - 27 → AA
/// - 702 → ZZ
pub fn column_letter(column: u32) -> String {
    let mut result = String::new();
    let mut idx = column.saturating_sub(1);

    loop {
        let remainder = idx % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }

    result
}

pub fn cell_reference(row: u32, column: u32) -> String {
    format!("{}{}", column_letter(column), row)
}

/// Parse `B12` / `$B$12` into `(row, column)`.
pub fn parse_cell_reference(reference: &str) -> Option<(u32, u32)> {
    let reference = reference.replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || !letters.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }

    let mut column: u32 = 0;
    for b in letters.bytes() {
        column = column
            .checked_mul(26)?
            .checked_add(u32::from(b.to_ascii_uppercase() - b'A') + 1)?;
    }
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row, column))
}
