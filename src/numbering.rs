use regex::Regex;
use std::sync::LazyLock;

/// Number used when the store holds no earlier invoice.
pub const DEFAULT_INVOICE_NUMBER: &str = "INV-0001";

static TRAILING_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+$").expect("trailing digit pattern"));

/// Next invoice number after `current`.
///
/// The trailing run of ASCII digits is incremented in place, keeping at
/// least its original width ("INV-0099" -> "INV-0100", "A-99" -> "A-100").
/// Digits earlier in the string are left alone. Without a trailing run the
/// suffix "-1" is appended.
pub fn next_invoice_number(current: &str) -> String {
    match TRAILING_DIGITS.find(current) {
        Some(run) => format!(
            "{}{}",
            &current[..run.start()],
            increment_digits(run.as_str())
        ),
        None => format!("{}-1", current),
    }
}

// Decimal increment on the digit string itself, so arbitrarily long runs
// never overflow.
fn increment_digits(digits: &str) -> String {
    let mut out: Vec<char> = digits.chars().collect();
    let mut carry = true;
    for d in out.iter_mut().rev() {
        if !carry {
            break;
        }
        if *d == '9' {
            *d = '0';
        } else {
            *d = char::from(*d as u8 + 1);
            carry = false;
        }
    }

    let mut next = String::with_capacity(out.len() + 1);
    if carry {
        next.push('1');
    }
    next.extend(out);
    next
}
