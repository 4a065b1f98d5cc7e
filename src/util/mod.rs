//! Numeric/textual conversion helpers
//!
//! JavaScript number formatting (ES2017 7.1.12.1), radix expansion with
//! round-trip precision, and string-to-number parsing.

/// ToString(Number): shortest decimal digits laid out per the spec's
/// positional/exponential rules.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".into();
    }
    if n == 0.0 {
        return "0".into();
    }
    if n < 0.0 {
        return format!("-{}", number_to_string(-n));
    }
    if n.is_infinite() {
        return "Infinity".into();
    }

    // Shortest round-trip digits via the exponential formatter:
    // "d.dddde±x" -> digit string + decimal exponent.
    let exp_form = format!("{:e}", n);
    let (mantissa, exp) = exp_form
        .split_once('e')
        .expect("exponential form always contains e");
    let exp: i32 = exp.parse().expect("exponent is an integer");
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let k = digits.len() as i32;
    // Position of the decimal point relative to the digit string.
    let point = exp + 1;

    if k <= point && point <= 21 {
        let mut out = digits;
        out.extend(std::iter::repeat('0').take((point - k) as usize));
        out
    } else if 0 < point && point <= 21 {
        format!("{}.{}", &digits[..point as usize], &digits[point as usize..])
    } else if -6 < point && point <= 0 {
        let zeros: String = std::iter::repeat('0').take((-point) as usize).collect();
        format!("0.{}{}", zeros, digits)
    } else if k == 1 {
        format!("{}e{}{}", digits, if point > 0 { "+" } else { "-" }, (point - 1).abs())
    } else {
        format!(
            "{}.{}e{}{}",
            &digits[..1],
            &digits[1..],
            if point > 0 { "+" } else { "-" },
            (point - 1).abs()
        )
    }
}

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Distance to the next representable double, used to stop emitting
/// fraction digits once they can no longer affect a round trip.
fn ulp(x: f64) -> f64 {
    if x == 0.0 {
        return f64::MIN_POSITIVE;
    }
    let bits = x.abs().to_bits();
    f64::from_bits(bits + 1) - x.abs()
}

/// Radix-r expansion of a double with exactly enough fraction digits to
/// round-trip.
pub fn number_to_string_radix(n: f64, radix: u32) -> String {
    debug_assert!((2..=36).contains(&radix));
    if n.is_nan() {
        return "NaN".into();
    }
    if n == 0.0 {
        return "0".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".into() } else { "-Infinity".into() };
    }
    if n < 0.0 {
        return format!("-{}", number_to_string_radix(-n, radix));
    }

    let r = radix as f64;
    let mut integer = n.trunc();
    let mut fraction = n - integer;

    let mut int_digits: Vec<u8> = Vec::new();
    if integer == 0.0 {
        int_digits.push(b'0');
    }
    while integer >= 1.0 {
        let digit = (integer % r) as usize;
        int_digits.push(DIGITS[digit]);
        integer = (integer / r).trunc();
    }
    int_digits.reverse();

    if fraction == 0.0 {
        return String::from_utf8(int_digits).expect("radix digits are ASCII");
    }

    // Emit fraction digits until the remaining error cannot affect a
    // round trip, then round the final digit to nearest.
    let mut delta = (0.5 * ulp(n)).max(f64::MIN_POSITIVE);
    let mut frac_digits: Vec<usize> = Vec::new();
    loop {
        fraction *= r;
        delta *= r;
        let mut digit = fraction.trunc() as usize;
        fraction -= digit as f64;
        if fraction < delta || frac_digits.len() >= 1100 {
            if fraction >= 0.5 {
                digit += 1;
            }
            frac_digits.push(digit);
            break;
        }
        frac_digits.push(digit);
    }
    // Propagate a possible carry out of the last digit.
    let mut i = frac_digits.len();
    while i > 0 && frac_digits[i - 1] == radix as usize {
        frac_digits[i - 1] = 0;
        if i == 1 {
            carry_integer(&mut int_digits, radix);
        } else {
            frac_digits[i - 2] += 1;
        }
        i -= 1;
    }
    while frac_digits.last() == Some(&0) {
        frac_digits.pop();
    }

    let mut out = String::from_utf8(int_digits).expect("radix digits are ASCII");
    if !frac_digits.is_empty() {
        out.push('.');
        for d in frac_digits {
            out.push(DIGITS[d] as char);
        }
    }
    out
}

fn carry_integer(digits: &mut Vec<u8>, radix: u32) {
    let mut i = digits.len();
    loop {
        if i == 0 {
            digits.insert(0, b'1');
            return;
        }
        i -= 1;
        if digits[i] == DIGITS[radix as usize - 1] {
            digits[i] = b'0';
        } else {
            let pos = DIGITS.iter().position(|&d| d == digits[i]).expect("digit");
            digits[i] = DIGITS[pos + 1];
            return;
        }
    }
}

fn is_js_whitespace(c: char) -> bool {
    c.is_whitespace() || c == '\u{FEFF}'
}

/// ToNumber(String): the JS numeric-string grammar, including the
/// binary/octal/hex forms and infinities.
pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim_matches(is_js_whitespace);
    if t.is_empty() {
        return 0.0;
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return match u128::from_str_radix(hex, 16) {
            Ok(v) => v as f64,
            Err(_) => parse_radix_big(hex, 16).unwrap_or(f64::NAN),
        };
    }
    if let Some(oct) = t.strip_prefix("0o").or_else(|| t.strip_prefix("0O")) {
        return match u128::from_str_radix(oct, 8) {
            Ok(v) => v as f64,
            Err(_) => parse_radix_big(oct, 8).unwrap_or(f64::NAN),
        };
    }
    if let Some(bin) = t.strip_prefix("0b").or_else(|| t.strip_prefix("0B")) {
        return match u128::from_str_radix(bin, 2) {
            Ok(v) => v as f64,
            Err(_) => parse_radix_big(bin, 2).unwrap_or(f64::NAN),
        };
    }
    let (sign, body) = match t.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, t.strip_prefix('+').unwrap_or(t)),
    };
    if body == "Infinity" {
        return sign * f64::INFINITY;
    }
    if !is_decimal_literal(body) {
        return f64::NAN;
    }
    body.parse::<f64>().map(|v| sign * v).unwrap_or(f64::NAN)
}

/// Digits-only radix parse that tolerates overflow by accumulating in
/// floating point.
fn parse_radix_big(s: &str, radix: u32) -> Option<f64> {
    if s.is_empty() {
        return None;
    }
    let mut acc = 0.0f64;
    for c in s.chars() {
        let d = c.to_digit(radix)?;
        acc = acc * radix as f64 + d as f64;
    }
    Some(acc)
}

/// StrDecimalLiteral without sign: digits [. digits] [exponent] or
/// . digits [exponent].
fn is_decimal_literal(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    let mut any_digits = false;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        any_digits = true;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
            any_digits = true;
        }
    }
    if !any_digits {
        return false;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        if i >= bytes.len() || !bytes[i].is_ascii_digit() {
            return false;
        }
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    i == bytes.len()
}

/// parseInt: sign, optional 0x under radix 16/0, then the longest digit
/// prefix in the given radix.
pub fn parse_int_str(s: &str, radix: i32) -> f64 {
    let t = s.trim_start_matches(is_js_whitespace);
    let (sign, mut body) = match t.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, t.strip_prefix('+').unwrap_or(t)),
    };
    let mut radix = radix;
    if radix == 0 {
        radix = 10;
        if body.starts_with("0x") || body.starts_with("0X") {
            radix = 16;
        }
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    if radix == 16 && (body.starts_with("0x") || body.starts_with("0X")) {
        body = &body[2..];
    }
    let mut acc = 0.0f64;
    let mut any = false;
    for c in body.chars() {
        match c.to_digit(radix as u32) {
            Some(d) => {
                acc = acc * radix as f64 + d as f64;
                any = true;
            }
            None => break,
        }
    }
    if !any {
        return f64::NAN;
    }
    sign * acc
}

/// parseFloat: the longest decimal-literal prefix, or Infinity.
pub fn parse_float_str(s: &str) -> f64 {
    let t = s.trim_start_matches(is_js_whitespace);
    let (sign, body) = match t.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, t.strip_prefix('+').unwrap_or(t)),
    };
    if body.starts_with("Infinity") {
        return sign * f64::INFINITY;
    }
    // Find the longest valid prefix.
    let mut end = 0;
    for i in (1..=body.len()).rev() {
        if body.is_char_boundary(i) && is_decimal_literal(&body[..i]) {
            end = i;
            break;
        }
    }
    if end == 0 {
        return f64::NAN;
    }
    body[..end].parse::<f64>().map(|v| sign * v).unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_formatting() {
        assert_eq!(number_to_string(0.0), "0");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(1.0), "1");
        assert_eq!(number_to_string(-1.5), "-1.5");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(123456.789), "123456.789");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::INFINITY), "Infinity");
    }

    #[test]
    fn exponential_layout_boundaries() {
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1e20), "100000000000000000000");
        assert_eq!(number_to_string(1e-6), "0.000001");
        assert_eq!(number_to_string(1e-7), "1e-7");
        assert_eq!(number_to_string(1.5e-7), "1.5e-7");
    }

    #[test]
    fn formatting_round_trips() {
        for &v in &[0.1, 1.0 / 3.0, 1234.5678, 9007199254740991.0, 5e-324] {
            let text = number_to_string(v);
            assert_eq!(text.parse::<f64>().unwrap(), v, "{}", text);
        }
    }

    #[test]
    fn radix_integers() {
        assert_eq!(number_to_string_radix(255.0, 16), "ff");
        assert_eq!(number_to_string_radix(8.0, 2), "1000");
        assert_eq!(number_to_string_radix(-35.0, 36), "-z");
        assert_eq!(number_to_string_radix(0.0, 8), "0");
    }

    #[test]
    fn radix_fractions_round_trip() {
        // 0.5 in binary is exact.
        assert_eq!(number_to_string_radix(0.5, 2), "0.1");
        assert_eq!(number_to_string_radix(0.25, 2), "0.01");
        // parseInt-style round trip for safe integers.
        for &n in &[1.0, 12345.0, 987654321.0] {
            for radix in [2u32, 8, 16, 36] {
                let text = number_to_string_radix(n, radix);
                assert_eq!(parse_int_str(&text, radix as i32), n);
            }
        }
    }

    #[test]
    fn string_parsing() {
        assert_eq!(string_to_number("  42  "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x10"), 16.0);
        assert_eq!(string_to_number("0b101"), 5.0);
        assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
        assert!(string_to_number("12abc").is_nan());
        assert!(string_to_number("inf").is_nan());
        assert_eq!(string_to_number("1.5e2"), 150.0);
        assert_eq!(string_to_number(".5"), 0.5);
    }

    #[test]
    fn parse_int_behavior() {
        assert_eq!(parse_int_str("42px", 10), 42.0);
        assert_eq!(parse_int_str("0x1f", 0), 31.0);
        assert_eq!(parse_int_str("  -10  ", 10), -10.0);
        assert_eq!(parse_int_str("z", 36), 35.0);
        assert!(parse_int_str("", 10).is_nan());
        assert!(parse_int_str("10", 1).is_nan());
    }

    #[test]
    fn parse_float_behavior() {
        assert_eq!(parse_float_str("3.14yes"), 3.14);
        assert_eq!(parse_float_str("Infinity!"), f64::INFINITY);
        assert!(parse_float_str("abc").is_nan());
        assert_eq!(parse_float_str("  .5"), 0.5);
    }
}
