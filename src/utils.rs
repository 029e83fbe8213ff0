use chrono::{DateTime, Utc};

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// Shortens counters for display: from 10 000 upward the number is rounded
/// to `precision` significant digits and rendered with a `k` or `m` suffix.
pub fn format_large_number(number: i64, precision: u32) -> String {
    if number < 10_000 {
        return number.to_string();
    }

    let digits = number.ilog10() + 1;
    let rounded = match digits.checked_sub(precision.max(1)) {
        Some(drop) if drop > 0 => {
            let scale = 10_i64.pow(drop);
            number.saturating_add(scale / 2) / scale * scale
        }
        _ => number,
    };

    if rounded >= 1_000_000 {
        format!("{}m", rounded as f64 / 1_000_000.0)
    } else {
        format!("{}k", rounded as f64 / 1_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_numbers_are_untouched() {
        assert_eq!(format_large_number(0, 3), "0");
        assert_eq!(format_large_number(9_999, 3), "9999");
        assert_eq!(format_large_number(-5, 3), "-5");
    }

    #[test]
    fn thousands() {
        assert_eq!(format_large_number(10_000, 3), "10k");
        assert_eq!(format_large_number(12_345, 3), "12.3k");
        assert_eq!(format_large_number(12_355, 3), "12.4k");
        assert_eq!(format_large_number(999_999, 3), "1m");
    }

    #[test]
    fn millions() {
        assert_eq!(format_large_number(1_234_567, 3), "1.23m");
        assert_eq!(format_large_number(45_000_000, 2), "45m");
    }

    #[test]
    fn extreme_inputs_do_not_overflow() {
        assert_eq!(format_large_number(i64::MAX, 3), "9220000000000m");
        assert_eq!(format_large_number(12_345, 0), "10k");
    }

    #[test]
    fn generous_precision_keeps_digits() {
        assert_eq!(format_large_number(12_345, 8), "12.345k");
    }
}
