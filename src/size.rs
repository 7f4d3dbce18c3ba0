//! Human-readable byte counts using binary (1024-based) steps.

use crate::error::{InspectError, Result};

const UNITS: [&str; 6] = ["K", "M", "G", "T", "P", "E"];

/// Format a byte count: `0B`, `1023B`, `1.0K`, `1.5K`, `2.3G`, ...
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{}B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    // Step on the rounded value so 1_048_575 prints as `1.0M`, not `1024.0K`.
    while (value * 10.0).round() >= 10_240.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1}{}", value, UNITS[unit])
}

/// Checked variant for signed inputs; negative counts are rejected.
pub fn format_size(bytes: i64) -> Result<String> {
    let bytes = u64::try_from(bytes).map_err(|_| InspectError::InvalidSize { value: bytes })?;
    Ok(format_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_table() {
        let cases = [
            (0, "0B"),
            (1, "1B"),
            (1023, "1023B"),
            (1024, "1.0K"),
            (1536, "1.5K"),
            (1_048_575, "1.0M"),
            (1_048_524, "1023.9K"),
            (1024 * 1024, "1.0M"),
            (5 * 1024 * 1024 * 1024 + 512 * 1024 * 1024, "5.5G"),
            (1024_u64.pow(4), "1.0T"),
            (1024_u64.pow(5), "1.0P"),
            (u64::MAX, "16.0E"),
        ];
        for (bytes, expected) in cases {
            assert_eq!(format_bytes(bytes), expected, "formatting {}", bytes);
        }
    }

    #[test]
    fn test_magnitude_order_survives_unit_steps() {
        let inputs = [0_u64, 512, 1023, 1024, 1536, 1_048_575, 1_048_576, 3 << 30, 1 << 40];
        let rank = |s: &str| -> (usize, f64) {
            let split = s.find(|c: char| c.is_ascii_alphabetic()).unwrap();
            let (number, suffix) = s.split_at(split);
            let step = match suffix {
                "B" => 0,
                other => UNITS.iter().position(|u| *u == other).unwrap() + 1,
            };
            (step, number.parse().unwrap())
        };
        for pair in inputs.windows(2) {
            let a = rank(&format_bytes(pair[0]));
            let b = rank(&format_bytes(pair[1]));
            assert!(a <= b, "{:?} should not exceed {:?}", a, b);
        }
    }

    #[test]
    fn test_negative_size_rejected() {
        assert!(matches!(
            format_size(-1),
            Err(InspectError::InvalidSize { value: -1 })
        ));
        assert_eq!(format_size(2048).unwrap(), "2.0K");
    }
}
