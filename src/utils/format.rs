const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Human readable size using 1024-based units, e.g. `1.5 MB` or `0 Bytes`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", SIZE_UNITS[unit])
}

pub fn with_thousands_separator(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{format_file_size, with_thousands_separator};

    #[test]
    fn formats_sizes() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(10 * 1024 * 1024), "10 MB");
        assert_eq!(format_file_size(1_234_567), "1.18 MB");
        assert_eq!(format_file_size(5 * 1024 * 1024 * 1024 * 1024), "5120 GB");
    }

    #[test]
    fn groups_thousands() {
        assert_eq!(with_thousands_separator(0), "0");
        assert_eq!(with_thousands_separator(999), "999");
        assert_eq!(with_thousands_separator(1000), "1,000");
        assert_eq!(with_thousands_separator(1_234_567), "1,234,567");
    }
}
