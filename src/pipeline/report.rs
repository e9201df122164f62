//! Console report

use std::io::{self, Write};

/// Integer with `,` thousands separators
pub fn format_count(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Print the physical plan and the enriched row count
pub fn write_report(out: &mut impl Write, plan: &str, rows: usize) -> io::Result<()> {
    writeln!(out, "Physical plan (should show 'BroadcastHashJoin'):")?;
    writeln!(out, "{}", plan.trim_end())?;
    writeln!(out, "Total rows after join: {}", format_count(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(2000), "2,000");
        assert_eq!(format_count(1234567), "1,234,567");
    }

    #[test]
    fn test_write_report() {
        let mut out = Vec::new();
        write_report(&mut out, "Project [sale_id]\n", 2000).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "Physical plan (should show 'BroadcastHashJoin'):\nProject [sale_id]\nTotal rows after join: 2,000\n"
        );
    }
}
