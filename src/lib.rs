pub mod abundance_table;
pub mod argument_parsing;
pub mod blast_hit_reducer;
pub mod category_abundance;
pub mod command_planner;
pub mod error;
pub mod most_wanted;
pub mod pie_chart;
pub mod report_renderer;
pub mod rep_set;

#[macro_use]
extern crate log;
extern crate clap;

pub use crate::error::{MostWantedError, Result};

pub const DEFAULT_CATEGORY: &str = "Environment";
pub const DEFAULT_MIN_ABUNDANCE: &str = "25";
pub const DEFAULT_MAX_ABUNDANCE: &str = "90000000000";
pub const DEFAULT_MIN_GROUPS: &str = "2";
pub const DEFAULT_MAX_REFERENCE_SIMILARITY: &str = "0.90";
pub const DEFAULT_MAX_NT_SIMILARITY: &str = "1.00";
pub const DEFAULT_E_VALUE: &str = "1e-4";
pub const DEFAULT_WORD_SIZE: &str = "28";
pub const DEFAULT_TOP_N: &str = "100";
pub const DEFAULT_MAX_PIE_SLICES: &str = "8";
pub const DEFAULT_JOBS: &str = "1";

/// Format a real the way the downstream QIIME scripts print them: shortest
/// round-trip representation, always with at least one decimal place, and in
/// exponent notation (`1e-05`, `1.5e+16`) when the decimal exponent is below
/// -4 or at least 16.
pub fn format_real(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_finite() && value != 0.0 {
        let scientific = format!("{:e}", value);
        if let Some((mantissa, exponent)) = scientific.split_once('e') {
            if let Ok(exponent) = exponent.parse::<i32>() {
                if !(-4..16).contains(&exponent) {
                    let sign = if exponent < 0 { '-' } else { '+' };
                    return format!("{}e{}{:02}", mantissa, sign, exponent.abs());
                }
            }
        }
    }
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_real() {
        assert_eq!("87.0", format_real(87.0));
        assert_eq!("89.5", format_real(89.5));
        assert_eq!("0.7", format_real(0.70));
        assert_eq!("1.0", format_real(1.0));
        assert_eq!("0.0001", format_real(0.0001));
        assert_eq!("0.0", format_real(0.0));
    }

    #[test]
    fn test_format_real_exponent_notation() {
        assert_eq!("1e-05", format_real(0.00001));
        assert_eq!("1.5e-07", format_real(1.5e-7));
        assert_eq!("-2.5e-10", format_real(-2.5e-10));
        assert_eq!("1e+16", format_real(1e16));
        assert_eq!("1e+100", format_real(1e100));
        assert_eq!("1000000000000000.0", format_real(1e15));
    }
}
