//! Cell formatting shared by the report tables.
//!
//! Undefined values (NaN) always render as an empty cell so a degenerate
//! subgroup leaves a gap instead of a `NaN` token.

use sepsis_math::Interval;

/// Below this a p-value is shown as `< 0.001`.
pub const PVALUE_FLOOR: f64 = 0.001;

/// `value` with `decimals` places, or empty when undefined.
pub fn number(value: f64, decimals: usize) -> String {
    if value.is_nan() {
        String::new()
    } else {
        format!("{:.*}", decimals, value)
    }
}

/// `value [low, high]`; the bracket is dropped when the interval is unknown.
pub fn with_interval(value: f64, interval: Option<Interval>, decimals: usize) -> String {
    if value.is_nan() {
        return String::new();
    }
    match interval {
        Some(ci) if !ci.low.is_nan() && !ci.high.is_nan() => format!(
            "{:.*} [{:.*}, {:.*}]",
            decimals, value, decimals, ci.low, decimals, ci.high
        ),
        _ => format!("{:.*}", decimals, value),
    }
}

/// Three decimals, or `< 0.001` for very small p-values.
pub fn p_value(p: f64) -> String {
    if p.is_nan() {
        String::new()
    } else if p < PVALUE_FLOOR {
        "< 0.001".to_string()
    } else {
        format!("{:.3}", p)
    }
}

/// `count (pct%)`.
pub fn count_with_percent(count: usize, total: usize) -> String {
    let pct = 100.0 * count as f64 / total as f64;
    if pct.is_nan() {
        format!("{:4} ()", count)
    } else {
        format!("{:4} ({:.2}%)", count, pct)
    }
}

/// Left-justify `cell` in a field of `width` characters.
pub fn pad(cell: &str, width: usize) -> String {
    format!("{:<width$}", cell, width = width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p_values_below_floor_collapse() {
        assert_eq!(p_value(0.0004), "< 0.001");
        assert_eq!(p_value(0.001), "0.001");
        assert_eq!(p_value(0.0421), "0.042");
        assert_eq!(p_value(1.0), "1.000");
        assert_eq!(p_value(f64::NAN), "");
    }

    #[test]
    fn intervals_render_inline() {
        let ci = Interval::new(8.6575, 49.1044);
        assert_eq!(with_interval(25.0, Some(ci), 2), "25.00 [8.66, 49.10]");
        assert_eq!(with_interval(25.0, None, 2), "25.00");
        assert_eq!(with_interval(f64::NAN, Some(ci), 2), "");
    }

    #[test]
    fn numbers_and_counts() {
        assert_eq!(number(1.0 / 3.0, 3), "0.333");
        assert_eq!(number(f64::NAN, 2), "");
        assert_eq!(count_with_percent(1, 4), "   1 (25.00%)");
        assert_eq!(count_with_percent(0, 0), "   0 ()");
        assert_eq!(pad("ab", 4), "ab  ");
    }
}
