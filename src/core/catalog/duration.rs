use once_cell::sync::Lazy;
use regex::Regex;

static ISO_DURATION: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^P(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$").ok()
});

/// 解析 ISO 8601 时长（`PT4M13S`、`P1DT2H`），返回秒数；格式不对返回 None
pub fn parse_iso8601_duration(value: &str) -> Option<f64> {
    let value = value.trim();
    if value == "P" || value.ends_with('T') {
        return None;
    }
    let caps = ISO_DURATION.as_ref()?.captures(value)?;
    let part = |i: usize| -> f64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    Some(part(1) * 604_800.0 + part(2) * 86_400.0 + part(3) * 3_600.0 + part(4) * 60.0 + part(5))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_youtube_durations() {
        assert_eq!(parse_iso8601_duration("PT4M13S"), Some(253.0));
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), Some(3723.0));
        assert_eq!(parse_iso8601_duration("PT45S"), Some(45.0));
        assert_eq!(parse_iso8601_duration("PT10M"), Some(600.0));
        assert_eq!(parse_iso8601_duration("P1DT1S"), Some(86_401.0));
        assert_eq!(parse_iso8601_duration("P0D"), Some(0.0));
    }

    #[test]
    fn test_fractional_seconds() {
        assert_eq!(parse_iso8601_duration("PT1.5S"), Some(1.5));
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(parse_iso8601_duration(""), None);
        assert_eq!(parse_iso8601_duration("P"), None);
        assert_eq!(parse_iso8601_duration("PT"), None);
        assert_eq!(parse_iso8601_duration("4M13S"), None);
        assert_eq!(parse_iso8601_duration("PT4X"), None);
    }
}
