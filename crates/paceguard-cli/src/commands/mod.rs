pub mod backoff;
pub mod config;
pub mod errors;
pub mod patterns;
pub mod simulate;

const MINUTE_MS: u64 = 60_000;

/// `1500` -> `1.5s`, `90000` -> `1.5min`.
pub fn format_ms(ms: u64) -> String {
    if ms >= MINUTE_MS {
        format!("{:.1}min", ms as f64 / MINUTE_MS as f64)
    } else if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{ms}ms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_ms_picks_unit() {
        assert_eq!(format_ms(80), "80ms");
        assert_eq!(format_ms(1500), "1.5s");
        assert_eq!(format_ms(90_000), "1.5min");
    }
}
