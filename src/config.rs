use crate::calendar::DateFormat;
use crate::limits::*;
use crate::model::Ts;

/// Runtime settings, read from `DAYGRID_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub cache_ttl_secs: Ts,
    pub previous_ttl_secs: Ts,
    pub refresh_queue: usize,
    pub metrics_port: Option<u16>,
    pub fixture: Option<String>,
    /// Day key pattern, strftime (`%d/%m/%Y`) or PHP `date()` (`d/m/Y`).
    pub date_format: DateFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            previous_ttl_secs: PREVIOUS_AVAILABILITY_TTL_SECS,
            refresh_queue: DEFAULT_REFRESH_QUEUE,
            metrics_port: None,
            fixture: None,
            date_format: DateFormat::default(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<i64>().ok());

        Self {
            cache_ttl_secs: parsed("DAYGRID_CACHE_TTL_SECS")
                .filter(|&v| v > 0)
                .unwrap_or(defaults.cache_ttl_secs),
            previous_ttl_secs: parsed("DAYGRID_PREVIOUS_TTL_SECS")
                .filter(|&v| v > 0)
                .unwrap_or(defaults.previous_ttl_secs),
            refresh_queue: parsed("DAYGRID_REFRESH_QUEUE")
                .and_then(|v| usize::try_from(v).ok())
                .filter(|&v| v > 0)
                .unwrap_or(defaults.refresh_queue),
            metrics_port: lookup("DAYGRID_METRICS_PORT").and_then(|s| s.trim().parse().ok()),
            fixture: lookup("DAYGRID_FIXTURE").filter(|s| !s.trim().is_empty()),
            date_format: lookup("DAYGRID_DATE_FORMAT")
                .and_then(|s| parse_date_format(s.trim()))
                .unwrap_or(defaults.date_format),
        }
    }
}

fn parse_date_format(raw: &str) -> Option<DateFormat> {
    if raw.contains('%') {
        DateFormat::new(raw)
    } else {
        DateFormat::from_php(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(settings(&[]), Settings::default());
    }

    #[test]
    fn reads_values() {
        let s = settings(&[
            ("DAYGRID_CACHE_TTL_SECS", "120"),
            ("DAYGRID_PREVIOUS_TTL_SECS", "30"),
            ("DAYGRID_REFRESH_QUEUE", "8"),
            ("DAYGRID_METRICS_PORT", "9100"),
            ("DAYGRID_FIXTURE", "fixture.json"),
        ]);
        assert_eq!(s.cache_ttl_secs, 120);
        assert_eq!(s.previous_ttl_secs, 30);
        assert_eq!(s.refresh_queue, 8);
        assert_eq!(s.metrics_port, Some(9100));
        assert_eq!(s.fixture.as_deref(), Some("fixture.json"));
    }

    #[test]
    fn date_format_in_either_syntax() {
        let php = settings(&[("DAYGRID_DATE_FORMAT", "d/m/Y")]);
        assert_eq!(php.date_format.pattern(), "%d/%m/%Y");
        let strftime = settings(&[("DAYGRID_DATE_FORMAT", "%Y.%m.%d")]);
        assert_eq!(strftime.date_format.pattern(), "%Y.%m.%d");
    }

    #[test]
    fn garbage_falls_back() {
        let s = settings(&[
            ("DAYGRID_CACHE_TTL_SECS", "soon"),
            ("DAYGRID_PREVIOUS_TTL_SECS", "-5"),
            ("DAYGRID_REFRESH_QUEUE", "0"),
            ("DAYGRID_METRICS_PORT", "70000"),
            ("DAYGRID_DATE_FORMAT", "%Y-%"),
        ]);
        assert_eq!(s, Settings::default());
    }
}
