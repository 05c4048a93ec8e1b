//! Shared CLI argument parsers.

use macship::Arch;
use std::time::Duration;

/// Parse a duration string (e.g., "30s", "5m", "2h").
pub fn parse_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s)
}

/// Parse an architecture name (`x86_64`, `arm64` or an alias).
pub fn parse_arch(s: &str) -> Result<Arch, String> {
    s.parse::<Arch>().map_err(|e| e.to_string())
}

/// Parse a job count, rejecting zero.
pub fn parse_jobs(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("job count must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("invalid job count: {}", s)),
    }
}

/// Number of parallel build jobs when none is given.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_parse_arch() {
        assert_eq!(parse_arch("arm64").unwrap(), Arch::Arm64);
        assert_eq!(parse_arch("x86_64").unwrap(), Arch::X86_64);
        assert!(parse_arch("ppc").is_err());
    }

    #[test]
    fn test_parse_jobs() {
        assert_eq!(parse_jobs("8").unwrap(), 8);
        assert!(parse_jobs("0").is_err());
        assert!(parse_jobs("many").is_err());
        assert!(default_jobs() >= 1);
    }
}
