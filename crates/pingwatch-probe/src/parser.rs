use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no latency marker in probe output")]
    NoLatencyMarker,
    #[error("malformed latency value: {0:?}")]
    MalformedValue(String),
}

// Windows prints `time<1ms` for sub-millisecond replies.
const MARKERS: [&str; 2] = ["time=", "time<"];
const UNIT: &str = "ms";

/// Extract the round-trip time in milliseconds from ping output.
///
/// The first `time=` (or `time<`) marker wins. The value runs up to the next
/// `ms` and must be a plain non-negative decimal such as `6.57` or `14`.
pub fn parse_latency(text: &str) -> Result<f64, ParseError> {
    let (start, marker) = find_marker(text).ok_or(ParseError::NoLatencyMarker)?;
    let rest = &text[start + marker.len()..];

    let end = match rest.find(UNIT) {
        Some(end) => end,
        None => {
            let fragment = rest.lines().next().unwrap_or_default().trim();
            return Err(ParseError::MalformedValue(fragment.to_string()));
        }
    };

    parse_value(rest[..end].trim())
}

fn find_marker(text: &str) -> Option<(usize, &'static str)> {
    MARKERS
        .iter()
        .filter_map(|marker| text.find(marker).map(|idx| (idx, *marker)))
        .min_by_key(|(idx, _)| *idx)
}

fn parse_value(raw: &str) -> Result<f64, ParseError> {
    let malformed = || ParseError::MalformedValue(raw.to_string());

    if raw.is_empty() || raw.starts_with('.') || raw.ends_with('.') {
        return Err(malformed());
    }
    if !raw.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(malformed());
    }
    if raw.matches('.').count() > 1 {
        return Err(malformed());
    }

    let value: f64 = raw.parse().map_err(|_| malformed())?;
    if !value.is_finite() || value < 0.0 {
        return Err(malformed());
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_linux_reply_line() {
        let line = "64 bytes from x: icmp_seq=1 ttl=57 time=6.57 ms";
        assert_eq!(parse_latency(line), Ok(6.57));
    }

    #[test]
    fn parses_sub_millisecond_reply() {
        let line = "64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=0.628 ms";
        assert_eq!(parse_latency(line), Ok(0.628));
    }

    #[test]
    fn parses_value_without_space_before_unit() {
        let line = "Reply from 1.1.1.1: bytes=32 time=14ms TTL=57";
        assert_eq!(parse_latency(line), Ok(14.0));
    }

    #[test]
    fn windows_less_than_marker_is_upper_bound() {
        let line = "Reply from 192.168.1.1: bytes=32 time<1ms TTL=64";
        assert_eq!(parse_latency(line), Ok(1.0));
    }

    #[test]
    fn missing_marker_is_reported() {
        let line = "From 10.0.0.1 icmp_seq=1 Destination Host Unreachable";
        assert_eq!(parse_latency(line), Err(ParseError::NoLatencyMarker));
        assert_eq!(parse_latency(""), Err(ParseError::NoLatencyMarker));
    }

    #[test]
    fn rejects_malformed_values() {
        for line in [
            "time=abc ms",
            "time= ms",
            "time=-1.5 ms",
            "time=1.2.3 ms",
            "time=.5 ms",
            "time=1e3 ms",
            "time=NaN ms",
        ] {
            assert!(
                matches!(parse_latency(line), Err(ParseError::MalformedValue(_))),
                "expected malformed value for {line:?}"
            );
        }
    }

    #[test]
    fn missing_unit_is_malformed() {
        assert_eq!(
            parse_latency("icmp_seq=1 time=6.57\nsecond line"),
            Err(ParseError::MalformedValue("6.57".to_string()))
        );
    }
}
