//! Elapsed recording time from a live record status.

use super::protocol::{RecordStatus, Timecode};

/// Seconds into the current recording, or `None` when it cannot be determined.
///
/// Sources are tried in order: the timecode string, the timecode as
/// nanoseconds, then `outputDuration` in milliseconds. The first finite,
/// non-negative value wins.
pub fn resolve_elapsed_seconds(status: &RecordStatus) -> Option<f64> {
    if !status.output_active {
        return None;
    }

    let from_timecode = status.output_timecode.as_ref().and_then(|tc| match tc {
        Timecode::Text(text) => parse_timecode(text),
        Timecode::Nanos(nanos) => Some(nanos / 1e9),
    });

    let from_duration = status.output_duration.map(|ms| ms / 1000.0);

    [from_timecode, from_duration]
        .into_iter()
        .flatten()
        .find(|secs| secs.is_finite() && *secs >= 0.0)
}

/// Parse `H+:MM:SS[.fraction]` into seconds.
pub fn parse_timecode(text: &str) -> Option<f64> {
    let mut parts = text.trim().splitn(3, ':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let rest = parts.next()?;

    let (whole, fraction) = match rest.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (rest, ""),
    };
    let seconds: u64 = whole.parse().ok()?;
    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let fraction: f64 = if fraction.is_empty() {
        0.0
    } else {
        format!("0.{}", fraction).parse().ok()?
    };

    let total = hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)?;
    Some(total as f64 + fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active() -> RecordStatus {
        RecordStatus {
            output_active: true,
            ..Default::default()
        }
    }

    fn close(actual: Option<f64>, expected: f64) -> bool {
        actual.is_some_and(|v| (v - expected).abs() < 1e-9)
    }

    #[test]
    fn test_timecode_string() {
        let status = RecordStatus {
            output_timecode: Some(Timecode::Text("00:03:16.099".into())),
            ..active()
        };
        assert!(close(resolve_elapsed_seconds(&status), 196.099));
    }

    #[test]
    fn test_timecode_nanoseconds() {
        let status = RecordStatus {
            output_timecode: Some(Timecode::Nanos(196_099_000_000.0)),
            ..active()
        };
        assert!(close(resolve_elapsed_seconds(&status), 196.099));
    }

    #[test]
    fn test_output_duration_fallback() {
        let status = RecordStatus {
            output_duration: Some(196_099.0),
            ..active()
        };
        assert!(close(resolve_elapsed_seconds(&status), 196.099));
    }

    #[test]
    fn test_inactive_output() {
        let status = RecordStatus {
            output_active: false,
            output_timecode: Some(Timecode::Text("00:03:16.099".into())),
            output_duration: Some(196_099.0),
            ..Default::default()
        };
        assert_eq!(resolve_elapsed_seconds(&status), None);
    }

    #[test]
    fn test_bad_timecode_falls_back_to_duration() {
        let status = RecordStatus {
            output_timecode: Some(Timecode::Text("not a timecode".into())),
            output_duration: Some(12_500.0),
            ..active()
        };
        assert!(close(resolve_elapsed_seconds(&status), 12.5));
    }

    #[test]
    fn test_negative_values_rejected() {
        let status = RecordStatus {
            output_timecode: Some(Timecode::Nanos(-1.0)),
            output_duration: Some(-5.0),
            ..active()
        };
        assert_eq!(resolve_elapsed_seconds(&status), None);
    }

    #[test]
    fn test_nothing_available() {
        assert_eq!(resolve_elapsed_seconds(&active()), None);
    }

    #[test]
    fn test_parse_timecode_forms() {
        assert!(close(parse_timecode("01:00:00.5"), 3600.5));
        assert!(close(parse_timecode("100:00:01"), 360_001.0));
        assert_eq!(parse_timecode("00:03"), None);
        assert_eq!(parse_timecode("00:03:1x.0"), None);
        assert_eq!(parse_timecode("00:03:16.0-9"), None);
    }

    #[test]
    fn test_parse_timecode_overflow_is_none() {
        assert_eq!(parse_timecode("18446744073709551615:00:00"), None);
        assert_eq!(parse_timecode("5124095576030432:00:00"), None);
        assert_eq!(parse_timecode("5124095576030431:00:16"), None);
        assert_eq!(parse_timecode("00:307445734561825861:00"), None);
    }
}
