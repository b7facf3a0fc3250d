//! Marker side-channel text format: one seconds value per line.

/// Parse a marker file body. Blank and non-numeric lines are dropped.
pub fn parse_marker_lines(body: &str) -> Vec<f64> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .collect()
}

/// Line appended for one captured marker.
pub fn format_marker_line(seconds: f64) -> String {
    format!("{:.2}\n", seconds)
}
