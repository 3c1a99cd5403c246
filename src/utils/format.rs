use std::time::Duration;

pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Player positions arrive as float seconds; anything negative or non-finite shows as 0:00.
pub fn format_position(seconds: f64) -> String {
    if seconds.is_finite() && seconds > 0.0 {
        format_duration(Duration::from_secs_f64(seconds))
    } else {
        format_duration(Duration::ZERO)
    }
}

/// Signed seek offset, e.g. `+10s` or `-30s`.
pub fn format_offset(seconds: f64) -> String {
    let rounded = seconds.round() as i64;
    if rounded >= 0 {
        format!("+{}s", rounded)
    } else {
        format!("{}s", rounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(700)), "11:40");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn test_format_position_and_offset() {
        assert_eq!(format_position(700.9), "11:40");
        assert_eq!(format_position(f64::NAN), "0:00");
        assert_eq!(format_offset(10.0), "+10s");
        assert_eq!(format_offset(-30.0), "-30s");
    }
}
