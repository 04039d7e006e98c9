use time::{Duration, OffsetDateTime, PrimitiveDateTime};

/// Current UTC wall-clock time in the column representation the stores use.
pub fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub fn minutes(value: i64) -> Duration {
    Duration::minutes(value.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn minutes_shifts_across_midnight() {
        let value = datetime!(2025-01-02 23:50);
        assert_eq!(value + minutes(20), datetime!(2025-01-03 00:10));
    }

    #[test]
    fn negative_windows_collapse_to_zero() {
        assert_eq!(minutes(-15), Duration::ZERO);
    }
}
