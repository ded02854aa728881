//! The latest-if-newer rule for `Latest*` pointer tables.

/// Whether `candidate` should replace the `current` latest pointer.
///
/// A missing pointer is always replaced. Otherwise only a strictly newer
/// candidate wins; an equal one keeps the current pointer so re-ingesting
/// the same data does not churn the row.
pub fn should_replace_latest<T: PartialOrd>(current: Option<&T>, candidate: &T) -> bool {
    match current {
        None => true,
        Some(current) => candidate > current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn missing_pointer_is_replaced() {
        assert!(should_replace_latest(None, &day(1)));
    }

    #[test]
    fn only_strictly_newer_wins() {
        assert!(should_replace_latest(Some(&day(1)), &day(2)));
        assert!(!should_replace_latest(Some(&day(2)), &day(2)));
        assert!(!should_replace_latest(Some(&day(3)), &day(2)));
    }
}
