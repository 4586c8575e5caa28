use chrono::{DateTime, Duration, Utc};

use crate::config::{DEFAULT_RETENTION_DAYS, RetentionSettings, RuleMode};

/// Effective retention window of a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionWindow {
    /// Records older than this many days are overdue. Always at least 1.
    Days(u32),
    /// The category is exempt.
    Never,
}

impl RetentionWindow {
    /// Instant before which a record is overdue, or `None` when exempt.
    ///
    /// A window reaching past the earliest representable instant yields
    /// [`DateTime::<Utc>::MIN_UTC`], which no record predates.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            RetentionWindow::Days(days) => Some(
                Duration::try_days(i64::from(*days))
                    .and_then(|window| now.checked_sub_signed(window))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            ),
            RetentionWindow::Never => None,
        }
    }
}

/// Resolve the retention window of a category.
///
/// Categories without a rule follow the global window. An invalid custom day
/// count falls back to [`DEFAULT_RETENTION_DAYS`], not to the configured
/// global value, so a broken rule never exempts or empties a category.
pub fn resolve_days(settings: &RetentionSettings, category_id: &str) -> RetentionWindow {
    let global = match settings.global_retention_days {
        0 => DEFAULT_RETENTION_DAYS,
        days => days,
    };

    let Some(rule) = settings.categories.get(category_id) else {
        return RetentionWindow::Days(global);
    };

    match rule.mode {
        RuleMode::Global => RetentionWindow::Days(global),
        RuleMode::Never => RetentionWindow::Never,
        RuleMode::Custom => match u32::try_from(rule.days) {
            Ok(days) if days >= 1 => RetentionWindow::Days(days),
            _ => RetentionWindow::Days(DEFAULT_RETENTION_DAYS),
        },
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::rstest;

    use super::*;
    use crate::config::CategoryRule;

    fn settings_with(category: &str, mode: RuleMode, days: i64) -> RetentionSettings {
        let mut settings = RetentionSettings {
            global_retention_days: 90,
            ..Default::default()
        };
        settings
            .categories
            .insert(category.to_string(), CategoryRule { mode, days });
        settings
    }

    #[rstest]
    #[case::custom(RuleMode::Custom, 30, RetentionWindow::Days(30))]
    #[case::custom_zero(RuleMode::Custom, 0, RetentionWindow::Days(DEFAULT_RETENTION_DAYS))]
    #[case::custom_negative(RuleMode::Custom, -5, RetentionWindow::Days(DEFAULT_RETENTION_DAYS))]
    #[case::custom_overflow(RuleMode::Custom, i64::MAX, RetentionWindow::Days(DEFAULT_RETENTION_DAYS))]
    #[case::custom_huge(RuleMode::Custom, 100_000_000, RetentionWindow::Days(100_000_000))]
    #[case::global(RuleMode::Global, 30, RetentionWindow::Days(90))]
    #[case::never(RuleMode::Never, 30, RetentionWindow::Never)]
    fn test_resolve_days(
        #[case] mode: RuleMode,
        #[case] days: i64,
        #[case] expected: RetentionWindow,
    ) {
        let settings = settings_with("contact", mode, days);
        assert_eq!(resolve_days(&settings, "contact"), expected);
    }

    #[test]
    fn test_missing_rule_uses_global() {
        let settings = settings_with("contact", RuleMode::Never, 0);
        assert_eq!(resolve_days(&settings, "other"), RetentionWindow::Days(90));
    }

    #[test]
    fn test_unvalidated_zero_global_uses_default() {
        let settings = RetentionSettings {
            global_retention_days: 0,
            ..Default::default()
        };
        assert_eq!(
            resolve_days(&settings, "any"),
            RetentionWindow::Days(DEFAULT_RETENTION_DAYS)
        );
    }

    #[test]
    fn test_cutoff() {
        let now = Utc.with_ymd_and_hms(2025, 3, 31, 12, 0, 0).unwrap();
        assert_eq!(
            RetentionWindow::Days(30).cutoff(now),
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(RetentionWindow::Never.cutoff(now), None);
    }

    #[test]
    fn test_cutoff_past_representable_range() {
        let now = Utc.with_ymd_and_hms(2025, 3, 31, 12, 0, 0).unwrap();
        assert_eq!(
            RetentionWindow::Days(100_000_000).cutoff(now),
            Some(DateTime::<Utc>::MIN_UTC)
        );
        assert_eq!(
            RetentionWindow::Days(u32::MAX).cutoff(now),
            Some(DateTime::<Utc>::MIN_UTC)
        );
    }
}
