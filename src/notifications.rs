use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::config::NotificationConfig;
use crate::risk::RiskProfile;
use crate::risk::advice::top_risk_factors;

/// Desktop notification sender with cooldown to prevent spam.
pub struct Notifier {
    enabled: bool,
    min_score: f64,
    cooldown: Duration,
    last_sent: Mutex<Option<DateTime<Utc>>>,
}

impl Notifier {
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            enabled: config.enabled,
            min_score: config.min_score,
            cooldown: Duration::seconds(config.cooldown_seconds.min(u64::from(u32::MAX)) as i64),
            last_sent: Mutex::new(None),
        }
    }

    /// Start the cooldown from a send recorded by an earlier process.
    pub fn with_last_sent(self, last_sent: Option<DateTime<Utc>>) -> Self {
        *self.last_sent.lock().unwrap_or_else(PoisonError::into_inner) = last_sent;
        self
    }

    /// Try to send a desktop notification for a risk profile. Blocks until
    /// the notification server accepts or rejects it.
    /// Returns true if a notification was sent, false if skipped or failed.
    pub fn notify(&self, profile: &RiskProfile) -> bool {
        if !self.enabled {
            return false;
        }
        if profile.score < self.min_score {
            return false;
        }
        if !self.check_cooldown(Utc::now()) {
            return false;
        }
        send_notification(profile)
    }

    /// Check and update cooldown. Returns true if enough time has passed.
    fn check_cooldown(&self, now: DateTime<Utc>) -> bool {
        let mut last = self.last_sent.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = *last {
            if now - prev < self.cooldown {
                return false;
            }
        }
        *last = Some(now);
        true
    }
}

fn send_notification(profile: &RiskProfile) -> bool {
    let (title, body) = render(profile);
    match notify_rust::Notification::new().summary(&title).body(&body).show() {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!("Desktop notification failed: {e}");
            false
        }
    }
}

fn render(profile: &RiskProfile) -> (String, String) {
    let title = format!("TxSentinel: {} risk", profile.category.as_str());
    let short: String = profile.address.chars().take(8).collect();
    let mut body = format!("{:.0} | {short}", profile.score);
    if let Some(top) = top_risk_factors(profile, 1).first() {
        body.push_str(&format!(" | {}", top.name));
    }
    (title, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::{FactorType, RiskCategory, RiskFactor};

    fn make_profile(score: f64) -> RiskProfile {
        let mut profile = RiskProfile::empty("9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin");
        profile.score = score;
        profile.category = RiskCategory::from_score(score);
        profile.factors = vec![RiskFactor::new(FactorType::WashTrading, 0.7, "test")];
        profile
    }

    fn config(enabled: bool, cooldown_seconds: u64) -> NotificationConfig {
        NotificationConfig {
            enabled,
            min_score: 75.0,
            cooldown_seconds,
        }
    }

    #[test]
    fn cooldown_blocks_rapid_notifications() {
        let notifier = Notifier::new(&config(true, 30));
        let now = Utc::now();
        assert!(notifier.check_cooldown(now));
        assert!(!notifier.check_cooldown(now + Duration::seconds(10)));
        assert!(notifier.check_cooldown(now + Duration::seconds(31)));
    }

    #[test]
    fn cooldown_zero_allows_all() {
        let notifier = Notifier::new(&config(true, 0));
        let now = Utc::now();
        assert!(notifier.check_cooldown(now));
        assert!(notifier.check_cooldown(now));
    }

    #[test]
    fn earlier_send_carries_into_new_notifier() {
        let now = Utc::now();
        let notifier = Notifier::new(&config(true, 30)).with_last_sent(Some(now - Duration::seconds(5)));
        assert!(!notifier.check_cooldown(now));
        assert!(!notifier.notify(&make_profile(90.0)));

        let notifier = Notifier::new(&config(true, 30)).with_last_sent(Some(now - Duration::seconds(60)));
        assert!(notifier.check_cooldown(now));
    }

    #[test]
    fn disabled_notifier_skips() {
        let notifier = Notifier::new(&config(false, 0));
        assert!(!notifier.notify(&make_profile(90.0)));
    }

    #[test]
    fn below_min_score_skips() {
        let notifier = Notifier::new(&config(true, 0));
        assert!(!notifier.notify(&make_profile(50.0)));
    }

    #[test]
    fn render_names_top_factor() {
        let (title, body) = render(&make_profile(80.0));
        assert_eq!(title, "TxSentinel: high risk");
        assert_eq!(body, "80 | 9xQeWvG8 | Wash Trading");
    }
}
