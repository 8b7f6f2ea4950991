use rand::Rng;

use crate::{constants::MESSAGE_POOLS, domain::Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Distraction,
    Streak,
    Pomodoro,
}

impl NotificationKind {
    pub fn title(self) -> &'static str {
        match self {
            NotificationKind::Distraction => "Distraction detected",
            NotificationKind::Streak => "Focus streak",
            NotificationKind::Pomodoro => "Pomodoro complete",
        }
    }

    fn pool(self) -> &'static [&'static str] {
        match self {
            NotificationKind::Distraction => MESSAGE_POOLS.distraction,
            NotificationKind::Streak => MESSAGE_POOLS.streak,
            NotificationKind::Pomodoro => MESSAGE_POOLS.pomodoro,
        }
    }
}

/// Fire-and-forget sink. Nothing is acknowledged or retried.
pub trait Notifier {
    fn notify(&mut self, kind: NotificationKind, title: &str, message: &str);
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, kind: NotificationKind, title: &str, message: &str) {
        log::info!("[{:?}] {}: {}", kind, title, message);
    }
}

pub fn pick_message<R: Rng + ?Sized>(kind: NotificationKind, rng: &mut R) -> &'static str {
    let pool = kind.pool();
    if pool.is_empty() {
        return kind.title();
    }
    pool[rng.gen_range(0..pool.len())]
}

pub fn send<R: Rng + ?Sized>(notifier: &mut dyn Notifier, kind: NotificationKind, rng: &mut R) {
    let message = pick_message(kind, rng);
    notifier.notify(kind, kind.title(), message);
}

/// Distraction alerts are rising-edge only and then held off for a cooldown.
pub fn distraction_alert_due(
    last_alert_at: Option<Timestamp>,
    now: Timestamp,
    cooldown_secs: i64,
) -> bool {
    match last_alert_at {
        Some(last) => (now - last).num_seconds() >= cooldown_secs || now < last,
        None => true,
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Vec<(NotificationKind, String)>,
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn notify(&mut self, kind: NotificationKind, _title: &str, message: &str) {
        self.sent.push((kind, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn test_messages_come_from_the_pool() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let message = pick_message(NotificationKind::Streak, &mut rng);
            assert!(MESSAGE_POOLS.streak.contains(&message));
        }
    }

    #[test]
    fn test_alert_cooldown() {
        let now = Utc::now();
        assert!(distraction_alert_due(None, now, 60));
        assert!(!distraction_alert_due(Some(now - Duration::seconds(30)), now, 60));
        assert!(distraction_alert_due(Some(now - Duration::seconds(60)), now, 60));
        // A clock that jumped backwards does not suppress alerts forever.
        assert!(distraction_alert_due(Some(now + Duration::hours(1)), now, 60));
    }

    #[test]
    fn test_send_records_kind() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut sink = RecordingNotifier::default();
        send(&mut sink, NotificationKind::Distraction, &mut rng);
        assert_eq!(sink.sent.len(), 1);
        assert_eq!(sink.sent[0].0, NotificationKind::Distraction);
    }
}
