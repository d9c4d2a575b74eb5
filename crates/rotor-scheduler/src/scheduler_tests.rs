use super::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Clone, Default)]
struct Flag {
    on: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl Flag {
    fn set(&self, value: bool) {
        self.on.store(value, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TokenSignal for Flag {
    fn expired_reason(&mut self) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.on
            .load(Ordering::SeqCst)
            .then(|| "Token cursorAuth/accessToken is empty in storage.json".to_string())
    }
}

impl RateLimitSignal for Flag {
    fn is_rate_limited(&mut self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.on.load(Ordering::SeqCst)
    }
}

fn scheduler(settings: SchedulerSettings) -> (HybridRotationScheduler, Flag, Flag) {
    let token = Flag::default();
    let rate = Flag::default();
    let s = HybridRotationScheduler::new(Box::new(token.clone()), Box::new(rate.clone()), settings);
    (s, token, rate)
}

fn only_scheduled(hours: f64) -> SchedulerSettings {
    SchedulerSettings {
        scheduled_interval_hours: hours,
        enable_token_check: false,
        enable_rate_limit_check: false,
        enable_scheduled_rotation: true,
    }
}

#[test]
fn test_priority_across_all_combinations() {
    let now = Utc::now();
    for mask in 0u8..16 {
        let manual = mask & 1 != 0;
        let token_on = mask & 2 != 0;
        let rate_on = mask & 4 != 0;
        let sched_on = mask & 8 != 0;

        let (mut s, token, rate) = scheduler(SchedulerSettings {
            scheduled_interval_hours: 12.0,
            ..SchedulerSettings::default()
        });
        token.set(token_on);
        rate.set(rate_on);
        if manual {
            s.trigger_manual_rotation();
        }
        if sched_on {
            s.set_last_rotation_time(Some(now - Duration::hours(13)));
        } else {
            s.set_last_rotation_time(Some(now - Duration::hours(1)));
        }

        let expected = if manual {
            RotationTrigger::Manual
        } else if token_on {
            RotationTrigger::TokenExpired
        } else if rate_on {
            RotationTrigger::RateLimited
        } else if sched_on {
            RotationTrigger::Scheduled
        } else {
            RotationTrigger::None
        };

        let decision = s.should_rotate_at(now);
        assert_eq!(decision.trigger, expected, "mask {mask:04b}");
        assert_eq!(decision.should_rotate, expected != RotationTrigger::None);
        assert_eq!(decision.reason.is_some(), decision.should_rotate);
    }
}

#[test]
fn test_higher_trigger_short_circuits_lower_checks() {
    let (mut s, token, rate) = scheduler(SchedulerSettings::default());
    token.set(true);
    rate.set(true);

    let decision = s.should_rotate();
    assert_eq!(decision.trigger, RotationTrigger::TokenExpired);
    assert_eq!(
        decision.reason.as_deref(),
        Some("Token cursorAuth/accessToken is empty in storage.json")
    );
    assert_eq!(rate.calls(), 0, "rate-limit signal must not be consulted");
}

#[test]
fn test_manual_trigger_fires_once() {
    let (mut s, _, _) = scheduler(SchedulerSettings::default());
    s.trigger_manual_rotation();

    let first = s.should_rotate();
    assert_eq!(
        first,
        RotationDecision {
            should_rotate: true,
            trigger: RotationTrigger::Manual,
            reason: Some("Manual rotation requested".into()),
        }
    );
    assert_eq!(s.should_rotate(), RotationDecision::none());
}

#[test]
fn test_manual_trigger_skips_monitors() {
    let (mut s, token, rate) = scheduler(SchedulerSettings::default());
    s.trigger_manual_rotation();
    s.should_rotate();
    assert_eq!(token.calls() + rate.calls(), 0);
}

#[test]
fn test_scheduled_interval_boundary() {
    let (mut s, _, _) = scheduler(only_scheduled(12.0));
    let t = Utc::now();
    s.notify_rotation_complete_at(RotationTrigger::Scheduled, true, t);

    let just_before = t + Duration::hours(12) - Duration::seconds(1);
    assert!(!s.should_rotate_at(just_before).should_rotate);
    assert!(!s.should_rotate_at(t + Duration::hours(6)).should_rotate);

    let at = s.should_rotate_at(t + Duration::hours(12));
    assert_eq!(at.trigger, RotationTrigger::Scheduled);
    assert!(s.should_rotate_at(t + Duration::hours(20)).should_rotate);
}

#[test]
fn test_failed_rotation_keeps_clock() {
    let (mut s, _, _) = scheduler(only_scheduled(12.0));
    let t = Utc::now() - Duration::hours(13);
    s.set_last_rotation_time(Some(t));

    s.notify_rotation_complete(RotationTrigger::Scheduled, false);
    assert_eq!(s.last_rotation_time(), Some(t));
    assert!(
        s.should_rotate().should_rotate,
        "failed scheduled rotation retries on the next poll"
    );
}

#[test]
fn test_scheduled_due_after_thirteen_hours() {
    let (mut s, token, rate) = scheduler(only_scheduled(12.0));
    token.set(true);
    rate.set(true);
    s.set_last_rotation_time(Some(Utc::now() - Duration::hours(13)));

    let decision = s.should_rotate();
    assert!(decision.should_rotate);
    assert_eq!(decision.trigger, RotationTrigger::Scheduled);
    assert_eq!(
        decision.reason.as_deref(),
        Some("Scheduled rotation (interval: 12h)")
    );
    assert_eq!(token.calls() + rate.calls(), 0, "disabled checks are not evaluated");
}

#[test]
fn test_never_rotated_never_scheduled() {
    let (mut s, _, _) = scheduler(only_scheduled(0.0));
    assert_eq!(s.should_rotate(), RotationDecision::none());
}

#[test]
fn test_get_status_does_not_consume_manual() {
    let (mut s, _, _) = scheduler(SchedulerSettings::default());
    s.trigger_manual_rotation();

    let status = s.get_status();
    assert!(status.manual_trigger_pending);
    assert!(s.manual_trigger_pending());
    assert_eq!(s.should_rotate().trigger, RotationTrigger::Manual);
}

#[test]
fn test_status_reports_next_scheduled_rotation() {
    let (mut s, _, _) = scheduler(only_scheduled(12.0));
    let t = Utc::now();
    s.notify_rotation_complete_at(RotationTrigger::Manual, true, t);

    let status = s.get_status_at(t + Duration::hours(1));
    assert_eq!(status.last_rotation, Some(t));
    assert_eq!(status.next_scheduled_rotation, Some(t + Duration::hours(12)));
    assert!(!status.scheduled_due);

    s.configure(None, None, Some(false), None);
    assert!(s.get_status().next_scheduled_rotation.is_none());
}

#[test]
fn test_configure_partial_update() {
    let (mut s, token, _) = scheduler(SchedulerSettings::default());
    token.set(true);
    s.configure(Some(false), None, None, Some(6.0));

    assert!(!s.settings().enable_token_check);
    assert!(s.settings().enable_rate_limit_check);
    assert_eq!(s.settings().scheduled_interval_hours, 6.0);
    assert_eq!(s.should_rotate(), RotationDecision::none());
}
