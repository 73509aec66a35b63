pub mod alerter;

use anyhow::Result;
use chrono::Local;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::mail::gmail_client::MailQuery;
use crate::monitor::alerter::{Alert, AlertOutcome};

/// One monitoring run: the domain being watched and the cutoff for "new".
/// Created once at startup and immutable for the process lifetime.
pub struct MonitorSession {
    pub domain: String,
    pub start_timestamp: i64,
}

impl MonitorSession {
    pub fn begin(domain: String) -> Self {
        let start_timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self {
            domain,
            start_timestamp,
        }
    }
}

pub struct MonitorConfig {
    /// Period between checks.
    pub check_interval: Duration,
    /// Shorter delay after a failed cycle.
    pub retry_delay: Duration,
}

/// The poll loop. Queries on a fixed period, alerts synchronously on matches,
/// logs and retries on transient errors, and exits when the stop flag is
/// raised or the alerter reports shutdown.
pub fn run_monitor(
    mail: &dyn MailQuery,
    alerter: &mut dyn Alert,
    session: &MonitorSession,
    cfg: &MonitorConfig,
    stop: &AtomicBool,
) -> Result<()> {
    while !stop.load(Ordering::SeqCst) {
        let now = Local::now().format("%Y-%m-%d %H:%M:%S");
        println!(
            "[{now}] Checking for new emails from @{}...",
            session.domain
        );

        match mail.check_new(&session.domain, session.start_timestamp) {
            Ok(emails) if emails.is_empty() => {
                println!("   No new emails from @{}\n", session.domain);
            }
            Ok(emails) => match alerter.alert(&emails, stop)? {
                AlertOutcome::Resumed => {
                    println!("Alarm stopped. Continuing to monitor...\n");
                }
                AlertOutcome::Shutdown => return Ok(()),
            },
            Err(e) => {
                eprintln!("Error checking emails: {e}");
                println!("   Retrying in {} seconds...\n", cfg.retry_delay.as_secs());
                if !sleep_interruptible(cfg.retry_delay, stop) {
                    break;
                }
                continue;
            }
        }

        println!(
            "   Next check in {} minutes...\n",
            cfg.check_interval.as_secs() / 60
        );
        if !sleep_interruptible(cfg.check_interval, stop) {
            break;
        }
    }

    Ok(())
}

/// Sleep in short slices so the stop flag is observed promptly.
/// Returns false when the sleep was cut short by an interruption.
fn sleep_interruptible(total: Duration, stop: &AtomicBool) -> bool {
    let slice = Duration::from_millis(250);
    let deadline = Instant::now() + total;
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        thread::sleep(remaining.min(slice));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::email::EmailSummary;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Serves a script of responses, raising the stop flag once exhausted so
    /// the loop winds down on its own.
    struct ScriptedMail {
        script: RefCell<VecDeque<Result<Vec<EmailSummary>>>>,
        stop: Arc<AtomicBool>,
    }

    impl ScriptedMail {
        fn new(script: Vec<Result<Vec<EmailSummary>>>, stop: Arc<AtomicBool>) -> Self {
            Self {
                script: RefCell::new(script.into()),
                stop,
            }
        }

        fn remaining(&self) -> usize {
            self.script.borrow().len()
        }
    }

    impl MailQuery for ScriptedMail {
        fn check_new(&self, _domain: &str, _after_epoch: i64) -> Result<Vec<EmailSummary>> {
            let mut script = self.script.borrow_mut();
            let item = script.pop_front().unwrap_or_else(|| Ok(vec![]));
            if script.is_empty() {
                self.stop.store(true, Ordering::SeqCst);
            }
            item
        }
    }

    struct RecordingAlerter {
        calls: Vec<Vec<EmailSummary>>,
        outcome: AlertOutcome,
    }

    impl RecordingAlerter {
        fn new(outcome: AlertOutcome) -> Self {
            Self {
                calls: Vec::new(),
                outcome,
            }
        }
    }

    impl Alert for RecordingAlerter {
        fn alert(&mut self, emails: &[EmailSummary], _stop: &AtomicBool) -> Result<AlertOutcome> {
            self.calls.push(emails.to_vec());
            Ok(self.outcome)
        }
    }

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            check_interval: Duration::from_millis(1),
            retry_delay: Duration::from_millis(1),
        }
    }

    fn session() -> MonitorSession {
        MonitorSession {
            domain: "example.com".to_string(),
            start_timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn empty_cycle_never_alerts() {
        let stop = Arc::new(AtomicBool::new(false));
        let mail = ScriptedMail::new(vec![Ok(vec![])], stop.clone());
        let mut alerter = RecordingAlerter::new(AlertOutcome::Resumed);

        run_monitor(&mail, &mut alerter, &session(), &fast_config(), &stop).unwrap();

        assert!(alerter.calls.is_empty());
    }

    #[test]
    fn all_summaries_of_a_cycle_reach_the_alerter() {
        let stop = Arc::new(AtomicBool::new(false));
        let found = vec![
            EmailSummary::new("a@example.com", "first", "Mon, 1 Jan 2024 00:00:01 +0000"),
            EmailSummary::new("b@example.com", "second", "Mon, 1 Jan 2024 00:00:02 +0000"),
        ];
        let mail = ScriptedMail::new(vec![Ok(found.clone())], stop.clone());
        let mut alerter = RecordingAlerter::new(AlertOutcome::Resumed);

        run_monitor(&mail, &mut alerter, &session(), &fast_config(), &stop).unwrap();

        assert_eq!(alerter.calls.len(), 1);
        assert_eq!(alerter.calls[0], found);
    }

    #[test]
    fn query_error_does_not_terminate_the_loop() {
        let stop = Arc::new(AtomicBool::new(false));
        let mail = ScriptedMail::new(
            vec![Err(anyhow::anyhow!("boom")), Ok(vec![])],
            stop.clone(),
        );
        let mut alerter = RecordingAlerter::new(AlertOutcome::Resumed);

        run_monitor(&mail, &mut alerter, &session(), &fast_config(), &stop).unwrap();

        // both scripted cycles were consumed, so the error was survived
        assert_eq!(mail.remaining(), 0);
        assert!(alerter.calls.is_empty());
    }

    #[test]
    fn alerter_shutdown_ends_the_run_early() {
        let stop = Arc::new(AtomicBool::new(false));
        let hit = vec![EmailSummary::new("a@example.com", "s", "d")];
        let mail = ScriptedMail::new(vec![Ok(hit.clone()), Ok(hit)], stop.clone());
        let mut alerter = RecordingAlerter::new(AlertOutcome::Shutdown);

        run_monitor(&mail, &mut alerter, &session(), &fast_config(), &stop).unwrap();

        assert_eq!(alerter.calls.len(), 1);
        assert_eq!(mail.remaining(), 1);
    }

    #[test]
    fn interruption_during_sleep_exits_promptly() {
        let stop = Arc::new(AtomicBool::new(false));
        // one quiet cycle, then a long sleep the interruption must cut short
        let mail = ScriptedMail::new(vec![Ok(vec![])], Arc::new(AtomicBool::new(false)));
        let mut alerter = RecordingAlerter::new(AlertOutcome::Resumed);
        let cfg = MonitorConfig {
            check_interval: Duration::from_secs(60),
            retry_delay: Duration::from_secs(60),
        };

        let flag = stop.clone();
        let killer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
        });

        let started = Instant::now();
        run_monitor(&mail, &mut alerter, &session(), &cfg, &stop).unwrap();
        killer.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(alerter.calls.is_empty());
    }

    #[test]
    fn sleep_reports_interruption() {
        let stop = AtomicBool::new(true);
        assert!(!sleep_interruptible(Duration::from_secs(10), &stop));

        let stop = AtomicBool::new(false);
        assert!(sleep_interruptible(Duration::from_millis(1), &stop));
    }
}
