use anyhow::Result;
use notify_rust::Notification;
use std::io::BufRead;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::domain::email::EmailSummary;

pub const SUBJECT_DISPLAY_LIMIT: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    /// Operator acknowledged the alarm; monitoring resumes.
    Resumed,
    /// Operator asked to quit while the alarm was ringing.
    Shutdown,
}

/// Raised for every cycle that found new mail. Blocks until acknowledged.
pub trait Alert {
    fn alert(&mut self, emails: &[EmailSummary], stop: &AtomicBool) -> Result<AlertOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Acknowledged,
    Interrupted,
}

/// Cancellable wait for the "stop alarm" acknowledgment, so front ends other
/// than an interactive console can supply their own signal.
pub trait AckSource {
    fn wait(&self, stop: &AtomicBool) -> AckOutcome;
}

/// Default acknowledgment source: a helper thread feeds stdin lines into a
/// channel, and the wait polls the channel while watching the stop flag.
pub struct StdinAck {
    rx: Receiver<()>,
}

impl StdinAck {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.lock().read_line(&mut line) {
                    Ok(0) => break, // EOF
                    Ok(_) => {
                        if tx.send(()).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });
        Self { rx }
    }
}

impl Default for StdinAck {
    fn default() -> Self {
        Self::new()
    }
}

impl AckSource for StdinAck {
    fn wait(&self, stop: &AtomicBool) -> AckOutcome {
        // Discard anything typed before the alarm started.
        while self.rx.try_recv().is_ok() {}

        loop {
            if stop.load(Ordering::SeqCst) {
                return AckOutcome::Interrupted;
            }
            match self.rx.recv_timeout(Duration::from_millis(200)) {
                Ok(()) => return AckOutcome::Acknowledged,
                Err(RecvTimeoutError::Timeout) => continue,
                // stdin closed; no acknowledgment can ever arrive
                Err(RecvTimeoutError::Disconnected) => return AckOutcome::Interrupted,
            }
        }
    }
}

/// Handle on the looping sound-playback child. The child must not outlive the
/// blocking wait, so `stop` kills it and `Drop` is the backstop.
struct AlarmSound {
    child: Child,
}

impl AlarmSound {
    fn spawn(player: &str, sound_file: &str) -> Result<Self> {
        let script = format!("while true; do {player} \"{sound_file}\"; sleep 0.5; done");
        let child = Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(Self { child })
    }

    fn stop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for AlarmSound {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(target_os = "macos")]
pub fn default_player() -> &'static str {
    "afplay"
}

#[cfg(not(target_os = "macos"))]
pub fn default_player() -> &'static str {
    "paplay"
}

#[cfg(target_os = "macos")]
const SPEECH_CANDIDATES: [&str; 1] = ["say"];

#[cfg(not(target_os = "macos"))]
const SPEECH_CANDIDATES: [&str; 3] = ["spd-say", "espeak", "say"];

/// Truncate for display, with an ellipsis only when the subject is actually
/// longer than the limit.
pub fn truncate_subject(subject: &str, limit: usize) -> String {
    if subject.chars().count() > limit {
        let mut out: String = subject.chars().take(limit).collect();
        out.push_str("...");
        out
    } else {
        subject.to_string()
    }
}

pub struct ConsoleAlerter {
    player: String,
    sound_file: String,
    ack: Box<dyn AckSource>,
}

impl ConsoleAlerter {
    pub fn new(player: String, sound_file: String, ack: Box<dyn AckSource>) -> Self {
        Self {
            player,
            sound_file,
            ack,
        }
    }

    fn render(&self, emails: &[EmailSummary]) {
        println!("\n{}", "=".repeat(70));
        println!("NEW EMAIL DETECTED!");
        println!("{}\n", "=".repeat(70));
        println!("Found {} NEW email(s):\n", emails.len());
        for (i, email) in emails.iter().enumerate() {
            println!("  {}. From: {}", i + 1, email.from);
            println!(
                "     Subject: {}",
                truncate_subject(&email.subject, SUBJECT_DISPLAY_LIMIT)
            );
            println!("     Received: {}", email.date);
            println!();
        }
    }

    fn notify_desktop(&self, emails: &[EmailSummary]) {
        let first = &emails[0];
        let result = Notification::new()
            .summary(&format!("{} new email(s)", emails.len()))
            .body(&format!(
                "{} — {}",
                first.from,
                truncate_subject(&first.subject, SUBJECT_DISPLAY_LIMIT)
            ))
            .show();
        if let Err(e) = result {
            log::warn!("desktop notification failed: {e}");
        }
    }

    fn speak(&self, phrase: &str) {
        for cmd in SPEECH_CANDIDATES {
            match Command::new(cmd)
                .arg(phrase)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
            {
                Ok(_) => return,
                Err(_) => continue,
            }
        }
        log::debug!("no speech synthesis command available");
    }
}

impl Alert for ConsoleAlerter {
    fn alert(&mut self, emails: &[EmailSummary], stop: &AtomicBool) -> Result<AlertOutcome> {
        self.render(emails);
        self.notify_desktop(emails);
        self.speak("Alert! You have new email");

        println!("ALARM IS PLAYING!");
        println!("\nOptions:");
        println!("  - Press ENTER to stop alarm and continue monitoring");
        println!("  - Press Ctrl+C to stop alarm and quit program\n");

        let mut sound = match AlarmSound::spawn(&self.player, &self.sound_file) {
            Ok(s) => Some(s),
            Err(e) => {
                log::warn!("could not start alarm sound: {e}");
                None
            }
        };

        let outcome = self.ack.wait(stop);

        if let Some(s) = &mut sound {
            s.stop();
        }

        match outcome {
            AckOutcome::Acknowledged => Ok(AlertOutcome::Resumed),
            AckOutcome::Interrupted => Ok(AlertOutcome::Shutdown),
        }
    }
}
