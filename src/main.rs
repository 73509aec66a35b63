use anyhow::{Result, anyhow};
use chrono::Local;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mailwatch::auth::token_manager::TokenManager;
use mailwatch::config;
use mailwatch::mail::gmail_client::GmailClient;
use mailwatch::monitor::alerter::{ConsoleAlerter, StdinAck, default_player};
use mailwatch::monitor::{MonitorConfig, MonitorSession, run_monitor};

fn prompt_domain() -> Result<String> {
    print!("\nEnter the email domain to monitor (e.g., icloud.com, gmail.com): ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn main() -> Result<()> {
    env_logger::init();

    println!("{}", "=".repeat(70));
    println!("Gmail Email Alert Monitor");
    println!("{}", "=".repeat(70));

    let domain = prompt_domain()?;
    if domain.is_empty() {
        println!("No domain entered. Exiting.");
        return Ok(());
    }

    let cfg = config::load_config().map_err(|e| anyhow!("Configuration error: {e}"))?;
    let check_interval = Duration::from_secs(cfg.check_interval_secs());
    let retry_delay = Duration::from_secs(cfg.retry_delay_secs());

    println!("\nMonitoring emails from: @{domain}");
    println!(
        "Checking every {} minutes for NEW emails",
        check_interval.as_secs() / 60
    );
    println!("Will only alert on emails received AFTER program starts");
    println!("Press Ctrl+C anytime to quit\n");

    println!("Authenticating with Gmail...");
    let token_mgr = TokenManager::from_config(&cfg)?;
    token_mgr
        .get_access_token()
        .map_err(|e| anyhow!("Could not connect to Gmail: {e}"))?;
    println!("Successfully connected to Gmail!\n");

    let session = MonitorSession::begin(domain);
    println!(
        "Program started at: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    println!("Will only alert on emails received after this time\n");

    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })?;

    let client = GmailClient::new(token_mgr)?;
    let mut alerter = ConsoleAlerter::new(
        default_player().to_string(),
        cfg.sound_file(),
        Box::new(StdinAck::new()),
    );
    let monitor_cfg = MonitorConfig {
        check_interval,
        retry_delay,
    };

    run_monitor(&client, &mut alerter, &session, &monitor_cfg, &stop)?;

    println!("\nStopping Gmail checker. Goodbye!");
    Ok(())
}
