//! `replydesk check`: run the eligibility classifier on one message header.

use anyhow::Result;

use crate::config::Config;

pub fn run_check(
    config: &Config,
    sender: &str,
    subject: &str,
    auto_submitted: Option<&str>,
) -> Result<()> {
    let rules = config.eligibility.rules();
    match rules.check(sender, subject, auto_submitted) {
        Ok(()) => println!("eligible"),
        Err(rejection) => {
            println!("ineligible");
            println!("  reason: {}", rejection);
        }
    }
    Ok(())
}
