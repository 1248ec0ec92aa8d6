//! `check` - verify the configured login against the server.

use anyhow::{bail, Result};

use crate::auth::{AuthProbe, HttpAuthClient, LoginStatus};
use crate::config::Config;

/// Print the login status; fails when the server rejects the credentials.
pub async fn run(config: &Config) -> Result<()> {
    let probe = HttpAuthClient::new(&config.server_url, config.token().map(String::from))?;
    println!("Checking login at {}...", config.server_url);
    match probe.check_login().await {
        LoginStatus::Valid => {
            println!("Login OK.");
            Ok(())
        }
        LoginStatus::Expired(reason) => {
            if reason.is_empty() {
                bail!("Login expired or invalid. Set SMARTDNS_TOKEN or update the config file.");
            }
            bail!("Login expired or invalid: {reason}");
        }
        LoginStatus::Unknown(reason) => {
            println!("Could not verify login: {reason}");
            Ok(())
        }
    }
}
