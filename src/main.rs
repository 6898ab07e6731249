/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use mail_relay::{ConnectionConfig, Mailer, Message};

#[derive(Parser, Debug)]
#[command(name = "mail-relay", about = "Send an email via custom SMTP server")]
struct Cli {
    /// SMTP server hostname or IP
    #[arg(long)]
    smtp_server: String,

    /// SMTP server port
    #[arg(long, default_value_t = 587)]
    smtp_port: u16,

    /// SMTP username (optional)
    #[arg(long)]
    username: Option<String>,

    /// SMTP password (optional)
    #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// From email address
    #[arg(long = "from")]
    sender: Option<String>,

    /// Recipient(s) (comma separated)
    #[arg(long)]
    to: String,

    /// Email subject
    #[arg(long, default_value = "")]
    subject: String,

    /// Email body
    #[arg(long, default_value = "")]
    body: String,

    /// Send body as HTML
    #[arg(long)]
    html: bool,

    /// Use SMTPS (SSL) instead of STARTTLS
    #[arg(long)]
    use_ssl: bool,

    /// Disable STARTTLS
    #[arg(long)]
    no_tls: bool,

    /// Path to attachment (can be repeated)
    #[arg(long = "attach", value_name = "PATH")]
    attachments: Vec<PathBuf>,

    /// Connection timeout in seconds
    #[arg(long, default_value_t = 10.0)]
    timeout: f64,

    /// Accept invalid TLS certificates
    #[arg(long)]
    insecure: bool,

    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbosity: u8,
}

impl Cli {
    fn config(&self) -> Result<ConnectionConfig> {
        let timeout = Duration::try_from_secs_f64(self.timeout)
            .with_context(|| format!("invalid timeout: {}", self.timeout))?;
        let mut config = ConnectionConfig::new(&self.smtp_server)
            .port(self.smtp_port)
            .use_ssl(self.use_ssl)
            .use_tls(!self.no_tls)
            .timeout(timeout)
            .allow_invalid_certs(self.insecure);
        config.username = self.username.clone();
        config.password = self.password.clone();
        config.sender_address = self.sender.clone();
        Ok(config)
    }

    fn message(&self) -> Message {
        self.attachments.iter().fold(
            Message::new(self.to.as_str())
                .subject(&self.subject)
                .body(&self.body)
                .html(self.html),
            |message, path| message.attach(path),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .parse_default_env()
        .init();

    let mailer = Mailer::new(cli.config()?);
    mailer
        .send(cli.message())
        .await
        .with_context(|| format!("failed to send message via {}", cli.smtp_server))?;

    log::info!("Message sent to {}", cli.to);
    Ok(())
}
