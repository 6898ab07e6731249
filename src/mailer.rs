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

use std::time::Duration;

use crate::{
    message::Message,
    smtp::Envelope,
    transport::{Connector, Session, SmtpConnector},
    Error,
};

pub const DEFAULT_PORT: u16 = 587;
pub const DEFAULT_SENDER: &str = "noreply@example.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// SMTP relay connection settings.
#[derive(Clone, PartialEq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    pub use_ssl: bool,
    pub sender_address: Option<String>,
    pub timeout: Duration,
    pub allow_invalid_certs: bool,
}

/// Delivers messages through a configured SMTP relay.
#[derive(Debug, Clone)]
pub struct Mailer {
    config: ConnectionConfig,
    sender: String,
}

impl ConnectionConfig {
    /// Creates a configuration for the given relay host using port 587 and
    /// STARTTLS.
    pub fn new(host: impl Into<String>) -> Self {
        ConnectionConfig {
            host: host.into(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            use_tls: true,
            use_ssl: false,
            sender_address: None,
            timeout: DEFAULT_TIMEOUT,
            allow_invalid_certs: false,
        }
    }

    /// Sets the SMTP port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Authentication credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Username without a password; an empty password is sent.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Upgrade plain connections with STARTTLS. Ignored with [`Self::use_ssl`].
    pub fn use_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Connect with implicit TLS (SMTPS).
    pub fn use_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    /// Default From address.
    pub fn sender(mut self, address: impl Into<String>) -> Self {
        self.sender_address = Some(address.into());
        self
    }

    /// Sets the SMTP connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Allow invalid TLS certificates.
    pub fn allow_invalid_certs(mut self, allow_invalid_certs: bool) -> Self {
        self.allow_invalid_certs = allow_invalid_certs;
        self
    }

    /// The sender address, falling back to the username and then to
    /// `noreply@example.com`.
    pub fn resolved_sender(&self) -> &str {
        self.sender_address
            .as_deref()
            .filter(|addr| !addr.is_empty())
            .or_else(|| self.username.as_deref().filter(|user| !user.is_empty()))
            .unwrap_or(DEFAULT_SENDER)
    }

    /// Whether a plain connection is upgraded with STARTTLS.
    pub fn use_starttls(&self) -> bool {
        self.use_tls && !self.use_ssl
    }
}

impl Mailer {
    pub fn new(config: ConnectionConfig) -> Self {
        Mailer {
            sender: config.resolved_sender().to_string(),
            config,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Default sender address of this mailer.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Sends a message through the configured relay.
    pub async fn send(&self, message: Message) -> crate::Result<()> {
        let connector = SmtpConnector::new().allow_invalid_certs(self.config.allow_invalid_certs);
        self.send_via(&connector, message).await
    }

    /// Sends a message using the given connector.
    ///
    /// Recipients and attachments are validated before any connection is
    /// opened. The session is always closed, and errors while closing never
    /// replace the outcome of the delivery.
    pub async fn send_via<C: Connector>(&self, connector: &C, message: Message) -> crate::Result<()> {
        let recipients = message.to.normalize();
        if recipients.is_empty() {
            return Err(Error::InvalidRecipients);
        }
        let attachments = message.load_attachments().await?;
        let sender = message.from.as_deref().unwrap_or(&self.sender);
        let envelope = message.compose(sender, &recipients, &attachments)?;
        drop(attachments);

        let config = &self.config;
        log::debug!(
            "Connecting to {}:{} ({})",
            config.host,
            config.port,
            if config.use_ssl {
                "implicit TLS"
            } else if config.use_tls {
                "STARTTLS"
            } else {
                "plain text"
            }
        );
        let mut session = if config.use_ssl {
            connector
                .open_tls(&config.host, config.port, config.timeout)
                .await
        } else {
            connector
                .open_plain(&config.host, config.port, config.timeout)
                .await
        }
        .map_err(Error::Transport)?;

        let result = self.deliver(&mut session, &envelope).await;

        if let Err(err) = session.quit().await {
            log::debug!("QUIT failed, closing connection: {}", err);
            if let Err(err) = session.close().await {
                log::warn!("Failed to close SMTP connection: {}", err);
            }
        }

        result
    }

    async fn deliver<S: Session>(&self, session: &mut S, envelope: &Envelope) -> crate::Result<()> {
        if self.config.use_starttls() {
            session.ehlo().await.map_err(Error::Transport)?;
            session.start_tls().await.map_err(Error::Transport)?;
            session.ehlo().await.map_err(Error::Transport)?;
        }

        if let Some(username) = self.config.username.as_deref().filter(|user| !user.is_empty()) {
            session
                .login(username, self.config.password.as_deref().unwrap_or_default())
                .await
                .map_err(Error::Authentication)?;
        }

        session
            .send_message(envelope)
            .await
            .map_err(Error::Delivery)
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("use_tls", &self.use_tls)
            .field("use_ssl", &self.use_ssl)
            .field("sender_address", &self.sender_address)
            .field("timeout", &self.timeout)
            .field("allow_invalid_certs", &self.allow_invalid_certs)
            .finish()
    }
}

/// Sends a single message with a one-off [`Mailer`].
pub async fn send_email(config: ConnectionConfig, message: Message) -> crate::Result<()> {
    Mailer::new(config).send(message).await
}
