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

//! Seams between the [`Mailer`](crate::Mailer) and the SMTP client.
//!
//! A [`Connector`] opens sessions, a [`Session`] runs the SMTP dialogue.
//! [`SmtpConnector`] and [`SmtpClient`] are the socket-based implementations;
//! tests swap in recorders.

#![allow(async_fn_in_trait)]

use std::time::Duration;

use crate::smtp::{self, Credentials, Envelope, SmtpClient, SmtpClientBuilder};

/// Opens SMTP sessions.
pub trait Connector {
    type Session: Session;

    /// Opens a clear text connection and reads the greeting.
    async fn open_plain(&self, host: &str, port: u16, timeout: Duration)
        -> smtp::Result<Self::Session>;

    /// Opens an implicit TLS (SMTPS) connection and reads the greeting.
    async fn open_tls(&self, host: &str, port: u16, timeout: Duration)
        -> smtp::Result<Self::Session>;
}

/// An open SMTP session.
pub trait Session {
    async fn ehlo(&mut self) -> smtp::Result<()>;

    async fn start_tls(&mut self) -> smtp::Result<()>;

    async fn login(&mut self, username: &str, password: &str) -> smtp::Result<()>;

    async fn send_message(&mut self, envelope: &Envelope) -> smtp::Result<()>;

    async fn quit(&mut self) -> smtp::Result<()>;

    async fn close(&mut self) -> smtp::Result<()>;
}

/// Connects to real SMTP servers over TCP.
#[derive(Debug, Clone, Default)]
pub struct SmtpConnector {
    allow_invalid_certs: bool,
    helo_host: Option<String>,
}

impl SmtpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept any server certificate.
    pub fn allow_invalid_certs(mut self, allow_invalid_certs: bool) -> Self {
        self.allow_invalid_certs = allow_invalid_certs;
        self
    }

    /// Override the local host name sent with EHLO.
    pub fn helo_host(mut self, host: impl Into<String>) -> Self {
        self.helo_host = Some(host.into());
        self
    }

    fn builder(&self, host: &str, port: u16, timeout: Duration) -> SmtpClientBuilder {
        let builder = SmtpClientBuilder::new(host, port)
            .timeout(timeout)
            .allow_invalid_certs(self.allow_invalid_certs);
        match &self.helo_host {
            Some(helo_host) => builder.helo_host(helo_host.as_str()),
            None => builder,
        }
    }
}

impl Connector for SmtpConnector {
    type Session = SmtpClient;

    async fn open_plain(&self, host: &str, port: u16, timeout: Duration) -> smtp::Result<SmtpClient> {
        self.builder(host, port, timeout).connect_plain().await
    }

    async fn open_tls(&self, host: &str, port: u16, timeout: Duration) -> smtp::Result<SmtpClient> {
        self.builder(host, port, timeout).connect_tls().await
    }
}

impl Session for SmtpClient {
    async fn ehlo(&mut self) -> smtp::Result<()> {
        SmtpClient::ehlo(self).await.map(|_| ())
    }

    async fn start_tls(&mut self) -> smtp::Result<()> {
        SmtpClient::start_tls(self).await
    }

    async fn login(&mut self, username: &str, password: &str) -> smtp::Result<()> {
        self.authenticate(&Credentials::new(username, password)).await
    }

    async fn send_message(&mut self, envelope: &Envelope) -> smtp::Result<()> {
        // Servers expect a greeting before MAIL FROM
        if self.capabilities.is_none() {
            self.ehlo_or_helo().await?;
        }
        self.send(envelope).await
    }

    async fn quit(&mut self) -> smtp::Result<()> {
        SmtpClient::quit(self).await
    }

    async fn close(&mut self) -> smtp::Result<()> {
        SmtpClient::close(self).await
    }
}
