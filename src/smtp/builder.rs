/*
 * Copyright Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::time::Duration;

use tokio::net::TcpStream;

use super::{stream::SmtpStream, tls::build_tls_connector, AssertReply, Error, SmtpClient, SmtpClientBuilder};

impl SmtpClientBuilder {
    pub fn new(hostname: impl AsRef<str>, port: u16) -> Self {
        let hostname = hostname.as_ref();
        SmtpClientBuilder {
            addr: format!("{}:{}", hostname, port),
            timeout: Duration::from_secs(10),
            tls_connector: build_tls_connector(false),
            tls_hostname: hostname.to_string(),
            local_host: gethostname::gethostname()
                .to_str()
                .unwrap_or("[127.0.0.1]")
                .to_string(),
        }
    }

    /// Allow invalid TLS certificates
    pub fn allow_invalid_certs(mut self, allow_invalid_certs: bool) -> Self {
        self.tls_connector = build_tls_connector(allow_invalid_certs);
        self
    }

    /// Set the EHLO hostname
    pub fn helo_host(mut self, host: impl Into<String>) -> Self {
        self.local_host = host.into();
        self
    }

    /// Sets the SMTP connection timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Connect over implicit TLS (SMTPS) and read the server greeting.
    pub async fn connect_tls(&self) -> super::Result<SmtpClient> {
        tokio::time::timeout(self.timeout, async {
            let mut client = self.client(TcpStream::connect(&self.addr).await?);
            client.into_tls().await?;

            // Read greeting
            client.read().await?.assert_positive_completion()?;

            Ok(client)
        })
        .await
        .map_err(|_| Error::Timeout)?
    }

    /// Connect over clear text and read the server greeting.
    pub async fn connect_plain(&self) -> super::Result<SmtpClient> {
        tokio::time::timeout(self.timeout, async {
            let mut client = self.client(TcpStream::connect(&self.addr).await?);

            // Read greeting
            client.read().await?.assert_positive_completion()?;

            Ok(client)
        })
        .await
        .map_err(|_| Error::Timeout)?
    }

    fn client(&self, stream: TcpStream) -> SmtpClient {
        log::debug!("Connected to {}", self.addr);
        SmtpClient {
            stream: SmtpStream::Basic(stream),
            timeout: self.timeout,
            capabilities: None,
            tls_connector: self.tls_connector.clone(),
            tls_hostname: self.tls_hostname.clone(),
            local_host: self.local_host.clone(),
        }
    }
}
