/*
 * Copyright Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use super::{AssertReply, Error, SmtpClient};

/// A message ready for SMTP transmission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub mail_from: String,
    pub rcpt_to: Vec<String>,
    pub body: Vec<u8>,
}

impl Envelope {
    /// Create a new envelope
    pub fn new<T>(
        from: impl Into<String>,
        to: impl IntoIterator<Item = T>,
        body: impl Into<Vec<u8>>,
    ) -> Self
    where
        T: Into<String>,
    {
        Envelope {
            mail_from: from.into(),
            rcpt_to: to.into_iter().map(Into::into).collect(),
            body: body.into(),
        }
    }
}

impl SmtpClient {
    /// Sends a MAIL FROM command to the server.
    pub async fn mail_from(&mut self, addr: &str) -> super::Result<()> {
        self.cmd(format!("MAIL FROM:<{}>\r\n", addr).as_bytes())
            .await?
            .assert_positive_completion()
    }

    /// Sends a RCPT TO command to the server.
    pub async fn rcpt_to(&mut self, addr: &str) -> super::Result<()> {
        self.cmd(format!("RCPT TO:<{}>\r\n", addr).as_bytes())
            .await?
            .assert_positive_completion()
    }

    /// Sends a DATA command to the server.
    pub async fn data(&mut self, message: impl AsRef<[u8]>) -> super::Result<()> {
        self.cmd(b"DATA\r\n").await?.assert_code(354)?;
        tokio::time::timeout(self.timeout, async {
            // Write message
            self.stream.write_message(message.as_ref()).await?;
            self.read().await
        })
        .await
        .map_err(|_| Error::Timeout)??
        .assert_positive_completion()
    }

    /// Transmits an envelope: MAIL FROM, one RCPT TO per recipient, then DATA.
    pub async fn send(&mut self, envelope: &Envelope) -> super::Result<()> {
        self.mail_from(&envelope.mail_from).await?;
        for rcpt in &envelope.rcpt_to {
            self.rcpt_to(rcpt).await?;
        }
        self.data(&envelope.body).await?;
        log::debug!(
            "Delivered {} bytes to {} recipient(s)",
            envelope.body.len(),
            envelope.rcpt_to.len()
        );
        Ok(())
    }

    /// Sends a QUIT command to the server and closes the connection.
    pub async fn quit(&mut self) -> super::Result<()> {
        let result = self.cmd(b"QUIT\r\n").await?.assert_positive_completion();
        self.stream.shutdown().await?;
        result
    }

    /// Drops the connection without saying goodbye.
    pub async fn close(&mut self) -> super::Result<()> {
        self.capabilities = None;
        self.stream.shutdown().await.map_err(Into::into)
    }
}
