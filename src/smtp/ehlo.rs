/*
 * Copyright Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use smtp_proto::{
    response::parser::{ResponseReceiver, MAX_RESPONSE_LENGTH as MAX_REPONSE_LENGTH},
    EhloResponse,
};

use super::{AssertReply, Error, SmtpClient};

impl SmtpClient {
    /// Sends a EHLO command to the server and stores the advertised capabilities.
    pub async fn ehlo(&mut self) -> super::Result<&EhloResponse<String>> {
        let cmd = format!("EHLO {}\r\n", self.local_host);
        log::trace!("C: {}", cmd.trim_end());
        let capabilities = tokio::time::timeout(self.timeout, async {
            self.stream.write_all(cmd.as_bytes()).await?;
            self.stream.flush().await?;
            self.read_ehlo().await
        })
        .await
        .map_err(|_| Error::Timeout)??;

        Ok(&*self.capabilities.insert(capabilities))
    }

    /// Sends a HELO command. The session carries no extensions afterwards.
    pub async fn helo(&mut self) -> super::Result<()> {
        let reply = self
            .cmd(format!("HELO {}\r\n", self.local_host).as_bytes())
            .await?;
        if !reply.is_positive_completion() {
            return Err(Error::UnexpectedReply(reply));
        }
        let hostname = reply
            .message
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        self.capabilities = Some(EhloResponse::new(hostname));
        Ok(())
    }

    /// Greets the server with EHLO, or with HELO if EHLO is refused.
    pub async fn ehlo_or_helo(&mut self) -> super::Result<()> {
        match self.ehlo().await.map(|_| ()) {
            Ok(()) => Ok(()),
            Err(Error::UnexpectedReply(reply)) if (500..=599).contains(&reply.code) => {
                log::debug!("EHLO refused with {}, trying HELO", reply.code);
                self.helo().await
            }
            Err(err) => Err(err),
        }
    }

    pub(crate) async fn read_ehlo(&mut self) -> super::Result<EhloResponse<String>> {
        let mut buf = vec![0u8; 1024];
        let mut pending = Vec::with_capacity(0);

        loop {
            let br = self.stream.read(&mut buf).await?;

            if br == 0 {
                return Err(Error::UnparseableReply);
            } else if br + pending.len() >= MAX_REPONSE_LENGTH {
                return Err(Error::UnparseableReply);
            }
            pending.extend_from_slice(&buf[..br]);
            let mut iter = pending.iter();

            match EhloResponse::parse(&mut iter) {
                Ok(reply) => return Ok(reply),
                Err(err) => match err {
                    smtp_proto::Error::NeedsMoreData { .. } => (),
                    smtp_proto::Error::InvalidResponse { code } => {
                        match ResponseReceiver::from_code(code).parse(&mut iter) {
                            Ok(response) => {
                                return Err(Error::UnexpectedReply(response));
                            }
                            Err(smtp_proto::Error::NeedsMoreData { .. }) => (),
                            Err(_) => return Err(Error::UnparseableReply),
                        }
                    }
                    _ => {
                        return Err(Error::UnparseableReply);
                    }
                },
            }
        }
    }
}
