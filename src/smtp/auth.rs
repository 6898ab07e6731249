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

use std::{borrow::Cow, fmt::Display};

use base64::{engine::general_purpose, Engine};
use smtp_proto::{AUTH_LOGIN, AUTH_PLAIN};

use super::{Error, SmtpClient};

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials<'x> {
    username: Cow<'x, str>,
    secret: Cow<'x, str>,
}

/// Authentication mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    Plain,
    Login,
}

impl<'x> Credentials<'x> {
    /// Creates a new `Credentials` instance.
    pub fn new(
        username: impl Into<Cow<'x, str>>,
        secret: impl Into<Cow<'x, str>>,
    ) -> Credentials<'x> {
        Credentials {
            username: username.into(),
            secret: secret.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn encode(&self, mechanism: Mechanism, challenge: &str) -> super::Result<String> {
        Ok(general_purpose::STANDARD.encode(match mechanism {
            Mechanism::Plain => format!("\u{0}{}\u{0}{}", self.username, self.secret),

            Mechanism::Login => {
                let challenge = general_purpose::STANDARD.decode(challenge)?;

                if b"user name".eq_ignore_ascii_case(challenge.get(0..9).unwrap_or_default())
                    || b"username".eq_ignore_ascii_case(
                        // Because Google makes its own standards
                        challenge.get(0..8).unwrap_or_default(),
                    )
                {
                    &self.username
                } else if b"password".eq_ignore_ascii_case(challenge.get(0..8).unwrap_or_default())
                {
                    &self.secret
                } else {
                    return Err(Error::UnparseableReply);
                }
                .to_string()
            }
        }))
    }
}

impl std::fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"***")
            .finish()
    }
}

impl Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mechanism::Plain => write!(f, "PLAIN"),
            Mechanism::Login => write!(f, "LOGIN"),
        }
    }
}

impl Mechanism {
    /// Picks the preferred mechanism out of the advertised ones.
    pub fn select(advertised: u64) -> Option<Mechanism> {
        if advertised & AUTH_PLAIN != 0 {
            Some(Mechanism::Plain)
        } else if advertised & AUTH_LOGIN != 0 {
            Some(Mechanism::Login)
        } else {
            None
        }
    }
}

impl SmtpClient {
    /// Authenticates with the server using the best mechanism it supports.
    pub async fn authenticate(&mut self, credentials: &Credentials<'_>) -> super::Result<()> {
        if self.capabilities.is_none() {
            self.ehlo_or_helo().await?;
        }
        let mechanism = self
            .capabilities
            .as_ref()
            .and_then(|caps| Mechanism::select(caps.auth_mechanisms))
            .ok_or(Error::UnsupportedAuthMechanism)?;
        log::debug!(
            "Authenticating as {:?} using {}",
            credentials.username(),
            mechanism
        );

        let mut reply = match mechanism {
            Mechanism::Plain => {
                self.cmd_secret(format!("AUTH PLAIN {}\r\n", credentials.encode(mechanism, "")?))
                    .await?
            }
            Mechanism::Login => self.cmd(b"AUTH LOGIN\r\n").await?,
        };

        for _ in 0..3 {
            match reply.code {
                334 => {
                    let response = credentials.encode(mechanism, &reply.message)?;
                    reply = self.cmd_secret(format!("{response}\r\n")).await?;
                }
                235 => {
                    return Ok(());
                }
                _ => {
                    return Err(Error::AuthenticationFailed(reply));
                }
            }
        }

        Err(Error::AuthenticationFailed(reply))
    }
}
