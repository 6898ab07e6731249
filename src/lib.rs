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

//! # mail-relay
//!
//! _mail-relay_ builds an e-mail message and hands it to an SMTP relay. It includes the following features:
//!
//! - Plain text or HTML bodies and any number of file **attachments**, with the MIME type guessed from the file extension.
//! - Simple Mail Transfer Protocol (**SMTP**; _RFC 5321_) delivery.
//! - Implicit TLS (**SMTPS**) or opportunistic upgrade with **STARTTLS** (_RFC 3207_).
//! - SMTP Service Extension for Authentication (_RFC 4954_) using PLAIN or LOGIN.
//! - Full async (requires Tokio).
//!
//! ## Usage Example
//!
//! Send a message with an attachment through a relay that requires authentication:
//!
//! ```rust
//!     let mailer = Mailer::new(
//!         ConnectionConfig::new("smtp.example.com")
//!             .port(587)
//!             .credentials("john", "p4ssw0rd")
//!             .sender("john@example.com"),
//!     );
//!
//!     mailer
//!         .send(
//!             Message::new("jane@example.com, james@test.com")
//!                 .subject("Hi!")
//!                 .body("<h1>Hello, world!</h1>")
//!                 .html(true)
//!                 .attach("./pretzels.png"),
//!         )
//!         .await
//!         .unwrap();
//! ```
//!
//! Connect over SMTPS without authentication:
//!
//! ```rust
//!     send_email(
//!         ConnectionConfig::new("smtp.example.com").port(465).use_ssl(true),
//!         Message::new(vec!["jane@example.com"]).subject("Hi!").body("Hello world!"),
//!     )
//!     .await
//!     .unwrap();
//! ```
//!
//! Recipients and attachments are validated before a connection is opened, and exactly
//! one delivery attempt is made per call.
//!
//! ## License
//!
//! Licensed under either of
//!
//!  * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//!  * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.
//!

pub mod mailer;
pub mod message;
pub mod mime;
pub mod smtp;
pub mod transport;

use std::{fmt::Display, path::PathBuf};

pub use mail_builder;
pub use mailer::{send_email, ConnectionConfig, Mailer};
pub use message::{Attachment, Message, Recipients};
pub use transport::{Connector, Session, SmtpConnector};

#[derive(Debug)]
pub enum Error {
    /// No recipient left after normalization.
    InvalidRecipients,

    /// Attachment path is not an existing regular file.
    AttachmentNotFound(PathBuf),

    /// Attachment could not be read.
    Attachment { path: PathBuf, err: std::io::Error },

    /// Failure writing the MIME message.
    Io(std::io::Error),

    /// Connection, greeting, EHLO or STARTTLS failure.
    Transport(smtp::Error),

    /// The server rejected the credentials.
    Authentication(smtp::Error),

    /// The server rejected the message.
    Delivery(smtp::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidRecipients => write!(f, "No recipients provided"),
            Error::AttachmentNotFound(path) => {
                write!(f, "Attachment not found: {}", path.display())
            }
            Error::Attachment { path, err } => {
                write!(f, "Failed to read attachment {}: {}", path.display(), err)
            }
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Transport(e) => write!(f, "SMTP connection error: {}", e),
            Error::Authentication(e) => write!(f, "SMTP authentication error: {}", e),
            Error::Delivery(e) => write!(f, "SMTP delivery error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Attachment { err, .. } => Some(err),
            Error::Io(e) => Some(e),
            Error::Transport(e) | Error::Authentication(e) | Error::Delivery(e) => Some(e),
            Error::InvalidRecipients | Error::AttachmentNotFound(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
