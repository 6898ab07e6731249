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

use std::path::{Path, PathBuf};

use mail_builder::{headers::address::Address, MessageBuilder};

use crate::{mime::mime_type_or_default, smtp::Envelope, Error};

/// Message recipients, either as separate addresses or a comma separated string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    List(Vec<String>),
    Delimited(String),
}

/// An e-mail message to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub from: Option<String>,
    pub to: Recipients,
    pub subject: String,
    pub body: String,
    pub html: bool,
    pub attachments: Vec<PathBuf>,
}

/// An address with an optional display name, as in `John Doe <john@example.com>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub name: Option<String>,
    pub email: String,
}

/// A file read into memory, ready to be attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Splits on commas outside quoted display names and angle brackets.
fn split_addresses(value: &str) -> impl Iterator<Item = String> + '_ {
    let mut in_quotes = false;
    let mut in_angle = false;
    value
        .split(move |ch: char| {
            match ch {
                '"' => in_quotes = !in_quotes,
                '<' if !in_quotes => in_angle = true,
                '>' if !in_quotes => in_angle = false,
                ',' => return !in_quotes && !in_angle,
                _ => (),
            }
            false
        })
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(str::to_string)
}

impl Mailbox {
    /// Parses `addr`, `Name <addr>` or `"Name" <addr>`.
    pub fn parse(value: &str) -> Mailbox {
        let value = value.trim();
        if let Some((name, rest)) = value.rsplit_once('<') {
            if let Some(email) = rest.strip_suffix('>') {
                let name = name.trim().trim_matches('"').trim();
                return Mailbox {
                    name: (!name.is_empty()).then(|| name.to_string()),
                    email: email.trim().to_string(),
                };
            }
        }
        Mailbox {
            name: None,
            email: value.to_string(),
        }
    }

    fn to_address(&self) -> Address<'_> {
        Address::new_address(self.name.as_deref(), self.email.as_str())
    }
}

impl Recipients {
    /// Splits on commas, trims and drops empty entries. Order and duplicates
    /// are kept.
    pub fn normalize(&self) -> Vec<String> {
        match self {
            Recipients::List(list) => list.iter().flat_map(|addr| split_addresses(addr)).collect(),
            Recipients::Delimited(value) => split_addresses(value).collect(),
        }
    }
}

impl Default for Recipients {
    fn default() -> Self {
        Recipients::List(Vec::new())
    }
}

impl From<&str> for Recipients {
    fn from(value: &str) -> Self {
        Recipients::Delimited(value.to_string())
    }
}

impl From<String> for Recipients {
    fn from(value: String) -> Self {
        Recipients::Delimited(value)
    }
}

impl From<Vec<String>> for Recipients {
    fn from(value: Vec<String>) -> Self {
        Recipients::List(value)
    }
}

impl From<Vec<&str>> for Recipients {
    fn from(value: Vec<&str>) -> Self {
        Recipients::List(value.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for Recipients {
    fn from(value: &[&str]) -> Self {
        Recipients::List(value.iter().map(|addr| addr.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Recipients {
    fn from(value: [&str; N]) -> Self {
        Recipients::List(value.iter().map(|addr| addr.to_string()).collect())
    }
}

impl Message {
    /// Create a new message
    pub fn new(to: impl Into<Recipients>) -> Self {
        Message {
            from: None,
            to: to.into(),
            subject: String::new(),
            body: String::new(),
            html: false,
            attachments: Vec::new(),
        }
    }

    /// Set the sender, overriding the configured one.
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Send the body as `text/html` instead of `text/plain`.
    pub fn html(mut self, html: bool) -> Self {
        self.html = html;
        self
    }

    /// Add a file attachment.
    pub fn attach(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachments.push(path.into());
        self
    }

    /// Reads all attachments in order, failing on the first missing file.
    pub async fn load_attachments(&self) -> crate::Result<Vec<Attachment>> {
        let mut attachments = Vec::with_capacity(self.attachments.len());
        for path in &self.attachments {
            attachments.push(Attachment::load(path).await?);
        }
        Ok(attachments)
    }

    /// Builds the RFC 5322 message and its SMTP envelope.
    ///
    /// Display names go to the From and To headers only, the envelope
    /// carries the bare addresses.
    pub fn compose(
        &self,
        sender: &str,
        recipients: &[String],
        attachments: &[Attachment],
    ) -> crate::Result<Envelope> {
        let sender = Mailbox::parse(sender);
        let recipients = recipients
            .iter()
            .map(|addr| Mailbox::parse(addr))
            .collect::<Vec<_>>();

        let mut builder = MessageBuilder::new()
            .from(sender.to_address())
            .to(Address::List(
                recipients.iter().map(Mailbox::to_address).collect(),
            ))
            .subject(self.subject.as_str());

        builder = if self.html {
            builder.html_body(self.body.as_str())
        } else {
            builder.text_body(self.body.as_str())
        };

        for attachment in attachments {
            builder = builder.attachment(
                attachment.mime_type.as_str(),
                attachment.filename.as_str(),
                attachment.bytes.as_slice(),
            );
        }

        let body = builder.write_to_vec()?;
        Ok(Envelope::new(
            sender.email,
            recipients.into_iter().map(|mailbox| mailbox.email),
            body,
        ))
    }
}

impl Attachment {
    /// Reads an attachment from disk.
    ///
    /// The path must name an existing regular file.
    pub async fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let not_found = || Error::AttachmentNotFound(path.to_path_buf());

        match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => (),
            _ => return Err(not_found()),
        }
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(not_found)?;
        let bytes = tokio::fs::read(path).await.map_err(|err| Error::Attachment {
            path: path.to_path_buf(),
            err,
        })?;

        log::debug!("Loaded attachment {:?} ({} bytes)", filename, bytes.len());

        Ok(Attachment {
            mime_type: mime_type_or_default(&filename),
            filename,
            bytes,
        })
    }
}
