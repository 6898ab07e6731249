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

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

#[allow(clippy::large_enum_variant)]
#[doc(hidden)]
#[derive(Default)]
pub enum SmtpStream {
    Basic(TcpStream),
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
    #[cfg(test)]
    Debug(Vec<u8>),
    #[default]
    None,
}

fn not_connected() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotConnected, "SMTP stream is closed")
}

impl SmtpStream {
    pub fn is_tls(&self) -> bool {
        matches!(self, SmtpStream::Tls(_))
    }

    pub(crate) async fn read(&mut self, buf: &mut [u8]) -> tokio::io::Result<usize> {
        match self {
            SmtpStream::Basic(stream) => stream.read(buf).await,
            SmtpStream::Tls(stream) => stream.read(buf).await,
            #[cfg(test)]
            SmtpStream::Debug(_) => Ok(0),
            SmtpStream::None => Err(not_connected()),
        }
    }

    pub(crate) async fn write_all(&mut self, bytes: &[u8]) -> tokio::io::Result<()> {
        match self {
            SmtpStream::Basic(stream) => stream.write_all(bytes).await,
            SmtpStream::Tls(stream) => stream.write_all(bytes).await,
            #[cfg(test)]
            SmtpStream::Debug(stream) => {
                stream.extend_from_slice(bytes);
                Ok(())
            }
            SmtpStream::None => Err(not_connected()),
        }
    }

    pub(crate) async fn flush(&mut self) -> tokio::io::Result<()> {
        match self {
            SmtpStream::Basic(stream) => stream.flush().await,
            SmtpStream::Tls(stream) => stream.flush().await,
            #[cfg(test)]
            SmtpStream::Debug(_) => Ok(()),
            SmtpStream::None => Err(not_connected()),
        }
    }

    /// Shuts down the write half and drops the connection.
    pub(crate) async fn shutdown(&mut self) -> tokio::io::Result<()> {
        match std::mem::take(self) {
            SmtpStream::Basic(mut stream) => stream.shutdown().await,
            SmtpStream::Tls(mut stream) => stream.shutdown().await,
            #[cfg(test)]
            SmtpStream::Debug(_) => Ok(()),
            SmtpStream::None => Ok(()),
        }
    }

    pub(crate) async fn write_message(&mut self, message: &[u8]) -> tokio::io::Result<()> {
        // Transparency procedure
        #[derive(Debug)]
        enum State {
            Cr,
            CrLf,
            Init,
        }

        let mut state = State::CrLf;
        let mut last_pos = 0;
        for (pos, byte) in message.iter().enumerate() {
            if *byte == b'.' && matches!(state, State::CrLf) {
                if let Some(bytes) = message.get(last_pos..pos) {
                    self.write_all(bytes).await?;
                    self.write_all(b".").await?;
                    last_pos = pos;
                }
                state = State::Init;
            } else if *byte == b'\r' {
                state = State::Cr;
            } else if *byte == b'\n' && matches!(state, State::Cr) {
                state = State::CrLf;
            } else {
                state = State::Init;
            }
        }
        if let Some(bytes) = message.get(last_pos..) {
            self.write_all(bytes).await?;
        }
        if message.ends_with(b"\r\n") {
            self.write_all(b".\r\n").await?;
        } else {
            self.write_all(b"\r\n.\r\n").await?;
        }
        self.flush().await
    }
}
