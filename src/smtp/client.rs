/*
 * Copyright Stalwart Labs Ltd.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use smtp_proto::{response::parser::ResponseReceiver, Response};

use super::{Error, SmtpClient};

impl SmtpClient {
    pub(crate) async fn read(&mut self) -> super::Result<Response<String>> {
        let mut buf = vec![0u8; 1024];
        let mut parser = ResponseReceiver::default();

        loop {
            let br = self.stream.read(&mut buf).await?;

            if br == 0 {
                return Err(Error::UnparseableReply);
            }

            match parser.parse(&mut buf[..br].iter()) {
                Ok(reply) => {
                    log::trace!("S: {} {}", reply.code, reply.message);
                    return Ok(reply);
                }
                Err(err) => match err {
                    smtp_proto::Error::NeedsMoreData { .. } => (),
                    _ => {
                        return Err(Error::UnparseableReply);
                    }
                },
            }
        }
    }

    /// Sends a command to the SMTP server and waits for a reply.
    pub async fn cmd(&mut self, cmd: impl AsRef<[u8]>) -> super::Result<Response<String>> {
        let cmd = cmd.as_ref();
        if !cmd.starts_with(b"AUTH") {
            log::trace!("C: {}", String::from_utf8_lossy(cmd).trim_end());
        }
        tokio::time::timeout(self.timeout, async {
            self.stream.write_all(cmd).await?;
            self.stream.flush().await?;
            self.read().await
        })
        .await
        .map_err(|_| Error::Timeout)?
    }

    /// Sends a command without logging its payload.
    pub(crate) async fn cmd_secret(
        &mut self,
        cmd: impl AsRef<[u8]>,
    ) -> super::Result<Response<String>> {
        log::trace!("C: <redacted>");
        tokio::time::timeout(self.timeout, async {
            self.stream.write_all(cmd.as_ref()).await?;
            self.stream.flush().await?;
            self.read().await
        })
        .await
        .map_err(|_| Error::Timeout)?
    }

    /// Returns `true` if the session runs over TLS.
    pub fn is_secure(&self) -> bool {
        self.stream.is_tls()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::{sync::Arc, time::Duration};

    use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
    use tokio::{
        io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
        net::TcpListener,
        task::JoinHandle,
    };
    use tokio_rustls::TlsAcceptor;

    use crate::smtp::{Credentials, Envelope, Error, SmtpClientBuilder};

    const GREETING: &[u8] = b"220 test.local ESMTP ready\r\n";

    /// Scripted SMTP server answering one connection.
    ///
    /// Returns the bound port and a handle yielding every line received.
    /// An empty `ehlo_lines` makes the server refuse EHLO.
    pub(crate) async fn spawn_server(
        ehlo_lines: &'static [&'static str],
        rcpt_reply: &'static str,
    ) -> (u16, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve(stream, true, ehlo_lines, rcpt_reply).await
        });
        (port, handle)
    }

    /// Scripted SMTP server behind a self-signed certificate.
    ///
    /// With `starttls` the connection starts in clear text, advertises
    /// STARTTLS and only serves `ehlo_lines` once upgraded.
    pub(crate) async fn spawn_tls_server(
        starttls: bool,
        ehlo_lines: &'static [&'static str],
        rcpt_reply: &'static str,
    ) -> (u16, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let acceptor = tls_acceptor();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            if !starttls {
                let stream = acceptor.accept(stream).await.unwrap();
                return serve(stream, true, ehlo_lines, rcpt_reply).await;
            }

            let (read, mut write) = tokio::io::split(stream);
            let mut reader = BufReader::new(read);
            let mut received = Vec::new();
            respond(&mut write, GREETING).await;
            for reply in [
                &b"250-test.local\r\n250 STARTTLS\r\n"[..],
                &b"220 2.0.0 ready to start TLS\r\n"[..],
            ] {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                received.push(line.trim_end().to_string());
                respond(&mut write, reply).await;
            }

            let stream = acceptor
                .accept(reader.into_inner().unsplit(write))
                .await
                .unwrap();
            received.extend(serve(stream, false, ehlo_lines, rcpt_reply).await);
            received
        });
        (port, handle)
    }

    fn tls_acceptor() -> TlsAcceptor {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(
                vec![CertificateDer::from(cert.serialize_der().unwrap())],
                PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.serialize_private_key_der())),
            )
            .unwrap();
        TlsAcceptor::from(Arc::new(config))
    }

    async fn respond<W: AsyncWrite + Unpin>(write: &mut W, bytes: &[u8]) {
        write.write_all(bytes).await.unwrap();
        write.flush().await.unwrap();
    }

    async fn serve<S>(
        stream: S,
        greet: bool,
        ehlo_lines: &[&str],
        rcpt_reply: &str,
    ) -> Vec<String>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (read, mut write) = tokio::io::split(stream);
        let mut reader = BufReader::new(read);
        let mut received = Vec::new();
        let mut in_data = false;
        let mut auth_login_step = 0;

        if greet {
            respond(&mut write, GREETING).await;
        }

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap() == 0 {
                break;
            }
            let line = line.trim_end_matches(['\r', '\n']).to_string();
            received.push(line.clone());

            if in_data {
                if line == "." {
                    in_data = false;
                    respond(&mut write, b"250 2.0.0 queued\r\n").await;
                }
                continue;
            }

            if auth_login_step == 1 {
                auth_login_step = 2;
                respond(&mut write, b"334 UGFzc3dvcmQ6\r\n").await;
                continue;
            } else if auth_login_step == 2 {
                auth_login_step = 0;
                respond(&mut write, b"235 2.7.0 accepted\r\n").await;
                continue;
            }

            let verb = line
                .split([' ', ':'])
                .next()
                .unwrap_or_default()
                .to_ascii_uppercase();
            let reply = match verb.as_str() {
                "EHLO" if !ehlo_lines.is_empty() => {
                    let mut reply = String::new();
                    for (pos, cap) in ehlo_lines.iter().enumerate() {
                        let sep = if pos + 1 == ehlo_lines.len() { ' ' } else { '-' };
                        reply.push_str(&format!("250{sep}{cap}\r\n"));
                    }
                    reply
                }
                "HELO" => "250 test.local\r\n".to_string(),
                "AUTH" if line.starts_with("AUTH PLAIN ") => {
                    // "\0user\0pass"
                    if line == "AUTH PLAIN AHVzZXIAcGFzcw==" {
                        "235 2.7.0 accepted\r\n".to_string()
                    } else {
                        "535 5.7.8 bad credentials\r\n".to_string()
                    }
                }
                "AUTH" => {
                    auth_login_step = 1;
                    "334 VXNlcm5hbWU6\r\n".to_string()
                }
                "MAIL" => "250 2.1.0 ok\r\n".to_string(),
                "RCPT" => format!("{rcpt_reply}\r\n"),
                "DATA" => {
                    in_data = true;
                    "354 go ahead\r\n".to_string()
                }
                "QUIT" => {
                    respond(&mut write, b"221 2.0.0 bye\r\n").await;
                    // Wait for the client to hang up
                    let mut rest = String::new();
                    let _ = reader.read_line(&mut rest).await;
                    break;
                }
                _ => "502 5.5.2 not implemented\r\n".to_string(),
            };
            respond(&mut write, reply.as_bytes()).await;
        }

        received
    }

    fn builder(port: u16) -> SmtpClientBuilder {
        SmtpClientBuilder::new("127.0.0.1", port)
            .timeout(Duration::from_secs(5))
            .helo_host("client.test")
    }

    #[tokio::test]
    async fn plain_session_with_auth_plain() {
        let (port, server) =
            spawn_server(&["test.local", "AUTH LOGIN PLAIN", "8BITMIME"], "250 2.1.5 ok").await;

        let mut client = builder(port).connect_plain().await.unwrap();
        assert!(!client.is_secure());
        client.ehlo().await.unwrap();
        client
            .authenticate(&Credentials::new("user", "pass"))
            .await
            .unwrap();
        client
            .send(&Envelope::new(
                "me@example.com",
                ["you@example.com", "them@example.com"],
                b"Subject: hi\r\n\r\n.hello\r\n".to_vec(),
            ))
            .await
            .unwrap();
        client.quit().await.unwrap();

        let received = server.await.unwrap();
        assert_eq!(
            received,
            vec![
                "EHLO client.test",
                "AUTH PLAIN AHVzZXIAcGFzcw==",
                "MAIL FROM:<me@example.com>",
                "RCPT TO:<you@example.com>",
                "RCPT TO:<them@example.com>",
                "DATA",
                "Subject: hi",
                "",
                "..hello",
                ".",
                "QUIT",
            ]
        );
    }

    #[tokio::test]
    async fn auth_login_when_plain_is_not_offered() {
        let (port, server) = spawn_server(&["test.local", "AUTH LOGIN"], "250 ok").await;

        let mut client = builder(port).connect_plain().await.unwrap();
        // Issues EHLO on its own when capabilities are unknown
        client
            .authenticate(&Credentials::new("user", "pass"))
            .await
            .unwrap();
        client.quit().await.unwrap();

        let received = server.await.unwrap();
        assert_eq!(
            received,
            vec!["EHLO client.test", "AUTH LOGIN", "dXNlcg==", "cGFzcw==", "QUIT"]
        );
    }

    #[tokio::test]
    async fn rejected_credentials() {
        let (port, server) = spawn_server(&["test.local", "AUTH PLAIN"], "250 ok").await;

        let mut client = builder(port).connect_plain().await.unwrap();
        client.ehlo().await.unwrap();
        match client.authenticate(&Credentials::new("user", "wrong")).await {
            Err(Error::AuthenticationFailed(reply)) => assert_eq!(reply.code, 535),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        client.quit().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn no_auth_mechanism_advertised() {
        let (port, server) = spawn_server(&["test.local", "8BITMIME"], "250 ok").await;

        let mut client = builder(port).connect_plain().await.unwrap();
        client.ehlo().await.unwrap();
        assert!(matches!(
            client.authenticate(&Credentials::new("user", "pass")).await,
            Err(Error::UnsupportedAuthMechanism)
        ));
        client.quit().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn rejected_recipient() {
        let (port, server) = spawn_server(&["test.local"], "550 5.1.1 no such user").await;

        let mut client = builder(port).connect_plain().await.unwrap();
        client.ehlo().await.unwrap();
        match client
            .send(&Envelope::new(
                "me@example.com",
                ["nobody@example.com"],
                b"Subject: hi\r\n\r\nhello\r\n".to_vec(),
            ))
            .await
        {
            Err(Error::UnexpectedReply(reply)) => assert_eq!(reply.code, 550),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        client.quit().await.unwrap();

        let received = server.await.unwrap();
        assert!(!received.iter().any(|line| line == "DATA"));
    }

    #[tokio::test]
    async fn starttls_requires_capability() {
        let (port, server) = spawn_server(&["test.local", "8BITMIME"], "250 ok").await;

        let mut client = builder(port).connect_plain().await.unwrap();
        client.ehlo().await.unwrap();
        assert!(matches!(
            client.start_tls().await,
            Err(Error::MissingStartTls)
        ));
        client.close().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn helo_when_ehlo_is_refused() {
        let (port, server) = spawn_server(&[], "250 ok").await;

        let mut client = builder(port).connect_plain().await.unwrap();
        client.ehlo_or_helo().await.unwrap();
        assert!(client
            .capabilities
            .as_ref()
            .is_some_and(|caps| caps.capabilities == 0 && caps.auth_mechanisms == 0));
        client
            .send(&Envelope::new(
                "me@example.com",
                ["you@example.com"],
                b"Subject: hi\r\n\r\nhello\r\n".to_vec(),
            ))
            .await
            .unwrap();
        client.quit().await.unwrap();

        let received = server.await.unwrap();
        assert_eq!(
            &received[..3],
            &["EHLO client.test", "HELO client.test", "MAIL FROM:<me@example.com>"]
        );
    }

    #[tokio::test]
    async fn implicit_tls_session() {
        let (port, server) = spawn_tls_server(false, &["test.local", "AUTH PLAIN"], "250 ok").await;

        let mut client = builder(port)
            .allow_invalid_certs(true)
            .connect_tls()
            .await
            .unwrap();
        assert!(client.is_secure());
        client.ehlo().await.unwrap();
        client
            .authenticate(&Credentials::new("user", "pass"))
            .await
            .unwrap();
        client
            .send(&Envelope::new(
                "me@example.com",
                ["you@example.com"],
                b"Subject: hi\r\n\r\nhello\r\n".to_vec(),
            ))
            .await
            .unwrap();
        client.quit().await.unwrap();

        let received = server.await.unwrap();
        assert_eq!(
            &received[..4],
            &[
                "EHLO client.test",
                "AUTH PLAIN AHVzZXIAcGFzcw==",
                "MAIL FROM:<me@example.com>",
                "RCPT TO:<you@example.com>",
            ]
        );
        assert_eq!(received.last().map(String::as_str), Some("QUIT"));
    }

    #[tokio::test]
    async fn starttls_upgrade() {
        let (port, server) = spawn_tls_server(true, &["test.local", "AUTH LOGIN"], "250 ok").await;

        let mut client = builder(port)
            .allow_invalid_certs(true)
            .connect_plain()
            .await
            .unwrap();
        client.ehlo().await.unwrap();
        client.start_tls().await.unwrap();
        assert!(client.is_secure());
        assert!(client.capabilities.is_none());

        // Fresh capabilities from the encrypted session
        let caps = client.ehlo().await.unwrap();
        assert!(!caps.has_capability(smtp_proto::EXT_START_TLS));
        assert_eq!(caps.auth_mechanisms, smtp_proto::AUTH_LOGIN);
        client
            .authenticate(&Credentials::new("user", "pass"))
            .await
            .unwrap();
        client.quit().await.unwrap();

        let received = server.await.unwrap();
        assert_eq!(
            received,
            vec![
                "EHLO client.test",
                "STARTTLS",
                "EHLO client.test",
                "AUTH LOGIN",
                "dXNlcg==",
                "cGFzcw==",
                "QUIT",
            ]
        );
    }

    #[tokio::test]
    async fn connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(matches!(
            builder(port).connect_plain().await,
            Err(Error::Io(_))
        ));
    }
}
