//! Live SMTP probing engine
//!
//! Drives a conversation with a domain's mail exchangers to learn whether
//! they would accept a RCPT for an address, without ever transmitting a
//! message. Catch-all behavior is detected with a dummy recipient probe and
//! cached per `(domain, mx)` pair.

pub mod reply;
mod session;
mod tls;

pub use reply::SmtpReply;

use crate::dns::{DnsProbe, MxHost};
use crate::VerifierConfig;
use dashmap::DashMap;
use session::{SessionError, SmtpSession};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Catch-all verdicts are kept this long per `(domain, mx)` pair
const CATCH_ALL_TTL: Duration = Duration::from_secs(60 * 60);

/// What the engine learned about an address
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SmtpProbeOutcome {
    pub smtp_valid: bool,
    pub catch_all: bool,
}

/// Cached observation from a dummy-recipient probe: either the server
/// accepts anything, or this is the verbatim rejection it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CatchAllVerdict {
    CatchAll,
    RejectionText(String),
}

struct CatchAllEntry {
    verdict: CatchAllVerdict,
    expires_at: Instant,
}

/// Per-host conversation result
enum HostVerdict {
    Decided(SmtpProbeOutcome),
    /// STARTTLS handshake fell apart; reconnect once without TLS
    RetryPlaintext,
}

/// The SMTP probing engine
pub struct SmtpProber {
    dns: Arc<DnsProbe>,
    tls: tokio_rustls::TlsConnector,
    catch_all_cache: DashMap<(String, String), CatchAllEntry>,
    ports: Vec<u16>,
    connect_timeout: Duration,
    command_timeout: Duration,
    helo_host: String,
    envelope_sender: String,
    dummy_local_part: String,
}

impl SmtpProber {
    pub fn new(config: &VerifierConfig, dns: Arc<DnsProbe>) -> Self {
        Self {
            dns,
            tls: tls::build_tls_connector(config.verify_tls_certs),
            catch_all_cache: DashMap::new(),
            ports: config.smtp_ports.clone(),
            connect_timeout: Duration::from_millis(config.smtp_connect_timeout_ms),
            command_timeout: Duration::from_millis(config.smtp_command_timeout_ms),
            helo_host: config.helo_host.clone(),
            envelope_sender: config.envelope_sender.clone(),
            dummy_local_part: config.dummy_local_part.clone(),
        }
    }

    /// Probe whether `local@domain` is deliverable.
    ///
    /// Never fails: exhaustion of every MX host yields
    /// `{smtp_valid: false, catch_all: false}`.
    pub async fn probe(&self, domain: &str, local: &str) -> SmtpProbeOutcome {
        let hosts = self.dns.resolve_mx(domain).await;
        self.probe_hosts(domain, local, &hosts).await
    }

    /// Probe a known set of exchangers, priority order assumed. The first
    /// host producing a decisive verdict terminates the loop; transport
    /// errors, protocol violations and transient rejections skip to the
    /// next host.
    pub async fn probe_hosts(
        &self,
        domain: &str,
        local: &str,
        hosts: &[MxHost],
    ) -> SmtpProbeOutcome {
        if hosts.is_empty() {
            debug!("no MX hosts for {}; probe is a negative", domain);
            return SmtpProbeOutcome::default();
        }

        for host in hosts {
            match self.probe_host(domain, local, &host.exchange, true).await {
                Ok(HostVerdict::Decided(outcome)) => return outcome,
                Ok(HostVerdict::RetryPlaintext) => {
                    debug!("retrying {} without TLS", host.exchange);
                    match self.probe_host(domain, local, &host.exchange, false).await {
                        Ok(HostVerdict::Decided(outcome)) => return outcome,
                        Ok(HostVerdict::RetryPlaintext) => continue,
                        Err(e) => {
                            debug!("skipping MX {}: {}", host.exchange, e);
                            continue;
                        }
                    }
                }
                Err(e) => {
                    debug!("skipping MX {}: {}", host.exchange, e);
                    continue;
                }
            }
        }

        SmtpProbeOutcome::default()
    }

    /// Number of live catch-all cache entries
    pub fn catch_all_cache_len(&self) -> usize {
        self.catch_all_cache.len()
    }

    /// Drop all cached catch-all verdicts.
    pub fn clear_cache(&self) {
        self.catch_all_cache.clear();
    }

    async fn probe_host(
        &self,
        domain: &str,
        local: &str,
        exchange: &str,
        allow_tls: bool,
    ) -> Result<HostVerdict, SessionError> {
        let (mut session, port) = SmtpSession::connect(
            exchange,
            &self.ports,
            self.connect_timeout,
            self.command_timeout,
            &self.tls,
        )
        .await?;
        debug!("probing {}@{} via {}:{}", local, domain, exchange, port);

        let verdict = self
            .converse(&mut session, domain, local, exchange, allow_tls)
            .await;
        // QUIT and hard-close on every path, decisive or failed.
        session.quit().await;
        verdict
    }

    /// One sequential pass through the conversation: greeting, EHLO/HELO,
    /// opportunistic STARTTLS, MAIL FROM, dummy and real RCPT.
    async fn converse(
        &self,
        session: &mut SmtpSession,
        domain: &str,
        local: &str,
        exchange: &str,
        allow_tls: bool,
    ) -> Result<HostVerdict, SessionError> {
        let greeting = session.read_reply().await?;
        if greeting.code != 220 {
            return Err(SessionError::Unexpected {
                phase: "greeting",
                code: greeting.code,
            });
        }

        let ehlo = session
            .send_command(&format!("EHLO {}", self.helo_host))
            .await?;
        let capabilities = if ehlo.code == 250 {
            Some(ehlo)
        } else {
            let helo = session
                .send_command(&format!("HELO {}", self.helo_host))
                .await?;
            if helo.code != 250 {
                return Err(SessionError::Unexpected {
                    phase: "HELO",
                    code: helo.code,
                });
            }
            None
        };

        if allow_tls && !session.is_secure() {
            if let Some(ehlo) = &capabilities {
                if ehlo.advertises("STARTTLS") {
                    let reply = session.send_command("STARTTLS").await?;
                    if reply.code == 220 {
                        match session.upgrade_tls(&self.tls).await {
                            Ok(()) => {
                                // A fresh EHLO is mandatory on the secured channel.
                                let second = session
                                    .send_command(&format!("EHLO {}", self.helo_host))
                                    .await?;
                                if second.code != 250 {
                                    return Err(SessionError::Unexpected {
                                        phase: "EHLO after STARTTLS",
                                        code: second.code,
                                    });
                                }
                            }
                            Err(SessionError::TlsHandshake(e)) => {
                                warn!("TLS handshake with {} failed: {}", exchange, e);
                                return Ok(HostVerdict::RetryPlaintext);
                            }
                            Err(e) => return Err(e),
                        }
                    } else {
                        debug!(
                            "STARTTLS declined by {} with {}; continuing in plaintext",
                            exchange, reply.code
                        );
                    }
                }
            }
        }

        let mail = session
            .send_command(&format!("MAIL FROM:<{}>", self.envelope_sender))
            .await?;
        if mail.code != 250 {
            return Err(SessionError::Unexpected {
                phase: "MAIL FROM",
                code: mail.code,
            });
        }

        let key = (domain.to_lowercase(), exchange.to_lowercase());
        match self.catch_all_lookup(&key) {
            Some(CatchAllVerdict::CatchAll) => {
                // Known blanket acceptor: no RCPT needed at all.
                debug!("catch-all cache hit for {}/{}", domain, exchange);
                Ok(HostVerdict::Decided(SmtpProbeOutcome {
                    smtp_valid: true,
                    catch_all: true,
                }))
            }
            Some(CatchAllVerdict::RejectionText(cached)) => {
                let reply = session
                    .send_command(&format!("RCPT TO:<{}@{}>", local, domain))
                    .await?;
                // Matching the recorded dummy rejection means the address
                // behaves like a random one.
                let smtp_valid = reply.to_single_line() != cached;
                Ok(HostVerdict::Decided(SmtpProbeOutcome {
                    smtp_valid,
                    catch_all: false,
                }))
            }
            None => {
                let dummy = session
                    .send_command(&format!(
                        "RCPT TO:<{}@{}>",
                        self.dummy_local_part, domain
                    ))
                    .await?;
                if dummy.is_positive_completion() {
                    self.catch_all_store(key, CatchAllVerdict::CatchAll);
                    return Ok(HostVerdict::Decided(SmtpProbeOutcome {
                        smtp_valid: true,
                        catch_all: true,
                    }));
                }
                self.catch_all_store(
                    key,
                    CatchAllVerdict::RejectionText(dummy.to_single_line()),
                );

                let reply = session
                    .send_command(&format!("RCPT TO:<{}@{}>", local, domain))
                    .await?;
                if reply.is_positive_completion() {
                    Ok(HostVerdict::Decided(SmtpProbeOutcome {
                        smtp_valid: true,
                        catch_all: false,
                    }))
                } else if reply.is_permanent() {
                    Ok(HostVerdict::Decided(SmtpProbeOutcome {
                        smtp_valid: false,
                        catch_all: false,
                    }))
                } else {
                    // 4xx and anything else: inconclusive for this host
                    Err(SessionError::Unexpected {
                        phase: "RCPT TO",
                        code: reply.code,
                    })
                }
            }
        }
    }

    fn catch_all_lookup(&self, key: &(String, String)) -> Option<CatchAllVerdict> {
        let entry = self.catch_all_cache.get(key)?;
        if entry.expires_at > Instant::now() {
            return Some(entry.verdict.clone());
        }
        drop(entry);
        self.catch_all_cache.remove(key);
        None
    }

    fn catch_all_store(&self, key: (String, String), verdict: CatchAllVerdict) {
        self.catch_all_cache.insert(
            key,
            CatchAllEntry {
                verdict,
                expires_at: Instant::now() + CATCH_ALL_TTL,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;
    use tokio_rustls::TlsAcceptor;

    /// One scripted server-side session: a greeting, then
    /// `(expected command prefix, canned response)` pairs in order. QUIT is
    /// always answered with 221 and ends the session.
    struct Script {
        greeting: &'static str,
        steps: Vec<(&'static str, &'static str)>,
    }

    impl Script {
        fn ok(steps: Vec<(&'static str, &'static str)>) -> Self {
            Self {
                greeting: "220 mx.test ESMTP ready\r\n",
                steps,
            }
        }
    }

    type CommandLog = Arc<Mutex<Vec<String>>>;

    /// Serve the given scripts, one connection each, recording every
    /// command received across all sessions.
    async fn mock_mx(scripts: Vec<Script>) -> (u16, CommandLog, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let log: CommandLog = Arc::new(Mutex::new(Vec::new()));
        let log_handle = log.clone();

        let task = tokio::spawn(async move {
            for script in scripts {
                let (mut socket, _) = listener.accept().await.unwrap();
                socket.write_all(script.greeting.as_bytes()).await.unwrap();
                socket.flush().await.unwrap();

                let mut buf: Vec<u8> = Vec::new();
                let mut steps = script.steps.into_iter();
                loop {
                    let Some(line) = read_line(&mut socket, &mut buf).await else {
                        break;
                    };
                    log_handle.lock().unwrap().push(line.clone());

                    if line.eq_ignore_ascii_case("QUIT") {
                        let _ = socket.write_all(b"221 bye\r\n").await;
                        break;
                    }

                    let response = match steps.next() {
                        Some((expect, response)) if line.starts_with(expect) => response,
                        Some(_) | None => "500 unexpected command\r\n",
                    };
                    socket.write_all(response.as_bytes()).await.unwrap();
                    socket.flush().await.unwrap();
                }
            }
        });

        (port, log, task)
    }

    async fn read_line<S: AsyncRead + Unpin>(socket: &mut S, buf: &mut Vec<u8>) -> Option<String> {
        loop {
            if let Some(pos) = buf.windows(2).position(|pair| pair == b"\r\n") {
                let line = String::from_utf8_lossy(&buf[..pos]).into_owned();
                buf.drain(..pos + 2);
                return Some(line);
            }
            let mut data = [0u8; 512];
            match socket.read(&mut data).await {
                Ok(0) | Err(_) => return None,
                Ok(n) => buf.extend_from_slice(&data[..n]),
            }
        }
    }

    fn test_prober(port: u16) -> SmtpProber {
        let config = VerifierConfig {
            smtp_ports: vec![port],
            smtp_connect_timeout_ms: 2_000,
            smtp_command_timeout_ms: 2_000,
            ..VerifierConfig::default()
        };
        let dns = Arc::new(DnsProbe::new(&config));
        SmtpProber::new(&config, dns)
    }

    fn local_mx(priority: u16) -> MxHost {
        MxHost {
            exchange: "127.0.0.1".to_string(),
            priority,
        }
    }

    fn commands(log: &CommandLog) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn valid_mailbox_with_rejecting_dummy() {
        let (port, log, server) = mock_mx(vec![Script::ok(vec![
            ("EHLO", "250-mx.test\r\n250-SIZE 35882577\r\n250 HELP\r\n"),
            ("MAIL FROM:<relja@getastromail.com>", "250 ok\r\n"),
            ("RCPT TO:<gibberishasdfasdf@example.test>", "550 5.1.1 unknown user\r\n"),
            ("RCPT TO:<alice@example.test>", "250 accepted\r\n"),
        ])])
        .await;

        let prober = test_prober(port);
        let outcome = prober
            .probe_hosts("example.test", "alice", &[local_mx(10)])
            .await;

        assert_eq!(
            outcome,
            SmtpProbeOutcome {
                smtp_valid: true,
                catch_all: false
            }
        );
        server.await.unwrap();

        let seen = commands(&log);
        // one EHLO before MAIL FROM, dummy probe before the real one, QUIT last
        assert_eq!(seen.iter().filter(|c| c.starts_with("EHLO")).count(), 1);
        assert!(seen[1].starts_with("MAIL FROM"));
        assert!(seen[2].contains("gibberishasdfasdf@"));
        assert!(seen[3].contains("alice@"));
        assert_eq!(seen.last().unwrap(), "QUIT");
    }

    #[tokio::test]
    async fn catch_all_domain_skips_real_rcpt() {
        let (port, log, server) = mock_mx(vec![Script::ok(vec![
            ("EHLO", "250 mx.test\r\n"),
            ("MAIL FROM", "250 ok\r\n"),
            ("RCPT TO:<gibberishasdfasdf@example.test>", "250 anything goes\r\n"),
        ])])
        .await;

        let prober = test_prober(port);
        let outcome = prober
            .probe_hosts("example.test", "alice", &[local_mx(10)])
            .await;

        assert_eq!(
            outcome,
            SmtpProbeOutcome {
                smtp_valid: true,
                catch_all: true
            }
        );
        server.await.unwrap();

        let seen = commands(&log);
        assert!(!seen.iter().any(|c| c.contains("alice@")));
        assert_eq!(seen.last().unwrap(), "QUIT");

        // the pair is recorded as a blanket acceptor
        let key = ("example.test".to_string(), "127.0.0.1".to_string());
        assert_eq!(
            prober.catch_all_lookup(&key),
            Some(CatchAllVerdict::CatchAll)
        );
    }

    #[tokio::test]
    async fn unknown_mailbox_matches_dummy_rejection() {
        let (port, _log, server) = mock_mx(vec![Script::ok(vec![
            ("EHLO", "250 mx.test\r\n"),
            ("MAIL FROM", "250 ok\r\n"),
            ("RCPT TO:<gibberishasdfasdf@example.test>", "550 no such user\r\n"),
            ("RCPT TO:<bob@example.test>", "550 no such user\r\n"),
        ])])
        .await;

        let prober = test_prober(port);
        let outcome = prober
            .probe_hosts("example.test", "bob", &[local_mx(10)])
            .await;

        assert_eq!(outcome, SmtpProbeOutcome::default());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn dead_mx_falls_through_to_next_in_priority_order() {
        let (port, log, server) = mock_mx(vec![Script::ok(vec![
            ("EHLO", "250 mx.test\r\n"),
            ("MAIL FROM", "250 ok\r\n"),
            ("RCPT TO:<gibberishasdfasdf@example.test>", "550 unknown\r\n"),
            ("RCPT TO:<alice@example.test>", "250 accepted\r\n"),
        ])])
        .await;

        // 127.0.0.2 refuses: nothing listens on that loopback address.
        let dead = MxHost {
            exchange: "127.0.0.2".to_string(),
            priority: 10,
        };
        let prober = test_prober(port);
        let outcome = prober
            .probe_hosts("example.test", "alice", &[dead, local_mx(20)])
            .await;

        assert_eq!(
            outcome,
            SmtpProbeOutcome {
                smtp_valid: true,
                catch_all: false
            }
        );
        server.await.unwrap();

        // exactly one session: the dead host was not retried afterwards
        let seen = commands(&log);
        assert_eq!(seen.iter().filter(|c| c.starts_with("EHLO")).count(), 1);
    }

    #[tokio::test]
    async fn empty_mx_list_is_a_negative() {
        let prober = test_prober(1);
        let outcome = prober.probe_hosts("example.test", "alice", &[]).await;
        assert_eq!(outcome, SmtpProbeOutcome::default());
    }

    #[tokio::test]
    async fn exhausted_hosts_yield_a_negative() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let prober = test_prober(port);
        let outcome = prober
            .probe_hosts("example.test", "alice", &[local_mx(10)])
            .await;
        assert_eq!(outcome, SmtpProbeOutcome::default());
    }

    #[tokio::test]
    async fn accepted_starttls_upgrades_and_completes_over_tls() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let log: CommandLog = Arc::new(Mutex::new(Vec::new()));
        let log_handle = log.clone();
        let acceptor = TlsAcceptor::from(tls::build_test_server_config());

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"220 mx.test ESMTP ready\r\n").await.unwrap();
            socket.flush().await.unwrap();

            let mut buf: Vec<u8> = Vec::new();
            let line = read_line(&mut socket, &mut buf).await.unwrap();
            assert!(line.starts_with("EHLO"), "got {line:?}");
            log_handle.lock().unwrap().push(line);
            socket
                .write_all(b"250-mx.test\r\n250-STARTTLS\r\n250 HELP\r\n")
                .await
                .unwrap();

            let line = read_line(&mut socket, &mut buf).await.unwrap();
            assert_eq!(line, "STARTTLS");
            log_handle.lock().unwrap().push(line);
            socket.write_all(b"220 go ahead\r\n").await.unwrap();
            socket.flush().await.unwrap();

            let mut tls_socket = acceptor.accept(socket).await.unwrap();

            // the rest of the conversation happens on the secured channel
            let steps: &[(&str, &str)] = &[
                ("EHLO", "250-mx.test\r\n250 HELP\r\n"),
                ("MAIL FROM", "250 ok\r\n"),
                ("RCPT TO:<gibberishasdfasdf@example.test>", "550 unknown user\r\n"),
                ("RCPT TO:<alice@example.test>", "250 accepted\r\n"),
            ];
            let mut buf: Vec<u8> = Vec::new();
            for (expect, response) in steps {
                let line = read_line(&mut tls_socket, &mut buf).await.unwrap();
                log_handle.lock().unwrap().push(line.clone());
                assert!(line.starts_with(expect), "got {line:?}, expected {expect:?}");
                tls_socket.write_all(response.as_bytes()).await.unwrap();
                tls_socket.flush().await.unwrap();
            }
            if let Some(line) = read_line(&mut tls_socket, &mut buf).await {
                log_handle.lock().unwrap().push(line);
                let _ = tls_socket.write_all(b"221 bye\r\n").await;
            }
        });

        let prober = test_prober(port);
        let outcome = prober
            .probe_hosts("example.test", "alice", &[local_mx(10)])
            .await;

        assert_eq!(
            outcome,
            SmtpProbeOutcome {
                smtp_valid: true,
                catch_all: false
            }
        );
        server.await.unwrap();

        let seen = commands(&log);
        // a fresh EHLO follows the handshake, so two in total
        assert_eq!(seen.iter().filter(|c| c.starts_with("EHLO")).count(), 2);
        assert_eq!(seen.iter().filter(|c| *c == "STARTTLS").count(), 1);
        assert_eq!(seen.last().unwrap(), "QUIT");
    }

    #[tokio::test]
    async fn declined_starttls_continues_in_plaintext() {
        let (port, log, server) = mock_mx(vec![Script::ok(vec![
            ("EHLO", "250-mx.test\r\n250-STARTTLS\r\n250 HELP\r\n"),
            ("STARTTLS", "454 TLS not available\r\n"),
            ("MAIL FROM", "250 ok\r\n"),
            ("RCPT TO:<gibberishasdfasdf@example.test>", "550 unknown\r\n"),
            ("RCPT TO:<alice@example.test>", "250 accepted\r\n"),
        ])])
        .await;

        let prober = test_prober(port);
        let outcome = prober
            .probe_hosts("example.test", "alice", &[local_mx(10)])
            .await;

        assert_eq!(
            outcome,
            SmtpProbeOutcome {
                smtp_valid: true,
                catch_all: false
            }
        );
        server.await.unwrap();

        let seen = commands(&log);
        assert!(seen.iter().any(|c| c == "STARTTLS"));
    }

    #[tokio::test]
    async fn rejected_ehlo_falls_back_to_helo() {
        let (port, log, server) = mock_mx(vec![Script::ok(vec![
            ("EHLO", "502 command not implemented\r\n"),
            ("HELO", "250 mx.test\r\n"),
            ("MAIL FROM", "250 ok\r\n"),
            ("RCPT TO:<gibberishasdfasdf@example.test>", "550 unknown\r\n"),
            ("RCPT TO:<alice@example.test>", "250 accepted\r\n"),
        ])])
        .await;

        let prober = test_prober(port);
        let outcome = prober
            .probe_hosts("example.test", "alice", &[local_mx(10)])
            .await;

        assert_eq!(
            outcome,
            SmtpProbeOutcome {
                smtp_valid: true,
                catch_all: false
            }
        );
        server.await.unwrap();

        let seen = commands(&log);
        assert!(seen.iter().any(|c| c.starts_with("HELO")));
    }

    #[tokio::test]
    async fn unexpected_greeting_skips_the_host_but_still_quits() {
        let (port, log, server) = mock_mx(vec![Script {
            greeting: "421 service not available\r\n",
            steps: vec![],
        }])
        .await;

        let prober = test_prober(port);
        let outcome = prober
            .probe_hosts("example.test", "alice", &[local_mx(10)])
            .await;

        assert_eq!(outcome, SmtpProbeOutcome::default());
        server.await.unwrap();
        assert_eq!(commands(&log), vec!["QUIT".to_string()]);
    }

    #[tokio::test]
    async fn rejected_mail_from_skips_the_host() {
        let (port, log, server) = mock_mx(vec![Script::ok(vec![
            ("EHLO", "250 mx.test\r\n"),
            ("MAIL FROM", "451 greylisted, come back later\r\n"),
        ])])
        .await;

        let prober = test_prober(port);
        let outcome = prober
            .probe_hosts("example.test", "alice", &[local_mx(10)])
            .await;

        assert_eq!(outcome, SmtpProbeOutcome::default());
        server.await.unwrap();
        assert_eq!(commands(&log).last().unwrap(), "QUIT");
    }

    #[tokio::test]
    async fn transient_rcpt_rejection_is_inconclusive() {
        let (port, _log, server) = mock_mx(vec![Script::ok(vec![
            ("EHLO", "250 mx.test\r\n"),
            ("MAIL FROM", "250 ok\r\n"),
            ("RCPT TO:<gibberishasdfasdf@example.test>", "550 unknown\r\n"),
            ("RCPT TO:<alice@example.test>", "450 mailbox busy\r\n"),
        ])])
        .await;

        let prober = test_prober(port);
        let outcome = prober
            .probe_hosts("example.test", "alice", &[local_mx(10)])
            .await;

        assert_eq!(outcome, SmtpProbeOutcome::default());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn dummy_probe_runs_once_per_server_within_ttl() {
        let (port, log, server) = mock_mx(vec![
            // first probe: dummy rejected, real rejected with the same text
            Script::ok(vec![
                ("EHLO", "250 mx.test\r\n"),
                ("MAIL FROM", "250 ok\r\n"),
                ("RCPT TO:<gibberishasdfasdf@example.test>", "550 no such user\r\n"),
                ("RCPT TO:<bob@example.test>", "550 no such user\r\n"),
            ]),
            // second probe: cache answers the dummy; a diverging reply
            // means this address is treated individually
            Script::ok(vec![
                ("EHLO", "250 mx.test\r\n"),
                ("MAIL FROM", "250 ok\r\n"),
                ("RCPT TO:<alice@example.test>", "250 welcome\r\n"),
            ]),
            // third probe: identical text means the address behaves like
            // a random one
            Script::ok(vec![
                ("EHLO", "250 mx.test\r\n"),
                ("MAIL FROM", "250 ok\r\n"),
                ("RCPT TO:<carol@example.test>", "550 no such user\r\n"),
            ]),
        ])
        .await;

        let prober = test_prober(port);
        let hosts = [local_mx(10)];

        let first = prober.probe_hosts("example.test", "bob", &hosts).await;
        assert_eq!(first, SmtpProbeOutcome::default());

        let second = prober.probe_hosts("example.test", "alice", &hosts).await;
        assert_eq!(
            second,
            SmtpProbeOutcome {
                smtp_valid: true,
                catch_all: false
            }
        );

        let third = prober.probe_hosts("example.test", "carol", &hosts).await;
        assert_eq!(third, SmtpProbeOutcome::default());

        server.await.unwrap();

        let seen = commands(&log);
        let dummy_count = seen
            .iter()
            .filter(|c| c.contains("gibberishasdfasdf@"))
            .count();
        assert_eq!(dummy_count, 1);
        assert_eq!(prober.catch_all_cache_len(), 1);
    }

    #[tokio::test]
    async fn cached_catch_all_answers_without_any_rcpt() {
        let (port, log, server) = mock_mx(vec![
            Script::ok(vec![
                ("EHLO", "250 mx.test\r\n"),
                ("MAIL FROM", "250 ok\r\n"),
                ("RCPT TO:<gibberishasdfasdf@example.test>", "250 always\r\n"),
            ]),
            Script::ok(vec![
                ("EHLO", "250 mx.test\r\n"),
                ("MAIL FROM", "250 ok\r\n"),
            ]),
        ])
        .await;

        let prober = test_prober(port);
        let hosts = [local_mx(10)];

        let first = prober.probe_hosts("example.test", "alice", &hosts).await;
        assert!(first.catch_all);

        let second = prober.probe_hosts("example.test", "dave", &hosts).await;
        assert_eq!(
            second,
            SmtpProbeOutcome {
                smtp_valid: true,
                catch_all: true
            }
        );

        server.await.unwrap();

        // only the very first session ever issued a RCPT
        let rcpt_count = commands(&log)
            .iter()
            .filter(|c| c.starts_with("RCPT"))
            .count();
        assert_eq!(rcpt_count, 1);
    }

    #[tokio::test]
    async fn expired_catch_all_entry_is_a_miss() {
        let prober = test_prober(1);
        let key = ("example.test".to_string(), "127.0.0.1".to_string());
        prober.catch_all_cache.insert(
            key.clone(),
            CatchAllEntry {
                verdict: CatchAllVerdict::CatchAll,
                expires_at: Instant::now() - Duration::from_secs(1),
            },
        );

        assert_eq!(prober.catch_all_lookup(&key), None);
        assert_eq!(prober.catch_all_cache_len(), 0);
    }
}
