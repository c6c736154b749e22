use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::capabilities::{self, Capabilities};
use super::formatter;
use super::parser::{IrcMessage, ParseError};

/// Default capacity of the inbound command queue.
pub const QUEUE_SIZE: usize = 10;

/// Sender used for notices that originate from the gateway itself.
pub const STATUS_NICK: &str = "status";

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One IRC client connection.
///
/// Cloning is cheap; all clones share the socket, the negotiated
/// capabilities and the lifetime scope. Every outbound line goes through
/// [`IrcSession::write`], which holds the socket for the whole line.
#[derive(Clone)]
pub struct IrcSession {
    shared: Arc<Shared>,
}

struct Shared {
    id: Uuid,
    caps: Mutex<Capabilities>,
    nick: watch::Sender<String>,
    pass: watch::Sender<Option<String>>,
    user_seen: AtomicBool,
    writer: tokio::sync::Mutex<BoxedWriter>,
    cancel: CancellationToken,
}

/// What the reader does with a line after local handling.
enum Flow {
    Handled,
    Forward(IrcMessage),
    Quit,
}

impl IrcSession {
    /// Take ownership of `stream` and start serving it.
    ///
    /// Spawns the reader task and returns immediately with the session handle
    /// and the queue of commands the session does not handle itself. The
    /// session stops when the peer quits or disconnects, or when `parent`
    /// is cancelled.
    pub fn start<S>(
        stream: S,
        parent: &CancellationToken,
        queue_size: usize,
    ) -> (IrcSession, mpsc::Receiver<IrcMessage>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (tx, rx) = mpsc::channel(queue_size.max(1));

        let session = IrcSession {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                caps: Mutex::new(Capabilities::new()),
                nick: watch::Sender::new(String::new()),
                pass: watch::Sender::new(None),
                user_seen: AtomicBool::new(false),
                writer: tokio::sync::Mutex::new(Box::new(writer)),
                cancel: parent.child_token(),
            }),
        };

        // Close the socket once the session ends, whatever ended it.
        let closer = session.clone();
        tokio::spawn(async move {
            closer.shared.cancel.cancelled().await;
            let mut writer = closer.shared.writer.lock().await;
            let _ = writer.shutdown().await;
            debug!(session = %closer.id(), "IRC socket closed");
        });

        let reader_session = session.clone();
        tokio::spawn(async move {
            reader_session.read_loop(BufReader::new(reader), tx).await;
        });

        (session, rx)
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Current nickname; empty until the client sent NICK.
    pub fn nick(&self) -> String {
        self.shared.nick.borrow().clone()
    }

    /// Password from the first PASS command. Empty when registration
    /// finished without one.
    pub fn pass(&self) -> Option<String> {
        self.shared.pass.borrow().clone()
    }

    /// Receiver that is notified every time the client sends NICK.
    pub fn nick_notifications(&self) -> watch::Receiver<String> {
        self.shared.nick.subscribe()
    }

    /// Resolve once PASS was received, or with an empty password once the
    /// client finished registration (NICK, USER and no open CAP negotiation)
    /// without sending one. Returns `None` if the session stopped first.
    pub async fn pass_ready(&self) -> Option<String> {
        let mut rx = self.shared.pass.subscribe();
        let ready = tokio::select! {
            result = rx.wait_for(|pass| pass.is_some()) => result.is_ok(),
            _ = self.shared.cancel.cancelled() => false,
        };
        if ready { self.pass() } else { None }
    }

    /// Resolve once the session has been torn down.
    pub async fn stopped(&self) {
        self.shared.cancel.cancelled().await;
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Tear the session down.
    pub fn stop(&self) {
        self.shared.cancel.cancel();
    }

    pub fn has_capability(&self, token: &str) -> bool {
        self.caps().has(token)
    }

    fn caps(&self) -> MutexGuard<'_, Capabilities> {
        // The set holds no invariants a panicking writer could break.
        self.shared
            .caps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write one line, tagged with `time` when the client negotiated
    /// `server-time`.
    pub async fn write(&self, time: DateTime<Utc>, line: &str) -> io::Result<()> {
        let mut data = String::with_capacity(line.len() + 32);
        if self.has_capability(capabilities::SERVER_TIME) {
            data.push_str("@time=");
            data.push_str(&time.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string());
            data.push(' ');
        }
        data.push_str(line);
        data.push_str("\r\n");

        let result = tokio::select! {
            biased;
            _ = self.shared.cancel.cancelled() => Err(closed()),
            result = async {
                let mut writer = self.shared.writer.lock().await;
                writer.write_all(data.as_bytes()).await?;
                writer.flush().await
            } => result,
        };

        if let Err(ref e) = result {
            warn!(session = %self.id(), error = %e, "error sending IRC message");
        }
        result
    }

    pub async fn write_now(&self, line: &str) -> io::Result<()> {
        self.write(Utc::now(), line).await
    }

    /// Write the lines in order, stopping at the first failure.
    pub async fn write_list<S: AsRef<str>>(&self, lines: &[S]) -> io::Result<()> {
        for line in lines {
            self.write_now(line.as_ref()).await?;
        }
        Ok(())
    }

    /// Send `body` as a PRIVMSG from `from` to `to`, dated `time`.
    pub async fn private_message(
        &self,
        time: DateTime<Utc>,
        from: &str,
        to: &str,
        body: &str,
    ) -> io::Result<()> {
        info!(
            target: "whapp_irc::messages",
            timestamp = %time.to_rfc3339(),
            %from,
            %to,
            "{}",
            body
        );
        self.write(time, &formatter::privmsg(from, to, body)).await
    }

    /// Send a notice from the gateway to the connected user.
    pub async fn status(&self, body: &str) -> io::Result<()> {
        let nick = self.nick();
        self.private_message(Utc::now(), STATUS_NICK, &nick, body)
            .await
    }

    async fn read_loop<R>(&self, mut reader: BufReader<R>, tx: mpsc::Sender<IrcMessage>)
    where
        R: AsyncRead + Unpin,
    {
        let cancel = self.shared.cancel.clone();
        let mut buf = Vec::with_capacity(512);

        loop {
            buf.clear();
            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = reader.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => {
                    debug!(session = %self.id(), "IRC connection closed by peer");
                    break;
                }
                Err(e) => {
                    warn!(session = %self.id(), error = %e, "error while listening for IRC messages");
                    break;
                }
                Ok(_) => {}
            }

            let line = String::from_utf8_lossy(&buf);
            let msg = match IrcMessage::parse(&line) {
                Ok(msg) => msg,
                Err(ParseError::Empty) => continue,
                Err(e) => {
                    warn!(session = %self.id(), error = %e, "got invalid IRC message, ignoring");
                    continue;
                }
            };

            match self.handle_internal(msg).await {
                Flow::Handled => {}
                Flow::Quit => break,
                Flow::Forward(msg) => {
                    // A full queue pauses reading from the socket.
                    let sent = tokio::select! {
                        _ = cancel.cancelled() => break,
                        sent = tx.send(msg) => sent,
                    };
                    if sent.is_err() {
                        debug!(session = %self.id(), "inbound queue consumer dropped");
                        break;
                    }
                }
            }
        }

        cancel.cancel();
    }

    /// Handle the housekeeping commands that never reach the application.
    async fn handle_internal(&self, msg: IrcMessage) -> Flow {
        let command = msg.command.clone();
        match command.as_str() {
            "PING" => {
                let token = msg
                    .params
                    .first()
                    .map(|s| s.as_str())
                    .unwrap_or(formatter::server_name());
                if self.write_now(&formatter::pong(token)).await.is_err() {
                    return Flow::Quit;
                }
            }
            "QUIT" => {
                info!(session = %self.id(), nick = %self.nick(), "received QUIT");
                return Flow::Quit;
            }
            "NICK" => match msg.params.first() {
                Some(nick) => {
                    debug!(session = %self.id(), %nick, "nick set");
                    self.shared.nick.send_replace(nick.clone());
                    self.settle_registration();
                }
                None => warn!(session = %self.id(), "NICK without a nickname, ignoring"),
            },
            "USER" => {
                self.shared.user_seen.store(true, Ordering::SeqCst);
                self.settle_registration();
                return Flow::Forward(msg);
            }
            "PASS" => {
                let pass = msg.params.first().cloned().unwrap_or_default();
                self.set_pass(pass);
            }
            "CAP" => self.handle_cap(&msg).await,
            _ => return Flow::Forward(msg),
        }
        Flow::Handled
    }

    /// Only the first password counts.
    fn set_pass(&self, pass: String) -> bool {
        self.shared.pass.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(pass);
            true
        })
    }

    /// A client that completed registration without PASS will not send one.
    fn settle_registration(&self) {
        let registered = !self.nick().is_empty()
            && self.shared.user_seen.load(Ordering::SeqCst)
            && !self.caps().is_negotiating();
        if registered && self.set_pass(String::new()) {
            debug!(session = %self.id(), "registration finished without PASS");
        }
    }

    async fn handle_cap(&self, msg: &IrcMessage) {
        self.caps().start_negotiation();

        let subcommand = msg.params.first().map(|s| s.to_ascii_uppercase());
        let reply = match subcommand.as_deref() {
            Some("LS") => {
                let supported: Vec<String> =
                    capabilities::SUPPORTED.iter().map(|c| c.to_string()).collect();
                Some(formatter::cap("LS", &supported))
            }
            Some("LIST") => Some(formatter::cap("LIST", &self.caps().list())),
            Some("REQ") => {
                let list = {
                    let mut caps = self.caps();
                    if msg.params.len() > 1 {
                        for token in msg.trailing().split_whitespace() {
                            caps.add(token);
                        }
                    }
                    caps.list()
                };
                Some(formatter::cap("ACK", &list))
            }
            Some("END") => {
                self.caps().finish_negotiation();
                self.settle_registration();
                None
            }
            other => {
                debug!(session = %self.id(), subcommand = ?other, "unsupported CAP subcommand");
                None
            }
        };

        if let Some(reply) = reply {
            // Failures are logged by write; a dead socket ends the reader on its own.
            let _ = self.write_now(&reply).await;
        }
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "IRC session closed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
    use tokio::time::timeout;

    struct Client {
        lines: tokio::io::Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Client {
        async fn send(&mut self, line: &str) {
            self.writer
                .write_all(format!("{}\r\n", line).as_bytes())
                .await
                .unwrap();
        }

        async fn recv(&mut self) -> String {
            timeout(Duration::from_secs(5), self.lines.next_line())
                .await
                .expect("timed out waiting for line")
                .unwrap()
                .expect("connection closed")
        }
    }

    fn start(queue_size: usize) -> (IrcSession, mpsc::Receiver<IrcMessage>, Client) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (session, inbound) = IrcSession::start(server, &CancellationToken::new(), queue_size);
        let (read, writer) = tokio::io::split(client);
        let client = Client {
            lines: BufReader::new(read).lines(),
            writer,
        };
        (session, inbound, client)
    }

    fn assert_server_time_tag(line: &str) -> &str {
        let rest = line.strip_prefix("@time=").expect("missing @time tag");
        let (stamp, rest) = rest.split_once(' ').unwrap();
        assert_eq!(stamp.len(), "2024-01-01T00:00:00.000Z".len());
        assert!(stamp.ends_with('Z'));
        DateTime::parse_from_rfc3339(stamp).expect("invalid timestamp");
        rest
    }

    #[tokio::test]
    async fn test_ping_answered_locally() {
        let (_session, mut inbound, mut client) = start(QUEUE_SIZE);

        client.send("PING :abc123").await;
        assert_eq!(client.recv().await, ":whapp-irc PONG whapp-irc :abc123");

        client.send("PRIVMSG #family :hi").await;
        let msg = inbound.recv().await.unwrap();
        assert_eq!(msg.command, "PRIVMSG");
    }

    #[tokio::test]
    async fn test_cap_negotiation() {
        let (session, _inbound, mut client) = start(QUEUE_SIZE);

        client.send("CAP LS 302").await;
        assert_eq!(
            client.recv().await,
            ":whapp-irc CAP * LS :server-time whapp-irc/replay"
        );

        client.send("CAP REQ :whapp-irc/replay server-time").await;
        let ack = client.recv().await;
        assert_eq!(
            assert_server_time_tag(&ack),
            ":whapp-irc CAP * ACK :server-time whapp-irc/replay"
        );

        client.send("CAP LIST").await;
        let list = client.recv().await;
        assert_eq!(
            assert_server_time_tag(&list),
            ":whapp-irc CAP * LIST :server-time whapp-irc/replay"
        );

        client.send("CAP END").await;
        client.send("PING :sync").await;
        client.recv().await;
        assert!(session.has_capability("server-time"));
        assert!(!session.caps().is_negotiating());
    }

    #[tokio::test]
    async fn test_server_time_tag_uses_given_time() {
        let (session, _inbound, mut client) = start(QUEUE_SIZE);

        let time = DateTime::parse_from_rfc3339("2018-03-04T05:06:07.089+02:00")
            .unwrap()
            .with_timezone(&Utc);

        session.write(time, ":bob PRIVMSG alice hi").await.unwrap();
        assert_eq!(client.recv().await, ":bob PRIVMSG alice hi");

        client.send("CAP REQ server-time").await;
        client.recv().await;

        session.write(time, ":bob PRIVMSG alice hi").await.unwrap();
        assert_eq!(
            client.recv().await,
            "@time=2018-03-04T03:06:07.089Z :bob PRIVMSG alice hi"
        );
    }

    #[tokio::test]
    async fn test_nick_and_pass_notifications() {
        let (session, mut inbound, mut client) = start(QUEUE_SIZE);
        let mut nicks = session.nick_notifications();

        let waiter = session.clone();
        let pass = tokio::spawn(async move { waiter.pass_ready().await });

        client.send("NICK alice").await;
        timeout(Duration::from_secs(5), nicks.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*nicks.borrow_and_update(), "alice");
        assert_eq!(session.nick(), "alice");

        client.send("PASS hunter2").await;
        assert_eq!(pass.await.unwrap(), Some("hunter2".to_string()));

        // Only the first PASS counts.
        client.send("PASS other").await;
        client.send("NICK alice2").await;
        client.send("USER alice 0 * :Alice").await;
        let msg = inbound.recv().await.unwrap();
        assert_eq!(msg.command, "USER");
        assert_eq!(session.pass(), Some("hunter2".to_string()));
        assert_eq!(session.nick(), "alice2");
    }

    #[tokio::test]
    async fn test_empty_pass() {
        let (session, _inbound, mut client) = start(QUEUE_SIZE);
        client.send("PASS").await;
        assert_eq!(session.pass_ready().await, Some(String::new()));
    }

    #[tokio::test]
    async fn test_registration_without_pass() {
        let (session, mut inbound, mut client) = start(QUEUE_SIZE);
        let waiter = session.clone();
        let pass = tokio::spawn(async move { waiter.pass_ready().await });

        client.send("CAP LS 302").await;
        client.recv().await;
        client.send("NICK alice").await;
        client.send("USER alice 0 * :Alice").await;
        assert_eq!(inbound.recv().await.unwrap().command, "USER");
        // Still negotiating, so a PASS may yet arrive.
        assert_eq!(session.pass(), None);

        client.send("CAP END").await;
        let pass = timeout(Duration::from_secs(5), pass).await.unwrap().unwrap();
        assert_eq!(pass, Some(String::new()));

        client.send("PASS late").await;
        client.send("PING :sync").await;
        client.recv().await;
        assert_eq!(session.pass(), Some(String::new()));
    }

    #[tokio::test]
    async fn test_only_application_commands_forwarded_in_order() {
        let (_session, mut inbound, mut client) = start(1);

        client.send("PRIVMSG #a :one").await;
        client.send(":bad").await;
        client.send("NICK alice").await;
        client.send("JOIN #b").await;
        client.send("CAP END").await;
        client.send("PRIVMSG #a :three").await;

        let commands: Vec<String> = [
            inbound.recv().await.unwrap(),
            inbound.recv().await.unwrap(),
            inbound.recv().await.unwrap(),
        ]
        .into_iter()
        .map(|m| m.format())
        .collect();
        assert_eq!(commands, vec!["PRIVMSG #a one", "JOIN #b", "PRIVMSG #a three"]);
    }

    #[tokio::test]
    async fn test_quit_tears_down() {
        let (session, mut inbound, mut client) = start(QUEUE_SIZE);

        client.send("QUIT :bye").await;
        timeout(Duration::from_secs(5), session.stopped())
            .await
            .unwrap();
        assert!(inbound.recv().await.is_none());

        let err = session.write_now(":x PRIVMSG y z").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
        assert_eq!(session.pass_ready().await, None);
    }

    #[tokio::test]
    async fn test_peer_disconnect_tears_down() {
        let (session, mut inbound, client) = start(QUEUE_SIZE);
        drop(client);
        timeout(Duration::from_secs(5), session.stopped())
            .await
            .unwrap();
        assert!(inbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_parent_cancellation_stops_session() {
        let parent = CancellationToken::new();
        let (_client, server) = tokio::io::duplex(1024);
        let (session, _inbound) = IrcSession::start(server, &parent, QUEUE_SIZE);
        parent.cancel();
        timeout(Duration::from_secs(5), session.stopped())
            .await
            .unwrap();
        assert!(session.is_stopped());
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_interleave() {
        let (session, _inbound, mut client) = start(QUEUE_SIZE);

        let mut handles = Vec::new();
        for writer in 0..8 {
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                for n in 0..25 {
                    let body = format!("{}-{}-{}", writer, n, "x".repeat(300));
                    session
                        .private_message(Utc::now(), "bob", "#family", &body)
                        .await
                        .unwrap();
                }
            }));
        }

        for _ in 0..200 {
            let line = client.recv().await;
            let msg = IrcMessage::parse(&line).unwrap();
            assert_eq!(msg.command, "PRIVMSG");
            assert_eq!(msg.params.len(), 2);
            assert!(msg.params[1].ends_with(&"x".repeat(300)));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_write_list_and_status() {
        let (session, _inbound, mut client) = start(QUEUE_SIZE);
        client.send("NICK alice").await;
        let mut nicks = session.nick_notifications();
        nicks.wait_for(|n| n == "alice").await.unwrap();

        session
            .write_list(&[":a JOIN #x", ":a PART #x"])
            .await
            .unwrap();
        session.status("logged in").await.unwrap();

        assert_eq!(client.recv().await, ":a JOIN #x");
        assert_eq!(client.recv().await, ":a PART #x");
        assert_eq!(client.recv().await, ":status PRIVMSG alice :logged in");
    }
}
