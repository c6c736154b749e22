//! One IRC client connection bridged to one messaging-service session.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::Bridge;
use crate::bridge::timestamps::{TimestampMap, TimestampStore};
use crate::error::{BridgeError, GatewayError};
use crate::irc::formatter;
use crate::irc::parser::IrcMessage;
use crate::irc::session::IrcSession;
use crate::maps::MapProvider;
use crate::storage::blob_store::BlobStore;
use crate::upstream::{Me, Message, MessagingClient, UpstreamError};

/// A logged-in messaging-service session.
pub struct Connection {
    pub client: Arc<dyn MessagingClient>,
    pub me: Me,
    /// Upstream messages and notifications, in delivery order.
    pub events: mpsc::Receiver<Message>,
}

/// Opens messaging-service sessions for IRC users.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Log in as the user identified by the IRC `nick` and `pass`.
    async fn connect(&self, nick: &str, pass: &str) -> Result<Connection, UpstreamError>;
}

/// Services shared by every gateway connection.
#[derive(Clone)]
pub struct GatewayContext {
    pub connector: Arc<dyn Connector>,
    pub blobs: Arc<dyn BlobStore>,
    /// Where chat timestamps are persisted; `None` keeps them in memory.
    pub timestamps: Option<Arc<dyn TimestampStore>>,
    pub map_provider: MapProvider,
    pub queue_size: usize,
}

/// Serve one IRC client on `stream` until it quits, the upstream session
/// ends, or `cancel` fires.
pub async fn serve<S>(
    stream: S,
    ctx: GatewayContext,
    cancel: CancellationToken,
) -> Result<(), GatewayError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (irc, mut inbound) = IrcSession::start(stream, &cancel, ctx.queue_size);
    let result = run(&irc, &mut inbound, &ctx).await;
    irc.stop();
    info!(session = %irc.id(), "gateway connection closed");
    result
}

async fn run(
    irc: &IrcSession,
    inbound: &mut mpsc::Receiver<IrcMessage>,
    ctx: &GatewayContext,
) -> Result<(), GatewayError> {
    let (nick, pass) = wait_for_login(irc, inbound)
        .await
        .ok_or(GatewayError::LoginAborted)?;
    info!(session = %irc.id(), %nick, "IRC client logged in");

    let connected = tokio::select! {
        result = ctx.connector.connect(&nick, &pass) => result,
        _ = irc.stopped() => return Err(GatewayError::LoginAborted),
    };
    let Connection {
        client,
        me,
        mut events,
    } = match connected {
        Ok(connection) => connection,
        Err(e) => {
            warn!(session = %irc.id(), %nick, error = %e, "failed to connect upstream");
            let _ = irc.status(&format!("error while connecting: {}", e)).await;
            return Err(e.into());
        }
    };

    irc.write_list(&[
        formatter::rpl_welcome(&nick),
        formatter::rpl_yourhost(&nick),
        formatter::rpl_created(&nick),
        formatter::rpl_myinfo(&nick),
        formatter::err_nomotd(&nick),
    ])
    .await?;

    let timestamps = load_timestamps(&me, ctx).await;
    let mut bridge = Bridge::new(
        irc.clone(),
        client.clone(),
        ctx.blobs.clone(),
        me,
        ctx.map_provider,
        timestamps,
    );

    loop {
        tokio::select! {
            biased;
            _ = irc.stopped() => break,
            event = events.recv() => {
                let Some(msg) = event else {
                    info!(session = %irc.id(), "upstream session ended");
                    let _ = irc.status("connection to the messaging service closed").await;
                    break;
                };
                if let Err(e) = bridge.handle_message(&msg).await {
                    warn!(session = %irc.id(), message = %msg.id, error = %e, "failed to handle message");
                    if matches!(e, BridgeError::UnknownNotificationType(_)) {
                        let _ = irc.status(&e.to_string()).await;
                    }
                }
            }
            command = inbound.recv() => {
                let Some(command) = command else { break };
                handle_command(irc, &bridge, client.as_ref(), command).await?;
            }
        }
    }

    Ok(())
}

/// Wait until the client sent NICK and either sent PASS or finished
/// registration without one. Other commands sent before that are dropped so
/// the reader never stalls on a full queue.
async fn wait_for_login(
    irc: &IrcSession,
    inbound: &mut mpsc::Receiver<IrcMessage>,
) -> Option<(String, String)> {
    let mut nicks = irc.nick_notifications();
    let pass_ready = irc.pass_ready();
    tokio::pin!(pass_ready);
    let mut pass = None;

    loop {
        let nick = irc.nick();
        if let Some(pass) = &pass
            && !nick.is_empty()
        {
            return Some((nick, String::clone(pass)));
        }

        tokio::select! {
            ready = &mut pass_ready, if pass.is_none() => pass = Some(ready?),
            changed = nicks.changed() => changed.ok()?,
            command = inbound.recv() => {
                let command = command?;
                debug!(command = %command.command, "ignoring command before login");
            }
        }
    }
}

async fn load_timestamps(me: &Me, ctx: &GatewayContext) -> TimestampMap {
    let Some(store) = &ctx.timestamps else {
        return TimestampMap::new();
    };

    let user_id = me.self_id.to_string();
    let initial = match store.load(&user_id).await {
        Ok(initial) => initial,
        Err(e) => {
            warn!(%user_id, error = %e, "failed to load chat timestamps, starting empty");
            Default::default()
        }
    };
    debug!(%user_id, chats = initial.len(), "loaded chat timestamps");
    TimestampMap::with_persistence(user_id, initial, store.clone())
}

/// Handle one command from the IRC client after login.
async fn handle_command(
    irc: &IrcSession,
    bridge: &Bridge,
    client: &dyn MessagingClient,
    msg: IrcMessage,
) -> std::io::Result<()> {
    match msg.command.as_str() {
        "PRIVMSG" => {
            let nick = irc.nick();
            let [target, text, ..] = msg.params.as_slice() else {
                return irc.write_now(&formatter::err_needmoreparams(&nick, "PRIVMSG")).await;
            };
            let Some(chat) = bridge.chats().by_identifier(target) else {
                return irc.write_now(&formatter::err_nosuchnick(&nick, target)).await;
            };

            info!(
                target: "whapp_irc::messages",
                from = %nick,
                to = %chat.identifier,
                "{}",
                text
            );
            if let Err(e) = client.send_message(&chat.id, text).await {
                warn!(chat = %chat.id, error = %e, "failed to send message upstream");
                irc.status(&format!("failed to send message to {}: {}", target, e))
                    .await?;
            }
            Ok(())
        }
        other => {
            debug!(command = %other, "ignoring IRC command");
            Ok(())
        }
    }
}
