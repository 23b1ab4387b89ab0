//! Interactive chat session.
//!
//! Reads lines from stdin, routes `/commands`, stores and sends everything
//! else to the active conversation, and stores and prints inbound messages.

use anyhow::Context;
use shellchat_core::{Host, HostError, InboundMessage, Multiaddr, PeerId, split_peer_addr};
use shellchat_store::MessageStore;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::display::{format_incoming, format_message, format_notice, short_peer};

/// Conversation that broadcasts to every open stream
pub const GLOBAL_ROOM: &str = "global-room";

const HELP: &str = "\
COMMANDS
--------
/myid              Show your shareable addresses
/connect <target>  Connect to a multiaddr ending in /p2p/<id>, or a peer id
/peer <id>         Switch to the conversation with a peer
/peers             List peers with an open chat stream
/global            Switch back to the global room
/history [n]       Show the last n messages of this conversation
/quit              Exit
/help              Show this help";

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand<'a> {
    /// Blank line
    Empty,
    /// Text for the active conversation
    Say(&'a str),
    /// `/myid`
    MyId,
    /// `/connect <target>`
    Connect(&'a str),
    /// `/peer <id>`
    Peer(&'a str),
    /// `/peers`
    Peers,
    /// `/global`
    Global,
    /// `/history [n]`
    History(Option<u32>),
    /// `/help`
    Help,
    /// `/quit`
    Quit,
    /// Malformed command, with a usage hint
    Invalid(String),
}

impl<'a> ChatCommand<'a> {
    /// Parse one input line
    #[must_use]
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if !line.starts_with('/') {
            return Self::Say(line);
        }

        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        match (command, arg) {
            ("/myid", "") => Self::MyId,
            ("/peers", "") => Self::Peers,
            ("/global", "") => Self::Global,
            ("/help", "") => Self::Help,
            ("/quit", "") => Self::Quit,
            ("/connect", "") => Self::Invalid("usage: /connect <multiaddr|peer id>".into()),
            ("/connect", target) => Self::Connect(target),
            ("/peer", "") => Self::Invalid("usage: /peer <peer id>".into()),
            ("/peer", peer) => Self::Peer(peer),
            ("/history", "") => Self::History(None),
            ("/history", n) => match n.parse::<u32>() {
                Ok(n) if n > 0 => Self::History(Some(n)),
                _ => Self::Invalid("usage: /history [n], n > 0".into()),
            },
            _ => Self::Invalid(format!("unknown command {command}, try /help")),
        }
    }
}

/// Peer a `/connect` target refers to, if it names one
#[must_use]
pub fn target_peer(target: &str) -> Option<PeerId> {
    match target.parse::<Multiaddr>() {
        Ok(addr) => split_peer_addr(&addr).map(|(peer, _)| peer),
        Err(_) => target.parse::<PeerId>().ok(),
    }
}

/// Whether the session keeps going after a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading
    Continue,
    /// `/quit`
    Quit,
}

/// State of one interactive session
pub struct ChatSession {
    host: Host,
    store: MessageStore,
    active: String,
    history_limit: u32,
}

impl ChatSession {
    /// Start in the global room
    #[must_use]
    pub fn new(host: Host, store: MessageStore, history_limit: u32) -> Self {
        Self {
            host,
            store,
            active: GLOBAL_ROOM.to_string(),
            history_limit,
        }
    }

    /// Conversation new text goes to
    #[must_use]
    pub fn active(&self) -> &str {
        &self.active
    }

    /// Handle one line of user input
    ///
    /// # Errors
    ///
    /// Returns an error only for storage failures; network failures are
    /// reported inline.
    pub async fn handle_line(&mut self, line: &str) -> anyhow::Result<Flow> {
        match ChatCommand::parse(line) {
            ChatCommand::Empty => {}
            ChatCommand::Say(text) => self.say(text).await?,
            ChatCommand::MyId => self.show_addresses().await,
            ChatCommand::Connect(target) => self.connect(target).await?,
            ChatCommand::Peer(peer) => {
                self.active = peer.to_string();
                println!("{}", format_notice(&format!("talking to {}", short_peer(peer))));
                self.show_history(self.history_limit).await?;
            }
            ChatCommand::Peers => self.show_peers().await,
            ChatCommand::Global => {
                self.active = GLOBAL_ROOM.to_string();
                println!("{}", format_notice("back in the global room"));
                self.show_history(self.history_limit).await?;
            }
            ChatCommand::History(n) => {
                self.show_history(n.unwrap_or(self.history_limit)).await?;
            }
            ChatCommand::Help => println!("{HELP}"),
            ChatCommand::Quit => return Ok(Flow::Quit),
            ChatCommand::Invalid(hint) => println!("{}", format_notice(&hint)),
        }
        Ok(Flow::Continue)
    }

    /// Print and store a message that arrived from a peer
    ///
    /// A storage failure is logged and the message is still shown. Returns
    /// whether the message was stored.
    pub async fn handle_inbound(&self, message: InboundMessage) -> bool {
        let peer_id = message.peer_id.to_string();
        let text = message.text();

        if self.active == peer_id || self.active == GLOBAL_ROOM {
            println!("{}", format_incoming(&peer_id, &text));
        } else {
            println!(
                "{}",
                format_notice(&format!(
                    "new message from {} (/peer {peer_id})",
                    short_peer(&peer_id)
                ))
            );
        }

        match self.store.save(&peer_id, &text, now(), false).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(peer = %peer_id, error = %e, "incoming message not stored");
                false
            }
        }
    }

    async fn say(&self, text: &str) -> anyhow::Result<()> {
        self.store
            .save(&self.active, text, now(), true)
            .await
            .context("Failed to store message")?;

        if self.active == GLOBAL_ROOM {
            match self.host.broadcast(text.as_bytes()).await {
                Ok(0) => println!("{}", format_notice("no peers connected, saved locally")),
                Ok(n) => tracing::debug!(peers = n, "broadcast"),
                Err(e) => println!("{}", format_notice(&format!("not sent: {e}"))),
            }
        } else {
            match self.host.send(&self.active, text.as_bytes()).await {
                Ok(()) => {}
                Err(HostError::PeerNotConnected(_)) => println!(
                    "{}",
                    format_notice("peer not connected, saved locally; use /connect")
                ),
                Err(e) => println!("{}", format_notice(&format!("not sent: {e}"))),
            }
        }
        Ok(())
    }

    async fn connect(&mut self, target: &str) -> anyhow::Result<()> {
        let Some(peer) = target_peer(target) else {
            println!(
                "{}",
                format_notice(&format!("invalid address or peer id: {target}"))
            );
            return Ok(());
        };

        println!("{}", format_notice(&format!("connecting to {}...", short_peer(&peer.to_string()))));
        let host = self.host.clone();
        let target = target.to_string();
        tokio::spawn(async move {
            match host.connect(&target).await {
                Ok(peer) => println!(
                    "{}",
                    format_notice(&format!("connected to {}", short_peer(&peer.to_string())))
                ),
                Err(e) => {
                    tracing::debug!(%target, error = %e, "connect failed");
                    println!("{}", format_notice(&format!("connect failed: {e}")));
                }
            }
        });

        self.active = peer.to_string();
        self.show_history(self.history_limit).await
    }

    async fn show_addresses(&self) {
        match self.host.shareable_addrs().await {
            Ok(addrs) if !addrs.is_empty() => {
                println!("My addresses:");
                for addr in addrs {
                    println!("  {addr}");
                }
            }
            Ok(_) => println!("{}", format_notice("not listening on any address yet")),
            Err(e) => println!("{}", format_notice(&format!("host unavailable: {e}"))),
        }
    }

    async fn show_peers(&self) {
        let peers = self.host.stream_peers().await;
        let connected = self.host.connected_peers().await.len();
        println!("Chat peers ({}), {connected} connections:", peers.len());
        for peer in peers {
            let marker = if peer == self.active { "*" } else { " " };
            println!(" {marker} {peer}");
        }
    }

    async fn show_history(&self, limit: u32) -> anyhow::Result<()> {
        let messages = self
            .store
            .get_recent(&self.active, limit)
            .await
            .context("Failed to load history")?;
        for message in &messages {
            println!("{}", format_message(message));
        }
        Ok(())
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Run the session until `/quit`, end of input or Ctrl+C
///
/// # Errors
///
/// Returns an error if stdin fails or a message typed by the user cannot
/// be stored.
pub async fn run(
    mut session: ChatSession,
    mut inbound: tokio::sync::mpsc::UnboundedReceiver<InboundMessage>,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("Failed to read input")? {
                Some(line) => {
                    if session.handle_line(&line).await? == Flow::Quit {
                        break;
                    }
                }
                None => break,
            },
            message = inbound.recv() => match message {
                Some(message) => {
                    session.handle_inbound(message).await;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_and_blank() {
        assert_eq!(ChatCommand::parse("   "), ChatCommand::Empty);
        assert_eq!(ChatCommand::parse(" hello there "), ChatCommand::Say("hello there"));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(ChatCommand::parse("/myid"), ChatCommand::MyId);
        assert_eq!(ChatCommand::parse("/peers"), ChatCommand::Peers);
        assert_eq!(ChatCommand::parse("/global"), ChatCommand::Global);
        assert_eq!(ChatCommand::parse("/quit"), ChatCommand::Quit);
        assert_eq!(ChatCommand::parse("/help"), ChatCommand::Help);
        assert_eq!(ChatCommand::parse("/history"), ChatCommand::History(None));
        assert_eq!(ChatCommand::parse("/history 5"), ChatCommand::History(Some(5)));
        assert_eq!(
            ChatCommand::parse("/connect  /ip4/1.2.3.4/tcp/1 "),
            ChatCommand::Connect("/ip4/1.2.3.4/tcp/1")
        );
        assert_eq!(ChatCommand::parse("/peer abc"), ChatCommand::Peer("abc"));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(ChatCommand::parse("/connect"), ChatCommand::Invalid(_)));
        assert!(matches!(ChatCommand::parse("/peer"), ChatCommand::Invalid(_)));
        assert!(matches!(ChatCommand::parse("/history 0"), ChatCommand::Invalid(_)));
        assert!(matches!(ChatCommand::parse("/history x"), ChatCommand::Invalid(_)));
        assert!(matches!(ChatCommand::parse("/dance"), ChatCommand::Invalid(_)));
        assert!(matches!(ChatCommand::parse("/quit now"), ChatCommand::Invalid(_)));
    }

    async fn session(dir: &std::path::Path) -> ChatSession {
        let store = MessageStore::open_with_params(
            dir.join("chat.db"),
            "pw",
            shellchat_crypto::KdfParams::low_security(),
        )
        .await
        .unwrap();
        let (host, _inbound) =
            Host::create(shellchat_core::HostConfig::local_only(), None).unwrap();
        ChatSession::new(host, store, 50)
    }

    fn inbound(peer_id: PeerId, text: &str) -> InboundMessage {
        InboundMessage {
            peer_id,
            payload: text.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn test_inbound_message_is_stored() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path()).await;
        let peer = PeerId::random();

        assert!(session.handle_inbound(inbound(peer, "hello")).await);

        let messages = session.store.get_recent(&peer.to_string(), 10).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hello");
        assert!(!messages[0].is_sent);
        session.host.shutdown().await;
    }

    #[tokio::test]
    async fn test_inbound_storage_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path()).await;
        let peer = PeerId::random();
        session.store.lock().await;

        assert!(!session.handle_inbound(inbound(peer, "lost")).await);

        // The session still handles input afterwards
        let mut session = session;
        assert_eq!(session.handle_line("/peers").await.unwrap(), Flow::Continue);
        assert!(!session.handle_inbound(inbound(peer, "again")).await);
        session.host.shutdown().await;
    }

    #[test]
    fn test_target_peer() {
        let peer = PeerId::random();
        assert_eq!(target_peer(&peer.to_string()), Some(peer));
        assert_eq!(
            target_peer(&format!("/ip4/127.0.0.1/tcp/4001/p2p/{peer}")),
            Some(peer)
        );
        assert_eq!(target_peer("/ip4/127.0.0.1/tcp/4001"), None);
        assert_eq!(target_peer("nonsense"), None);
    }
}
