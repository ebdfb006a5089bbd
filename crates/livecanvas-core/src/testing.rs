//! In-process relay and peer harness for multi-client tests.

use std::collections::{BTreeMap, VecDeque};
use std::net::TcpListener;
use std::sync::mpsc::{Receiver, channel};
use std::thread;

use crate::client::{InputEvent, LiveClient};
use crate::config::LiveConfig;
use crate::crdt::ObjectStore;
use crate::presence::ConnectionId;
use crate::surface::MemorySurface;
use crate::sync::{ClientMessage, ServerMessage, decode_payload, encode_payload};
use crate::threads::{ThreadId, ThreadMetadata};

/// Single-room relay with the same fan-out rules as the server.
#[derive(Default)]
pub struct LoopbackRelay {
    next_id: ConnectionId,
    room: Option<String>,
    members: Vec<ConnectionId>,
    store: Option<ObjectStore>,
    threads: BTreeMap<ThreadId, ThreadMetadata>,
    inboxes: BTreeMap<ConnectionId, VecDeque<String>>,
}

impl LoopbackRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self) -> ConnectionId {
        self.next_id += 1;
        self.inboxes.insert(self.next_id, VecDeque::new());
        self.next_id
    }

    fn deliver(&mut self, to: ConnectionId, msg: &ServerMessage) {
        let json = serde_json::to_string(msg).unwrap();
        self.inboxes.entry(to).or_default().push_back(json);
    }

    fn fan_out(&mut self, from: Option<ConnectionId>, msg: &ServerMessage) {
        let targets: Vec<_> = self
            .members
            .iter()
            .copied()
            .filter(|id| Some(*id) != from)
            .collect();
        for to in targets {
            self.deliver(to, msg);
        }
    }

    pub fn send(&mut self, from: ConnectionId, json: &str) {
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Join { room } => {
                let room = self.room.get_or_insert(room).clone();
                let peers = self.members.clone();
                self.members.push(from);
                let joined = ServerMessage::Joined {
                    room,
                    connection_id: from,
                    peers,
                    initial_sync: self.store.as_ref().map(|store| encode_payload(&store.export_snapshot())),
                    threads: self.threads.clone(),
                };
                self.deliver(from, &joined);
                self.fan_out(Some(from), &ServerMessage::PeerJoined { connection_id: from });
            }
            ClientMessage::Leave => {
                self.members.retain(|id| *id != from);
                self.fan_out(None, &ServerMessage::PeerLeft { connection_id: from });
            }
            ClientMessage::Sync { data } => {
                let bytes = decode_payload(&data).unwrap();
                self.store.get_or_insert_with(ObjectStore::new).merge(&bytes).unwrap();
                self.fan_out(Some(from), &ServerMessage::Sync { from, data });
            }
            ClientMessage::Presence { state } => {
                self.fan_out(Some(from), &ServerMessage::Presence { from, state });
            }
            ClientMessage::Broadcast { event } => {
                self.fan_out(Some(from), &ServerMessage::Broadcast { from, event });
            }
            ClientMessage::CreateThread { thread_id, metadata } => {
                self.threads.insert(thread_id.clone(), metadata);
                self.fan_out(None, &ServerMessage::ThreadUpdated { thread_id, metadata });
            }
            ClientMessage::EditThread { thread_id, patch } => {
                if let Some(metadata) = self.threads.get_mut(&thread_id) {
                    patch.apply(metadata);
                    let metadata = *metadata;
                    self.fan_out(None, &ServerMessage::ThreadUpdated { thread_id, metadata });
                }
            }
        }
    }

    /// Drop a connection without a leave message, as a lost socket would.
    pub fn disconnect(&mut self, conn: ConnectionId) {
        self.inboxes.remove(&conn);
        if self.members.contains(&conn) {
            self.members.retain(|id| *id != conn);
            self.fan_out(None, &ServerMessage::PeerLeft { connection_id: conn });
        }
    }

    pub fn take_for(&mut self, to: ConnectionId) -> Vec<String> {
        self.inboxes
            .get_mut(&to)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default()
    }
}

/// A client wired to the loopback relay.
pub struct TestPeer {
    pub connection: ConnectionId,
    pub client: LiveClient<MemorySurface>,
}

impl TestPeer {
    pub fn join(relay: &mut LoopbackRelay, room: &str) -> Self {
        let mut client = LiveClient::new(MemorySurface::new(), LiveConfig::default());
        client.join_room(room);
        Self {
            connection: relay.connect(),
            client,
        }
    }

    /// Forward whatever the surface raised since the last call.
    pub fn flush_surface(&mut self) {
        let events = self.client.surface_mut().take_events();
        for event in events {
            self.client.handle_input(InputEvent::Surface(event)).unwrap();
        }
    }
}

/// Exchange messages until nobody has anything left to send.
pub fn pump(relay: &mut LoopbackRelay, peers: &mut [&mut TestPeer], now_ms: u64) {
    loop {
        let mut moved = false;
        for peer in peers.iter_mut() {
            peer.flush_surface();
            for msg in peer.client.take_outgoing() {
                relay.send(peer.connection, &msg);
                moved = true;
            }
        }
        for peer in peers.iter_mut() {
            for msg in relay.take_for(peer.connection) {
                peer.client.handle_server_message(&msg, now_ms);
                moved = true;
            }
        }
        if !moved {
            break;
        }
    }
}

struct TestLogger;

impl log::Log for TestLogger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        // Render the message so formatting bugs surface in tests.
        let _ = record.args().to_string();
    }

    fn flush(&self) {}
}

static LOGGER: TestLogger = TestLogger;

/// Enable debug logging so debug-only formatting runs.
pub fn debug_logging() {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(log::LevelFilter::Debug);
}

/// Accept one WebSocket connection on a local port.
///
/// Every text frame received is forwarded on the returned channel, and
/// `reply` is sent back after the first one.
pub fn spawn_socket_server(reply: Option<String>) -> (String, Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    let (tx, rx) = channel();
    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut socket = tungstenite::accept(stream).unwrap();
        let mut reply = reply;
        while let Ok(msg) = socket.read() {
            if let tungstenite::Message::Text(text) = msg {
                let _ = tx.send(text.to_string());
                if let Some(reply) = reply.take() {
                    let _ = socket.send(tungstenite::Message::Text(reply.into()));
                }
            }
        }
    });
    (url, rx)
}
