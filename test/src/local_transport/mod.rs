/// In-memory transport for end-to-end testing
/// Carries frames between two wires without network I/O

use std::{
    collections::VecDeque,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;

use rd_shared::{Transport, WireBase};

/// One direction of a [`LocalTransportPair`].
///
/// A queued transport keeps frames until [`LocalTransport::deliver`] is called; an
/// inline transport hands each frame to the peer wire as soon as it is sent.
pub struct LocalTransport {
    inline: bool,
    peer: Mutex<Option<Weak<WireBase>>>,
    outbox: Mutex<VecDeque<Vec<u8>>>,
}

impl LocalTransport {
    fn new(inline: bool) -> Arc<Self> {
        Arc::new(Self {
            inline,
            peer: Mutex::new(None),
            outbox: Mutex::new(VecDeque::new()),
        })
    }

    /// Sets the wire that receives this transport's frames.
    pub fn connect(&self, peer: &Arc<WireBase>) {
        *self.peer.lock() = Some(Arc::downgrade(peer));
    }

    fn peer(&self) -> Option<Arc<WireBase>> {
        self.peer.lock().as_ref().and_then(Weak::upgrade)
    }

    pub fn queued(&self) -> usize {
        self.outbox.lock().len()
    }

    /// Hands every queued frame to the peer wire. Returns how many were delivered.
    pub fn deliver(&self) -> usize {
        let Some(peer) = self.peer() else {
            return 0;
        };
        let mut count = 0;
        loop {
            let next = self.outbox.lock().pop_front();
            let Some(frame) = next else {
                return count;
            };
            peer.receive_frame(&frame).expect("peer rejected a frame");
            count += 1;
        }
    }

    /// Takes the queued frames without delivering them.
    pub fn take_queued(&self) -> Vec<Vec<u8>> {
        self.outbox.lock().drain(..).collect()
    }

    /// Drops every queued frame, as a lossy link would.
    pub fn drop_queued(&self) -> usize {
        let mut outbox = self.outbox.lock();
        let count = outbox.len();
        outbox.clear();
        count
    }
}

impl Transport for LocalTransport {
    fn send_frame(&self, frame: Vec<u8>) {
        if self.inline {
            if let Some(peer) = self.peer() {
                peer.receive_frame(&frame).expect("peer rejected a frame");
                return;
            }
        }
        self.outbox.lock().push_back(frame);
    }
}

/// Pair of connected transports for end-to-end testing
pub struct LocalTransportPair {
    pub client_to_server: Arc<LocalTransport>,
    pub server_to_client: Arc<LocalTransport>,
}

impl LocalTransportPair {
    /// Frames wait until delivered explicitly.
    pub fn queued() -> Self {
        Self {
            client_to_server: LocalTransport::new(false),
            server_to_client: LocalTransport::new(false),
        }
    }

    /// Frames reach the peer during the send call.
    pub fn inline() -> Self {
        Self {
            client_to_server: LocalTransport::new(true),
            server_to_client: LocalTransport::new(true),
        }
    }

    pub fn connect(&self, client: &Arc<WireBase>, server: &Arc<WireBase>) {
        self.client_to_server.connect(server);
        self.server_to_client.connect(client);
    }

    /// Delivers queued frames both ways. Returns how many were delivered.
    pub fn deliver(&self) -> usize {
        self.client_to_server.deliver() + self.server_to_client.deliver()
    }
}
