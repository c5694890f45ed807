use std::sync::Arc;

use rd_shared::{
    IdKind, Lifetime, LifetimeDefinition, Protocol, ProtocolConfig, PumpScheduler, RdBindable,
    Scheduler, SynchronousScheduler, WireBase,
};

use crate::local_transport::{LocalTransport, LocalTransportPair};

const MAX_EXCHANGE_ROUNDS: usize = 1000;

/// One side of a [`TestEndpoints`] pair.
pub struct TestPeer {
    pub protocol: Arc<Protocol>,
    pub wire: Arc<WireBase>,
    pump: Option<Arc<PumpScheduler>>,
    lifetime: LifetimeDefinition,
}

impl TestPeer {
    fn new(config: ProtocolConfig, pumped: bool, transport: Arc<LocalTransport>) -> Self {
        let pump = pumped.then(|| Arc::new(PumpScheduler::new(config.name.clone())));
        let scheduler: Arc<dyn Scheduler> = match &pump {
            Some(pump) => pump.clone(),
            None => Arc::new(SynchronousScheduler::new()),
        };
        let lifetime = LifetimeDefinition::new();
        let (protocol, wire) = Protocol::over_transport(config, scheduler, transport, &lifetime);
        wire.set_connected(true);
        Self {
            protocol,
            wire,
            pump,
            lifetime,
        }
    }

    /// Runs `f` as if on this peer's scheduler.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.pump {
            Some(pump) => pump.run_active(f),
            None => f(),
        }
    }

    /// Runs queued work. Always zero for a synchronous peer.
    pub fn pump(&self) -> usize {
        self.pump.as_ref().map_or(0, |pump| pump.pump())
    }

    pub fn bind(&self, entity: &dyn RdBindable, name: &str) {
        self.run(|| self.protocol.bind_static(entity, name));
    }

    pub fn lifetime(&self) -> &Lifetime {
        self.lifetime.lifetime()
    }

    /// Tears down everything bound to this peer.
    pub fn disconnect(&self) {
        self.run(|| {
            self.lifetime.terminate();
        });
    }
}

/// Client and server protocols wired to each other in memory.
pub struct TestEndpoints {
    pub client: TestPeer,
    pub server: TestPeer,
    pub transports: LocalTransportPair,
}

impl TestEndpoints {
    /// Peers on pump schedulers with queued transports. Nothing moves until
    /// [`TestEndpoints::exchange`] is called.
    pub fn new() -> Self {
        Self::with_configs(client_config(), server_config())
    }

    pub fn with_configs(client: ProtocolConfig, server: ProtocolConfig) -> Self {
        Self::build(client, server, true)
    }

    /// Peers on synchronous schedulers with inline transports: every message is handled
    /// before the send returns. Blocking calls work from the test thread.
    pub fn synchronous() -> Self {
        Self::synchronous_with_configs(client_config(), server_config())
    }

    pub fn synchronous_with_configs(client: ProtocolConfig, server: ProtocolConfig) -> Self {
        Self::build(client, server, false)
    }

    fn build(client: ProtocolConfig, server: ProtocolConfig, pumped: bool) -> Self {
        let transports = if pumped {
            LocalTransportPair::queued()
        } else {
            LocalTransportPair::inline()
        };
        let client = TestPeer::new(client, pumped, transports.client_to_server.clone());
        let server = TestPeer::new(server, pumped, transports.server_to_client.clone());
        transports.connect(&client.wire, &server.wire);
        Self {
            client,
            server,
            transports,
        }
    }

    /// Binds `client_entity` and `server_entity` under the same name on each side.
    pub fn bind(&self, client_entity: &dyn RdBindable, server_entity: &dyn RdBindable, name: &str) {
        self.client.bind(client_entity, name);
        self.server.bind(server_entity, name);
    }

    /// Delivers frames and pumps both schedulers until nothing moves. Returns how many
    /// frames and actions were processed.
    pub fn exchange(&self) -> usize {
        let mut total = 0;
        for _ in 0..MAX_EXCHANGE_ROUNDS {
            let moved = self.transports.deliver() + self.client.pump() + self.server.pump();
            if moved == 0 {
                return total;
            }
            total += moved;
        }
        panic!("endpoints did not settle after {} rounds", MAX_EXCHANGE_ROUNDS);
    }
}

impl Default for TestEndpoints {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestEndpoints {
    fn drop(&mut self) {
        self.client.disconnect();
        self.server.disconnect();
    }
}

fn client_config() -> ProtocolConfig {
    ProtocolConfig::new("client", IdKind::Client)
}

fn server_config() -> ProtocolConfig {
    ProtocolConfig::new("server", IdKind::Server)
}
