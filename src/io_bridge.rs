//! Sharing the port address space between several devices.
//!
//! A [PortBridge] owns a set of [PortClient]s, each of which occupies a contiguous range
//! of ports. The bridge implements [InputOutput], so an [Emulator](crate::emulator::Emulator)
//! only sees plain port reads and writes.

use slog::{debug, o, trace, Discard, Logger};

use std::collections::BTreeMap;
use std::fmt;

use crate::emulator::InputOutput;

const PORT_COUNT: u32 = 0x10000;

/// A device connected to a [PortBridge].
///
/// Ports passed to [read](PortClient::read) and [write](PortClient::write) are offsets
/// from the base port the bridge assigned to the client.
pub trait PortClient {
    /// Number of consecutive ports the device needs.
    fn required_ports(&self) -> u16;

    fn preferred_base(&self) -> u16;

    /// Whether the device accepts a base other than the preferred one.
    fn can_relocate(&self) -> bool;

    /// Called when the device was connected at a base other than the preferred one.
    fn relocated(&mut self, _base: u16) {}

    fn read(&mut self, offset: u16) -> u16;

    fn write(&mut self, offset: u16, value: u16);
}

/// Handle of a connected client.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(usize);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BridgeError {
    /// The client asked for zero ports.
    NoPorts,

    /// The preferred range of a client that cannot relocate is taken or runs past the
    /// last port.
    Unavailable {
        base: u16,
        ports: u16,
    },

    /// There is no free range large enough for the client.
    Exhausted {
        ports: u16,
    },

    NotConnected(ClientId),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BridgeError::NoPorts =>
                write!(f, "client does not require any ports"),
            BridgeError::Unavailable { base, ports } =>
                write!(f, "{} ports starting at 0x{:04X} are not available", ports, base),
            BridgeError::Exhausted { ports } =>
                write!(f, "no free range of {} ports", ports),
            BridgeError::NotConnected(id) =>
                write!(f, "client {} is not connected", id.0),
        }
    }
}

impl std::error::Error for BridgeError {}

struct Connection {
    base: u16,
    ports: u16,
    client: Box<dyn PortClient>,
}

impl Connection {
    fn end(&self) -> u32 {
        self.base as u32 + self.ports as u32
    }
}

/// Routes port accesses to the client owning the port.
///
/// Ports that belong to no client read as 0 and ignore writes.
pub struct PortBridge {
    connections: BTreeMap<ClientId, Connection>,

    /// Base port of every connection.
    bases: BTreeMap<u16, ClientId>,

    next_id: usize,
    log: Logger,
}

impl PortBridge {
    pub fn new() -> PortBridge {
        PortBridge::with_logger(None)
    }

    pub fn with_logger<L>(logger: L) -> PortBridge
    where
        L: Into<Option<Logger>>,
    {
        let log = logger.into()
            .unwrap_or_else(|| Logger::root(Discard, o!()))
            .new(o!("stage" => "io"));

        PortBridge {
            connections: BTreeMap::new(),
            bases: BTreeMap::new(),
            next_id: 0,
            log,
        }
    }

    /// Connects a client and assigns it a range of ports.
    ///
    /// The preferred base is used when the whole range is free. Otherwise a client that
    /// can relocate gets the lowest free range large enough and is notified through
    /// [PortClient::relocated].
    ///
    /// # Returns
    /// The handle of the client and its assigned base port.
    pub fn connect(&mut self, mut client: Box<dyn PortClient>) -> Result<(ClientId, u16), BridgeError> {
        let ports = client.required_ports();
        let preferred = client.preferred_base();

        if ports == 0 {
            return Err(BridgeError::NoPorts);
        }

        let base = if self.is_free(preferred as u32, ports as u32) {
            preferred
        } else if client.can_relocate() {
            let base = self.find_free(ports as u32)
                .ok_or(BridgeError::Exhausted { ports })?;

            client.relocated(base);
            base
        } else {
            return Err(BridgeError::Unavailable { base: preferred, ports });
        };

        let id = ClientId(self.next_id);
        self.next_id += 1;

        debug!(self.log, "client connected"; "client" => id.0, "base" => base, "ports" => ports);

        self.bases.insert(base, id);
        self.connections.insert(id, Connection { base, ports, client });

        Ok((id, base))
    }

    /// Disconnects a client, freeing its ports.
    ///
    /// # Returns
    /// The client that was connected.
    pub fn disconnect(&mut self, id: ClientId) -> Result<Box<dyn PortClient>, BridgeError> {
        let connection = self.connections.remove(&id)
            .ok_or(BridgeError::NotConnected(id))?;

        self.bases.remove(&connection.base);
        debug!(self.log, "client disconnected"; "client" => id.0, "base" => connection.base);

        Ok(connection.client)
    }

    /// Base port assigned to a connected client.
    pub fn base(&self, id: ClientId) -> Option<u16> {
        self.connections.get(&id).map(|connection| connection.base)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn is_free(&self, base: u32, ports: u32) -> bool {
        let end = base + ports;

        end <= PORT_COUNT && self.connections.values()
            .all(|connection| connection.end() <= base || end <= connection.base as u32)
    }

    fn find_free(&self, ports: u32) -> Option<u16> {
        let mut candidate = 0u32;

        for connection in self.bases.values().filter_map(|id| self.connections.get(id)) {
            if connection.base as u32 >= candidate + ports {
                break;
            }

            candidate = candidate.max(connection.end());
        }

        if candidate + ports <= PORT_COUNT {
            Some(candidate as u16)
        } else {
            None
        }
    }

    fn route(&mut self, port: u16) -> Option<(&mut Connection, u16)> {
        let id = *self.bases.range(..=port).next_back()?.1;
        let connection = self.connections.get_mut(&id)?;

        if (port as u32) < connection.end() {
            let offset = port - connection.base;
            Some((connection, offset))
        } else {
            None
        }
    }
}

impl Default for PortBridge {
    fn default() -> PortBridge {
        PortBridge::new()
    }
}

impl fmt::Debug for PortBridge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut builder = f.debug_map();

        for (id, connection) in &self.connections {
            builder.entry(&id.0, &format!("{:04X}..{:05X}", connection.base, connection.end()));
        }

        builder.finish()
    }
}

impl InputOutput for PortBridge {
    fn input(&mut self, port: u16) -> u16 {
        let value = match self.route(port) {
            Some((connection, offset)) => connection.client.read(offset),
            None => 0,
        };

        trace!(self.log, "input"; "port" => port, "value" => value);

        value
    }

    fn output(&mut self, port: u16, data: u16) {
        trace!(self.log, "output"; "port" => port, "value" => data);

        if let Some((connection, offset)) = self.route(port) {
            connection.client.write(offset, data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::{Emulator, FlatMemory};
    use crate::symbolic::Program;

    use std::cell::RefCell;
    use std::rc::Rc;

    /// A bank of registers that remembers where it was relocated to.
    struct Registers {
        values: Vec<u16>,
        preferred_base: u16,
        can_relocate: bool,
        relocated_to: Rc<RefCell<Option<u16>>>,
    }

    impl Registers {
        fn new(ports: usize, preferred_base: u16, can_relocate: bool) -> Registers {
            Registers {
                values: vec![0; ports],
                preferred_base,
                can_relocate,
                relocated_to: Rc::new(RefCell::new(None)),
            }
        }
    }

    impl PortClient for Registers {
        fn required_ports(&self) -> u16 {
            self.values.len() as u16
        }

        fn preferred_base(&self) -> u16 {
            self.preferred_base
        }

        fn can_relocate(&self) -> bool {
            self.can_relocate
        }

        fn relocated(&mut self, base: u16) {
            *self.relocated_to.borrow_mut() = Some(base);
        }

        fn read(&mut self, offset: u16) -> u16 {
            self.values[offset as usize]
        }

        fn write(&mut self, offset: u16, value: u16) {
            self.values[offset as usize] = value;
        }
    }

    #[test]
    fn test_connect_and_route() {
        let mut bridge = PortBridge::new();

        let (first, base) = bridge.connect(Box::new(Registers::new(4, 0x10, false))).unwrap();
        assert_eq!(base, 0x10);
        assert_eq!(bridge.base(first), Some(0x10));

        bridge.output(0x12, 99);
        assert_eq!(bridge.input(0x12), 99);
        assert_eq!(bridge.input(0x14), 0);
        assert_eq!(bridge.input(0x0F), 0);

        bridge.output(0x20, 5);
        assert_eq!(bridge.input(0x20), 0);
    }

    #[test]
    fn test_conflicts() {
        let mut bridge = PortBridge::new();
        bridge.connect(Box::new(Registers::new(4, 0, false))).unwrap();

        assert_eq!(
            bridge.connect(Box::new(Registers::new(2, 3, false))).err(),
            Some(BridgeError::Unavailable { base: 3, ports: 2 }),
        );

        let relocatable = Registers::new(2, 3, true);
        let relocated_to = relocatable.relocated_to.clone();

        let (_, base) = bridge.connect(Box::new(relocatable)).unwrap();
        assert_eq!(base, 4);
        assert_eq!(*relocated_to.borrow(), Some(4));

        assert_eq!(
            bridge.connect(Box::new(Registers::new(0, 0, true))).err(),
            Some(BridgeError::NoPorts),
        );
        assert_eq!(
            bridge.connect(Box::new(Registers::new(2, 0xFFFF, false))).err(),
            Some(BridgeError::Unavailable { base: 0xFFFF, ports: 2 }),
        );
    }

    #[test]
    fn test_relocation_fills_gaps() {
        let mut bridge = PortBridge::new();
        bridge.connect(Box::new(Registers::new(2, 0, false))).unwrap();
        bridge.connect(Box::new(Registers::new(2, 5, false))).unwrap();

        let (_, base) = bridge.connect(Box::new(Registers::new(3, 0, true))).unwrap();
        assert_eq!(base, 2);

        let (_, base) = bridge.connect(Box::new(Registers::new(4, 0, true))).unwrap();
        assert_eq!(base, 7);
    }

    #[test]
    fn test_disconnect() {
        let mut bridge = PortBridge::new();
        let (id, _) = bridge.connect(Box::new(Registers::new(1, 8, false))).unwrap();

        bridge.output(8, 1);
        let client = bridge.disconnect(id).unwrap();
        assert_eq!(client.required_ports(), 1);
        assert_eq!(bridge.input(8), 0);
        assert!(bridge.is_empty());

        assert_eq!(bridge.disconnect(id).err(), Some(BridgeError::NotConnected(id)));
        assert!(bridge.connect(Box::new(Registers::new(1, 8, false))).is_ok());
    }

    #[test]
    fn test_emulator_through_bridge() {
        let program = Program::parse("COPYI A, 0x55\nOUTI A, 0x21\nINI B, 0x21\nHALT")
            .unwrap()
            .compile()
            .unwrap();

        let mut bridge = PortBridge::new();
        bridge.connect(Box::new(Registers::new(2, 0x20, false))).unwrap();

        let mut emulator = Emulator::new(FlatMemory::with_program(&program.bytes), bridge);
        emulator.run().unwrap();

        assert_eq!(emulator.context.r[1], 0x55);
    }
}
