//! Metrics emitter boundary.
//!
//! The core hands a finished root transaction to anything implementing
//! [`RecordTiming`]; aggregation, sampling, and retry are that collaborator's
//! problem. The bundled implementation is [`StatsdClient`], a minimal
//! plain-text statsd timer over UDP.

use std::net::UdpSocket;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::config::{Config, KEY_STATSD_HOST, KEY_STATSD_PORT};

/// Sink for named timing measurements.
///
/// Called exactly once per completed root transaction. Implementations must
/// not panic; a transport failure is theirs to swallow or log.
pub trait RecordTiming: Send + Sync {
    /// Records `millis` milliseconds under `name`.
    fn record_timing(&self, name: &str, millis: u64);
}

/// Error constructing a statsd client.
#[derive(Debug, Error)]
pub enum EmitError {
    /// A required statsd configuration key is absent.
    #[error("missing {key:?} config")]
    MissingConfig {
        /// The absent key.
        key: &'static str,
    },
    /// `STATSD_PORT` does not parse as a port number.
    #[error("invalid STATSD_PORT value {value:?}")]
    InvalidPort {
        /// The raw configured value.
        value: String,
    },
    /// The UDP socket could not be created or connected.
    #[error("unable to open statsd socket for {target}")]
    Socket {
        /// The statsd `host:port` target.
        target: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Plain-text statsd client emitting `name:value|ms` timer datagrams.
#[derive(Debug)]
pub struct StatsdClient {
    socket: UdpSocket,
    target: String,
}

impl StatsdClient {
    /// Builds a client from `STATSD_HOST` and `STATSD_PORT`.
    ///
    /// Fails fast when either key is absent or the port is malformed; the
    /// socket is bound and connected immediately so a bad target surfaces
    /// here, not at emission time.
    pub fn from_config(config: &Config) -> Result<Self, EmitError> {
        let host = config
            .get(KEY_STATSD_HOST)
            .ok_or(EmitError::MissingConfig {
                key: KEY_STATSD_HOST,
            })?;
        let port_raw = config
            .get(KEY_STATSD_PORT)
            .ok_or(EmitError::MissingConfig {
                key: KEY_STATSD_PORT,
            })?;
        let port: u16 = port_raw.parse().map_err(|_| EmitError::InvalidPort {
            value: port_raw.to_string(),
        })?;
        Self::connect(host, port)
    }

    /// Builds a client for an explicit `host:port` target.
    pub fn connect(host: &str, port: u16) -> Result<Self, EmitError> {
        let target = format!("{host}:{port}");
        let socket = UdpSocket::bind("0.0.0.0:0").and_then(|socket| {
            socket.connect(&*target)?;
            Ok(socket)
        });
        match socket {
            Ok(socket) => Ok(Self { socket, target }),
            Err(source) => Err(EmitError::Socket { target, source }),
        }
    }

    /// Returns the `host:port` this client sends to.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Renders one timer datagram payload.
    fn payload(name: &str, millis: u64) -> String {
        format!("{name}:{millis}|ms")
    }
}

impl RecordTiming for StatsdClient {
    fn record_timing(&self, name: &str, millis: u64) {
        let payload = Self::payload(name, millis);
        // Fire-and-forget: statsd is UDP, a lost datagram is acceptable.
        if let Err(err) = self.socket.send(payload.as_bytes()) {
            tracing::warn!(target = %self.target, %err, "statsd send failed");
        }
    }
}

/// Emitter that discards every measurement.
///
/// Default sink for [`TracerBuilder`](crate::TracerBuilder) when no emitter
/// is injected; useful for tests and for running instrumented code without
/// a metrics backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEmitter;

impl RecordTiming for NullEmitter {
    fn record_timing(&self, _name: &str, _millis: u64) {}
}

static GLOBAL_CLIENT: Mutex<Option<Arc<StatsdClient>>> = Mutex::new(None);

/// Returns the process-wide statsd client, constructing it on first use.
///
/// The first successful construction wins and is cached for the remaining
/// process lifetime. A failed construction surfaces the error and leaves the
/// slot empty, so a later call with fixed configuration can still succeed.
pub fn global_client(config: &Config) -> Result<Arc<StatsdClient>, EmitError> {
    let mut slot = GLOBAL_CLIENT.lock();
    if let Some(client) = slot.as_ref() {
        return Ok(Arc::clone(client));
    }
    let client = Arc::new(StatsdClient::from_config(config)?);
    *slot = Some(Arc::clone(&client));
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KEY_APP_NAME;

    #[test]
    fn from_config_requires_host_then_port() {
        let mut config = Config::new();
        config.set(KEY_APP_NAME, "Test App");

        let err = StatsdClient::from_config(&config).unwrap_err();
        assert!(matches!(
            err,
            EmitError::MissingConfig {
                key: KEY_STATSD_HOST
            }
        ));

        config.set(KEY_STATSD_HOST, "127.0.0.1");
        let err = StatsdClient::from_config(&config).unwrap_err();
        assert!(matches!(
            err,
            EmitError::MissingConfig {
                key: KEY_STATSD_PORT
            }
        ));

        config.set(KEY_STATSD_PORT, "not-a-port");
        let err = StatsdClient::from_config(&config).unwrap_err();
        assert!(matches!(err, EmitError::InvalidPort { .. }));

        config.set(KEY_STATSD_PORT, "8125");
        let client = StatsdClient::from_config(&config).unwrap();
        assert_eq!(client.target(), "127.0.0.1:8125");
    }

    #[test]
    fn payload_format() {
        assert_eq!(
            StatsdClient::payload("carpy.app.host.Test.ok", 1234),
            "carpy.app.host.Test.ok:1234|ms"
        );
        assert_eq!(StatsdClient::payload("n", 0), "n:0|ms");
    }

    #[test]
    fn timing_datagram_reaches_the_wire() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(std::time::Duration::from_secs(5)))
            .unwrap();
        let port = receiver.local_addr().unwrap().port();

        let client = StatsdClient::connect("127.0.0.1", port).unwrap();
        client.record_timing("carpy.app.host.Test.ok", 42);

        let mut buf = [0u8; 256];
        let n = receiver.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"carpy.app.host.Test.ok:42|ms");
    }

    #[test]
    fn global_client_failure_does_not_poison_later_success() {
        // First call with empty config must fail without caching anything.
        let empty = Config::new();
        assert!(global_client(&empty).is_err());

        let mut config = Config::new();
        config.set(KEY_STATSD_HOST, "127.0.0.1");
        config.set(KEY_STATSD_PORT, "8125");
        let first = global_client(&config).unwrap();

        // Later calls return the cached instance even with different config.
        let second = global_client(&empty).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
