//! The request engine: process config, the upstream HTTP client, wire
//! encoding, credential refresh, the flow-monitor event sink, and C9's
//! per-request dispatch loop that ties C2-C5 (kiro-identity) and C6-C8
//! (kiro-adapters) together.

pub mod config;
pub mod engine;
pub mod events;
pub mod refresher;
pub mod upstream;
pub mod wire;

pub use config::{load as load_config, ConfigError, IdentityConfig, ProxyConfig};
pub use engine::{RequestEngine, StreamDelta, StreamItem};
pub use events::{Event, EventHub, EventSink, TracingEventSink};
pub use refresher::OAuthRefresher;
pub use upstream::UpstreamClient;
