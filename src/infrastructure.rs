//! Infrastructure layer - transports, configuration and logging
//!
//! Concrete `ProgressTransport` implementations live here, along with the
//! configuration loader and the tracing setup used by the binary.

pub mod channel_transport;
pub mod config;
pub mod http_transport;
pub mod logging;
pub mod sse_codec;

// Re-export commonly used items
pub use channel_transport::{ChannelFeed, ChannelTransport};
pub use config::{AppConfig, ConfigError, ConfigManager, LoggingConfig, MonitorConfig};
pub use http_transport::{stream_url, HttpProgressTransport};
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use sse_codec::SseDecoder;
