//! Thin Supabase Realtime client over Phoenix Channels v1 protocol.
//!
//! Provides a WebSocket client for Supabase Realtime `postgres_changes`
//! using `tokio-tungstenite`. Handles heartbeats, channel join/leave,
//! join acknowledgment, and auto-reconnect with backoff.

mod client;
mod connection;
mod handler;
mod types;

pub use client::RealtimeClient;
pub use types::{ChannelConfig, PhoenixMessage, PostgresChangesFilter, RealtimeConfig, RealtimeEvent};
