//! # Audio Module
//!
//! Per-guild playback engine.
//!
//! ## Architecture
//!
//! ### [`player`] - Guild Player
//! - One actor task per guild owning queue, current track and voice session
//! - Track advance with loop policy, seek/replay, idle disconnect
//! - Stale completion signals discarded by play token
//!
//! ### [`queue`] - Queue Management
//! - Ordered upcoming tracks with move/swap/remove/shuffle
//! - Loop modes and queue pagination
//!
//! ### [`registry`] - Guild Registry
//! - Guild to player map, created on join and torn down on leave
//! - [`registry::GuildHandle`], the command API used by the bot layer
//!
//! ### [`session`] - Collaborator seams
//! - Voice session, chat notifier and stream resolver traits
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let registry = GuildRegistry::new(deps);
//! let guild = registry.ensure(guild_id);
//!
//! guild.play(tracks, Some(channel_id), Some(notifier)).await?;
//! guild.pause().await?;
//! guild.resume().await?;
//! guild.skip(None).await?;
//! ```

pub mod player;
pub mod queue;
pub mod registry;
pub mod session;
pub mod track;
