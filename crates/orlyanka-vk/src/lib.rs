//! # orlyanka-vk
//!
//! The VK Bots API layer for the orlyanka game bot.
//!
//! This crate owns everything that talks to the platform:
//!
//! - **API client**: token-authenticated HTTPS calls with the VK
//!   response/error envelope ([`VkApi`], [`ApiTransport`])
//! - **Update model**: typed long-poll updates ([`Update`], [`Message`])
//! - **Update feed**: the blocking `wait()` contract and its Bots Long Poll
//!   implementation ([`UpdateFeed`], [`LongPollFeed`])
//! - **Execute pool**: rate-limit-friendly batching of outbound calls into
//!   single `execute` requests ([`ExecutePool`], [`ApiCall`])
//!
//! Game rules, sessions and the payment ledger live in `orlyanka-bot`; this
//! crate knows nothing about them.
//!
//! ```text
//! ┌──────────────┐  wait()   ┌────────────┐  enqueue()  ┌─────────────┐
//! │ LongPollFeed │──────────▶│  the bot   │────────────▶│ ExecutePool │
//! └──────────────┘           └────────────┘             └──────┬──────┘
//!         │                                                    │ ≤25 calls
//!         ▼                                                    ▼
//!   api.vk.com (a_check)                              api.vk.com (execute)
//! ```

pub mod api;
pub mod error;
pub mod execute;
pub mod feed;
pub mod update;

pub use api::{ApiTransport, VkApi};
pub use error::{ApiError, ApiResult};
pub use execute::{ApiCall, ExecutePool};
pub use feed::{LongPollFeed, UpdateFeed};
pub use update::{Membership, Message, Update};
