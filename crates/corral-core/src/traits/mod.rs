// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions for the Corral relay.
//!
//! The agent engine, the tool-use security policy, and the chat platform
//! adapters are external collaborators; the relay core only sees these
//! interfaces, so every trait here can be satisfied by a trivial stub in
//! tests.

pub mod adapter;
pub mod channel;
pub mod engine;
pub mod policy;

pub use adapter::PluginAdapter;
pub use channel::ChannelAdapter;
pub use engine::AgentEngine;
pub use policy::ToolPolicy;
