// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for CRUD operations on storage entities.

pub mod bindings;
pub mod cleanup;
pub mod messages;
pub mod pending;
pub mod runs;
