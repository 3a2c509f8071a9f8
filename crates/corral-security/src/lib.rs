// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output sanitization, URL safety validation, and tool-use policies for
//! the Corral relay.

pub mod policy;
pub mod redact;
pub mod url;

pub use policy::{PathRestrictedPolicy, PermissivePolicy};
pub use redact::{redact, sanitize_output, truncate};
pub use url::{is_private_ip, validate_webhook_url};
