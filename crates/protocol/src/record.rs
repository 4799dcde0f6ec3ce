//! Persisted and exchanged record types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A controller-managed identity, as chosen for a sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identifier {
	/// Human-readable alias.
	pub name: String,
	/// Internal identifier prefix.
	pub prefix: String,
}

impl Identifier {
	pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			prefix: prefix.into(),
		}
	}
}

/// Association between a site and the identity used to sign in there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigninRecord {
	pub id: String,
	pub domain: String,
	pub identifier: Identifier,
	#[serde(default)]
	pub auto_signin: bool,
	/// Unix milliseconds.
	#[serde(default)]
	pub created_at: u64,
	/// Unix milliseconds of last use.
	#[serde(default)]
	pub updated_at: u64,
}

/// Header name to value map produced by a signing request.
pub type SignedHeaders = BTreeMap<String, String>;

/// Secret unlocking the local identity client.
///
/// Serializes as a plain string but never prints its contents.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Passcode(String);

impl Passcode {
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the secret value.
	pub fn expose(&self) -> &str {
		&self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.trim().is_empty()
	}
}

impl fmt::Debug for Passcode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("Passcode(<redacted>)")
	}
}

impl From<&str> for Passcode {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

impl From<String> for Passcode {
	fn from(value: String) -> Self {
		Self(value)
	}
}
