//! Inbound requests from the popup and content scripts.

use serde::{Deserialize, Serialize};

use crate::record::{Identifier, Passcode, SigninRecord};

/// Every request the background broker understands.
///
/// Serialized with an inline `type` tag:
/// ```json
/// { "type": "delete-signin", "id": "3f0c..." }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Request {
	FetchSignins,
	DeleteSignin {
		id: String,
	},
	UpdateAutoSignin {
		signin: SigninRecord,
	},
	CreateSignin {
		domain: String,
		identifier: Identifier,
		#[serde(default)]
		auto_signin: bool,
	},
	GetAutoSignin {
		domain: String,
	},
	Connect {
		agent_url: String,
		passcode: Passcode,
	},
	IsConnected,
	Disconnect,
	Logout,
	FetchIdentifiers,
	GetSignedHeaders {
		origin: String,
		signin: SigninRecord,
		#[serde(default)]
		method: Option<String>,
		#[serde(default)]
		path: Option<String>,
	},
}

impl Request {
	/// Wire name of this request kind.
	pub fn kind(&self) -> &'static str {
		match self {
			Request::FetchSignins => "fetch-signins",
			Request::DeleteSignin { .. } => "delete-signin",
			Request::UpdateAutoSignin { .. } => "update-auto-signin",
			Request::CreateSignin { .. } => "create-signin",
			Request::GetAutoSignin { .. } => "get-auto-signin",
			Request::Connect { .. } => "connect",
			Request::IsConnected => "is-connected",
			Request::Disconnect => "disconnect",
			Request::Logout => "logout",
			Request::FetchIdentifiers => "fetch-identifiers",
			Request::GetSignedHeaders { .. } => "get-signed-headers",
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn unit_requests_parse_from_type_only() {
		let request: Request = serde_json::from_value(json!({ "type": "fetch-signins" })).unwrap();
		assert_eq!(request, Request::FetchSignins);
		assert_eq!(request.kind(), "fetch-signins");
	}

	#[test]
	fn connect_fields_are_camel_case() {
		let request: Request = serde_json::from_value(json!({
			"type": "connect",
			"agentUrl": "http://example.com/agent",
			"passcode": "test-passcode"
		}))
		.unwrap();
		match request {
			Request::Connect { agent_url, passcode } => {
				assert_eq!(agent_url, "http://example.com/agent");
				assert_eq!(passcode.expose(), "test-passcode");
			}
			other => panic!("unexpected request: {other:?}"),
		}
	}

	#[test]
	fn signed_headers_method_and_path_are_optional() {
		let request: Request = serde_json::from_value(json!({
			"type": "get-signed-headers",
			"origin": "https://x.com",
			"signin": {
				"id": "a",
				"domain": "x.com",
				"identifier": { "name": "alice", "prefix": "EAbc" }
			}
		}))
		.unwrap();
		let Request::GetSignedHeaders { method, path, .. } = request else {
			panic!("expected get-signed-headers");
		};
		assert!(method.is_none());
		assert!(path.is_none());
	}

	#[test]
	fn unknown_type_is_rejected() {
		let parsed = serde_json::from_value::<Request>(json!({ "type": "launch-rockets" }));
		assert!(parsed.is_err());
	}

	#[test]
	fn connect_debug_hides_passcode() {
		let request = Request::Connect {
			agent_url: "http://example.com/agent".into(),
			passcode: Passcode::new("test-passcode"),
		};
		assert!(!format!("{request:?}").contains("test-passcode"));
	}
}
