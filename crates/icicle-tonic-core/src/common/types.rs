use serde::{Deserialize, Serialize};

/// Payload a server stores on its member node: the bind addresses a client
/// can reach the advertising process on.
///
/// Only `rpc` is ever consumed; `thrift` is carried for compatibility with
/// deployments that still populate it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// RPC bind addresses, `"host:port"`.
    pub rpc: Vec<String>,
    #[serde(default)]
    pub thrift: Vec<String>,
}

/// `Ping` reply status of a healthy server.
pub const PING_STATUS_OK: i32 = 0;

/// URI for dialing a `"host:port"` bind address.
pub fn endpoint_uri(addr: &str) -> String {
    format!("http://{addr}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_json_round_trip() {
        let peer = Peer {
            rpc: vec!["10.0.0.1:8080".to_string(), "10.0.0.1:8081".to_string()],
            thrift: Vec::new(),
        };
        let json = serde_json::to_string(&peer).unwrap();
        assert_eq!(json, r#"{"rpc":["10.0.0.1:8080","10.0.0.1:8081"],"thrift":[]}"#);
        assert_eq!(serde_json::from_str::<Peer>(&json).unwrap(), peer);
    }

    #[test]
    fn peer_json_tolerates_a_missing_thrift_list() {
        let peer: Peer = serde_json::from_str(r#"{"rpc":["a:1"]}"#).unwrap();
        assert_eq!(peer.rpc, vec!["a:1"]);
        assert!(peer.thrift.is_empty());
    }

    #[test]
    fn endpoint_uri_prefixes_the_scheme() {
        assert_eq!(endpoint_uri("127.0.0.1:8080"), "http://127.0.0.1:8080");
    }
}
