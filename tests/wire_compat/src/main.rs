fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use feedwire_protocol::{ClientPacket, RequestKind, ServerPacket};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (key order is ignored).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  wire: {fixture}\n  Rust: {reserialized}"
        );
        parsed
    }

    /// Decodes a fixture the way the session does: one raw line at a time.
    fn decode_line(name: &str) -> ServerPacket {
        let line = load_fixture(name).to_string();
        ServerPacket::decode(&line).unwrap_or_else(|e| panic!("failed to decode {name}: {e}"))
    }

    // --- Client packets ---

    #[test]
    fn fixture_listen_request() {
        let packet = roundtrip_test::<ClientPacket>("listen_request.json");
        assert_eq!(packet.nonce(), Some("44h1k13746815ab1r2"));
    }

    #[test]
    fn listen_request_builder_matches_fixture() {
        let built = ClientPacket::request(
            RequestKind::Listen,
            "44h1k13746815ab1r2",
            vec!["channel-bits-events-v1.44322889".into()],
            Some("cfabdegwdoklmawdzdo98xt2fo512y".into()),
        );
        let encoded: serde_json::Value = serde_json::from_str(&built.encode().unwrap()).unwrap();
        assert_eq!(encoded, load_fixture("listen_request.json"));
    }

    #[test]
    fn fixture_listen_request_anonymous() {
        let packet = roundtrip_test::<ClientPacket>("listen_request_anonymous.json");
        let ClientPacket::Listen { data, .. } = packet else {
            panic!("expected LISTEN");
        };
        assert_eq!(data.auth_token, None);
        assert_eq!(data.topics.len(), 2);
    }

    #[test]
    fn fixture_unlisten_request() {
        let packet = roundtrip_test::<ClientPacket>("unlisten_request.json");
        assert!(matches!(packet, ClientPacket::Unlisten { .. }));
    }

    #[test]
    fn fixture_ping() {
        let packet = roundtrip_test::<ClientPacket>("ping.json");
        assert_eq!(packet, ClientPacket::Ping);
        assert_eq!(packet.encode().unwrap(), r#"{"type":"PING"}"#);
    }

    // --- Server packets ---

    #[test]
    fn fixture_pong() {
        assert_eq!(roundtrip_test::<ServerPacket>("pong.json"), ServerPacket::Pong);
        assert_eq!(decode_line("pong.json"), ServerPacket::Pong);
    }

    #[test]
    fn fixture_reconnect() {
        assert_eq!(
            roundtrip_test::<ServerPacket>("reconnect.json"),
            ServerPacket::Reconnect
        );
    }

    #[test]
    fn fixture_response_ok() {
        let packet = roundtrip_test::<ServerPacket>("response_ok.json");
        assert!(matches!(&packet, ServerPacket::Response { nonce, .. } if nonce == "44h1k13746815ab1r2"));
        assert_eq!(packet.error_text(), None, "empty error string means success");
    }

    #[test]
    fn fixture_response_error() {
        let packet = roundtrip_test::<ServerPacket>("response_error.json");
        assert_eq!(packet.error_text(), Some("ERR_BADAUTH"));
    }

    #[test]
    fn fixture_message() {
        let packet = roundtrip_test::<ServerPacket>("message.json");
        let ServerPacket::Message { data } = packet else {
            panic!("expected MESSAGE");
        };
        assert_eq!(data.topic, "channel-bits-events-v1.44322889");

        let payload = data.decode().unwrap();
        assert_eq!(payload["message_type"], "bits_event");
        assert_eq!(payload["data"]["bits_used"], 10000);
    }

    #[test]
    fn raw_fixture_lines_decode() {
        // Pretty-printed files include newlines and indentation; the line
        // decoder must accept them after trimming.
        for name in ["response_error.json", "message.json", "reconnect.json"] {
            let raw = read_fixture(name);
            ServerPacket::decode(&raw).unwrap_or_else(|e| panic!("{name}: {e}"));
        }
    }

    // --- Backward compatibility: fields the server may omit ---

    #[test]
    fn response_without_error_field_is_success() {
        let packet = ServerPacket::decode(r#"{"type":"RESPONSE","nonce":"n"}"#).unwrap();
        assert_eq!(packet.error_text(), None);
    }

    #[test]
    fn response_without_nonce_decodes() {
        let packet = ServerPacket::decode(r#"{"type":"RESPONSE","error":"ERR_SERVER"}"#).unwrap();
        assert!(matches!(&packet, ServerPacket::Response { nonce, .. } if nonce.is_empty()));
        assert_eq!(packet.error_text(), Some("ERR_SERVER"));
    }

    #[test]
    fn unknown_packet_types_are_tolerated() {
        let packet =
            ServerPacket::decode(r#"{"type":"AUTH_REVOKED","data":{"topics":["x"]}}"#).unwrap();
        assert_eq!(packet, ServerPacket::Unknown);
    }
}
