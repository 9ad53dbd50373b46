use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::resource::SharedResource;

/// Every datagram exchanged on the shared UDP port is one JSON object with
/// a top-level `type` tag, matching exactly one of these variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Packet {
    #[serde(rename = "announcement")]
    Announcement { username: String, timestamp: DateTime<Utc> },
    #[serde(rename = "disconnection")]
    Disconnection { username: String, timestamp: DateTime<Utc> },
    #[serde(rename = "message")]
    Message { data: Message },
    #[serde(rename = "file_share")]
    FileShare(FileSharePacket),
}

/// Sub-tagged on `action`, nested inside a `file_share` packet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum FileSharePacket {
    #[serde(rename = "announce")]
    Announce { data: SharedResource },
    #[serde(rename = "add_access")]
    AddAccess { data: AccessUpdate },
    #[serde(rename = "remove_access")]
    RemoveAccess { data: AccessUpdate },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessUpdate {
    pub resource_id: String,
    pub username: String,
}

impl Packet {
    pub fn announcement(username: &str, now: DateTime<Utc>) -> Self {
        Packet::Announcement {
            username: username.to_string(),
            timestamp: now,
        }
    }

    pub fn disconnection(username: &str, now: DateTime<Utc>) -> Self {
        Packet::Disconnection {
            username: username.to_string(),
            timestamp: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announcement_wire_shape() {
        let packet = Packet::announcement("a#aaaa", Utc::now());
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["type"], "announcement");
        assert_eq!(json["username"], "a#aaaa");
    }

    #[test]
    fn file_share_announce_wire_shape() {
        let resource = SharedResource {
            resource_id: "a#aaaa_1_x".to_string(),
            owner: "a#aaaa".to_string(),
            path: "/tmp/x".to_string(),
            is_directory: false,
            allowed_users: Default::default(),
            shared_to_all: true,
            timestamp: Utc::now(),
            modified_time: 123.0,
            ftp_password: "secret".to_string(),
        };
        let packet = Packet::FileShare(FileSharePacket::Announce { data: resource });
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["type"], "file_share");
        assert_eq!(json["action"], "announce");
        assert_eq!(json["data"]["owner"], "a#aaaa");
    }

    #[test]
    fn access_update_wire_shape() {
        let packet = Packet::FileShare(FileSharePacket::RemoveAccess {
            data: AccessUpdate {
                resource_id: "r1".to_string(),
                username: "b#bbbb".to_string(),
            },
        });
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["type"], "file_share");
        assert_eq!(json["action"], "remove_access");
        assert_eq!(json["data"]["resource_id"], "r1");
    }

    #[test]
    fn decodes_message_packet() {
        let raw = serde_json::json!({
            "type": "message",
            "data": {
                "id": "abc",
                "sender": "a#aaaa",
                "recipient": "b#bbbb",
                "title": "hi",
                "content": "hello",
                "timestamp": Utc::now().to_rfc3339(),
                "conversation_id": "abcde",
            }
        });
        let packet: Packet = serde_json::from_value(raw).unwrap();
        assert!(matches!(packet, Packet::Message { .. }));
    }

    #[test]
    fn unknown_type_fails_to_decode() {
        let raw = serde_json::json!({"type": "unknown_thing"});
        let result: Result<Packet, _> = serde_json::from_value(raw);
        assert!(result.is_err());
    }
}
