use crate::error::WireError;
use crate::packer::{Packer, Unpacker};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound for preallocating the player list of a parsed record.
/// A single datagram cannot carry more players than this anyway.
const MAX_PREALLOCATED_PLAYERS: usize = 64;

/// One player line of a server info record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub name: String,
    pub clan: String,
    pub country: i32,
    pub score: i32,
    #[serde(rename = "type")]
    pub kind: i32,
}

impl PlayerInfo {
    fn pack(&self, packer: &mut Packer) {
        packer
            .add_string(&self.name)
            .add_string(&self.clan)
            .add_int(self.country)
            .add_int(self.score)
            .add_int(self.kind);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> Result<Self, WireError> {
        Ok(Self {
            name: unpacker.next_sanitized_string(&[])?,
            clan: unpacker.next_sanitized_string(&[])?,
            country: unpacker.next_int()?,
            score: unpacker.next_int()?,
            kind: unpacker.next_int()?,
        })
    }
}

/// Status of a single game server as reported by itself.
///
/// `address` is not part of the wire record; it is filled in with the
/// endpoint the reply came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub address: String,
    pub version: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    pub map: String,
    #[serde(rename = "gametype")]
    pub game_type: String,
    pub server_flags: u8,
    pub skill_level: u8,
    pub num_players: i32,
    pub max_players: i32,
    pub num_clients: i32,
    pub max_clients: i32,
    pub players: Vec<PlayerInfo>,
}

impl ServerInfo {
    /// Re-derives `num_clients` from the player list.
    pub fn normalize(&mut self) {
        self.num_clients = i32::try_from(self.players.len()).unwrap_or(i32::MAX);
    }

    /// True for a record that carries no server data at all.
    pub fn is_empty(&self) -> bool {
        self.version.is_empty()
            && self.name.is_empty()
            && self.map.is_empty()
            && self.game_type.is_empty()
            && self.max_clients == 0
            && self.players.is_empty()
    }

    /// Serializes the wire record.
    ///
    /// The client count written is always the length of `players`, whatever
    /// `num_clients` currently holds.
    pub fn to_bytes(&self) -> Vec<u8> {
        let num_clients = i32::try_from(self.players.len()).unwrap_or(i32::MAX);

        let mut packer = Packer::with_capacity(128 + self.players.len() * 32);
        packer
            .add_string(&self.version)
            .add_string(&self.name)
            .add_string(&self.hostname)
            .add_string(&self.map)
            .add_string(&self.game_type)
            .add_byte(self.server_flags)
            .add_byte(self.skill_level)
            .add_int(self.num_players)
            .add_int(self.max_players)
            .add_int(num_clients)
            .add_int(self.max_clients);

        for player in &self.players {
            player.pack(&mut packer);
        }
        packer.into_bytes()
    }

    /// Parses a wire record received from `address`.
    pub fn parse(record: &[u8], address: impl Into<String>) -> Result<Self, WireError> {
        let mut unpacker = Unpacker::new(record);

        let mut info = ServerInfo {
            address: address.into(),
            version: unpacker.next_string()?,
            name: unpacker.next_sanitized_string(&[])?,
            hostname: unpacker.next_string()?,
            map: unpacker.next_string()?,
            game_type: unpacker.next_string()?,
            server_flags: unpacker.next_byte()?,
            skill_level: unpacker.next_byte()?,
            num_players: unpacker.next_int()?,
            max_players: unpacker.next_int()?,
            num_clients: unpacker.next_int()?,
            max_clients: unpacker.next_int()?,
            players: Vec::new(),
        };

        let count = usize::try_from(info.num_clients)
            .map_err(|_| WireError::MalformedRecord("negative client count"))?;

        info.players.reserve(count.min(MAX_PREALLOCATED_PLAYERS));
        for _ in 0..count {
            info.players.push(PlayerInfo::unpack(&mut unpacker)?);
        }

        Ok(info)
    }
}

impl fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?} [{}] {} {}/{}",
            self.address,
            self.name,
            self.game_type,
            self.map,
            self.players.len(),
            self.max_clients
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zcatch_info() -> ServerInfo {
        ServerInfo {
            address: "127.0.0.1:8303".to_string(),
            version: "0.7.4".to_string(),
            name: "Simply zCatch".to_string(),
            map: "ctf1".to_string(),
            max_players: 16,
            max_clients: 16,
            players: vec![
                PlayerInfo {
                    name: "player1".to_string(),
                    ..Default::default()
                },
                PlayerInfo {
                    name: "player2".to_string(),
                    clan: "clan2".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_record_roundtrip_normalizes_client_count() {
        let info = zcatch_info();
        assert_eq!(info.num_clients, 0);

        let parsed = ServerInfo::parse(&info.to_bytes(), "127.0.0.1:8303").unwrap();

        let mut expected = info;
        expected.normalize();
        assert_eq!(parsed.num_clients, 2);
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_populated_record_roundtrip() {
        let mut info = ServerInfo {
            address: "[2001:db8::1]:8305".to_string(),
            version: "0.7.5".to_string(),
            name: "DM | Fun".to_string(),
            hostname: "fun.example.org".to_string(),
            map: "dm1".to_string(),
            game_type: "DM".to_string(),
            server_flags: 3,
            skill_level: 2,
            num_players: 3,
            max_players: 12,
            num_clients: 99,
            max_clients: 16,
            players: (0..3)
                .map(|i| PlayerInfo {
                    name: format!("p{}", i),
                    clan: "c".to_string(),
                    country: -1,
                    score: 1000 * i,
                    kind: i % 2,
                })
                .collect(),
        };

        let parsed = ServerInfo::parse(&info.to_bytes(), info.address.clone()).unwrap();
        info.normalize();
        assert_eq!(parsed, info);
    }

    #[test]
    fn test_truncated_record() {
        let bytes = zcatch_info().to_bytes();
        // drop the trailing player fields
        let result = ServerInfo::parse(&bytes[..bytes.len() - 2], "x");
        assert!(result.is_err());
    }

    #[test]
    fn test_negative_client_count_rejected() {
        let mut packer = Packer::new();
        packer
            .add_string("0.7.4")
            .add_string("n")
            .add_string("")
            .add_string("m")
            .add_string("g")
            .add_byte(0)
            .add_byte(0)
            .add_int(0)
            .add_int(8)
            .add_int(-3)
            .add_int(8);

        assert_eq!(
            ServerInfo::parse(packer.as_bytes(), "x"),
            Err(WireError::MalformedRecord("negative client count"))
        );
    }

    #[test]
    fn test_display_names_are_sanitized() {
        let mut info = zcatch_info();
        info.name = "bad\x07name".to_string();
        info.players[0].name = "pl\x1bayer".to_string();

        let parsed = ServerInfo::parse(&info.to_bytes(), "x").unwrap();
        assert_eq!(parsed.name, "bad name");
        assert_eq!(parsed.players[0].name, "pl ayer");
    }

    #[test]
    fn test_is_empty() {
        assert!(ServerInfo::default().is_empty());
        assert!(!zcatch_info().is_empty());
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(zcatch_info()).unwrap();
        assert_eq!(json["gametype"], "");
        assert!(json.get("game_type").is_none());
        assert!(json.get("hostname").is_none());
        assert_eq!(json["max_clients"], 16);
        assert_eq!(json["players"][1]["clan"], "clan2");
        assert_eq!(json["players"][1]["type"], 0);
    }

    #[test]
    fn test_json_hostname_roundtrip() {
        let mut info = zcatch_info();
        info.hostname = "zcatch.example.org".to_string();
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"hostname\":\"zcatch.example.org\""));

        let mut without = serde_json::to_value(zcatch_info()).unwrap();
        without["name"] = "renamed".into();
        let parsed: ServerInfo = serde_json::from_value(without).unwrap();
        assert_eq!(parsed.hostname, "");
        assert_eq!(parsed.name, "renamed");
    }
}
