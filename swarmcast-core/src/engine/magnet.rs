//! Magnet link parsing

use data_encoding::BASE32;
use url::Url;

use super::{EngineError, InfoHash};

const BTIH_PREFIX: &str = "urn:btih:";

/// Parsed magnet link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    pub info_hash: InfoHash,
    pub display_name: Option<String>,
    pub trackers: Vec<String>,
    /// The link exactly as submitted, handed to the engine unchanged
    pub raw: String,
}

impl MagnetLink {
    /// Parses a magnet URI carrying a BitTorrent v1 info hash.
    ///
    /// Accepts the 40 character hex form and the 32 character base32 form of
    /// the `xt=urn:btih:` topic.
    ///
    /// # Errors
    /// - `EngineError::InvalidMagnet` - Malformed URI or missing/invalid info hash
    pub fn parse(magnet_uri: &str) -> Result<Self, EngineError> {
        let trimmed = magnet_uri.trim();
        let url = Url::parse(trimmed).map_err(|e| EngineError::InvalidMagnet {
            reason: e.to_string(),
        })?;
        if url.scheme() != "magnet" {
            return Err(EngineError::InvalidMagnet {
                reason: format!("unsupported scheme {:?}", url.scheme()),
            });
        }

        let mut info_hash = None;
        let mut display_name = None;
        let mut trackers = Vec::new();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "xt" if info_hash.is_none() => {
                    if let Some(topic) = btih_topic(&value) {
                        info_hash = Some(parse_topic(topic)?);
                    }
                }
                "dn" if !value.is_empty() => display_name = Some(value.into_owned()),
                "tr" => trackers.push(value.into_owned()),
                _ => {}
            }
        }

        let info_hash = info_hash.ok_or_else(|| EngineError::InvalidMagnet {
            reason: "missing xt=urn:btih: topic".to_string(),
        })?;

        Ok(Self {
            info_hash,
            display_name,
            trackers,
            raw: trimmed.to_string(),
        })
    }

    /// Builds a magnet URI for a known info hash.
    pub fn build(info_hash: InfoHash, display_name: &str, trackers: &[String]) -> String {
        let mut link = format!(
            "magnet:?xt={BTIH_PREFIX}{info_hash}&dn={}",
            urlencoding::encode(display_name)
        );
        for tracker in trackers {
            link.push_str("&tr=");
            link.push_str(&urlencoding::encode(tracker));
        }
        link
    }

    /// Name to show before metadata arrives.
    pub fn fallback_name(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| format!("Torrent_{}", &self.info_hash.to_string()[..16]))
    }
}

fn btih_topic(value: &str) -> Option<&str> {
    value
        .get(..BTIH_PREFIX.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(BTIH_PREFIX))
        .map(|_| &value[BTIH_PREFIX.len()..])
}

fn parse_topic(topic: &str) -> Result<InfoHash, EngineError> {
    match topic.len() {
        40 => InfoHash::from_hex(topic),
        32 => decode_base32(topic),
        other => Err(EngineError::InvalidMagnet {
            reason: format!("invalid hash length: {other} (expected 40 hex or 32 base32)"),
        }),
    }
}

fn decode_base32(encoded: &str) -> Result<InfoHash, EngineError> {
    let invalid = |detail: String| EngineError::InvalidMagnet {
        reason: format!("invalid base32 info hash {encoded:?}: {detail}"),
    };
    let bytes = BASE32
        .decode(encoded.to_ascii_uppercase().as_bytes())
        .map_err(|e| invalid(e.to_string()))?;
    let hash: [u8; 20] = bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| invalid(format!("{} bytes", bytes.len())))?;
    Ok(InfoHash::new(hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX_MAGNET: &str = "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&dn=Big.Buck.Bunny&tr=http://tracker.example.com/announce";

    #[test]
    fn test_parse_hex_magnet() {
        let magnet = MagnetLink::parse(HEX_MAGNET).unwrap();
        assert_eq!(
            magnet.info_hash.to_string(),
            "0123456789abcdef0123456789abcdef01234567"
        );
        assert_eq!(magnet.display_name.as_deref(), Some("Big.Buck.Bunny"));
        assert_eq!(magnet.trackers.len(), 1);
    }

    #[test]
    fn test_parse_base32_magnet() {
        // Base32 of bytes 0x00..0x13
        let magnet =
            MagnetLink::parse("magnet:?xt=urn:btih:AAAQEAYEAUDAOCAJBIFQYDIOB4IBCEQT").unwrap();
        let expected: Vec<u8> = (0u8..20).collect();
        assert_eq!(magnet.info_hash.as_bytes().as_slice(), expected.as_slice());

        let lowercase =
            MagnetLink::parse("magnet:?xt=urn:btih:aaaqeayeaudaocajbifqydiob4ibceqt").unwrap();
        assert_eq!(lowercase.info_hash, magnet.info_hash);
    }

    #[test]
    fn test_parse_rejects_bad_base32() {
        let result = MagnetLink::parse("magnet:?xt=urn:btih:AAAQEAYEAUDAOCAJBIFQYDIOB4IBCEQ1");
        assert!(matches!(result, Err(EngineError::InvalidMagnet { .. })));
    }

    #[test]
    fn test_parse_rejects_missing_topic() {
        let result = MagnetLink::parse("magnet:?dn=nothing");
        assert!(matches!(result, Err(EngineError::InvalidMagnet { .. })));
    }

    #[test]
    fn test_parse_decodes_display_name() {
        let magnet = MagnetLink::parse(
            "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&dn=Wallace+And+Gromit%202024",
        )
        .unwrap();
        assert_eq!(magnet.display_name.as_deref(), Some("Wallace And Gromit 2024"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(MagnetLink::parse("invalid-magnet").is_err());
        assert!(MagnetLink::parse("http://example.com/?xt=urn:btih:0123456789abcdef0123456789abcdef01234567").is_err());
        assert!(MagnetLink::parse("magnet:?xt=urn:btih:1234").is_err());
    }

    #[test]
    fn test_fallback_name_without_display_name() {
        let magnet = MagnetLink::parse(
            "magnet:?xt=urn:btih:fedcba9876543210fedcba9876543210fedcba98",
        )
        .unwrap();
        assert!(magnet.fallback_name().starts_with("Torrent_fedcba9876543210"));
    }

    #[test]
    fn test_build_parses_back() {
        let info_hash = InfoHash::new([7u8; 20]);
        let link = MagnetLink::build(info_hash, "My Movie.mkv", &[]);
        let magnet = MagnetLink::parse(&link).unwrap();
        assert_eq!(magnet.info_hash, info_hash);
        assert_eq!(magnet.display_name.as_deref(), Some("My Movie.mkv"));
    }
}
