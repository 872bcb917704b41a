//! Twilio media-stream websocket frames.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Inbound frame, tagged by `event`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CarrierEvent {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },
    Start {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        start: StartMeta,
    },
    Media {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        media: MediaPayload,
    },
    Mark {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        mark: MarkPayload,
    },
    Dtmf {
        dtmf: DtmfPayload,
    },
    Stop {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        #[serde(default)]
        stop: Option<StopMeta>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMeta {
    #[serde(default)]
    pub stream_sid: Option<String>,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub account_sid: Option<String>,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
    #[serde(default)]
    pub media_format: Option<MediaFormat>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    pub encoding: String,
    pub sample_rate: u32,
    #[serde(default = "one")]
    pub channels: u16,
}

fn one() -> u16 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaPayload {
    #[serde(default)]
    pub track: Option<String>,
    pub payload: String,
}

impl MediaPayload {
    /// Raw audio bytes carried by this frame.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.payload.as_bytes())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkPayload {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DtmfPayload {
    pub digit: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopMeta {
    #[serde(default)]
    pub call_sid: Option<String>,
}

impl CarrierEvent {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Start { .. } => "start",
            Self::Media { .. } => "media",
            Self::Mark { .. } => "mark",
            Self::Dtmf { .. } => "dtmf",
            Self::Stop { .. } => "stop",
            Self::Unknown => "unknown",
        }
    }
}

/// Outbound frame sent to the carrier.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboundFrame {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: MarkPayload,
    },
    /// Drop any audio the carrier has buffered but not yet played.
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

impl OutboundFrame {
    pub fn media(stream_sid: &str, audio: &[u8]) -> Self {
        Self::Media {
            stream_sid: stream_sid.to_string(),
            media: OutboundMedia {
                payload: STANDARD.encode(audio),
            },
        }
    }

    pub fn mark(stream_sid: &str, name: impl Into<String>) -> Self {
        Self::Mark {
            stream_sid: stream_sid.to_string(),
            mark: MarkPayload { name: name.into() },
        }
    }

    pub fn clear(stream_sid: &str) -> Self {
        Self::Clear {
            stream_sid: stream_sid.to_string(),
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing these plain structs cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_with_custom_parameters() {
        let raw = r#"{
            "event": "start",
            "sequenceNumber": "1",
            "streamSid": "MZ123",
            "start": {
                "accountSid": "AC1",
                "streamSid": "MZ123",
                "callSid": "CA456",
                "tracks": ["inbound"],
                "customParameters": {"payerId": "1003"},
                "mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1}
            }
        }"#;
        match CarrierEvent::parse(raw).unwrap() {
            CarrierEvent::Start { stream_sid, start } => {
                assert_eq!(stream_sid.as_deref(), Some("MZ123"));
                assert_eq!(start.call_sid.as_deref(), Some("CA456"));
                assert_eq!(start.custom_parameters["payerId"], "1003");
                assert_eq!(start.media_format.unwrap().sample_rate, 8000);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_media_and_decode() {
        let raw = r#"{"event":"media","streamSid":"MZ1","media":{"track":"inbound","chunk":"2","timestamp":"40","payload":"AQID"}}"#;
        match CarrierEvent::parse(raw).unwrap() {
            CarrierEvent::Media { media, .. } => assert_eq!(media.decode().unwrap(), vec![1, 2, 3]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_stop_and_unknown() {
        let stop = CarrierEvent::parse(r#"{"event":"stop","streamSid":"MZ1","stop":{"callSid":"CA1"}}"#).unwrap();
        assert_eq!(stop.name(), "stop");

        let unknown = CarrierEvent::parse(r#"{"event":"something_new","foo":1}"#).unwrap();
        assert!(matches!(unknown, CarrierEvent::Unknown));
    }

    #[test]
    fn test_outbound_media_frame_shape() {
        let json: serde_json::Value =
            serde_json::from_str(&OutboundFrame::media("MZ9", &[1, 2, 3]).to_json()).unwrap();
        assert_eq!(json["event"], "media");
        assert_eq!(json["streamSid"], "MZ9");
        assert_eq!(json["media"]["payload"], "AQID");

        let clear: serde_json::Value =
            serde_json::from_str(&OutboundFrame::clear("MZ9").to_json()).unwrap();
        assert_eq!(clear["event"], "clear");
    }
}
