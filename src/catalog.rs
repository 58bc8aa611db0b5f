//! Format catalog: the resolutions and frame-rate ranges a device reports
//!
//! Matching is by exact `(width, height)` only. The frame-rate range is
//! carried along for callers but never consulted by [`FormatCatalog::find`].

use crate::errors::{Result, UvcError};
use crate::types::{FrameRateRange, Resolution};
use serde::{Deserialize, Serialize};

/// UVC video-streaming format subtype of a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatKind {
    Uncompressed,
    Mjpeg,
    FrameBased,
    Other(u8),
}

impl FormatKind {
    pub fn from_descriptor_subtype(subtype: u8) -> Self {
        match subtype {
            0x04 => FormatKind::Uncompressed,
            0x06 => FormatKind::Mjpeg,
            0x10 => FormatKind::FrameBased,
            other => FormatKind::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatEntry {
    pub resolution: Resolution,
    pub frame_rate: Option<FrameRateRange>,
    pub kind: FormatKind,
}

/// Ordered, immutable list of supported formats for one device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatCatalog {
    entries: Vec<FormatEntry>,
}

#[derive(Deserialize)]
struct RawCatalog {
    formats: Vec<RawFormat>,
}

#[derive(Deserialize)]
struct RawFormat {
    #[serde(rename = "type", default)]
    subtype: u8,
    #[serde(default)]
    sizes: Vec<RawSize>,
}

#[derive(Deserialize)]
struct RawSize {
    width: u32,
    height: u32,
    #[serde(default)]
    fps: Option<[f32; 2]>,
}

impl FormatCatalog {
    pub fn new(entries: Vec<FormatEntry>) -> Self {
        Self { entries }
    }

    /// Decode a `getSupportedVideoSize` payload.
    ///
    /// An empty `formats` list is a valid (if useless) catalog; anything that
    /// does not decode into entries is `MalformedCatalog`.
    pub fn parse(device_id: &str, payload: &str) -> Result<Self> {
        let malformed = |reason: String| UvcError::MalformedCatalog {
            device_id: device_id.to_string(),
            reason,
        };

        let raw: RawCatalog = serde_json::from_str(payload).map_err(|e| malformed(e.to_string()))?;

        let mut entries = Vec::new();
        for format in raw.formats {
            let kind = FormatKind::from_descriptor_subtype(format.subtype);
            for size in format.sizes {
                let resolution =
                    Resolution::new(size.width, size.height).map_err(|e| malformed(e.to_string()))?;
                let frame_rate = match size.fps {
                    Some([min, max]) => {
                        Some(FrameRateRange::new(min, max).map_err(|e| malformed(e.to_string()))?)
                    }
                    None => None,
                };
                entries.push(FormatEntry {
                    resolution,
                    frame_rate,
                    kind,
                });
            }
        }

        Ok(Self { entries })
    }

    /// Exact size lookup; `None` means the device does not support it
    pub fn find(&self, width: u32, height: u32) -> Option<&FormatEntry> {
        self.entries
            .iter()
            .find(|e| e.resolution.width == width && e.resolution.height == height)
    }

    pub fn supports(&self, resolution: Resolution) -> bool {
        self.find(resolution.width, resolution.height).is_some()
    }

    pub fn entries(&self) -> &[FormatEntry] {
        &self.entries
    }

    /// Distinct resolutions in catalog order
    pub fn resolutions(&self) -> Vec<Resolution> {
        let mut out: Vec<Resolution> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if !out.contains(&entry.resolution) {
                out.push(entry.resolution);
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_SIZES: &str = r#"{"formats":[{"type":6,"sizes":[
        {"width":640,"height":480,"fps":[15.0,30.0]},
        {"width":1280,"height":720,"fps":[30.0,30.0]}
    ]}]}"#;

    #[test]
    fn test_find_exact_match() {
        let catalog = FormatCatalog::parse("cam0", TWO_SIZES).unwrap();
        let entry = catalog.find(640, 480).unwrap();
        assert_eq!(entry.resolution, Resolution::new(640, 480).unwrap());
        assert_eq!(entry.frame_rate, Some(FrameRateRange::new(15.0, 30.0).unwrap()));
        assert_eq!(entry.kind, FormatKind::Mjpeg);
    }

    #[test]
    fn test_find_no_nearest_neighbour() {
        let catalog = FormatCatalog::parse("cam0", TWO_SIZES).unwrap();
        assert!(catalog.find(800, 600).is_none());
        assert!(catalog.find(1280, 721).is_none());
    }

    #[test]
    fn test_empty_catalog_is_valid() {
        let catalog = FormatCatalog::parse("cam0", r#"{"formats":[]}"#).unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.find(640, 480).is_none());
    }

    #[test]
    fn test_malformed_payloads() {
        for payload in [
            "",
            "[]",
            r#"{"sizes":[]}"#,
            r#"{"formats":[{"type":6,"sizes":[{"width":0,"height":480}]}]}"#,
            r#"{"formats":[{"type":6,"sizes":[{"width":640,"height":480,"fps":[30.0,15.0]}]}]}"#,
        ] {
            let err = FormatCatalog::parse("cam0", payload).unwrap_err();
            assert!(
                matches!(err, UvcError::MalformedCatalog { .. }),
                "payload {:?} gave {:?}",
                payload,
                err
            );
        }
    }

    #[test]
    fn test_entries_flattened_in_order() {
        let payload = r#"{"formats":[
            {"type":4,"sizes":[{"width":640,"height":480}]},
            {"type":16,"sizes":[{"width":1920,"height":1080},{"width":640,"height":480}]}
        ]}"#;
        let catalog = FormatCatalog::parse("cam0", payload).unwrap();
        assert_eq!(catalog.len(), 3);
        // first match wins
        assert_eq!(catalog.find(640, 480).unwrap().kind, FormatKind::Uncompressed);
        assert_eq!(catalog.entries()[1].kind, FormatKind::FrameBased);
        assert_eq!(catalog.resolutions().len(), 2);
    }
}
