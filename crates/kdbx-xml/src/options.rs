//! Load and save options.

use serde::{Deserialize, Serialize};

/// Where a document keeps its binary pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PayloadLocation {
    /// `<Meta><Binaries>` inside the XML (KDBX 3.x).
    #[default]
    Meta,
    /// Outside the XML, in the container's inner header (KDBX 4.x).
    External,
}

/// Options for reading a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Accept legacy attachment nodes that carry base64 content instead of a `Ref`.
    pub accept_inline_values: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            accept_inline_values: true,
        }
    }
}

impl LoadOptions {
    #[must_use]
    pub fn with_inline_values(mut self, accept: bool) -> Self {
        self.accept_inline_values = accept;
        self
    }
}

/// Options for writing a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOptions {
    pub payload_location: PayloadLocation,
    /// Gzip payloads written into `<Meta><Binaries>`.
    pub compress_payloads: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            payload_location: PayloadLocation::Meta,
            compress_payloads: true,
        }
    }
}

impl SaveOptions {
    #[must_use]
    pub fn with_payload_location(mut self, location: PayloadLocation) -> Self {
        self.payload_location = location;
        self
    }

    #[must_use]
    pub fn with_compression(mut self, enable: bool) -> Self {
        self.compress_payloads = enable;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert!(LoadOptions::default().accept_inline_values);
        let save = SaveOptions::default();
        assert_eq!(save.payload_location, PayloadLocation::Meta);
        assert!(save.compress_payloads);
    }

    #[test]
    fn options_serialize() {
        let options = SaveOptions::default()
            .with_payload_location(PayloadLocation::External)
            .with_compression(false);
        let json = serde_json::to_string(&options).expect("serialize options");
        let round: SaveOptions = serde_json::from_str(&json).expect("deserialize options");
        assert_eq!(round, options);
    }
}
