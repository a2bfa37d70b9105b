//! Output container definitions and the input extension allow-list.

use serde::{Deserialize, Serialize};

/// Container formats a job can be remuxed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    /// MPEG-4 Part 14
    #[default]
    Mp4,
    /// WebM (Matroska subset)
    Webm,
    /// Matroska
    Mkv,
    /// QuickTime
    Mov,
    /// Audio Video Interleave
    Avi,
    /// Apple MPEG-4 variant
    M4v,
    /// Flash Video
    Flv,
    /// Animated GIF, the only target that has to be re-encoded
    Gif,
}

impl TargetFormat {
    /// Returns the file extension (without the dot).
    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Mp4 => "mp4",
            TargetFormat::Webm => "webm",
            TargetFormat::Mkv => "mkv",
            TargetFormat::Mov => "mov",
            TargetFormat::Avi => "avi",
            TargetFormat::M4v => "m4v",
            TargetFormat::Flv => "flv",
            TargetFormat::Gif => "gif",
        }
    }

    /// Returns the MIME type used when delivering the artifact.
    pub fn mime_type(&self) -> &'static str {
        match self {
            TargetFormat::Mp4 => "video/mp4",
            TargetFormat::Webm => "video/webm",
            TargetFormat::Mkv => "video/x-matroska",
            TargetFormat::Mov => "video/quicktime",
            TargetFormat::Avi => "video/x-msvideo",
            TargetFormat::M4v => "video/x-m4v",
            TargetFormat::Flv => "video/x-flv",
            TargetFormat::Gif => "image/gif",
        }
    }

    /// Returns a human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            TargetFormat::Mp4 => "MP4",
            TargetFormat::Webm => "WebM",
            TargetFormat::Mkv => "MKV",
            TargetFormat::Mov => "MOV",
            TargetFormat::Avi => "AVI",
            TargetFormat::M4v => "M4V",
            TargetFormat::Flv => "FLV",
            TargetFormat::Gif => "GIF",
        }
    }

    /// Whether the audio/video bitstreams can be copied without re-encoding.
    pub fn supports_stream_copy(&self) -> bool {
        !matches!(self, TargetFormat::Gif)
    }

    /// Muxer options that make the output progressively readable.
    pub fn streaming_flags(&self) -> &'static [&'static str] {
        match self {
            TargetFormat::Mp4 | TargetFormat::Mov | TargetFormat::M4v => {
                &["-movflags", "+faststart"]
            }
            TargetFormat::Mkv | TargetFormat::Webm => &["-cues_to_front", "1"],
            TargetFormat::Flv => &["-flvflags", "add_keyframe_index"],
            TargetFormat::Avi | TargetFormat::Gif => &[],
        }
    }

    /// Parse a format from an extension or name, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_lowercase();
        Self::all().iter().copied().find(|f| f.extension() == ext)
    }

    /// All available formats.
    pub fn all() -> &'static [TargetFormat] {
        &[
            TargetFormat::Mp4,
            TargetFormat::Webm,
            TargetFormat::Mkv,
            TargetFormat::Mov,
            TargetFormat::Avi,
            TargetFormat::M4v,
            TargetFormat::Flv,
            TargetFormat::Gif,
        ]
    }
}

impl std::fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Supported input file extensions.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &["mkv", "avi", "mov", "mp4", "webm", "flv", "m4v"]
}

/// Check if a file extension is accepted as conversion input.
pub fn is_supported_extension(ext: &str) -> bool {
    let ext_lower = ext.trim_start_matches('.').to_lowercase();
    supported_input_extensions().iter().any(|e| *e == ext_lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_gif_requires_reencode() {
        for format in TargetFormat::all() {
            assert_eq!(format.supports_stream_copy(), *format != TargetFormat::Gif);
        }
    }

    #[test]
    fn test_streaming_flags() {
        assert_eq!(TargetFormat::Mp4.streaming_flags(), &["-movflags", "+faststart"]);
        assert_eq!(TargetFormat::Webm.streaming_flags(), &["-cues_to_front", "1"]);
        assert!(TargetFormat::Gif.streaming_flags().is_empty());
    }

    #[test]
    fn test_from_extension() {
        assert_eq!(TargetFormat::from_extension("MKV"), Some(TargetFormat::Mkv));
        assert_eq!(TargetFormat::from_extension(".gif"), Some(TargetFormat::Gif));
        assert_eq!(TargetFormat::from_extension("wmv"), None);
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_extension("mkv"));
        assert!(is_supported_extension("MOV"));
        assert!(!is_supported_extension("gif"));
        assert!(!is_supported_extension("txt"));
    }

    #[test]
    fn test_serde_uses_extension_names() {
        let json = serde_json::to_string(&TargetFormat::M4v).unwrap();
        assert_eq!(json, "\"m4v\"");
        let back: TargetFormat = serde_json::from_str("\"webm\"").unwrap();
        assert_eq!(back, TargetFormat::Webm);
    }
}
