//! Target formats.
//!
//! The modelled formats cover what the converter is known to produce
//! correctly. Anything else is carried through as [`AudioFormat::Other`] and
//! must be recognised by the transcoder before a run starts.

use crate::error::ConfigError;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Names that parse but are known not to round-trip through the codec.
const BROKEN_FORMATS: &[(&str, &str)] = &[
    ("aac", "raw AAC output loses tags; use 'm4a'"),
    ("oggflac", "Ogg FLAC output is not produced reliably"),
    ("shorten", "no Shorten encoder is available"),
    ("shn", "no Shorten encoder is available"),
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Aiff,
    Alac,
    Au,
    Flac,
    M4a,
    Mp2,
    Mp3,
    Opus,
    Speex,
    Vorbis,
    Wav,
    WavPack,
    /// Container name passed straight to the transcoder; also used as the extension.
    Other(String),
}

impl AudioFormat {
    pub const MODELLED: &'static [AudioFormat] = &[
        AudioFormat::Aiff,
        AudioFormat::Alac,
        AudioFormat::Au,
        AudioFormat::Flac,
        AudioFormat::M4a,
        AudioFormat::Mp2,
        AudioFormat::Mp3,
        AudioFormat::Opus,
        AudioFormat::Speex,
        AudioFormat::Vorbis,
        AudioFormat::Wav,
        AudioFormat::WavPack,
    ];

    pub fn name(&self) -> &str {
        match self {
            AudioFormat::Aiff => "aiff",
            AudioFormat::Alac => "alac",
            AudioFormat::Au => "au",
            AudioFormat::Flac => "flac",
            AudioFormat::M4a => "m4a",
            AudioFormat::Mp2 => "mp2",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Opus => "opus",
            AudioFormat::Speex => "speex",
            AudioFormat::Vorbis => "vorbis",
            AudioFormat::Wav => "wav",
            AudioFormat::WavPack => "wavpack",
            AudioFormat::Other(name) => name,
        }
    }

    /// File extension of converted files, without the dot.
    pub fn extension(&self) -> &str {
        match self {
            AudioFormat::Aiff => "aiff",
            AudioFormat::Alac => "m4a",
            AudioFormat::Au => "au",
            AudioFormat::Flac => "flac",
            AudioFormat::M4a => "m4a",
            AudioFormat::Mp2 => "mp2",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Opus => "opus",
            AudioFormat::Speex => "spx",
            AudioFormat::Vorbis => "ogg",
            AudioFormat::Wav => "wav",
            AudioFormat::WavPack => "wv",
            AudioFormat::Other(name) => name,
        }
    }
}

impl FromStr for AudioFormat {
    type Err = ConfigError;

    /// Accepts short names (`opus`), common extensions (`ogg`, `wv`) and the
    /// long `XxxAudio` identifiers (`OpusAudio`), case-insensitively.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let lowered = input.trim().to_ascii_lowercase();
        let name = lowered
            .strip_suffix("audio")
            .filter(|rest| !rest.is_empty())
            .unwrap_or(lowered.as_str());

        if let Some((broken, reason)) = BROKEN_FORMATS.iter().find(|(n, _)| *n == name) {
            return Err(ConfigError::UnsupportedFormat {
                name: broken.to_string(),
                reason: reason.to_string(),
            });
        }

        let format = match name {
            "aiff" | "aif" => AudioFormat::Aiff,
            "alac" => AudioFormat::Alac,
            "au" => AudioFormat::Au,
            "flac" => AudioFormat::Flac,
            "m4a" => AudioFormat::M4a,
            "mp2" => AudioFormat::Mp2,
            "mp3" => AudioFormat::Mp3,
            "opus" => AudioFormat::Opus,
            "speex" | "spx" => AudioFormat::Speex,
            "vorbis" | "ogg" => AudioFormat::Vorbis,
            "wav" | "wave" => AudioFormat::Wav,
            "wavpack" | "wv" => AudioFormat::WavPack,
            other if !other.is_empty() && other.chars().all(|c| c.is_ascii_alphanumeric()) => {
                AudioFormat::Other(other.to_string())
            }
            _ => return Err(ConfigError::UnknownFormat(input.to_string())),
        };

        Ok(format)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for AudioFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Target format plus the optional encoder preset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatSpec {
    pub format: AudioFormat,
    pub quality: Option<String>,
}

impl FormatSpec {
    pub fn new(format: AudioFormat, quality: Option<String>) -> Result<Self, ConfigError> {
        let quality = match quality {
            Some(q) if q.trim().is_empty() => return Err(ConfigError::EmptyQuality),
            Some(q) => Some(q.trim().to_string()),
            None => None,
        };
        Ok(Self { format, quality })
    }

    /// Parses `format` and wraps it with `quality`.
    pub fn parse(format: &str, quality: Option<&str>) -> Result<Self, ConfigError> {
        Self::new(format.parse()?, quality.map(str::to_string))
    }

    pub fn target_extension(&self) -> &str {
        self.format.extension()
    }
}

impl fmt::Display for FormatSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.quality {
            Some(q) => write!(f, "{} ({})", self.format, q),
            None => write!(f, "{}", self.format),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_and_long_names() {
        assert_eq!("opus".parse::<AudioFormat>().unwrap(), AudioFormat::Opus);
        assert_eq!("OpusAudio".parse::<AudioFormat>().unwrap(), AudioFormat::Opus);
        assert_eq!("VorbisAudio".parse::<AudioFormat>().unwrap(), AudioFormat::Vorbis);
        assert_eq!("WavPackAudio".parse::<AudioFormat>().unwrap(), AudioFormat::WavPack);
        assert_eq!(" MP3 ".parse::<AudioFormat>().unwrap(), AudioFormat::Mp3);
        assert_eq!("ogg".parse::<AudioFormat>().unwrap(), AudioFormat::Vorbis);
    }

    #[test]
    fn test_broken_formats_rejected_at_parse_time() {
        for name in ["aac", "AACAudio", "OggFlacAudio", "ShortenAudio", "shn"] {
            let err = name.parse::<AudioFormat>().unwrap_err();
            assert!(
                matches!(err, ConfigError::UnsupportedFormat { .. }),
                "{} should be unsupported, got {:?}",
                name,
                err
            );
        }
    }

    #[test]
    fn test_unmodelled_names_pass_through() {
        assert_eq!(
            "caf".parse::<AudioFormat>().unwrap(),
            AudioFormat::Other("caf".to_string())
        );
        assert_eq!(AudioFormat::Other("caf".into()).extension(), "caf");
    }

    #[test]
    fn test_garbage_names_rejected() {
        assert!(matches!(
            "".parse::<AudioFormat>(),
            Err(ConfigError::UnknownFormat(_))
        ));
        assert!(matches!(
            "../etc".parse::<AudioFormat>(),
            Err(ConfigError::UnknownFormat(_))
        ));
        assert_eq!(
            "audio".parse::<AudioFormat>().unwrap(),
            AudioFormat::Other("audio".to_string())
        );
    }

    #[test]
    fn test_extensions() {
        assert_eq!(AudioFormat::Opus.extension(), "opus");
        assert_eq!(AudioFormat::Vorbis.extension(), "ogg");
        assert_eq!(AudioFormat::Speex.extension(), "spx");
        assert_eq!(AudioFormat::WavPack.extension(), "wv");
        assert_eq!(AudioFormat::Alac.extension(), "m4a");
    }

    #[test]
    fn test_every_modelled_format_round_trips_its_name() {
        for format in AudioFormat::MODELLED {
            assert_eq!(&format.name().parse::<AudioFormat>().unwrap(), format);
        }
    }

    #[test]
    fn test_format_spec_quality_validation() {
        assert_eq!(
            FormatSpec::parse("opus", Some("  ")).unwrap_err(),
            ConfigError::EmptyQuality
        );
        let spec = FormatSpec::parse("mp3", Some(" 2 ")).unwrap();
        assert_eq!(spec.quality.as_deref(), Some("2"));
        assert_eq!(spec.target_extension(), "mp3");
        assert_eq!(spec.to_string(), "mp3 (2)");
        assert_eq!(FormatSpec::parse("flac", None).unwrap().to_string(), "flac");
    }

    #[test]
    fn test_serializes_as_name() {
        let spec = FormatSpec::parse("OpusAudio", Some("96k")).unwrap();
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["format"], "opus");
        assert_eq!(json["quality"], "96k");
    }
}
