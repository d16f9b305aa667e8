//! Concat compatibility validation

use std::borrow::Borrow;
use std::fmt;

use serde::Serialize;

use crate::domain::model::MediaFingerprint;
use crate::error::{QuiclipError, QuiclipResult};

/// Fingerprint fields that must match for stream-copy concatenation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintField {
    VideoCodec,
    AudioCodec,
    PixelFormat,
    Resolution,
    TimeBase,
}

impl fmt::Display for FingerprintField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FingerprintField::VideoCodec => "video codec",
            FingerprintField::AudioCodec => "audio codec",
            FingerprintField::PixelFormat => "pixel format",
            FingerprintField::Resolution => "resolution",
            FingerprintField::TimeBase => "time base",
        };
        write!(f, "{}", name)
    }
}

/// One differing field with both values rendered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMismatch {
    pub field: FingerprintField,
    pub first: String,
    pub second: String,
}

impl fmt::Display for FieldMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} vs {}", self.field, self.first, self.second)
    }
}

/// First incompatible adjacent pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub first: usize,
    pub second: usize,
    pub fields: Vec<FieldMismatch>,
}

/// Outcome of a validation run; empty means compatible
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub mismatch: Option<Mismatch>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.mismatch.is_none()
    }

    /// Turn a non-empty report into `IncompatibleSegments`
    pub fn into_result(self) -> QuiclipResult<()> {
        match self.mismatch {
            None => Ok(()),
            Some(mismatch) => Err(QuiclipError::IncompatibleSegments {
                first: mismatch.first,
                second: mismatch.second,
                fields: mismatch
                    .fields
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}

/// Checks that fingerprints can be joined with a stream copy
pub struct ConcatValidator;

impl ConcatValidator {
    /// Compare each fingerprint with its successor and report the first difference
    pub fn validate<F: Borrow<MediaFingerprint>>(fingerprints: &[F]) -> ValidationReport {
        let mismatch = fingerprints
            .windows(2)
            .enumerate()
            .find_map(|(i, pair)| {
                let fields = Self::compare(pair[0].borrow(), pair[1].borrow());
                (!fields.is_empty()).then(|| Mismatch {
                    first: i,
                    second: i + 1,
                    fields,
                })
            });
        ValidationReport { mismatch }
    }

    fn compare(a: &MediaFingerprint, b: &MediaFingerprint) -> Vec<FieldMismatch> {
        let mut fields = Vec::new();
        let mut check = |field: FingerprintField, first: String, second: String| {
            if first != second {
                fields.push(FieldMismatch {
                    field,
                    first,
                    second,
                });
            }
        };

        check(
            FingerprintField::VideoCodec,
            a.video_codec.clone(),
            b.video_codec.clone(),
        );
        check(
            FingerprintField::AudioCodec,
            a.audio_codec.clone().unwrap_or_else(|| "none".to_string()),
            b.audio_codec.clone().unwrap_or_else(|| "none".to_string()),
        );
        check(
            FingerprintField::PixelFormat,
            a.pixel_format.clone(),
            b.pixel_format.clone(),
        );
        check(
            FingerprintField::Resolution,
            a.resolution.to_string(),
            b.resolution.to_string(),
        );
        check(
            FingerprintField::TimeBase,
            a.time_base.to_string(),
            b.time_base.to_string(),
        );
        fields
    }
}
