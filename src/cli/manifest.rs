//! Job manifests: YAML or JSON files describing one job

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::model::{ClipRequest, JobSpec, TimeSpec};
use crate::error::{QuiclipError, QuiclipResult};

/// A time given either as seconds or as a `HH:MM:SS.ms`-style string
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ManifestTime {
    Seconds(f64),
    Text(String),
}

impl ManifestTime {
    fn seconds(&self) -> QuiclipResult<f64> {
        match self {
            ManifestTime::Seconds(value) => Ok(*value),
            ManifestTime::Text(text) => Ok(TimeSpec::parse(text)?.as_seconds()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestSegment {
    pub file: PathBuf,
    pub start: ManifestTime,
    pub end: ManifestTime,
}

/// Job description loaded from a file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case", deny_unknown_fields)]
pub enum JobManifest {
    Clip {
        segments: Vec<ManifestSegment>,
        #[serde(default)]
        output: Option<PathBuf>,
    },
    Merge {
        files: Vec<PathBuf>,
        #[serde(default)]
        output: Option<PathBuf>,
    },
}

impl JobManifest {
    /// Load a manifest, picking the format from the file extension
    pub fn load(path: &Path) -> QuiclipResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "json" => Ok(serde_json::from_str(&content)?),
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| {
                QuiclipError::config(format!("invalid manifest {}: {}", path.display(), e))
            }),
            _ => Err(QuiclipError::config(format!(
                "unsupported manifest format '{}', expected .yaml, .yml or .json",
                path.display()
            ))),
        }
    }

    /// Convert into a job spec plus the requested output, segments numbered in file order
    pub fn into_job(self) -> QuiclipResult<(JobSpec, Option<PathBuf>)> {
        match self {
            JobManifest::Clip { segments, output } => {
                let requests = segments
                    .into_iter()
                    .enumerate()
                    .map(|(position, segment)| {
                        ClipRequest::new(
                            segment.file,
                            segment.start.seconds()?,
                            segment.end.seconds()?,
                            position,
                        )
                    })
                    .collect::<QuiclipResult<Vec<_>>>()?;
                Ok((JobSpec::Clip(requests), output))
            }
            JobManifest::Merge { files, output } => Ok((JobSpec::Merge(files), output)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_clip_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.yaml");
        std::fs::write(
            &path,
            "mode: clip\noutput: highlights.mp4\nsegments:\n  - file: a.mp4\n    start: 0\n    end: \"0:10\"\n  - file: b.mp4\n    start: 25.3\n    end: 30\n",
        )
        .unwrap();

        let (spec, output) = JobManifest::load(&path).unwrap().into_job().unwrap();
        assert_eq!(output, Some(PathBuf::from("highlights.mp4")));
        match spec {
            JobSpec::Clip(requests) => {
                assert_eq!(requests.len(), 2);
                assert_eq!(requests[0].end(), 10.0);
                assert_eq!(requests[1].position(), 1);
                assert_eq!(requests[1].start(), 25.3);
            }
            other => panic!("unexpected spec {:?}", other),
        }
    }

    #[test]
    fn test_json_merge_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        std::fs::write(&path, r#"{"mode": "merge", "files": ["a.mp4", "b.mp4"]}"#).unwrap();

        let (spec, output) = JobManifest::load(&path).unwrap().into_job().unwrap();
        assert!(output.is_none());
        assert_eq!(
            spec,
            JobSpec::Merge(vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")])
        );
    }

    #[test]
    fn test_rejects_unknown_format_and_fields() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("job.txt");
        std::fs::write(&txt, "mode: merge").unwrap();
        assert!(JobManifest::load(&txt).is_err());

        let yaml = dir.path().join("job.yml");
        std::fs::write(&yaml, "mode: merge\nfiles: [a.mp4]\nreencode: true\n").unwrap();
        assert!(JobManifest::load(&yaml).is_err());
    }

    #[test]
    fn test_bad_time_in_manifest() {
        let manifest = JobManifest::Clip {
            segments: vec![ManifestSegment {
                file: PathBuf::from("a.mp4"),
                start: ManifestTime::Text("soon".to_string()),
                end: ManifestTime::Seconds(4.0),
            }],
            output: None,
        };
        assert!(matches!(
            manifest.into_job(),
            Err(QuiclipError::InvalidRange { .. })
        ));
    }
}
