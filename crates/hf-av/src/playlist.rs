//! HLS media playlist parsing and verification.
//!
//! The transcoder's output is only published once its manifest parses and
//! every segment it references is present on disk, so readers never see a
//! playlist pointing at missing segments.

use std::path::Path;

use hf_core::{parse_segment_name, Error, Result, MANIFEST_FILE};

/// One `#EXTINF` entry of a media playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRef {
    pub uri: String,
    /// Duration in seconds as declared by `#EXTINF`.
    pub duration: f64,
}

/// A parsed HLS media playlist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub target_duration: Option<u32>,
    pub media_sequence: u64,
    pub segments: Vec<SegmentRef>,
    /// Whether `#EXT-X-ENDLIST` was present.
    pub ended: bool,
}

impl Manifest {
    /// Parse playlist text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

        if lines.next() != Some("#EXTM3U") {
            return Err(invalid("missing #EXTM3U header"));
        }

        let mut manifest = Manifest::default();
        let mut pending_duration: Option<f64> = None;

        for line in lines {
            if let Some(value) = line.strip_prefix("#EXTINF:") {
                let duration = value
                    .split(',')
                    .next()
                    .and_then(|d| d.trim().parse::<f64>().ok())
                    .ok_or_else(|| invalid(format!("bad #EXTINF line: {line}")))?;
                pending_duration = Some(duration);
            } else if let Some(value) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
                manifest.target_duration = Some(
                    value
                        .trim()
                        .parse()
                        .map_err(|_| invalid(format!("bad target duration: {value}")))?,
                );
            } else if let Some(value) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
                manifest.media_sequence = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("bad media sequence: {value}")))?;
            } else if line == "#EXT-X-ENDLIST" {
                manifest.ended = true;
            } else if line.starts_with('#') {
                // Other tags carry nothing we serve differently.
            } else {
                let duration = pending_duration
                    .take()
                    .ok_or_else(|| invalid(format!("segment {line} has no #EXTINF")))?;
                manifest.segments.push(SegmentRef {
                    uri: line.to_string(),
                    duration,
                });
            }
        }

        Ok(manifest)
    }

    /// Read, parse and verify the manifest inside `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found("manifest", path.display())
            } else {
                Error::storage("read manifest", &path, e)
            }
        })?;

        let manifest = Self::parse(&text)?;
        manifest.verify(dir)?;
        Ok(manifest)
    }

    /// Check that the playlist lists `index0.ts .. index{K-1}.ts` in order and
    /// that every one of them exists in `dir`.
    pub fn verify(&self, dir: &Path) -> Result<()> {
        if self.segments.is_empty() {
            return Err(invalid("playlist has no segments"));
        }

        for (expected, segment) in self.segments.iter().enumerate() {
            let index = parse_segment_name(&segment.uri)
                .ok_or_else(|| invalid(format!("unexpected segment name {}", segment.uri)))?;
            if index != expected as u64 {
                return Err(invalid(format!(
                    "segment {} out of order (expected index {expected})",
                    segment.uri
                )));
            }
            if !dir.join(&segment.uri).is_file() {
                return Err(invalid(format!("segment {} is missing", segment.uri)));
            }
        }

        Ok(())
    }

    /// Number of segments listed.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Render as a VOD media playlist.
    pub fn to_m3u8(&self) -> String {
        let target = self.target_duration.unwrap_or_else(|| {
            self.segments
                .iter()
                .map(|s| s.duration.ceil() as u32)
                .max()
                .unwrap_or(0)
        });

        let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
        out.push_str(&format!("#EXT-X-TARGETDURATION:{target}\n"));
        out.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\n", self.media_sequence));
        for segment in &self.segments {
            out.push_str(&format!("#EXTINF:{:.6},\n{}\n", segment.duration, segment.uri));
        }
        if self.ended {
            out.push_str("#EXT-X-ENDLIST\n");
        }
        out
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::Validation(format!("invalid HLS manifest: {}", message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "#EXTM3U\n\
        #EXT-X-VERSION:3\n\
        #EXT-X-TARGETDURATION:2\n\
        #EXT-X-MEDIA-SEQUENCE:0\n\
        #EXTINF:2.000000,\n\
        index0.ts\n\
        #EXTINF:2.000000,\n\
        index1.ts\n\
        #EXTINF:1.033333,\n\
        index2.ts\n\
        #EXT-X-ENDLIST\n";

    #[test]
    fn parses_ffmpeg_playlist() {
        let m = Manifest::parse(SAMPLE).unwrap();
        assert_eq!(m.target_duration, Some(2));
        assert_eq!(m.media_sequence, 0);
        assert_eq!(m.segment_count(), 3);
        assert_eq!(m.segments[2].uri, "index2.ts");
        assert!(m.ended);
        assert!((m.segments[2].duration - 1.033333).abs() < 1e-6);
    }

    #[test]
    fn renders_parseable_playlist() {
        let m = Manifest::parse(SAMPLE).unwrap();
        let text = m.to_m3u8();
        assert!(text.contains("#EXT-X-TARGETDURATION:2\n"));
        assert!(text.ends_with("index2.ts\n#EXT-X-ENDLIST\n"));
        assert_eq!(Manifest::parse(&text).unwrap(), m);
    }

    #[test]
    fn rejects_missing_header() {
        let err = Manifest::parse("#EXTINF:2,\nindex0.ts\n").unwrap_err();
        assert!(err.to_string().contains("#EXTM3U"));
    }

    #[test]
    fn rejects_uri_without_extinf() {
        assert!(Manifest::parse("#EXTM3U\nindex0.ts\n").is_err());
    }

    #[test]
    fn verify_requires_files_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let m = Manifest::parse(SAMPLE).unwrap();

        std::fs::write(dir.path().join("index0.ts"), b"a").unwrap();
        std::fs::write(dir.path().join("index1.ts"), b"b").unwrap();
        let err = m.verify(dir.path()).unwrap_err();
        assert!(err.to_string().contains("index2.ts is missing"));

        std::fs::write(dir.path().join("index2.ts"), b"c").unwrap();
        m.verify(dir.path()).unwrap();
    }

    #[test]
    fn verify_rejects_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let m = Manifest::parse("#EXTM3U\n#EXTINF:2,\nindex0.ts\n#EXTINF:2,\nindex2.ts\n").unwrap();
        std::fs::write(dir.path().join("index0.ts"), b"a").unwrap();
        std::fs::write(dir.path().join("index2.ts"), b"c").unwrap();
        assert!(m.verify(dir.path()).is_err());
    }

    #[test]
    fn verify_rejects_empty_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let m = Manifest::parse("#EXTM3U\n#EXT-X-ENDLIST\n").unwrap();
        assert!(m.verify(dir.path()).is_err());
    }

    #[test]
    fn load_missing_manifest_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manifest::load(dir.path()).unwrap_err();
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn load_reads_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), SAMPLE).unwrap();
        for i in 0..3 {
            std::fs::write(dir.path().join(format!("index{i}.ts")), b"ts").unwrap();
        }
        let m = Manifest::load(dir.path()).unwrap();
        assert_eq!(m.segment_count(), 3);
    }
}
