use std::path::PathBuf;

/// Intermediate per-label copy of the source image, prior to text overlay.
/// Owned by the pipeline invocation that created it until consumed.
#[derive(Debug, Clone)]
pub struct Variation {
    pub path: PathBuf,
}

/// Final encoded, labeled raster ready for publication. Ownership transfers
/// to the publishing step, which deletes the file after upload or on any
/// earlier failure.
#[derive(Debug, Clone)]
pub struct StickerArtifact {
    pub path: PathBuf,
    pub label: String,
}
