//! Media type lookup by file extension
//!
//! A single table drives both the `Content-Type` of streamed files and the
//! choice of which file in a swarm to stream by default. Extend `MEDIA_TYPES`
//! to recognize more containers; nothing else needs to change.

/// Content type served when a file's extension is not in the table.
pub const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

/// Known media extensions, lowercase, without the leading dot.
const MEDIA_TYPES: &[MediaType] = &[
    MediaType::video("mp4", "video/mp4"),
    MediaType::video("mkv", "video/x-matroska"),
    MediaType::video("avi", "video/x-msvideo"),
    MediaType::video("mov", "video/quicktime"),
    MediaType::video("m4v", "video/mp4"),
    MediaType::video("webm", "video/webm"),
];

/// One row of the extension table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaType {
    pub extension: &'static str,
    pub content_type: &'static str,
    pub is_video: bool,
}

impl MediaType {
    const fn video(extension: &'static str, content_type: &'static str) -> Self {
        Self {
            extension,
            content_type,
            is_video: true,
        }
    }
}

/// Returns the normalized (lowercase) extension of a file name or path.
pub fn normalized_extension(file_name: &str) -> Option<String> {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let (stem, extension) = base.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}

/// Looks up the table row for a file name.
pub fn lookup(file_name: &str) -> Option<&'static MediaType> {
    let extension = normalized_extension(file_name)?;
    MEDIA_TYPES.iter().find(|media| media.extension == extension)
}

/// Content type label for a file, falling back to [`DEFAULT_CONTENT_TYPE`].
///
/// This is a best-effort label derived from the name only.
pub fn content_type_for(file_name: &str) -> &'static str {
    lookup(file_name)
        .map(|media| media.content_type)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

/// Whether the file name carries a recognized video extension.
pub fn is_video_file(file_name: &str) -> bool {
    lookup(file_name).is_some_and(|media| media.is_video)
}
