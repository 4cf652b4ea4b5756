use thiserror::Error;

/// Hard failures surfaced to the direct caller.
///
/// Everything else in the pipeline (unrecognized enum values inside a
/// translation table, not-implemented legacy refinements) is logged and
/// degrades to a no-op so the frame still renders.
#[derive(Debug, Error, PartialEq)]
pub enum D3dError {
    /// The named object is not a member of the list it was looked up in.
    #[error("invalid object")]
    InvalidObject,

    /// A required selector or structural argument is out of range.
    #[error("invalid parameters")]
    InvalidParams,

    #[error("texture load failed: source is {src_width}x{src_height} but destination is {dst_width}x{dst_height}")]
    TextureLoadFailed {
        src_width: u32,
        src_height: u32,
        dst_width: u32,
        dst_height: u32,
    },

    #[error("unknown matrix handle {0}")]
    UnknownMatrixHandle(u32),

    #[error("scene already in progress")]
    SceneInProgress,

    #[error("no scene in progress")]
    NoSceneInProgress,
}
