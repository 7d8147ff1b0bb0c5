//! Sound feedback collaborator seam.
//!
//! Actual playback lives outside this crate; the service only decides when
//! a cue should sound and when the audio resources are held.

/// Cue to play for user feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundCue {
    /// A tag entered the field.
    Start,

    /// A tag was dispatched successfully.
    End,

    /// Something went wrong with the tag.
    Error,
}

/// Sound effect playback collaborator.
///
/// `acquire`/`release` bracket the adapter's on-period: resources are
/// acquired when the adapter comes up and released on every disable, so a
/// disabled reader never holds audio resources.
pub trait SoundEffects: Send + Sync {
    /// Acquire playback resources; called when the adapter turns on.
    fn acquire(&self) {}

    /// Release playback resources; called when the adapter turns off.
    fn release(&self) {}

    /// Play a cue. May be a no-op when resources are not acquired.
    fn play(&self, cue: SoundCue);
}

/// Sound collaborator that does nothing.
#[derive(Debug, Default)]
pub struct NoopSounds;

impl SoundEffects for NoopSounds {
    fn play(&self, _cue: SoundCue) {}
}
