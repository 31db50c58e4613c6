/// Lifecycle of a track.
///
/// `New -> Tracked` on activation, `Tracked <-> Lost` on missed and recovered
/// frames, and `Tracked | Lost -> Removed` once the track is dropped. A removed
/// track never comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    /// Created from a detection, no id yet
    #[default]
    New,
    Tracked,
    /// Not associated in the latest frame, still eligible for recovery
    Lost,
    Removed,
}
