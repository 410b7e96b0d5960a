strong_type!(ChunkNum, u64);
strong_type!(Version, u64);

impl Version {
    /// Sentinel meaning "any version is acceptable" on reads, or
    /// "no particular version" in responses.
    pub const ANY: Version = Version(0);

    /// Whether this is the any-version sentinel.
    pub fn is_any(&self) -> bool {
        self.0 == 0
    }

    /// The next version in sequence.
    pub fn next(&self) -> Version {
        Version(self.0 + 1)
    }
}
