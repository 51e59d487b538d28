/// Stats from one ingest run (or one chunk of one).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub fetched: u32,
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
}

impl IngestStats {
    pub fn absorb(&mut self, other: IngestStats) {
        self.fetched += other.fetched;
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

impl std::fmt::Display for IngestStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Ingest Run Complete ===")?;
        writeln!(f, "Fetched: {}", self.fetched)?;
        writeln!(f, "Created: {}", self.created)?;
        writeln!(f, "Updated: {}", self.updated)?;
        writeln!(f, "Skipped: {}", self.skipped)?;
        Ok(())
    }
}
