use threadscout_common::{PairState, SessionSnapshot};

/// Stats from a scrape run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScrapeStats {
    pub pairs_total: u32,
    pub pairs_succeeded: u32,
    pub pairs_partial: u32,
    pub pairs_failed: u32,
    pub pairs_interrupted: u32,
    pub pairs_not_attempted: u32,
    pub pages_fetched: u32,
    pub records_found: u32,
    pub records_stored: u32,
    pub items_skipped: u32,
    pub retries: u32,
    pub elapsed_secs: i64,
}

impl ScrapeStats {
    pub fn from_snapshot(snap: &SessionSnapshot) -> Self {
        let mut stats = ScrapeStats {
            pairs_total: snap.pairs.len() as u32,
            records_stored: snap.total_records as u32,
            elapsed_secs: snap.elapsed_secs.unwrap_or(0),
            ..Default::default()
        };
        for pair in &snap.pairs {
            match pair.state {
                PairState::Succeeded => stats.pairs_succeeded += 1,
                PairState::Partial => stats.pairs_partial += 1,
                PairState::Failed => stats.pairs_failed += 1,
                PairState::Interrupted => stats.pairs_interrupted += 1,
                PairState::NotAttempted | PairState::Running => stats.pairs_not_attempted += 1,
            }
            stats.pages_fetched += pair.pages_fetched;
            stats.records_found += pair.records_found;
            stats.items_skipped += pair.items_skipped;
            stats.retries += pair.retries;
        }
        stats
    }

    /// Records found but not stored: duplicates plus relevance-filtered.
    pub fn not_stored(&self) -> u32 {
        self.records_found.saturating_sub(self.records_stored)
    }
}

impl std::fmt::Display for ScrapeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Scrape Run Complete ===")?;
        writeln!(f, "Pairs:              {}", self.pairs_total)?;
        writeln!(f, "  Succeeded:        {}", self.pairs_succeeded)?;
        writeln!(f, "  Partial:          {}", self.pairs_partial)?;
        writeln!(f, "  Failed:           {}", self.pairs_failed)?;
        if self.pairs_interrupted > 0 || self.pairs_not_attempted > 0 {
            writeln!(f, "  Interrupted:      {}", self.pairs_interrupted)?;
            writeln!(f, "  Not attempted:    {}", self.pairs_not_attempted)?;
        }
        writeln!(f, "Pages fetched:      {}", self.pages_fetched)?;
        writeln!(f, "Retries:            {}", self.retries)?;
        writeln!(f, "Records found:      {}", self.records_found)?;
        writeln!(f, "Records stored:     {}", self.records_stored)?;
        writeln!(f, "  Not stored:       {}", self.not_stored())?;
        writeln!(f, "Items skipped:      {}", self.items_skipped)?;
        write!(f, "Elapsed:            {}s", self.elapsed_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadscout_common::{PairProgress, Platform, ScrapeStatus};
    use uuid::Uuid;

    #[test]
    fn counts_pairs_by_state() {
        let mut ok = PairProgress::new(Platform::Reddit, "mcp");
        ok.state = PairState::Succeeded;
        ok.pages_fetched = 2;
        ok.records_found = 30;
        let mut bad = PairProgress::new(Platform::Github, "mcp");
        bad.state = PairState::Failed;
        bad.retries = 3;

        let snap = SessionSnapshot {
            id: Uuid::new_v4(),
            status: ScrapeStatus::Completed,
            cancel_requested: false,
            keywords: vec![],
            platforms: vec![Platform::Reddit, Platform::Github],
            pairs: vec![ok, bad],
            failed_pairs: vec![],
            current_pair: None,
            progress_percent: 100,
            total_records: 25,
            started_at: None,
            finished_at: None,
            elapsed_secs: Some(4),
            analysis_available: false,
        };

        let stats = ScrapeStats::from_snapshot(&snap);
        assert_eq!(stats.pairs_succeeded, 1);
        assert_eq!(stats.pairs_failed, 1);
        assert_eq!(stats.retries, 3);
        assert_eq!(stats.not_stored(), 5);
        let report = stats.to_string();
        assert!(report.contains("Records stored:     25"));
        assert!(report.contains("Not stored:       5"));
    }
}
