use crate::content::ContentStat;

/// A page is force-saved only when its marker signal worsened against the
/// historical run. Equal or improved counts never force anything; without
/// history there is nothing to regress from.
pub fn force_save(current: u64, historical: Option<u64>) -> bool {
    matches!(historical, Some(h) if current > h)
}

/// Historical half of a page record, present only when the previous run
/// produced this direction.
#[derive(Debug, Clone, Copy)]
pub struct HistoricalSignal {
    pub stat: ContentStat,
    pub marker_count: u64,
}

/// Everything one CSV row needs for one page of one direction, held in a
/// single struct so the fields cannot drift out of page alignment. Immutable
/// once computed; consumed once by the report aggregator.
#[derive(Debug, Clone)]
pub struct PageRecord {
    /// 0-based page index; the aggregator applies the configured numbering.
    pub page_index: usize,
    pub authoritative: ContentStat,
    pub candidate: ContentStat,
    pub marker_count: u64,
    pub historical: Option<HistoricalSignal>,
}

impl PageRecord {
    pub fn marker_ratio(&self) -> f64 {
        ratio_of(self.marker_count, self.authoritative.size)
    }

    pub fn historical_marker_ratio(&self) -> Option<f64> {
        self.historical
            .map(|h| ratio_of(h.marker_count, h.stat.size))
    }

    pub fn forced(&self) -> bool {
        force_save(self.marker_count, self.historical.map(|h| h.marker_count))
    }
}

fn ratio_of(count: u64, size: u64) -> f64 {
    if size == 0 { 0.0 } else { count as f64 / size as f64 }
}

/// Free-text note about something off with a document, e.g. page counts
/// disagreeing between variants. Non-fatal; comparison proceeds truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anomaly {
    pub category: String,
    pub detail: String,
}

impl Anomaly {
    pub fn page_count_mismatch(left: &str, left_pages: usize, right: &str, right_pages: usize) -> Self {
        Anomaly {
            category: "page-count-mismatch".to_string(),
            detail: format!("{} {} vs {} {}", left, left_pages, right, right_pages),
        }
    }

    pub fn red_color_mismatch(direction: &str, page_number: usize) -> Self {
        Anomaly {
            category: "red-color-mismatch".to_string(),
            detail: format!("{} page {} composite has no marker bucket", direction, page_number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anomaly_details_name_their_direction() {
        let import = Anomaly::red_color_mismatch("import", 3);
        assert_eq!(import.detail, "import page 3 composite has no marker bucket");
        let export = Anomaly::red_color_mismatch("export", 3);
        assert_ne!(import.detail, export.detail);
    }

    #[test]
    fn forces_only_when_signal_worsens() {
        assert!(force_save(10, Some(9)));
        assert!(force_save(1, Some(0)));
        assert!(!force_save(10, Some(10)));
        assert!(!force_save(5, Some(10)));
        assert!(!force_save(0, Some(0)));
        assert!(!force_save(10, None));
    }

    #[test]
    fn record_ratios_divide_by_page_size() {
        let record = PageRecord {
            page_index: 0,
            authoritative: ContentStat { size: 200, content: 10 },
            candidate: ContentStat { size: 200, content: 10 },
            marker_count: 50,
            historical: Some(HistoricalSignal {
                stat: ContentStat { size: 100, content: 5 },
                marker_count: 25,
            }),
        };
        assert!((record.marker_ratio() - 0.25).abs() < 1e-9);
        assert!((record.historical_marker_ratio().expect("history") - 0.25).abs() < 1e-9);
        assert!(record.forced());
    }

    #[test]
    fn zero_size_page_has_zero_ratio() {
        let record = PageRecord {
            page_index: 0,
            authoritative: ContentStat { size: 0, content: 0 },
            candidate: ContentStat { size: 0, content: 0 },
            marker_count: 0,
            historical: None,
        };
        assert_eq!(record.marker_ratio(), 0.0);
    }
}
