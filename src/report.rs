use crate::config::DocumentPaths;
use crate::regress::{Anomaly, PageRecord};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Poll intervals of the lock protocol. Parameterized so tests do not sleep
/// for real seconds; production uses the defaults.
#[derive(Debug, Clone, Copy)]
pub struct LockTiming {
    /// Pause between tentatively writing the lock and verifying ownership.
    pub settle: Duration,
    /// Backoff between contention retries. Unbounded retry count.
    pub retry: Duration,
}

impl Default for LockTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(100),
            retry: Duration::from_secs(1),
        }
    }
}

/// Best-effort mutual exclusion over a shared report tree, coordinated
/// between independent processes through a named lock file holding the
/// current owner's document id. The create/verify window is not atomic: two
/// writers can both observe "no lock file" before either creates one, and a
/// holder that crashes before the delete leaves the batch blocked. Both are
/// known limitations of the protocol being reproduced.
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    fn acquire(path: &Path, owner: &str, timing: LockTiming) -> io::Result<Self> {
        loop {
            if !path.exists() {
                fs::write(path, owner)?;
                thread::sleep(timing.settle);
                // Proceed only if the file still reads back our id; anyone
                // else's id means we lost the race.
                if let Ok(contents) = fs::read_to_string(path) {
                    if contents == owner {
                        return Ok(Self {
                            path: path.to_path_buf(),
                        });
                    }
                }
            }
            thread::sleep(timing.retry);
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Appends one invocation's rows and anomalies to the batch-wide CSV
/// reports, one writer at a time. All of a document's rows go out inside a
/// single critical section, in page order.
pub struct ReportAggregator {
    import_csv: PathBuf,
    export_csv: PathBuf,
    anomaly_csv: PathBuf,
    lock_path: PathBuf,
    owner: String,
    timing: LockTiming,
}

impl ReportAggregator {
    pub fn new(paths: &DocumentPaths, owner: impl Into<String>) -> Self {
        Self {
            import_csv: paths.report_file("import-statistics.csv"),
            export_csv: paths.report_file("export-statistics.csv"),
            anomaly_csv: paths.report_file("statistics-anomalies.csv"),
            lock_path: paths.report_file("statistics.lock"),
            owner: owner.into(),
            timing: LockTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: LockTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn append(
        &self,
        base_file: &str,
        import: &[PageRecord],
        export: &[PageRecord],
        anomalies: &[Anomaly],
        one_based_pages: bool,
    ) -> io::Result<()> {
        if import.is_empty() && export.is_empty() && anomalies.is_empty() {
            return Ok(());
        }
        let _lock = LockFile::acquire(&self.lock_path, &self.owner, self.timing)?;
        append_rows(&self.import_csv, base_file, import, one_based_pages)?;
        append_rows(&self.export_csv, base_file, export, one_based_pages)?;
        append_anomalies(&self.anomaly_csv, base_file, anomalies)?;
        Ok(())
    }
}

/// Column names of the statistics reports. Historical columns are present in
/// the header even though rows without history omit them.
const STATISTICS_HEADER: &str = "basefile,page,authSize,authContent,authRatio,\
candSize,candContent,candRatio,markerCount,markerRatio,\
histSize,histContent,histRatio,histMarkerCount,histMarkerRatio";

fn append_rows(
    path: &Path,
    base_file: &str,
    records: &[PageRecord],
    one_based_pages: bool,
) -> io::Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    let is_new = !path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if is_new {
        writeln!(file, "{}", STATISTICS_HEADER)?;
    }
    for record in records {
        writeln!(file, "{}", csv_row(base_file, record, one_based_pages))?;
    }
    file.flush()
}

fn append_anomalies(path: &Path, base_file: &str, anomalies: &[Anomaly]) -> io::Result<()> {
    if anomalies.is_empty() {
        return Ok(());
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for anomaly in anomalies {
        writeln!(file, "{},{},{}", base_file, anomaly.category, anomaly.detail)?;
    }
    file.flush()
}

fn csv_row(base_file: &str, record: &PageRecord, one_based_pages: bool) -> String {
    let page = record.page_index + usize::from(one_based_pages);
    let mut row = format!(
        "{},{},{},{},{:.6},{},{},{:.6},{},{:.6}",
        base_file,
        page,
        record.authoritative.size,
        record.authoritative.content,
        record.authoritative.ratio(),
        record.candidate.size,
        record.candidate.content,
        record.candidate.ratio(),
        record.marker_count,
        record.marker_ratio(),
    );
    if let Some(historical) = record.historical {
        row.push_str(&format!(
            ",{},{},{:.6},{},{:.6}",
            historical.stat.size,
            historical.stat.content,
            historical.stat.ratio(),
            historical.marker_count,
            record.historical_marker_ratio().unwrap_or(0.0),
        ));
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::content::ContentStat;
    use crate::regress::HistoricalSignal;

    fn scratch_base() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "pagediff_report_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    fn record(page_index: usize, marker: u64, with_history: bool) -> PageRecord {
        PageRecord {
            page_index,
            authoritative: ContentStat { size: 100, content: 5 },
            candidate: ContentStat { size: 100, content: 5 },
            marker_count: marker,
            historical: with_history.then_some(HistoricalSignal {
                stat: ContentStat { size: 100, content: 4 },
                marker_count: 1,
            }),
        }
    }

    fn aggregator(base: &Path, owner: &str) -> ReportAggregator {
        let config = RunConfig::new("sample.docx");
        let paths = DocumentPaths::resolve_under(&config, base).expect("paths");
        ReportAggregator::new(&paths, owner).with_timing(LockTiming {
            settle: Duration::from_millis(5),
            retry: Duration::from_millis(10),
        })
    }

    #[test]
    fn rows_include_historical_columns_only_when_present() {
        let bare = csv_row("a.docx", &record(0, 7, false), true);
        assert_eq!(bare, "a.docx,1,100,5,0.050000,100,5,0.050000,7,0.070000");
        let with_history = csv_row("a.docx", &record(0, 7, true), true);
        assert_eq!(
            with_history,
            "a.docx,1,100,5,0.050000,100,5,0.050000,7,0.070000,100,4,0.040000,1,0.010000"
        );
    }

    #[test]
    fn zero_based_numbering_is_selectable() {
        assert!(csv_row("a.docx", &record(0, 0, false), false).starts_with("a.docx,0,"));
    }

    #[test]
    fn append_writes_rows_and_releases_lock() {
        let base = scratch_base();
        let agg = aggregator(&base, "sample.docx");
        agg.append(
            "sample.docx",
            &[record(0, 3, false), record(1, 0, false)],
            &[record(0, 2, false)],
            &[Anomaly::page_count_mismatch("authoritative", 12, "import", 8)],
            true,
        )
        .expect("append");

        let import = fs::read_to_string(base.join("diff-pdf-docx-import-statistics.csv")).expect("csv");
        assert_eq!(import.lines().next(), Some(STATISTICS_HEADER));
        assert_eq!(import.lines().count(), 3);
        let export = fs::read_to_string(base.join("diff-pdf-docx-export-statistics.csv")).expect("csv");
        assert_eq!(export.lines().count(), 2);
        let anomalies =
            fs::read_to_string(base.join("diff-pdf-docx-statistics-anomalies.csv")).expect("csv");
        assert_eq!(
            anomalies.trim(),
            "sample.docx,page-count-mismatch,authoritative 12 vs import 8"
        );
        assert!(!base.join("diff-pdf-docx-statistics.lock").exists());
        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn header_is_written_only_on_file_creation() {
        let base = scratch_base();
        let agg = aggregator(&base, "sample.docx");
        agg.append("sample.docx", &[record(0, 0, false)], &[], &[], true)
            .expect("first append");
        agg.append("sample.docx", &[record(1, 0, false)], &[], &[], true)
            .expect("second append");

        let csv = fs::read_to_string(base.join("diff-pdf-docx-import-statistics.csv")).expect("csv");
        let headers = csv.lines().filter(|line| *line == STATISTICS_HEADER).count();
        assert_eq!(headers, 1);
        assert_eq!(csv.lines().count(), 3);
        assert_eq!(csv.lines().next(), Some(STATISTICS_HEADER));
        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn concurrent_writers_all_land_with_contiguous_rows() {
        let base = scratch_base();
        let writers = 4;
        let rows_per_writer = 3;

        let handles: Vec<_> = (0..writers)
            .map(|w| {
                let base = base.clone();
                thread::spawn(move || {
                    // Stagger starts so contention happens against a held
                    // lock rather than inside the protocol's create window.
                    thread::sleep(Duration::from_millis(w as u64 * 25));
                    let owner = format!("writer-{}.docx", w);
                    let agg = aggregator(&base, &owner);
                    let records: Vec<PageRecord> =
                        (0..rows_per_writer).map(|p| record(p, w as u64, false)).collect();
                    agg.append(&owner, &records, &[], &[], true).expect("append");
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread");
        }

        let csv = fs::read_to_string(base.join("diff-pdf-docx-import-statistics.csv")).expect("csv");
        assert_eq!(csv.lines().next(), Some(STATISTICS_HEADER));
        let owners: Vec<String> = csv
            .lines()
            .skip(1)
            .map(|line| line.split(',').next().expect("owner").to_string())
            .collect();
        assert_eq!(owners.len(), writers * rows_per_writer);

        // Each writer's rows must be one contiguous run.
        let mut seen: Vec<String> = Vec::new();
        for owner in &owners {
            match seen.last() {
                Some(last) if last == owner => {}
                _ => {
                    assert!(
                        !seen.contains(owner),
                        "rows for {} are interleaved: {:?}",
                        owner,
                        owners
                    );
                    seen.push(owner.clone());
                }
            }
        }
        assert_eq!(seen.len(), writers);
        assert!(!base.join("diff-pdf-docx-statistics.lock").exists());
        let _ = fs::remove_dir_all(&base);
    }
}
