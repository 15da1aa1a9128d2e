mod compose;
mod config;
mod content;
mod debug;
mod error;
mod page;
mod raster;
mod regress;
mod report;

pub use compose::{
    BACKGROUND_FUZZ, Composite, MARKER_BLUE, MARKER_FUZZ, MARKER_RED, MarkerDetection,
    compare_overlay, direct_overlay,
};
pub use config::{Denylist, DocumentPaths, ReportOptions, RunConfig};
pub use content::{ContentStat, measure};
use debug::DebugLogger;
pub use error::PageDiffError;
pub use page::{Page, PageSet, Variant, comparison_limit};
pub use raster::probe_page_count;
pub use regress::{Anomaly, HistoricalSignal, PageRecord, force_save};
pub use report::{LockTiming, ReportAggregator};

use std::fs;
use std::path::{Path, PathBuf};

/// The up-to-five rasterized renderings of one document. History sets are
/// absent when no previous run exists.
pub struct DocumentSets {
    pub authoritative: PageSet,
    pub import: PageSet,
    pub export: PageSet,
    pub history_import: Option<PageSet>,
    pub history_export: Option<PageSet>,
}

/// What one invocation produced, for callers and tests; the CSV reports are
/// the durable output.
#[derive(Debug)]
pub struct RunSummary {
    pub pages_compared: usize,
    pub import_records: Vec<PageRecord>,
    pub export_records: Vec<PageRecord>,
    pub anomalies: Vec<Anomaly>,
    /// Page numbers (in the configured numbering) whose overlays were
    /// persisted regardless of `no_save_overlay`.
    pub forced_import_pages: Vec<usize>,
    pub forced_export_pages: Vec<usize>,
    pub artifacts: Vec<PathBuf>,
}

/// The per-document diff pipeline: rasterize, measure, composite, decide,
/// report. One engine instance handles exactly one document; batch
/// parallelism is one process per document, coordinated only through the
/// report lock file.
pub struct DiffEngine {
    config: RunConfig,
    paths: DocumentPaths,
    debug: DebugLogger,
    lock_timing: LockTiming,
}

impl DiffEngine {
    pub fn new(config: RunConfig) -> Result<Self, PageDiffError> {
        let paths = DocumentPaths::resolve(&config)?;
        Ok(Self::with_paths(config, paths))
    }

    pub fn with_paths(config: RunConfig, paths: DocumentPaths) -> Self {
        let debug = DebugLogger::new(config.debug);
        Self {
            config,
            paths,
            debug,
            lock_timing: LockTiming::default(),
        }
    }

    pub fn with_lock_timing(mut self, timing: LockTiming) -> Self {
        self.lock_timing = timing;
        self
    }

    pub fn paths(&self) -> &DocumentPaths {
        &self.paths
    }

    /// Full invocation: check inputs, rasterize every available rendering,
    /// then diff. The three current inputs are required; history is probed
    /// and loaded only when present.
    pub fn run(&self) -> Result<RunSummary, PageDiffError> {
        for required in [
            &self.paths.authoritative_pdf,
            &self.paths.import_pdf,
            &self.paths.export_pdf,
        ] {
            if !required.is_file() {
                return Err(PageDiffError::MissingInput(required.clone()));
            }
        }

        // The history export for legacy formats is renamed by hand after the
        // previous run. A missing baseline with its unrenamed sibling still
        // present means that step was skipped; diffing against nothing would
        // silently pass the whole batch.
        if !self.paths.history_export_pdf.is_file() {
            if let Some((unrenamed, modern)) = self.paths.unrenamed_history_export() {
                if unrenamed.is_file() {
                    return Err(PageDiffError::HistoryNotRenamed {
                        legacy: self.paths.ext.clone(),
                        modern: modern.to_string(),
                    });
                }
            }
        }

        let resolution = self.config.resolution;
        let max_pages = self.config.max_pages;
        let sets = DocumentSets {
            authoritative: raster::load(
                Variant::Authoritative,
                &self.paths.authoritative_pdf,
                resolution,
                max_pages,
            )?,
            import: raster::load(Variant::Import, &self.paths.import_pdf, resolution, max_pages)?,
            export: raster::load(Variant::Export, &self.paths.export_pdf, resolution, max_pages)?,
            history_import: self
                .load_history(Variant::HistoryImport, &self.paths.history_import_pdf)?,
            history_export: self
                .load_history(Variant::HistoryExport, &self.paths.history_export_pdf)?,
        };
        self.run_with_pages(sets)
    }

    fn load_history(
        &self,
        variant: Variant,
        path: &Path,
    ) -> Result<Option<PageSet>, PageDiffError> {
        if path.is_file() {
            self.debug
                .log(format!("loading {} from [{}]", variant.label(), path.display()));
            Ok(Some(raster::load(
                variant,
                path,
                self.config.resolution,
                self.config.max_pages,
            )?))
        } else {
            self.debug
                .log(format!("no {} at [{}]", variant.label(), path.display()));
            Ok(None)
        }
    }

    /// The diff engine proper, independent of the raster backend: truncate
    /// to the shortest rendering, measure and composite every page, decide
    /// what to persist, and append to the shared reports.
    pub fn run_with_pages(&self, sets: DocumentSets) -> Result<RunSummary, PageDiffError> {
        let mut anomalies = Vec::new();
        self.note_count_mismatch(&mut anomalies, &sets.authoritative, &sets.import);
        self.note_count_mismatch(&mut anomalies, &sets.authoritative, &sets.export);
        if let Some(history) = &sets.history_import {
            self.note_count_mismatch(&mut anomalies, &sets.import, history);
        }
        if let Some(history) = &sets.history_export {
            self.note_count_mismatch(&mut anomalies, &sets.export, history);
        }

        let limit = comparison_limit(
            self.config.max_pages,
            &[
                Some(&sets.authoritative),
                Some(&sets.import),
                Some(&sets.export),
                sets.history_import.as_ref(),
                sets.history_export.as_ref(),
            ],
        );
        self.debug
            .log(format!("comparing {} page(s) of {}", limit, self.config.base_file));

        let mut summary = RunSummary {
            pages_compared: limit,
            import_records: Vec::with_capacity(limit),
            export_records: Vec::with_capacity(limit),
            anomalies: Vec::new(),
            forced_import_pages: Vec::new(),
            forced_export_pages: Vec::new(),
            artifacts: Vec::new(),
        };

        for index in 0..limit {
            let (Some(auth_page), Some(import_page), Some(export_page)) = (
                sets.authoritative.page(index),
                sets.import.page(index),
                sets.export.page(index),
            ) else {
                break;
            };
            let auth_stat = content::measure(auth_page);

            self.diff_direction(
                "import",
                index,
                auth_page,
                auth_stat,
                import_page,
                sets.history_import.as_ref().and_then(|s| s.page(index)),
                &self.paths.import_overlay_dir,
                &self.paths.import_compare_dir,
                &mut anomalies,
                &mut summary.import_records,
                &mut summary.forced_import_pages,
                &mut summary.artifacts,
            )?;
            self.diff_direction(
                "export",
                index,
                auth_page,
                auth_stat,
                export_page,
                sets.history_export.as_ref().and_then(|s| s.page(index)),
                &self.paths.export_overlay_dir,
                &self.paths.export_compare_dir,
                &mut anomalies,
                &mut summary.export_records,
                &mut summary.forced_export_pages,
                &mut summary.artifacts,
            )?;
        }

        summary.anomalies = anomalies;
        self.debug.increment("pages.compared", limit as u64);
        self.debug
            .increment("anomalies", summary.anomalies.len() as u64);

        let aggregator = ReportAggregator::new(&self.paths, self.config.base_file.clone())
            .with_timing(self.lock_timing);
        aggregator.append(
            &self.config.base_file,
            &summary.import_records,
            &summary.export_records,
            &summary.anomalies,
            self.config.report.one_based_pages,
        )?;

        self.debug.emit_summary(&self.config.base_file);
        Ok(summary)
    }

    fn note_count_mismatch(&self, anomalies: &mut Vec<Anomaly>, left: &PageSet, right: &PageSet) {
        if left.len() != right.len() {
            anomalies.push(Anomaly::page_count_mismatch(
                left.variant.label(),
                left.len(),
                right.variant.label(),
                right.len(),
            ));
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn diff_direction(
        &self,
        direction: &str,
        index: usize,
        auth_page: &Page,
        auth_stat: ContentStat,
        candidate_page: &Page,
        history_page: Option<&Page>,
        overlay_dir: &Path,
        compare_dir: &Path,
        anomalies: &mut Vec<Anomaly>,
        records: &mut Vec<PageRecord>,
        forced_pages: &mut Vec<usize>,
        artifacts: &mut Vec<PathBuf>,
    ) -> Result<(), PageDiffError> {
        let detection = self.config.report.marker_detection;
        let page_number = index + usize::from(self.config.report.one_based_pages);

        let overlay = compose::direct_overlay(auth_page, candidate_page, detection);
        if !overlay.marker_found {
            self.debug.increment("marker.lookup_miss", 1);
            self.debug.log(format!(
                "{} page {}: marker color absent from composite, counting 0",
                direction, page_number
            ));
            if detection == MarkerDetection::ExactHistogram && !auth_stat.is_degenerate() {
                anomalies.push(Anomaly::red_color_mismatch(direction, page_number));
            }
        }

        let historical = history_page.map(|page| HistoricalSignal {
            stat: content::measure(page),
            marker_count: compose::direct_overlay(auth_page, page, detection).marker_count,
        });

        let record = PageRecord {
            page_index: index,
            authoritative: auth_stat,
            candidate: content::measure(candidate_page),
            marker_count: overlay.marker_count,
            historical,
        };
        let forced = record.forced();
        if forced {
            forced_pages.push(page_number);
            self.debug.log(format!(
                "{} page {}: marker count {} worsened from {}, forcing save",
                direction,
                page_number,
                record.marker_count,
                historical.map(|h| h.marker_count).unwrap_or(0)
            ));
        }

        let persist = !self.config.no_save_overlay || forced;
        if persist {
            let name = self
                .paths
                .overlay_file(&self.config.base_file, direction, page_number);
            artifacts.push(save_png(&overlay.pixmap, overlay_dir, &name)?);

            if self.config.report.compare_overlays {
                if let Some(history) = history_page {
                    let compare =
                        compose::compare_overlay(auth_page, candidate_page, history, detection);
                    let name = self.paths.overlay_file(
                        &self.config.base_file,
                        &format!("{}-compare", direction),
                        page_number,
                    );
                    artifacts.push(save_png(&compare.pixmap, compare_dir, &name)?);
                }
            }
        }

        records.push(record);
        Ok(())
    }
}

fn save_png(
    pixmap: &tiny_skia::Pixmap,
    dir: &Path,
    file_name: &str,
) -> Result<PathBuf, PageDiffError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    let encoded = pixmap
        .encode_png()
        .map_err(|e| PageDiffError::Image(format!("png encode failed: {}", e)))?;
    fs::write(&path, encoded)?;
    Ok(path)
}
