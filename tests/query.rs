mod common;

use bigwig_remote::{BigWigError, BigWigFile, DataRecord, GenomicRange, ZoomQuery};
use common::{build_fixture, MockSource, CHROM_LENGTH, RAW_EXPECTED, ZOOM_EXPECTED};

#[tokio::test]
async fn initialization_exposes_file_metadata() {
    for big in [false, true] {
        let source = MockSource::new(build_fixture(big));
        let mut bw = BigWigFile::open(source);

        assert!(bw.summary().is_none());
        bw.initialized().await.unwrap();
        // Idempotent.
        bw.initialized().await.unwrap();

        let summary = bw.summary().unwrap();
        assert_eq!(summary.bases_covered, 120_000);
        assert_eq!(summary.min_val, 0.5);
        assert_eq!(summary.max_val, 8.0);

        let chroms = bw.chromosomes().unwrap();
        assert_eq!(chroms.len(), 1);
        assert_eq!(chroms[0].name, "chr1");
        assert_eq!(chroms[0].length, CHROM_LENGTH);

        assert_eq!(bw.zoom_levels(), Some(1));
        assert_eq!(bw.zoom_headers().unwrap()[0].reduction_level, 1000);
    }
}

#[tokio::test]
async fn full_resolution_queries_filter_half_open() {
    for big in [false, true] {
        let source = MockSource::new(build_fixture(big));
        let mut bw = BigWigFile::open(source);

        // The whole covered region, by chromosome name.
        let records = bw
            .query(Some(GenomicRange::new("chr1", 0, 100_000)), None)
            .await
            .unwrap();
        let got: Vec<(u32, u32, f32)> = records
            .iter()
            .map(|r| (r.start(), r.end(), r.avg() as f32))
            .collect();
        assert_eq!(got, RAW_EXPECTED.to_vec());
        assert!(records.iter().all(|r| r.chrom_name().as_deref() == Some("chr1")));
        assert!(records.iter().all(|r| r.start() < 100_000 && r.end() > 0));

        // A sub-range: a record ending exactly at the query start and one
        // starting exactly at the query end are both excluded.
        let records = bw
            .query(Some(GenomicRange::new("chr1", 10_000, 20_000)), None)
            .await
            .unwrap();
        let got: Vec<(u32, u32)> = records.iter().map(|r| (r.start(), r.end())).collect();
        assert_eq!(got, vec![(10_000, 20_000)]);

        // Query by numeric chromosome id.
        let records = bw
            .query(Some(GenomicRange::new(0u32, 0, 10_000)), None)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].avg(), 1.0);
    }
}

#[tokio::test]
async fn fixed_step_positions_derive_from_the_section_header() {
    let source = MockSource::new(build_fixture(false));
    let mut bw = BigWigFile::open(source);

    let records = bw
        .query(Some(GenomicRange::new("chr1", 60_000, 60_030)), None)
        .await
        .unwrap();
    let got: Vec<(u32, u32, f32)> = records
        .iter()
        .map(|r| (r.start(), r.end(), r.avg() as f32))
        .collect();
    assert_eq!(
        got,
        vec![(60_000, 60_005, 4.0), (60_010, 60_015, 5.0), (60_020, 60_025, 6.0)]
    );
}

#[tokio::test]
async fn queries_without_a_range_return_everything() {
    let source = MockSource::new(build_fixture(false));
    let mut bw = BigWigFile::open(source);

    let records = bw.query(None, None).await.unwrap();
    assert_eq!(records.len(), RAW_EXPECTED.len());
}

#[tokio::test]
async fn explicit_zoom_levels_return_aggregated_records() {
    for big in [false, true] {
        let source = MockSource::new(build_fixture(big));
        let mut bw = BigWigFile::open(source);

        let records = bw
            .query(
                Some(GenomicRange::new("chr1", 0, 2000)),
                Some(ZoomQuery::level(0)),
            )
            .await
            .unwrap();
        assert_eq!(records.len(), ZOOM_EXPECTED.len());
        assert!(records.iter().all(|r| matches!(r, DataRecord::Zoom { .. })));

        let first = &records[0];
        assert_eq!(first.start(), 0);
        assert_eq!(first.end(), 1000);
        assert_eq!(first.min(), 0.5);
        assert_eq!(first.max(), 8.0);
        assert_eq!(first.sum(), 400.0);
        assert_eq!(first.sumsq(), 2500.0);
        assert_eq!(first.cnt(), 100.0);
        // avg = sum / validCount, norm = sqrt(sumsq / validCount).
        assert_eq!(first.avg(), 4.0);
        assert_eq!(first.norm(), 5.0);
    }
}

#[tokio::test]
async fn adaptive_zoom_selects_by_query_width() {
    let source = MockSource::new(build_fixture(false));
    let mut bw = BigWigFile::open(source);

    // A genome-wide query with a tight item budget lands on the zoom level.
    let records = bw
        .query(
            Some(GenomicRange::new("chr1", 0, CHROM_LENGTH)),
            Some(ZoomQuery::adaptive(Some(100), None)),
        )
        .await
        .unwrap();
    assert!(records.iter().all(|r| matches!(r, DataRecord::Zoom { .. })));
    assert_eq!(records.len(), ZOOM_EXPECTED.len());

    // A query narrower than the budget stays at full resolution.
    let records = bw
        .query(
            Some(GenomicRange::new("chr1", 0, 10_000)),
            Some(ZoomQuery::adaptive(Some(100_000), None)),
        )
        .await
        .unwrap();
    assert!(records.iter().all(|r| matches!(r, DataRecord::Raw { .. })));
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn error_paths_surface_typed_errors() {
    let source = MockSource::new(build_fixture(false));
    let mut bw = BigWigFile::open(source);

    let err = bw
        .query(Some(GenomicRange::new("chrNope", 0, 100)), None)
        .await
        .unwrap_err();
    assert!(matches!(err, BigWigError::UnknownChromosome(name) if name == "chrNope"));

    let err = bw
        .query(
            Some(GenomicRange::new("chr1", 0, 100)),
            Some(ZoomQuery::level(5)),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BigWigError::InvalidZoomIndex { requested: 5, available: 1 }
    ));
}

#[tokio::test]
async fn small_files_cost_one_round_trip() {
    let source = MockSource::new(build_fixture(false));
    let counter = std::sync::Arc::clone(&source);
    let mut bw = BigWigFile::open(source);

    bw.query(Some(GenomicRange::new("chr1", 0, 100_000)), None)
        .await
        .unwrap();
    // The whole fixture fits in one 512 KiB cache block, so every read of
    // header, trees and data coalesces into a single underlying fetch.
    assert_eq!(counter.fetch_count(), 1);

    // Re-querying (and querying the zoom level) touches only caches.
    bw.query(Some(GenomicRange::new("chr1", 0, 100_000)), None)
        .await
        .unwrap();
    bw.query(
        Some(GenomicRange::new("chr1", 0, 2000)),
        Some(ZoomQuery::level(0)),
    )
    .await
    .unwrap();
    assert_eq!(counter.fetch_count(), 1);
}

#[tokio::test]
async fn records_render_with_chromosome_names() {
    let source = MockSource::new(build_fixture(false));
    let mut bw = BigWigFile::open(source);

    let records = bw
        .query(Some(GenomicRange::new("chr1", 0, 10_000)), None)
        .await
        .unwrap();
    assert_eq!(records[0].to_string(), "chr1:0-10000\t1");
}
