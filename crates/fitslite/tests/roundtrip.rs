//! End-to-end round-trip tests: build a container on disk, reload it, and
//! check that headers, payloads, and inventory survive unchanged.

use std::path::PathBuf;

use fitslite::fitsfile::FitsFile;
use fitslite::header::Commentary;
use fitslite::image::ImageData;
use fitslite::table::{ColumnData, TableColumn, TableData};
use fitslite::texttable::{read_table, ReadOptions};
use fitslite::{Error, Value};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn temp_path(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

fn spectrum_table() -> TableData {
    TableData::new(vec![
        TableColumn {
            name: Some(String::from("LAMBDA")),
            data: ColumnData::Float(vec![3500.0, 4500.0, 5500.0]),
        },
        TableColumn {
            name: Some(String::from("COUNTS")),
            data: ColumnData::Integer(vec![120, 981, 404]),
        },
        TableColumn {
            name: Some(String::from("FILTER")),
            data: ColumnData::Text(vec![
                String::from("u"),
                String::from("g"),
                String::from("r"),
            ]),
        },
    ])
    .unwrap()
}

/// Create a three-unit container on disk and return its path.
fn build_sample(dir: &tempfile::TempDir) -> PathBuf {
    let path = temp_path(dir, "sample.fits");
    let mut f = FitsFile::create(&path).open().unwrap();

    let pixels = ImageData::F32((0..64).map(|i| i as f32 / 3.0).collect());
    f.append_image("SCI", &[8, 8], &pixels).unwrap();
    f.append_table("SPEC", &spectrum_table()).unwrap();

    let primary = f.primary_mut().header_mut();
    primary.set("TELESCOP", "1.2m", Some("survey telescope")).unwrap();
    primary.set("EXPTIME", 30.0f64, Some("seconds")).unwrap();
    primary.append_commentary(Commentary::History, "bias subtracted");
    primary.append_commentary(Commentary::History, "flat corrected");
    primary.append_commentary(Commentary::Comment, "demo container");

    f.close().unwrap();
    path
}

// ===========================================================================
// Container round-trips
// ===========================================================================

#[test]
fn full_container_survives_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = build_sample(&dir);

    let first = FitsFile::open(&path).unwrap();
    let copy = temp_path(&dir, "copy.fits");
    first.save_as(&copy).unwrap();
    let second = FitsFile::open(&copy).unwrap();

    // Inventory is identical.
    assert_eq!(first.list_units().unwrap(), second.list_units().unwrap());

    // Every header card and every payload is identical.
    assert_eq!(first.num_units(), second.num_units());
    for i in 0..first.num_units() {
        assert_eq!(
            first.hdu(i).unwrap().header(),
            second.hdu(i).unwrap().header(),
            "header mismatch in unit {}",
            i
        );
        assert_eq!(
            first.data(i).unwrap(),
            second.data(i).unwrap(),
            "payload mismatch in unit {}",
            i
        );
    }
}

#[test]
fn header_values_and_comments_survive_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = build_sample(&dir);

    let f = FitsFile::open(&path).unwrap();
    let primary = f.primary().header();
    assert_eq!(primary.string("TELESCOP").as_deref(), Some("1.2m"));
    assert_eq!(
        primary.card("TELESCOP").unwrap().comment.as_deref(),
        Some("survey telescope")
    );
    assert_eq!(primary.float("EXPTIME"), Some(30.0));
    assert_eq!(
        primary.history().collect::<Vec<_>>(),
        vec!["bias subtracted", "flat corrected"]
    );
    assert_eq!(primary.comments().collect::<Vec<_>>(), vec!["demo container"]);
}

#[test]
fn commentary_count_is_exact_across_saves() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "hist.fits");
    FitsFile::create(&path).open().unwrap().close().unwrap();

    let n = 7;
    FitsFile::with_edit(&path, |f| {
        for _ in 0..n {
            f.primary_mut()
                .header_mut()
                .append_commentary(Commentary::History, "same text every time");
        }
        Ok(())
    })
    .unwrap();

    let f = FitsFile::open(&path).unwrap();
    assert_eq!(f.primary().header().history().count(), n);
}

#[test]
fn case_insensitive_header_access_across_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "case.fits");
    {
        let mut f = FitsFile::create(&path).open().unwrap();
        f.primary_mut()
            .header_mut()
            .set("crpix1", 12i64, None)
            .unwrap();
        f.close().unwrap();
    }
    let f = FitsFile::open(&path).unwrap();
    assert_eq!(
        f.primary().header().value("CRPIX1").unwrap(),
        &Value::Integer(12)
    );
}

#[test]
fn failed_deletion_leaves_header_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = build_sample(&dir);

    let mut f = FitsFile::edit(&path).unwrap();
    let before = f.primary().header().clone();
    assert!(matches!(
        f.primary_mut().header_mut().delete("NOBS"),
        Err(Error::Lookup(_))
    ));
    assert_eq!(f.primary().header(), &before);
}

#[test]
fn lazy_view_mutation_persists_through_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = build_sample(&dir);

    {
        let f = FitsFile::edit(&path).unwrap();
        let view = f.image_view("SCI").unwrap();
        view.set(0, -5.5).unwrap();
        view.set(63, 123.25).unwrap();

        // Visible through a fresh eager read on the still-open container.
        let data = f.data("SCI").unwrap().into_image().unwrap();
        assert_eq!(data.get_f64(0).unwrap(), -5.5);

        drop(view);
        f.close().unwrap();
    }

    let f = FitsFile::open(&path).unwrap();
    let data = f.data("SCI").unwrap().into_image().unwrap();
    assert_eq!(data.get_f64(0).unwrap(), -5.5);
    assert_eq!(data.get_f64(63).unwrap(), 123.25);
}

#[test]
fn table_payload_round_trips_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let path = build_sample(&dir);

    let f = FitsFile::open(&path).unwrap();
    let table = f.data("SPEC").unwrap().into_table().unwrap();
    let expected = spectrum_table();
    assert_eq!(table.n_rows(), expected.n_rows());
    for name in ["LAMBDA", "COUNTS", "FILTER"] {
        assert_eq!(table.column(name).unwrap(), expected.column(name).unwrap());
    }
}

#[test]
fn units_selectable_by_name_and_pair_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = build_sample(&dir);

    let f = FitsFile::open(&path).unwrap();
    assert_eq!(f.hdu("SCI").unwrap().name().as_deref(), Some("SCI"));
    assert_eq!(f.hdu(("SPEC", 1i64)).unwrap().name().as_deref(), Some("SPEC"));
    assert!(matches!(f.hdu("GHOST"), Err(Error::Lookup(_))));
}

#[test]
fn inventory_describes_every_unit() {
    let dir = tempfile::tempdir().unwrap();
    let path = build_sample(&dir);

    let f = FitsFile::open(&path).unwrap();
    let lines: Vec<String> = f
        .list_units()
        .unwrap()
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("PRIMARY"));
    assert!(lines[1].contains("SCI,1"));
    assert!(lines[1].contains("8 x 8 (float32)"));
    assert!(lines[2].contains("3 cols x 3 rows"));
}

// ===========================================================================
// Text table scenario
// ===========================================================================

#[test]
fn throughput_file_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = temp_path(&dir, "throughput.txt");
    std::fs::write(
        &path,
        "# downloaded from the archive\n\
         lambda throughput\n\
         \n\
         3500.0 0.12\n\
         4500.0 0.68\n\
         5500.0 0.84\n",
    )
    .unwrap();

    let opts = ReadOptions {
        header_line: 2,
        data_start: 3,
        ..ReadOptions::default()
    };
    let table = read_table(&path, &opts).unwrap();

    assert_eq!(table.names(), vec!["lambda", "throughput"]);
    assert_eq!(table.n_rows(), 3);
    assert_eq!(
        table.column("lambda").unwrap(),
        &ColumnData::Float(vec![3500.0, 4500.0, 5500.0])
    );
}
