//! End-to-end runs: JSON document → `RasterHost` → files on disk.

use image::{Rgba, RgbaImage};
use permute_layers::config::{self, CONFIG_FILE};
use permute_layers::document::{self, MetadataStore, PERM_FORMAT_KEY};
use permute_layers::host::{ExportParams, RasterHost};
use permute_layers::permute::{self, PermuteError, RunOptions, count_tuples};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

fn write_png(dir: &Path, name: &str, width: u32, height: u32, color: Rgba<u8>) {
    RgbaImage::from_pixel(width, height, color)
        .save(dir.join(name))
        .unwrap();
}

fn write_document(dir: &Path, json: &str) -> std::path::PathBuf {
    let path = dir.join("document.json");
    fs::write(&path, json).unwrap();
    path
}

fn pixel(path: &Path, x: u32, y: u32) -> Rgba<u8> {
    *image::open(path).unwrap().to_rgba8().get_pixel(x, y)
}

fn run_document(
    dir: &Path,
    doc_path: &Path,
    template: &str,
    expand_subgroups: bool,
) -> (RasterHost, Result<permute::RunReport, PermuteError>) {
    let tree = document::load_document(doc_path)
        .unwrap()
        .to_tree(dir)
        .unwrap();
    let host = RasterHost::new(tree, ExportParams::default());
    let options = RunOptions {
        export_dir: dir.join("out"),
        filename_template: template.to_string(),
        expand_subgroups,
    };
    let result = permute::run(&host, host.tree(), &options);
    (host, result)
}

#[test]
fn expanded_group_over_fixed_stack() {
    let tmp = TempDir::new().unwrap();
    write_png(tmp.path(), "green.png", 1, 1, GREEN);
    write_png(tmp.path(), "white.png", 1, 1, WHITE);
    write_png(tmp.path(), "skin.png", 4, 4, RED);
    let doc = write_document(
        tmp.path(),
        r#"{
            "width": 4, "height": 4,
            "layers": [
                { "name": "Eyes (prm)", "layers": [
                    { "name": "Green", "image": "green.png", "offset": [1, 1] },
                    { "name": "White", "image": "white.png", "offset": [1, 1] }
                ] },
                { "name": "Face", "layers": [
                    { "name": "Skin", "image": "skin.png" }
                ] }
            ]
        }"#,
    );

    let (host, result) = run_document(tmp.path(), &doc, "{0}/{1}.png", true);
    let report = result.unwrap();

    let out = tmp.path().join("out");
    assert_eq!(report.exports.len(), 2);
    assert_eq!(report.exports[0].path, out.join("Green/Face.png"));
    assert_eq!(report.exports[1].path, out.join("White/Face.png"));

    assert_eq!(pixel(&out.join("Green/Face.png"), 1, 1), GREEN);
    assert_eq!(pixel(&out.join("Green/Face.png"), 0, 0), RED);
    assert_eq!(pixel(&out.join("White/Face.png"), 1, 1), WHITE);

    assert_eq!(host.live_canvases(), 0);
    assert_eq!(host.undo_depth(), 0);
}

#[test]
fn group_children_as_alternatives_to_jpeg() {
    let tmp = TempDir::new().unwrap();
    write_png(tmp.path(), "h1.png", 4, 4, RED);
    write_png(tmp.path(), "h2.png", 4, 4, BLUE);
    write_png(tmp.path(), "o1.png", 4, 4, WHITE);
    let doc = write_document(
        tmp.path(),
        r#"{
            "width": 4, "height": 4,
            "layers": [
                { "name": "Hair", "layers": [
                    { "name": "H1", "image": "h1.png" },
                    { "name": "H2", "image": "h2.png" }
                ] },
                { "name": "Outfit", "layers": [
                    { "name": "O1", "image": "o1.png" }
                ] }
            ]
        }"#,
    );

    let (host, result) = run_document(tmp.path(), &doc, "{0}/{1}.jpg", false);
    result.unwrap();

    let out = tmp.path().join("out");
    for file in ["H1/O1.jpg", "H2/O1.jpg"] {
        let decoded = image::open(out.join(file)).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 4));
    }
    // Hair is on top and fully opaque.
    let top_left = pixel(&out.join("H2/O1.jpg"), 0, 0);
    assert!(top_left[2] > 200 && top_left[0] < 60, "{top_left:?}");
    assert_eq!(host.live_canvases(), 0);
}

#[test]
fn nested_opacity_reaches_the_file() {
    let tmp = TempDir::new().unwrap();
    write_png(tmp.path(), "white.png", 2, 2, WHITE);
    write_png(tmp.path(), "black.png", 2, 2, BLACK);
    let doc = write_document(
        tmp.path(),
        r#"{
            "width": 2, "height": 2,
            "layers": [
                { "name": "Outer (prm)", "layers": [
                    { "name": "Inner (prm)", "opacity": 80.0, "layers": [
                        { "name": "Leaf", "image": "white.png", "opacity": 50.0 }
                    ] }
                ] },
                { "name": "Base", "image": "black.png" }
            ]
        }"#,
    );

    let (_host, result) = run_document(tmp.path(), &doc, "{0}-{1}.png", true);
    let report = result.unwrap();

    let file = tmp.path().join("out/Inner.0-Base.png");
    assert_eq!(report.exports[0].path, file);
    // White at 40% over black.
    assert_eq!(pixel(&file, 0, 0), Rgba([102, 102, 102, 255]));
}

#[test]
fn naming_templates_come_from_document_metadata() {
    let tmp = TempDir::new().unwrap();
    write_png(tmp.path(), "a.png", 2, 2, RED);
    write_png(tmp.path(), "b.png", 2, 2, BLUE);
    write_png(tmp.path(), "bg.png", 2, 2, WHITE);
    let doc_path = write_document(
        tmp.path(),
        r#"{
            "width": 2, "height": 2,
            "layers": [
                { "name": "Look (prm)", "layers": [
                    { "name": "Style (prm) (hasbg)", "layers": [
                        { "name": "A", "image": "a.png" },
                        { "name": "B", "image": "b.png" }
                    ] },
                    { "name": "Backdrop", "image": "bg.png" }
                ] }
            ]
        }"#,
    );

    let mut doc = document::load_document(&doc_path).unwrap();
    doc.write_metadata("Look (prm)", PERM_FORMAT_KEY, "look-{counter:02}-{0.name}")
        .unwrap();
    doc.write_metadata("Look (prm)/Style (prm) (hasbg)", PERM_FORMAT_KEY, "{0.name}")
        .unwrap();
    document::save_document(&doc, &doc_path).unwrap();

    let (_host, result) = run_document(tmp.path(), &doc_path, "{0}.png", true);
    let report = result.unwrap();

    let names: Vec<&str> = report
        .exports
        .iter()
        .map(|e| e.picks[0].as_str())
        .collect();
    assert_eq!(names, vec!["look-00-A", "look-01-B"]);
    assert!(tmp.path().join("out/look-01-B.png").exists());
}

#[test]
fn config_file_drives_counts() {
    let tmp = TempDir::new().unwrap();
    write_png(tmp.path(), "x.png", 2, 2, RED);
    fs::write(
        tmp.path().join(CONFIG_FILE),
        "[export]\nexpand_subgroups = true\nfilename_template = \"{0}.png\"\n",
    )
    .unwrap();
    let doc_path = write_document(
        tmp.path(),
        r#"{
            "width": 2, "height": 2,
            "layers": [
                { "name": "Pick (prm)", "layers": [
                    { "name": "X1", "image": "x.png" },
                    { "name": "X2", "image": "x.png" },
                    { "name": "X3", "image": "x.png", "visible": false }
                ] }
            ]
        }"#,
    );

    let settings = config::load_config(tmp.path()).unwrap();
    let tree = document::load_document(&doc_path)
        .unwrap()
        .to_tree(tmp.path())
        .unwrap();
    assert_eq!(count_tuples(&tree, settings.export.expand_subgroups), 2);

    let (_host, result) = run_document(
        tmp.path(),
        &doc_path,
        &settings.export.filename_template,
        settings.export.expand_subgroups,
    );
    assert_eq!(result.unwrap().exports.len(), 2);
    assert!(tmp.path().join("out/X2.png").exists());
    assert!(!tmp.path().join("out/X3.png").exists());
}

#[test]
fn blocked_output_path_releases_every_canvas() {
    let tmp = TempDir::new().unwrap();
    write_png(tmp.path(), "x.png", 2, 2, RED);
    let doc = write_document(
        tmp.path(),
        r#"{
            "width": 2, "height": 2,
            "layers": [
                { "name": "Pick (prm)", "layers": [
                    { "name": "X1", "image": "x.png" },
                    { "name": "X2", "image": "x.png" }
                ] }
            ]
        }"#,
    );
    fs::create_dir_all(tmp.path().join("out")).unwrap();
    fs::write(tmp.path().join("out/X2"), b"not a directory").unwrap();

    let (host, result) = run_document(tmp.path(), &doc, "{0}/image.png", true);

    assert!(matches!(result, Err(PermuteError::Resource { .. })));
    assert!(tmp.path().join("out/X1/image.png").exists());
    assert_eq!(host.live_canvases(), 0);
    assert_eq!(host.undo_depth(), 0);
}

#[test]
fn unwritable_output_file_is_resource_error() {
    let tmp = TempDir::new().unwrap();
    write_png(tmp.path(), "x.png", 2, 2, RED);
    let doc = write_document(
        tmp.path(),
        r#"{
            "width": 2, "height": 2,
            "layers": [
                { "name": "Pick (prm)", "layers": [
                    { "name": "X1", "image": "x.png" }
                ] }
            ]
        }"#,
    );
    // A directory where the file should go.
    fs::create_dir_all(tmp.path().join("out/X1.png")).unwrap();

    let (host, result) = run_document(tmp.path(), &doc, "{0}.png", true);

    match result {
        Err(PermuteError::Resource { path, .. }) => {
            assert_eq!(path, tmp.path().join("out/X1.png"));
        }
        other => panic!("expected a resource error, got {other:?}"),
    }
    assert_eq!(host.live_canvases(), 0);
}
