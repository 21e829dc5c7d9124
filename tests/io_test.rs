use std::path::{Path, PathBuf};

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use scribble_expand::io::{load_annotation_mask, load_image_with_annotations, save_annotations};
use scribble_expand::{default_config, process, ConfigError, Config, Params, SegmentError};

fn write_base(dir: &Path) -> PathBuf {
    let path = dir.join("base.png");
    let img: GrayImage = ImageBuffer::from_fn(4, 4, |_x, y| Luma([if y < 2 { 10 } else { 200 }]));
    img.save(&path).unwrap();
    path
}

fn write_annotation(dir: &Path, name: &str, w: u32, h: u32, at: (u32, u32)) -> PathBuf {
    let path = dir.join(name);
    let img: RgbImage = ImageBuffer::from_fn(w, h, |x, y| if (x, y) == at { Rgb([255, 0, 0]) } else { Rgb([0, 0, 0]) });
    img.save(&path).unwrap();
    path
}

fn config() -> Config {
    let mut cfg = default_config(false);
    cfg.num_threads = 1;
    cfg
}

#[test]
fn process_writes_expanded_masks_next_to_annotations() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_base(dir.path());
    let top = write_annotation(dir.path(), "top.png", 4, 4, (0, 0));
    let bottom = write_annotation(dir.path(), "bottom.png", 4, 4, (3, 3));
    let labels = dir.path().join("labels.png");

    let written = process(Params {
        image_path: base,
        annotation_paths: vec![top, bottom],
        labels_path: Some(labels.clone()),
        config: config(),
    })
    .expect("process should succeed");

    assert_eq!(written, vec![dir.path().join("top_expanded.png"), dir.path().join("bottom_expanded.png")]);
    let top_mask = load_annotation_mask(&written[0], 1).unwrap();
    let bottom_mask = load_annotation_mask(&written[1], 1).unwrap();
    for y in 0..4 {
        for x in 0..4 {
            assert_eq!(top_mask.get(x, y), y < 2);
            assert_eq!(bottom_mask.get(x, y), y >= 2);
        }
    }
    let label_img = image::open(&labels).unwrap().to_luma8();
    assert_eq!(label_img.get_pixel(0, 0).0, [0]);
    assert_eq!(label_img.get_pixel(0, 3).0, [255]);
}

#[test]
fn annotation_size_must_match_image() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_base(dir.path());
    let small = write_annotation(dir.path(), "small.png", 3, 4, (0, 0));
    let err = load_image_with_annotations(&base, &[small], &config()).unwrap_err();
    assert!(matches!(err, SegmentError::Configuration(ConfigError::DimensionMismatch { .. })));
}

#[test]
fn missing_annotation_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_base(dir.path());
    let err = load_image_with_annotations(&base, &[dir.path().join("nope.png")], &config()).unwrap_err();
    assert!(matches!(err, SegmentError::Io(_)));
}

#[test]
fn down_scaling_shrinks_image_and_masks() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_base(dir.path());
    let ann = write_annotation(dir.path(), "a.png", 4, 4, (2, 2));
    let mut cfg = config();
    cfg.down_scaling = 2;
    let (img, scribbles) = load_image_with_annotations(&base, &[ann], &cfg).unwrap();
    assert_eq!((img.width(), img.height(), img.channels()), (2, 2, 1));
    assert!(scribbles.masks()[0].get(1, 1));
    assert_eq!(scribbles.masks()[0].count(), 1);
}

#[test]
fn output_path_count_must_match_classes() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_base(dir.path());
    let top = write_annotation(dir.path(), "top.png", 4, 4, (0, 0));
    let bottom = write_annotation(dir.path(), "bottom.png", 4, 4, (3, 3));
    let (img, scribbles) = load_image_with_annotations(&base, &[top, bottom], &config()).unwrap();
    let out = scribble_expand::expand_annotations(&img, &scribbles, &config()).unwrap();
    let err = save_annotations(&[dir.path().join("only.png")], &out.map).unwrap_err();
    assert!(matches!(err, SegmentError::Configuration(ConfigError::ClassCountMismatch { expected: 2, found: 1 })));
}
