use scribble_expand::{build_system, default_config, BorderPolicy, ClassMask, ColorImage, ScribbleSet};

#[test]
fn scribbled_rows_are_identity_and_others_are_stochastic() {
    let img = ColorImage::from_fn(5, 4, 1, |x, y| vec![(x * y) as f64 / 12.0]).unwrap();
    let set = ScribbleSet::new(vec![ClassMask::from_points(5, 4, &[(0, 0)]), ClassMask::from_points(5, 4, &[(4, 3), (2, 2)])]);
    let system = build_system(&img, &set, &default_config(false)).unwrap();
    let grid = img.grid();
    let scribbled = [grid.index(0, 0), grid.index(4, 3), grid.index(2, 2)];

    assert_eq!(system.rows(), 20);
    for (p, row) in system.matrix().outer_iterator().enumerate() {
        let entries: Vec<(usize, f64)> = row.iter().map(|(q, &v)| (q, v)).collect();
        if scribbled.contains(&p) {
            assert_eq!(entries, vec![(p, 1.0)]);
        } else {
            let diag: f64 = entries.iter().filter(|(q, _)| *q == p).map(|(_, v)| v).sum();
            let off: f64 = entries.iter().filter(|(q, _)| *q != p).map(|(_, v)| v).sum();
            assert_eq!(diag, 1.0);
            assert!((off + 1.0).abs() < 1e-12, "row {p}");
        }
    }
}

#[test]
fn right_hand_side_marks_only_the_class() {
    let img = ColorImage::from_raw(3, 1, 1, vec![0.0, 0.5, 1.0]).unwrap();
    let set = ScribbleSet::new(vec![ClassMask::from_points(3, 1, &[(0, 0)]), ClassMask::from_points(3, 1, &[(2, 0)])]);
    let system = build_system(&img, &set, &default_config(false)).unwrap();
    assert_eq!(system.rhs(0), vec![1.0, 0.0, 0.0]);
    assert_eq!(system.rhs(1), vec![0.0, 0.0, 1.0]);
    assert_eq!(system.for_class(1).class, 1);
}

#[test]
fn zero_pad_rows_lose_padding_mass() {
    let img = ColorImage::from_raw(3, 3, 1, vec![0.0; 9]).unwrap();
    let set = ScribbleSet::new(vec![ClassMask::from_points(3, 3, &[(1, 1)])]);
    let mut cfg = default_config(false);
    cfg.border = BorderPolicy::ZeroPad;
    let system = build_system(&img, &set, &cfg).unwrap();
    let corner: f64 = system.matrix().outer_view(0).unwrap().iter().filter(|(q, _)| *q != 0).map(|(_, &v)| v).sum();
    // flat window: 3 of the 8 sites are real pixels
    assert!((corner + 3.0 / 8.0).abs() < 1e-12);
}
