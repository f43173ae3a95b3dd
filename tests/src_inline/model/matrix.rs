use super::*;

#[test]
fn test_from_rows_rejects_ragged() {
    let ragged = vec![vec![1.0, 2.0], vec![3.0]];
    assert!(Matrix::from_rows(ragged, Unit::Ppm).is_none());

    let m = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]], Unit::Ppm).unwrap();
    assert_eq!(m.rows(), 2);
    assert_eq!(m.cols(), 2);
    assert_eq!(m.get(1, 0), Some(3.0));
    assert_eq!(m.get(2, 0), None);
}

#[test]
fn test_valid_values_skip_nan() {
    let m = Matrix::new(1, 4, vec![1.0, f64::NAN, 3.0, f64::NAN], Unit::Cps).unwrap();
    assert_eq!(m.n_valid(), 2);
    assert_eq!(m.valid_values().collect::<Vec<_>>(), vec![1.0, 3.0]);
}

#[test]
fn test_fingerprint_tracks_content() {
    let a = Matrix::new(1, 2, vec![1.0, 2.0], Unit::Ppm).unwrap();
    let b = Matrix::new(1, 2, vec![1.0, 2.0], Unit::Ppm).unwrap();
    let c = Matrix::new(1, 2, vec![1.0, 2.5], Unit::Ppm).unwrap();
    let d = Matrix::new(2, 1, vec![1.0, 2.0], Unit::Ppm).unwrap();
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_ne!(a.fingerprint(), c.fingerprint());
    assert_ne!(a.fingerprint(), d.fingerprint());
}

#[test]
fn test_downsample_block_mean_ignores_nan() {
    let values = vec![
        1.0, 3.0, 5.0, 5.0, //
        f64::NAN, 2.0, 5.0, 5.0, //
        0.0, 0.0, f64::NAN, f64::NAN, //
        0.0, 4.0, f64::NAN, f64::NAN,
    ];
    let m = Matrix::new(4, 4, values, Unit::Ppm).unwrap();
    let small = m.downsample(2);
    assert_eq!(small.rows(), 2);
    assert_eq!(small.cols(), 2);
    assert_eq!(small.get(0, 0), Some(2.0));
    assert_eq!(small.get(0, 1), Some(5.0));
    assert_eq!(small.get(1, 0), Some(1.0));
    assert!(small.get(1, 1).unwrap().is_nan());

    assert_eq!(m.downsample(8).fingerprint(), m.fingerprint());
}

#[test]
fn test_downsample_factor_matches_block_edge() {
    let m = Matrix::new(10, 7, vec![1.0; 70], Unit::Ppm).unwrap();
    assert_eq!(m.downsample_factor(3), 3);
    assert_eq!(m.downsample(3).rows(), 4);
    assert_eq!(m.downsample(3).cols(), 3);
    assert_eq!(m.downsample_factor(10), 1);
    assert_eq!(m.downsample_factor(0), 1);
    // 10 / 6 rounds down to a factor of 1: nothing to average
    assert_eq!(m.downsample_factor(6), 1);
    assert_eq!(m.downsample(6), m);
}

#[test]
fn test_element_key_ordering() {
    let mut keys = vec![
        ElementKey::new("Fe56", Unit::Cps),
        ElementKey::new("Mo98", Unit::Ppm),
        ElementKey::new("Ca44", Unit::Ppm),
        ElementKey::new("Ca100", Unit::Ppm),
        ElementKey::new("Ca9", Unit::Ppm),
        ElementKey::new("TotalMo", Unit::Counts),
    ];
    keys.sort();
    let names = keys.iter().map(|k| k.dir_name()).collect::<Vec<_>>();
    assert_eq!(
        names,
        vec![
            "Ca9_ppm",
            "Ca44_ppm",
            "Ca100_ppm",
            "Mo98_ppm",
            "Fe56_CPS",
            "TotalMo_raw"
        ]
    );
}

#[test]
fn test_unit_parse() {
    assert_eq!(Unit::parse("ppm"), Some(Unit::Ppm));
    assert_eq!(Unit::parse("CPS"), Some(Unit::Cps));
    assert_eq!(Unit::parse("raw"), Some(Unit::Counts));
    assert_eq!(Unit::parse("wt%"), None);
}
