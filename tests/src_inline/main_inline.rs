use super::*;

fn parse(args: &[&str]) -> Cli {
    let mut argv = vec!["kira-elemaps"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
}

fn run_args(args: &[&str]) -> RunArgs {
    let mut argv = vec!["run", "--input", "data", "--out", "out"];
    argv.extend_from_slice(args);
    match parse(&argv).command {
        Command::Run(args) => args,
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn test_run_defaults() {
    let args = run_args(&[]);
    assert_eq!(args.dirs.input, PathBuf::from("data"));
    assert_eq!(args.scale_mode, ScaleModeArg::Auto);
    assert_eq!(args.pixel_size, 6.0);
    assert_eq!(args.scale_bar_um, 500.0);
    assert_eq!(args.aspect, 1.3);
    assert!(args.elements.is_empty());

    let config = build_config(&args, Vec::new()).unwrap();
    assert_eq!(config.scale.mode, ScaleMode::AutoPercentile);
    assert_eq!(config.colormap, ColorMap::Jet);
    assert!(config.layout.auto_fallback);
}

#[test]
fn test_fixed_scale_requires_value() {
    let args = run_args(&["--scale-mode", "fixed"]);
    assert!(build_config(&args, Vec::new()).is_err());

    let args = run_args(&["--scale-mode", "fixed", "--scale-max", "250"]);
    let config = build_config(&args, Vec::new()).unwrap();
    assert_eq!(config.scale.mode, ScaleMode::UserFixed);
    assert_eq!(config.scale.value, Some(250.0));
}

#[test]
fn test_layout_flags() {
    let args = run_args(&["--rows", "3", "--no-row-fallback"]);
    let config = build_config(&args, Vec::new()).unwrap();
    assert_eq!(config.layout.user_rows, Some(3));
    assert!(!config.layout.auto_fallback);
}

#[test]
fn test_unknown_colormap_rejected() {
    let args = run_args(&["--colormap", "rainbow"]);
    assert!(build_config(&args, Vec::new()).is_err());
}

#[test]
fn test_repeatable_element_and_exclude() {
    let args = run_args(&["--element", "Fe56_ppm", "--element", "Cu63", "--exclude", "S2"]);
    assert_eq!(args.elements, vec!["Fe56_ppm", "Cu63"]);
    assert_eq!(args.excluded, vec!["S2"]);
}

#[test]
fn test_select_elements_exact_and_bare() {
    let available = vec![
        ElementKey::new("Fe56", Unit::Ppm),
        ElementKey::new("Fe56", Unit::Cps),
        ElementKey::new("Cu63", Unit::Ppm),
    ];
    let exact = select_elements(&["Fe56_ppm".to_string()], &available).unwrap();
    assert_eq!(exact, vec![ElementKey::new("Fe56", Unit::Ppm)]);

    let bare = select_elements(&["Fe56".to_string()], &available).unwrap();
    assert_eq!(bare.len(), 2);

    assert!(select_elements(&["Zn66".to_string()], &available).is_err());
    assert!(select_elements(&[], &available).unwrap().is_empty());
}

#[test]
fn test_status_and_template_commands() {
    assert!(matches!(
        parse(&["status", "--input", "a", "--out", "b"]).command,
        Command::Status(_)
    ));
    match parse(&["pixel-template", "--input", "a", "--out", "sizes.csv", "--pixel-size", "10"]).command {
        Command::PixelTemplate(args) => assert_eq!(args.pixel_size, 10.0),
        other => panic!("unexpected command {other:?}"),
    }
    assert!(parse(&["-v", "status", "--input", "a", "--out", "b"]).verbose);
}

#[test]
fn test_only_exclude_and_sample_pixel_size() {
    let args = run_args(&[
        "--only",
        "S1",
        "--only",
        "S3",
        "--exclude",
        "S3",
        "--sample-pixel-size",
        "S1=8.5",
    ]);
    assert_eq!(args.sample_pixel_sizes, vec![("S1".to_string(), 8.5)]);

    let mut samples = SampleSet::from_names(["S1", "S2", "S3"]);
    apply_sample_args(&args, &mut samples).unwrap();
    let included = samples.included().map(|s| s.name.as_str()).collect::<Vec<_>>();
    assert_eq!(included, vec!["S1"]);
    assert_eq!(samples.get("S1").unwrap().pixel_size, Some(8.5));

    let config = build_config(&args, Vec::new()).unwrap();
    assert_eq!(config.pixel_size_for("S1", samples.get("S1").unwrap().pixel_size), 8.5);
    assert_eq!(config.pixel_size_for("S2", None), 6.0);
}

#[test]
fn test_sample_args_reject_unknown_or_bad_values() {
    let mut samples = SampleSet::from_names(["S1"]);
    assert!(apply_sample_args(&run_args(&["--only", "S9"]), &mut samples).is_err());

    let mut samples = SampleSet::from_names(["S1"]);
    assert!(apply_sample_args(&run_args(&["--sample-pixel-size", "S1=0"]), &mut samples).is_err());

    assert!(parse_sample_pixel_size("S1").is_err());
    assert!(parse_sample_pixel_size("S1=abc").is_err());
    assert_eq!(
        parse_sample_pixel_size("core 12 = 4").unwrap(),
        ("core 12".to_string(), 4.0)
    );
}
