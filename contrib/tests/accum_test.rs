use contrib::{
    BinContext, ContribError, ContribRegistry, OutputFormat, OutputSpec, SharedBuffer, SinkTable,
};
use radiometry::Color;

fn ascii_registry(mods: &[(&str, Option<&str>, i64)]) -> (ContribRegistry, SinkTable, SharedBuffer) {
    let mut registry = ContribRegistry::new();
    for (name, expr, nbins) in mods {
        registry
            .register(name, OutputSpec::stdout(OutputFormat::Ascii), *expr, *nbins)
            .unwrap();
    }
    let mut sinks = SinkTable::new();
    let buffer = SharedBuffer::new();
    registry.connect_buffers(&mut sinks, &buffer);
    (registry, sinks, buffer)
}

#[test]
fn register_contribute_flush_round_trip() {
    let (mut registry, mut sinks, buffer) = ascii_registry(&[("glass", Some("dz"), 3)]);
    let idx = registry.find("glass").unwrap();
    assert_eq!(registry.get(idx).nbins(), 3);

    let n = 250;
    for _ in 0..n {
        assert!(registry.contribute(idx, 1, Color::new(0.5, 0.25, 0.125)));
    }
    registry.flush(&mut sinks).unwrap();

    let text = String::from_utf8(buffer.take()).unwrap();
    let fields = text
        .trim()
        .split(|c| c == ' ' || c == '\t')
        .map(|f| f.parse::<f64>().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(fields.len(), 9);
    // Bin 1 holds exactly N * v; the other bins stayed zero.
    assert_eq!(&fields[0..3], &[0.0, 0.0, 0.0]);
    assert!((fields[3] - 0.5 * n as f64).abs() < 1e-9);
    assert!((fields[4] - 0.25 * n as f64).abs() < 1e-9);
    assert!((fields[5] - 0.125 * n as f64).abs() < 1e-9);
    assert_eq!(&fields[6..9], &[0.0, 0.0, 0.0]);

    // All bins zeroed by the flush: the next record is all zeros.
    registry.flush(&mut sinks).unwrap();
    let text = String::from_utf8(buffer.take()).unwrap();
    assert!(text
        .trim()
        .split(|c| c == ' ' || c == '\t')
        .all(|f| f.parse::<f64>().unwrap() == 0.0));
}

#[test]
fn out_of_range_bin_is_dropped_without_side_effects() {
    let (mut registry, mut sinks, buffer) = ascii_registry(&[("m", Some("dx"), 2)]);
    let idx = 0;
    assert!(registry.contribute(idx, 0, Color::ONE));
    // bin == nbins and negative bins are both dropped.
    assert!(!registry.contribute(idx, 2, Color::new(9.0, 9.0, 9.0)));
    assert!(!registry.contribute(idx, -1, Color::new(9.0, 9.0, 9.0)));

    registry.flush(&mut sinks).unwrap();
    let text = String::from_utf8(buffer.take()).unwrap();
    let fields = text
        .trim()
        .split(|c| c == ' ' || c == '\t')
        .map(|f| f.parse::<f64>().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(fields, vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0]);
}

#[test]
fn duplicate_modifier_rejected() {
    let mut registry = ContribRegistry::new();
    let spec = OutputSpec::stdout(OutputFormat::Ascii);
    registry.register("m", spec.clone(), None, 1).unwrap();
    let err = registry.register("m", spec, None, 1).unwrap_err();
    assert!(matches!(err, ContribError::DuplicateModifier(_)));
}

#[test]
fn bin_count_validation() {
    let mut registry = ContribRegistry::new();
    let spec = OutputSpec::stdout(OutputFormat::Ascii);

    // Non-constant expression with no bin count is illegal.
    let err = registry.register("a", spec.clone(), Some("dx"), 0).unwrap_err();
    assert!(matches!(err, ContribError::InvalidBinCount { .. }));

    // A constant expression must select bin 0; the count is forced to 1.
    let idx = registry.register("b", spec.clone(), Some("2 - 2"), 0).unwrap();
    assert_eq!(registry.get(idx).nbins(), 1);
    let err = registry.register("c", spec.clone(), Some("3"), 5).unwrap_err();
    assert!(matches!(err, ContribError::NonZeroConstant(_)));

    // Unspecified expression defaults to the single-bin constant.
    let idx = registry.register("d", spec, None, 0).unwrap();
    assert_eq!(registry.get(idx).nbins(), 1);
}

#[test]
fn bin_expression_sees_the_hit_context() {
    let (registry, _sinks, _buffer) = ascii_registry(&[("m", Some("floor(px) + abs(dz)"), 8)]);
    let ctx = BinContext {
        px: 2.9,
        dz: -1.0,
        ..Default::default()
    };
    assert_eq!(registry.get(0).eval_bin(&ctx), 3);
}
