//! End-to-end runs into `.dat` files.

#![cfg(feature = "storage_csv")]

use parspace::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn space(source: Arc<MockSource>) -> ParameterSpace {
    let mut registry = InstrumentRegistry::new();
    registry.register(source);
    let mut settings = Settings::default();
    settings.run.point_yield = Duration::ZERO;
    settings.sync.enabled = false;
    ParameterSpace::new("iv_curve", registry).with_settings(settings)
}

fn data_lines(text: &str) -> Vec<&str> {
    text.lines().filter(|line| !line.starts_with('#')).collect()
}

#[tokio::test]
async fn test_grid_run_writes_blocks_and_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(MockSource::new("smu"));
    let mut space = space(source.clone());
    space.set_user("alice");
    space.add_axis(
        Axis::new("gate", 0.0, 1.0, 1.0)
            .with_unit("V")
            .with_binding(AxisBinding::parameter("smu", "gate")),
    );
    space.add_axis(
        Axis::new("bias", 0.0, 2.0, 1.0)
            .with_unit("V")
            .with_binding(AxisBinding::parameter("smu", "bias")),
    );
    space.add_measurand(Measurand::from_parameter("I", source, "bias").with_unit("A"));
    space.set_strategy(Strategy::Sweep { sweepback: false });

    let mut sink = DatFileSink::new(dir.path(), "iv_curve");
    let report = space.traverse(&mut sink, &mut []).await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(report.location.unwrap().starts_with(dir.path()));

    let path = sink.path().unwrap().to_path_buf();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("# User: alice"));
    assert!(text.contains(&format!("# Run: {}", report.run_uid)));
    assert!(text.contains("#\tname: gate (V)\n#\tsize: 2"));
    assert!(text.contains("#\tname: I (A)\n#\ttype: value"));

    // blank line after each block of three
    let body: Vec<&str> = data_lines(&text)
        .into_iter()
        .skip_while(|line| line.is_empty())
        .collect();
    assert_eq!(
        body,
        vec![
            "0e0\t0e0\t0e0",
            "0e0\t1e0\t1e0",
            "0e0\t2e0\t2e0",
            "",
            "1e0\t0e0\t0e0",
            "1e0\t1e0\t1e0",
            "1e0\t2e0\t2e0",
            "",
        ]
    );

    let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
    let meta = std::fs::read_to_string(path.with_file_name(format!("{stem}.meta.txt"))).unwrap();
    assert!(meta.starts_with("#inner loop\n3\n0\n2\nbias (V)\n#outer loop\n2\n1\n0\ngate (V)\n"));

    let json = std::fs::read_to_string(path.with_extension("json")).unwrap();
    let record: RunMetadata = serde_json::from_str(&json).unwrap();
    assert_eq!(record.run.unwrap().run_uid, report.run_uid);
    assert_eq!(record.rows, 6);
    assert_eq!(record.blocks, 2);
}

#[tokio::test]
async fn test_failed_run_still_closes_file() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(MockSource::new("smu"));
    let mut space = space(source);
    space.add_axis(Axis::new("t", 0.0, 5.0, 1.0));
    let reads = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    space.add_measurand(Measurand::from_fn("signal", move || {
        let reads = reads.clone();
        async move {
            if reads.fetch_add(1, std::sync::atomic::Ordering::SeqCst) >= 2 {
                anyhow::bail!("lost lock-in");
            }
            Ok(1.5)
        }
    }));
    space.set_strategy(Strategy::Sweep { sweepback: false });

    let mut sink = DatFileSink::new(dir.path(), "timed");
    let report = space.traverse(&mut sink, &mut []).await.unwrap();
    assert!(matches!(report.outcome, RunOutcome::Failed(_)));

    let path = sink.path().unwrap().to_path_buf();
    let text = std::fs::read_to_string(&path).unwrap();
    let rows: Vec<&str> = data_lines(&text)
        .into_iter()
        .filter(|line| !line.is_empty())
        .collect();
    assert_eq!(rows, vec!["0e0\t1.5e0", "1e0\t1.5e0"]);
    let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
    assert!(path.with_file_name(format!("{stem}.meta.txt")).exists());
}

#[tokio::test]
async fn test_back_to_back_runs_keep_both_data_sets() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(MockSource::new("smu"));
    let mut space = space(source);
    space.add_axis(Axis::new("t", 0.0, 4.0, 1.0));
    space.set_strategy(Strategy::Sweep { sweepback: false });

    let mut first = DatFileSink::new(dir.path(), "iv");
    space.traverse(&mut first, &mut []).await.unwrap();
    space.remove_all_axes();
    space.add_axis(Axis::new("t", 0.0, 1.0, 1.0));
    let mut second = DatFileSink::new(dir.path(), "iv");
    space.traverse(&mut second, &mut []).await.unwrap();

    let first_path = first.path().unwrap().to_path_buf();
    let second_path = second.path().unwrap().to_path_buf();
    assert_ne!(first_path, second_path);

    let rows = |path: &std::path::Path| {
        let text = std::fs::read_to_string(path).unwrap();
        let count = data_lines(&text)
            .into_iter()
            .filter(|line| !line.is_empty())
            .count();
        count
    };
    assert_eq!(rows(&first_path), 5);
    assert_eq!(rows(&second_path), 2);
}
