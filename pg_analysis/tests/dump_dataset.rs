extern crate pg_analysis;

use std::collections::HashSet;
use std::fs::{create_dir_all, read, remove_dir_all, write};
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use proptest::prelude::*;

use phased_workload::{Key, PhasedWorkload, Session};

use pg_analysis::{
    extract_from_workload, extract_workload, write_dataset_to_file, DatasetExtractor, Error,
    RECORD_SIZE_BYTES,
};

const DUMP_DATASET: &str = env!("CARGO_BIN_EXE_pg-analysis-dump-dataset");

fn test_root(root: &str, line: u32) -> PathBuf {
    let root: String = root
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let path = std::env::temp_dir().join(format!("{}_{}", root, line));
    if path.exists() {
        remove_dir_all(&path).expect("could not prepare for test");
    }
    create_dir_all(&path).expect("could not prepare for test");
    path
}

const UNIFORM: &str = r#"
load:
  num_records: 1000
  distribution:
    type: uniform
    range_min: 1
    range_max: 1000000
run:
- num_requests: 100
  read:
    proportion_pct: 100
    distribution:
      type: zipfian
"#;

const EMPTY: &str = r#"
load:
  num_records: 0
  distribution:
    type: linspace
    start_key: 0
    step_size: 1
"#;

fn custom_workload(keys: &[Key]) -> PhasedWorkload {
    let yaml = format!(
        "load:\n  num_records: {}\n  distribution:\n    type: custom\n",
        keys.len()
    );
    let mut workload = PhasedWorkload::from_yaml(&yaml, Some(RECORD_SIZE_BYTES)).unwrap();
    workload.set_custom_load_dataset(keys.to_vec()).unwrap();
    workload
}

#[test]
fn extract_uniform() {
    let root = test_root(module_path!(), line!());
    let config = root.join("uniform.yaml");
    write(&config, UNIFORM).unwrap();
    let db = extract_workload(&config, RECORD_SIZE_BYTES).unwrap();
    let mut dataset = db.take_dataset();
    assert_eq!(1000, dataset.len());
    assert_eq!(1000, dataset.iter().collect::<HashSet<_>>().len());
    assert!(dataset.iter().all(|k| (1..=1_000_000).contains(k)));
    let output = root.join("uniform.txt");
    write_dataset_to_file(&mut dataset, &output).unwrap();
    let text = String::from_utf8(read(&output).unwrap()).unwrap();
    let keys: Vec<Key> = text.lines().map(|line| line.parse().unwrap()).collect();
    assert_eq!(1000, keys.len());
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
    assert!(text.ends_with('\n'));
}

#[test]
fn extraction_is_deterministic() {
    let root = test_root(module_path!(), line!());
    let config = root.join("uniform.yaml");
    write(&config, UNIFORM).unwrap();
    let mut outputs = vec![];
    for name in ["first.txt", "second.txt"] {
        let db = extract_workload(&config, RECORD_SIZE_BYTES).unwrap();
        let output = root.join(name);
        write_dataset_to_file(&mut db.take_dataset(), &output).unwrap();
        outputs.push(read(&output).unwrap());
    }
    assert_eq!(outputs[0], outputs[1]);
}

const CUSTOM_WITH_RUN: &str = r#"
load:
  num_records: 3
  distribution:
    type: custom
run:
- num_requests: 400
  read:
    proportion_pct: 25
    distribution:
      type: zipfian
  update:
    proportion_pct: 25
    distribution:
      type: uniform
  scan:
    proportion_pct: 25
    max_length: 10
    distribution:
      type: uniform
  insert:
    proportion_pct: 25
    distribution:
      type: linspace
      start_key: 100
      step_size: 1
"#;

#[test]
fn run_phases_leave_the_dataset_alone() {
    let mut workload =
        PhasedWorkload::from_yaml(CUSTOM_WITH_RUN, Some(RECORD_SIZE_BYTES)).unwrap();
    workload.set_custom_load_dataset(vec![5, 1, 3]).unwrap();
    let db = Arc::new(DatasetExtractor::default());
    let mut session = Session::new(2).unwrap();
    session.set_database(Arc::clone(&db)).unwrap();
    session.initialize().unwrap();
    session
        .replay_bulk_load_trace(&workload.get_load_trace().unwrap())
        .unwrap();
    let stats = session.run_phased_workload(&workload).unwrap();
    session.terminate().unwrap();
    assert_eq!(400, stats.requests());
    assert!(stats.inserts > 0);
    assert!(stats.updates > 0);
    assert!(stats.reads > 0);
    assert_eq!(0, stats.reads_found);
    assert_eq!(0, stats.scanned_keys);
    assert_eq!(vec![5, 1, 3], db.dataset());
}

#[test]
fn five_one_three() {
    let root = test_root(module_path!(), line!());
    let db = extract_from_workload(&custom_workload(&[5, 1, 3])).unwrap();
    assert_eq!(vec![5, 1, 3], db.dataset());
    let output = root.join("dataset.txt");
    write_dataset_to_file(&mut db.take_dataset(), &output).unwrap();
    assert_eq!(b"1\n3\n5\n".to_vec(), read(&output).unwrap());
}

#[test]
fn empty_load() {
    let root = test_root(module_path!(), line!());
    let config = root.join("empty.yaml");
    write(&config, EMPTY).unwrap();
    let db = extract_workload(&config, RECORD_SIZE_BYTES).unwrap();
    assert!(db.is_empty());
    let output = root.join("empty.txt");
    write_dataset_to_file(&mut db.take_dataset(), &output).unwrap();
    assert!(read(&output).unwrap().is_empty());
}

#[test]
fn overwrite_existing_output() {
    let root = test_root(module_path!(), line!());
    let output = root.join("dataset.txt");
    write(&output, "stale\nstale\nstale\nstale\n").unwrap();
    let db = extract_from_workload(&custom_workload(&[2, 1])).unwrap();
    write_dataset_to_file(&mut db.take_dataset(), &output).unwrap();
    assert_eq!(b"1\n2\n".to_vec(), read(&output).unwrap());
}

#[test]
fn missing_config() {
    let root = test_root(module_path!(), line!());
    match extract_workload(root.join("does-not-exist.yaml"), RECORD_SIZE_BYTES) {
        Err(Error::Workload(phased_workload::Error::Io(_))) => {}
        Err(err) => panic!("unexpected error {:?}", err),
        Ok(_) => panic!("extracted a workload that does not exist"),
    }
}

#[test]
fn malformed_config() {
    let root = test_root(module_path!(), line!());
    let config = root.join("malformed.yaml");
    write(&config, "load: [this is not a load phase\n").unwrap();
    assert!(matches!(
        extract_workload(&config, RECORD_SIZE_BYTES),
        Err(Error::Workload(phased_workload::Error::Yaml(_)))
    ));
}

#[test]
fn custom_without_dataset() {
    let workload = PhasedWorkload::from_yaml(
        "load:\n  num_records: 2\n  distribution:\n    type: custom\n",
        None,
    )
    .unwrap();
    assert!(matches!(
        extract_from_workload(&workload),
        Err(Error::Workload(phased_workload::Error::InvalidWorkload(_)))
    ));
}

#[test]
fn command_line_success() {
    let root = test_root(module_path!(), line!());
    let config = root.join("uniform.yaml");
    write(&config, UNIFORM).unwrap();
    let output = root.join("dataset.txt");
    let status = Command::new(DUMP_DATASET)
        .arg(&config)
        .arg("--output_file")
        .arg(&output)
        .status()
        .unwrap();
    assert!(status.success());
    let text = String::from_utf8(read(&output).unwrap()).unwrap();
    assert_eq!(1000, text.lines().count());

    let db = extract_workload(&config, RECORD_SIZE_BYTES).unwrap();
    let library = root.join("library.txt");
    write_dataset_to_file(&mut db.take_dataset(), &library).unwrap();
    assert_eq!(read(&library).unwrap(), read(&output).unwrap());
}

#[test]
fn command_line_invalid_config() {
    let root = test_root(module_path!(), line!());
    let output = root.join("dataset.txt");
    let status = Command::new(DUMP_DATASET)
        .arg(root.join("does-not-exist.yaml"))
        .arg("--output_file")
        .arg(&output)
        .status()
        .unwrap();
    assert!(!status.success());
    assert!(!output.exists());
}

#[test]
fn command_line_missing_output_file() {
    let root = test_root(module_path!(), line!());
    let config = root.join("empty.yaml");
    write(&config, EMPTY).unwrap();
    let status = Command::new(DUMP_DATASET).arg(&config).status().unwrap();
    assert!(!status.success());
}

#[test]
fn command_line_missing_config() {
    let root = test_root(module_path!(), line!());
    let status = Command::new(DUMP_DATASET)
        .arg("--output_file")
        .arg(root.join("dataset.txt"))
        .status()
        .unwrap();
    assert!(!status.success());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn captures_the_load_in_order(keys in proptest::collection::hash_set(any::<u64>(), 0..64)) {
        let keys: Vec<Key> = keys.into_iter().collect();
        let db = extract_from_workload(&custom_workload(&keys)).unwrap();
        prop_assert_eq!(&keys, &db.dataset());
    }

    #[test]
    fn output_is_sorted(keys in proptest::collection::hash_set(any::<u64>(), 0..64)) {
        let keys: Vec<Key> = keys.into_iter().collect();
        let db = extract_from_workload(&custom_workload(&keys)).unwrap();
        let mut dataset = db.take_dataset();
        let mut output = Vec::new();
        pg_analysis::write_dataset(&mut dataset, &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        let written: Vec<Key> = text.lines().map(|line| line.parse().unwrap()).collect();
        prop_assert_eq!(keys.len(), written.len());
        prop_assert!(written.windows(2).all(|w| w[0] <= w[1]));
    }
}
