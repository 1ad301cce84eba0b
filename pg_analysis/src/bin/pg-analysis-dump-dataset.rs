//! Dump the dataset a workload's load phase generates, sorted, one key per line.

use pg_analysis::{extract_workload, write_dataset_to_file, RECORD_SIZE_BYTES};

const USAGE: &str = "USAGE: pg-analysis-dump-dataset --output_file <path> <workload_config>";

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut opts = getopts::Options::new();
    opts.reqopt(
        "",
        "output_file",
        "Where to write the sorted keys.",
        "PATH",
    );
    let matches = match opts.parse(&args) {
        Ok(matches) => matches,
        Err(err) => {
            eprintln!("{}", err);
            eprintln!("{}", opts.usage(USAGE));
            std::process::exit(1);
        }
    };
    if matches.free.len() != 1 {
        eprintln!("expected exactly one workload config, got {}", matches.free.len());
        eprintln!("{}", opts.usage(USAGE));
        std::process::exit(1);
    }
    // reqopt means parse fails without --output_file.
    let output_file = matches.opt_str("output_file").unwrap_or_default();
    let workload_config = &matches.free[0];

    let db = match extract_workload(workload_config, RECORD_SIZE_BYTES) {
        Ok(db) => db,
        Err(err) => {
            eprintln!("could not extract {}: {}", workload_config, err);
            std::process::exit(1);
        }
    };
    let mut dataset = db.take_dataset();
    if let Err(err) = write_dataset_to_file(&mut dataset, &output_file) {
        eprintln!("could not write {}: {}", output_file, err);
        std::process::exit(1);
    }
}
