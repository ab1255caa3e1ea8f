use std::process::exit;

use covering_cli::cli::parse_args;
use covering_cli::cli::run;

fn main() {
    let args = parse_args();
    if let Err(e) = run(&args) {
        eprintln!("{e:#}");
        exit(1);
    }
}
