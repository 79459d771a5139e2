//! Fixture: stands in for a QZKP simulation script.
//!
//! Accepts the same positional arguments as the real scripts:
//! `<key_length> v` (basic) or `<key_length> <iterations> [<p1> <p2> <attacker>]`
//! (iterative). Iterative runs print one progress line per iteration and
//! write `fake_results.csv` into the working directory.
//!
//! Behaviour knobs, read from the environment:
//! - `QZKP_FAKE_STDERR`: text written to stderr before exiting
//! - `QZKP_FAKE_EXIT`: exit code (default 0)
//! - `QZKP_FAKE_NO_CSV`: skip writing the result file

// Test fixtures require special allowances - they are not production code
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]
#![allow(clippy::exit)]

use std::fs;
use std::io::{self, Write};

const RESULT_FILE: &str = "fake_results.csv";

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let key_length = args.first().cloned().unwrap_or_default();
    let mode = args.get(1).cloned().unwrap_or_default();

    if mode == "v" || mode.is_empty() {
        println!("Basic protocol, key length {key_length}");
        println!("Verifier accepted the proof");
    } else {
        let iterations: u32 = mode.parse().unwrap_or(1);
        let extra = args.get(2..).map(|rest| rest.join(" ")).unwrap_or_default();
        println!("Iterative run: key={key_length} iterations={iterations} {extra}");
        let mut csv = String::from("Iteration,Percentages,Decision\n");
        for i in 1..=iterations {
            let done = f64::from(i) * 100.0 / f64::from(iterations);
            println!("Iteration {i}/{iterations} complete {done:.2}%");
            io::stdout().flush().ok();
            let decision = i % 2;
            let rate = if decision == 0 { 90 + i % 5 } else { 10 + i % 7 };
            csv.push_str(&format!("{i},{rate}.0,{decision}\n"));
        }
        if std::env::var_os("QZKP_FAKE_NO_CSV").is_none() {
            if let Err(err) = fs::write(RESULT_FILE, csv) {
                eprintln!("could not write {RESULT_FILE}: {err}");
            }
        }
    }

    if let Ok(text) = std::env::var("QZKP_FAKE_STDERR") {
        eprint!("{text}");
    }
    let code = std::env::var("QZKP_FAKE_EXIT")
        .ok()
        .and_then(|value| value.parse::<i32>().ok())
        .unwrap_or(0);
    std::process::exit(code);
}
