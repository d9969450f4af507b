#[macro_use]
extern crate log;

extern crate bio;
extern crate clap;

extern crate rmem;

use bio::io::fasta;
use clap::{App, Arg};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rmem::error::RmemResult;
use rmem::index::RefIndex;
use rmem::io::write_to_file;
use rmem::util;

fn build_index(reference_path: &str,
               index_path: &str,
               occ_interval: u32,
               sa_sample: usize)
               -> RmemResult<()> {
    let reader = fasta::Reader::new(BufReader::new(File::open(Path::new(reference_path))?));

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        records.push((record.id().to_owned(), record.seq().to_vec()));
    }
    info!("Parsed {} reference sequences, building index...", records.len());

    let index = RefIndex::new(records, occ_interval, sa_sample)?;

    info!("Writing index to {} ...", index_path);
    write_to_file(&index, index_path)?;
    Ok(())
}

fn main() {
    let args = App::new("rmem-index")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Build an alignment index from a FASTA reference.")
        .arg(Arg::with_name("FASTA")
            .short("f")
            .long("fasta")
            .help("Path to the reference FASTA file.")
            .takes_value(true)
            .required(true))
        .arg(Arg::with_name("INDEX")
            .short("i")
            .long("index")
            .help("Path to write the index file.")
            .takes_value(true)
            .required(true))
        .arg(Arg::with_name("OCC_INTERVAL")
            .long("occ-interval")
            .takes_value(true)
            .help("Sampling interval of the occurrence table.")
            .default_value("32"))
        .arg(Arg::with_name("SA_SAMPLE")
            .long("sa-sample")
            .takes_value(true)
            .help("Sampling rate of the suffix array.")
            .default_value("32"))
        .arg(Arg::with_name("VERBOSE")
            .short("v")
            .help("Include this flag to trigger debug-level logging."))
        .get_matches();

    util::init_logging(if args.is_present("VERBOSE") {
        log::LogLevelFilter::Debug
    } else {
        log::LogLevelFilter::Info
    });

    let fasta_path = args.value_of("FASTA").unwrap();
    let index_path = args.value_of("INDEX").unwrap();

    let occ_interval = match args.value_of("OCC_INTERVAL") {
        Some(s) => s.parse::<u32>().expect("Invalid occurrence sampling interval!"),
        None => unreachable!(),
    };
    let sa_sample = match args.value_of("SA_SAMPLE") {
        Some(s) => {
            let sa_sample = s.parse::<usize>().expect("Invalid suffix array sample rate!");
            if sa_sample == 0 {
                panic!("Suffix array sample rate must be positive");
            }
            sa_sample
        },
        None => unreachable!(),
    };

    let exit_code = match build_index(fasta_path, index_path, occ_interval, sa_sample) {
        Ok(()) => {
            info!("Index written to {}", index_path);
            0
        },
        Err(why) => {
            error!("Error building index: {}", why);
            2
        },
    };

    std::process::exit(exit_code);
}
