#[macro_use]
extern crate log;

extern crate bio;
extern crate clap;
extern crate flate2;

extern crate rmem;

use bio::io::{fasta, fastq};
use clap::{App, Arg};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::process::exit;
use std::time::Instant;

use rmem::error::{RmemError, RmemResult};
use rmem::index::RefIndex;
use rmem::io::from_file;
use rmem::mapper::{process_batch, SeqRead};
use rmem::opts::{MapOpts, FLAG_HARDCLIP};
use rmem::sam;
use rmem::util;

fn open_maybe_gz(path: &str) -> RmemResult<Box<dyn Read + Send>> {
    let mut file = File::open(Path::new(path))?;
    let mut magic = [0u8; 2];
    let read_len = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;

    if read_len == 2 && magic == [0x1f, 0x8b] {
        Ok(Box::new(GzDecoder::new(file)?))
    } else {
        Ok(Box::new(file))
    }
}

enum FastxRecord {
    Fasta(fasta::Record),
    Fastq(fastq::Record),
}

impl FastxRecord {
    fn id(&self) -> &str {
        match *self {
            FastxRecord::Fasta(ref r) => r.id(),
            FastxRecord::Fastq(ref r) => r.id(),
        }
    }

    fn seq(&self) -> &[u8] {
        match *self {
            FastxRecord::Fasta(ref r) => r.seq(),
            FastxRecord::Fastq(ref r) => r.seq(),
        }
    }

    fn qual(&self) -> Option<&[u8]> {
        match *self {
            FastxRecord::Fasta(_) => None,
            FastxRecord::Fastq(ref r) => Some(r.qual()),
        }
    }
}

/// Map every read of the input against the index, writing SAM in input
/// order. Reads are gathered into batches of roughly `chunk_size *
/// n_threads` query bases between barriers.
fn align_reads(input_path: &str,
               input_type: &str,
               index_path: &str,
               results_path: Option<&str>,
               opts: &MapOpts)
               -> RmemResult<()> {
    let input_type = input_type.to_ascii_uppercase();

    let records: Box<dyn Iterator<Item = RmemResult<FastxRecord>>> = if input_type == "FASTA" {
        Box::new(fasta::Reader::new(open_maybe_gz(input_path)?)
            .records()
            .map(|r| r.map(FastxRecord::Fasta).map_err(RmemError::from)))
    } else if input_type == "FASTQ" {
        Box::new(fastq::Reader::new(open_maybe_gz(input_path)?)
            .records()
            .map(|r| r.map(FastxRecord::Fastq).map_err(RmemError::from)))
    } else {
        return Err(RmemError::InvalidHeader(format!("Unknown input type: {}", input_type)));
    };

    info!("Deserializing reference index ...");
    let index: RefIndex = from_file(index_path)?;

    let mut writer: Box<dyn Write> = match results_path {
        Some(p) => Box::new(BufWriter::new(File::create(Path::new(p))?)),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };
    writer.write_all(sam::header(&index).as_bytes())?;

    info!("Beginning queries.");
    let timer = Instant::now();

    let budget = opts.chunk_size * opts.n_threads.max(1);
    let mut batch: Vec<SeqRead> = Vec::new();
    let mut batch_bases = 0usize;
    let mut n_reads = 0usize;

    let mut flush = |batch: &mut Vec<SeqRead>, writer: &mut dyn Write| -> RmemResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        process_batch(opts, &index, batch)?;
        for read in batch.drain(..) {
            writer.write_all(read.sam.as_bytes())?;
        }
        Ok(())
    };

    for record in records {
        let record = record?;
        batch_bases += record.seq().len();
        batch.push(SeqRead::new(record.id().to_owned(),
                                util::encode_seq(record.seq()),
                                record.qual().map(|q| q.to_vec())));
        n_reads += 1;
        if batch_bases >= budget {
            flush(&mut batch, &mut *writer)?;
            batch_bases = 0;
        }
    }
    flush(&mut batch, &mut *writer)?;
    writer.flush()?;

    info!("Aligned {} reads in {} seconds.",
          n_reads,
          timer.elapsed().as_millis() as f32 / 1000.0);
    Ok(())
}

fn main() {
    let args = App::new("rmem-align")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Seed-and-extend read alignment against a prebuilt index.")
        .arg(Arg::with_name("FASTA")
            .long("fasta")
            .help("Path to FASTA reads.")
            .takes_value(true)
            .required_unless("FASTQ")
            .conflicts_with("FASTQ"))
        .arg(Arg::with_name("FASTQ")
            .long("fastq")
            .help("Path to FASTQ reads.")
            .takes_value(true)
            .required_unless("FASTA")
            .conflicts_with("FASTA"))
        .arg(Arg::with_name("INDEX")
            .short("i")
            .long("index")
            .help("Path to the index file.")
            .takes_value(true)
            .required(true))
        .arg(Arg::with_name("RESULTS_PATH")
            .short("o")
            .long("output")
            .takes_value(true)
            .help("Path to write SAM output; stdout when omitted."))
        .arg(Arg::with_name("NUM_THREADS")
            .short("t")
            .long("threads")
            .takes_value(true)
            .help("Number of worker threads to spawn.")
            .default_value("1"))
        .arg(Arg::with_name("MATCH_SCORE")
            .short("A")
            .takes_value(true)
            .help("Match score.")
            .default_value("1"))
        .arg(Arg::with_name("MISMATCH_PENALTY")
            .short("B")
            .takes_value(true)
            .help("Mismatch penalty.")
            .default_value("4"))
        .arg(Arg::with_name("GAP_OPEN")
            .short("O")
            .takes_value(true)
            .help("Gap open penalty.")
            .default_value("6"))
        .arg(Arg::with_name("GAP_EXTEND")
            .short("E")
            .takes_value(true)
            .help("Gap extension penalty.")
            .default_value("1"))
        .arg(Arg::with_name("BAND_WIDTH")
            .short("w")
            .takes_value(true)
            .help("Band width for extension alignment.")
            .default_value("100"))
        .arg(Arg::with_name("MIN_SEED_LEN")
            .short("k")
            .long("min-seed")
            .takes_value(true)
            .help("Discard exact matches shorter than this.")
            .default_value("19"))
        .arg(Arg::with_name("MAX_OCC")
            .short("c")
            .long("max-occ")
            .takes_value(true)
            .help("Skip seeds occurring more often than this.")
            .default_value("10000"))
        .arg(Arg::with_name("HARDCLIP")
            .long("hard-clip")
            .help("Hard-clip instead of soft-clip in SAM output."))
        .arg(Arg::with_name("VERBOSE")
            .short("v")
            .help("Include this flag to trigger debug-level logging."))
        .get_matches();

    util::init_logging(if args.is_present("VERBOSE") {
        log::LogLevelFilter::Debug
    } else {
        log::LogLevelFilter::Info
    });

    let exit_code = {
        let fasta_path = args.value_of("FASTA");
        let fastq_path = args.value_of("FASTQ");
        let index_path = args.value_of("INDEX").unwrap();
        let results_path = args.value_of("RESULTS_PATH");

        let (input_path, input_type) = if let Some(p) = fasta_path {
            (p, "FASTA")
        } else {
            (fastq_path.unwrap(), "FASTQ")
        };

        let mut opts = MapOpts::default();

        opts.n_threads = match args.value_of("NUM_THREADS") {
            Some(s) => {
                let t = s.parse::<usize>()
                    .expect("Invalid number entered for number of threads!");
                if t == 0 {
                    panic!("Thread count must be positive");
                }
                t
            },
            None => unreachable!(),
        };
        opts.a = parse_arg(&args, "MATCH_SCORE");
        opts.b = parse_arg(&args, "MISMATCH_PENALTY");
        opts.q = parse_arg(&args, "GAP_OPEN");
        opts.r = parse_arg(&args, "GAP_EXTEND");
        opts.w = parse_arg(&args, "BAND_WIDTH");
        opts.min_seed_len = parse_arg(&args, "MIN_SEED_LEN");
        opts.max_occ = parse_arg::<usize>(&args, "MAX_OCC");
        if args.is_present("HARDCLIP") {
            opts.flag |= FLAG_HARDCLIP;
        }
        opts.fill_scmat();

        if opts.min_seed_len < 10 {
            warn!("Seed length below 10 may produce large numbers of spurious hits.");
        }

        match align_reads(input_path, input_type, index_path, results_path, &opts) {
            Ok(()) => 0,
            Err(why) => {
                error!("Error running alignment: {}", why);
                2
            },
        }
    };

    exit(exit_code);
}

fn parse_arg<T: std::str::FromStr>(args: &clap::ArgMatches, name: &str) -> T {
    match args.value_of(name) {
        Some(s) => match s.parse::<T>() {
            Ok(v) => v,
            Err(_) => panic!("Invalid value for {}: {}", name, s),
        },
        None => unreachable!(),
    }
}
