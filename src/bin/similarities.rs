/**
 * LatentReco
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

extern crate env_logger;
extern crate getopts;
extern crate latentreco;
extern crate log;
extern crate num_cpus;

use std::env;
use std::error::Error;

use getopts::Options;
use log::info;

use latentreco::io;
use latentreco::{Cosine, EntityMapping, Pearson};

fn main() {

    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("i", "inputfile", "Input file name (required). The input consists of pairs of \
        an item and one of its attributes. The input file must contain one pair of integer ids \
        per line, separated by whitespace. Item and attribute ids are independent.", "PATH");
    opts.optopt("o", "outputfile", "Output file name (optional, output will be written to stdout \
        by default).", "PATH");
    opts.optopt("n", "num-neighbors", "Number of most similar items to output per item \
        (optional, defaults to 10).", "NUMBER");
    opts.optopt("m", "measure", "Similarity measure, either 'cosine' or 'pearson' (optional, \
        defaults to cosine).", "MEASURE");
    opts.optflag("h", "help", "Print this help menu");

    let matches = match opts.parse(&args[1..]) {
        Ok(matches) => matches,
        Err(failure) => {
            let hint = failure.to_string();
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    if matches.opt_present("h") {
        return print_usage_and_exit(&program, opts, None);
    }

    let relation_path = match matches.opt_str("i") {
        Some(path) => path,
        None => return print_usage_and_exit(
            &program,
            opts,
            Some("Please specify an inputfile via --inputfile."),
        ),
    };

    let output_path = matches.opt_str("o");

    let k: usize = match matches.opt_get_default("n", 10) {
        Ok(k) => k,
        Err(failure) => {
            let hint = format!("Problem with option 'n': {}", failure.to_string());
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    let measure = matches.opt_str("m").unwrap_or_else(|| "cosine".to_string());

    if measure != "cosine" && measure != "pearson" {
        let hint = format!("Unknown similarity measure '{}'.", measure);
        return print_usage_and_exit(&program, opts, Some(&hint));
    }

    if let Err(failure) = compute_similarities(&relation_path, k, &measure, output_path) {
        eprintln!("{}", failure);
        std::process::exit(1);
    }
}

fn print_usage_and_exit(
    program: &str,
    opts: Options,
    hint: Option<&str>
) {

    if let Some(hint) = hint {
        eprintln!("\n{}\n", hint);
    }

    let brief = format!("Usage: {} [options]", program);
    eprint!("{}", opts.usage(&brief));
}

fn compute_similarities(
    relation_path: &str,
    k: usize,
    measure: &str,
    output_path: Option<String>
) -> Result<(), Box<dyn Error>> {

    info!("Reading {}", relation_path);

    let mut items = EntityMapping::new();
    let mut attributes = EntityMapping::new();
    let relation =
        io::read_bipartite_relation_from_file(relation_path, &mut items, &mut attributes)?;

    info!("Computing {} similarities between {} items with {} attributes", measure,
        relation.num_rows(), relation.num_columns());

    let correlations = if measure == "pearson" {
        let pearson = Pearson::new(relation.num_columns());
        latentreco::row_similarities(&relation, &pearson, num_cpus::get())
    } else {
        latentreco::row_similarities(&relation, &Cosine, num_cpus::get())
    };

    info!("Writing {} most similar items per item...", k);
    io::write_neighbors(&correlations, &items, k, output_path)?;

    Ok(())
}
